//! Preparing raw agent step logs for the `agent` built-in schema.

use crate::packet::{Packet, Scalar};
use crate::router::CONFIDENCE_PATH_KEY;

pub const DEFAULT_EPISODE_GROUP_SIZE: i64 = 10;

const TOOL_FAMILIES: [(&str, &[&str]); 3] = [
    (
        "search",
        &["search", "web_search", "info_gather", "weather_api", "web_"],
    ),
    ("math", &["python", "eval", "calc", "compute", "math"]),
    ("memory", &["memory", "recall", "retrieve", "compress", "vector"]),
];

const PACKET_DEFAULTS: [(&str, &str); 5] = [
    ("error_type", "unknown"),
    ("operation", "general"),
    ("tool_name", "misc"),
    ("episode", "unknown"),
    ("step", "unknown"),
];

/// Buckets episodes into ranges to keep directory fan-out small.
///
/// `compute_episode_group(15, 10)` is `Some("10-19")`; `None` when the range
/// does not fit in an `i64`.
pub fn compute_episode_group(episode: i64, group_size: i64) -> Option<String> {
    let size = group_size.max(1);
    let base = episode.div_euclid(size).checked_mul(size)?;
    let last = base.checked_add(size - 1)?;
    Some(format!("{base}-{last}"))
}

/// Coarse tool family for an action name, `"other"` when nothing matches.
pub fn extract_tool_family(action: &str) -> &'static str {
    let action = action.to_lowercase();
    TOOL_FAMILIES
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|kw| action.contains(kw)))
        .map(|(family, _)| *family)
        .unwrap_or("other")
}

pub fn compute_confidence_path(confidence: Option<f64>) -> &'static str {
    match confidence {
        None => "",
        Some(c) if c >= 0.90 => "/high_conf",
        Some(c) if c >= 0.75 => "/medium_conf",
        Some(_) => "/low_conf",
    }
}

/// Turns a raw agent log into a routing packet.
///
/// Adds `episode_group`, `tool_family` (from `action`, unless set) and
/// `confidence_path`, then fills the optional fields the agent schema's
/// templates refer to.
pub fn prepare_agent_packet(log: &Packet) -> Packet {
    let mut packet = log.clone();

    let episode = match log.get("episode") {
        Some(Scalar::Integer(episode)) => Some(*episode),
        // Saturates; out-of-range floats then fail the checked arithmetic.
        Some(Scalar::Float(episode)) => Some(episode.floor() as i64),
        Some(other) => {
            log::debug!("Episode {other} is not numeric; no episode_group");
            None
        }
        None => None,
    };
    if let Some(episode) = episode {
        match compute_episode_group(episode, DEFAULT_EPISODE_GROUP_SIZE) {
            Some(group) => {
                packet.insert("episode_group", group);
            }
            None => log::debug!("Episode {episode} out of range; no episode_group"),
        }
    }

    if !log.contains_key("tool_family") {
        if let Some(action) = log.get("action") {
            packet.insert("tool_family", extract_tool_family(&action.to_string()));
        }
    }

    let confidence = log.get("confidence").and_then(Scalar::as_number);
    packet.insert(CONFIDENCE_PATH_KEY, compute_confidence_path(confidence));

    for (key, default) in PACKET_DEFAULTS {
        packet.insert_default(key, default);
    }

    packet
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn episode_groups() {
        assert_eq!(compute_episode_group(5, 10).as_deref(), Some("0-9"));
        assert_eq!(compute_episode_group(15, 10).as_deref(), Some("10-19"));
        assert_eq!(compute_episode_group(100, 10).as_deref(), Some("100-109"));
        assert_eq!(compute_episode_group(7, 5).as_deref(), Some("5-9"));
        assert_eq!(compute_episode_group(-3, 10).as_deref(), Some("-10--1"));
    }

    #[test]
    fn extreme_episodes_have_no_group() {
        assert_eq!(compute_episode_group(i64::MAX, 10), None);
        assert_eq!(compute_episode_group(i64::MIN, 10), None);
        assert_eq!(
            compute_episode_group(i64::MAX - 7, 1).as_deref(),
            Some("9223372036854775800-9223372036854775800")
        );

        for episode in [json!(i64::MAX), json!(i64::MIN), json!(1e30), json!(-1e30)] {
            let log = Packet::from_value(&json!({"episode": episode, "outcome": "success"})).unwrap();
            let packet = prepare_agent_packet(&log);
            assert!(!packet.contains_key("episode_group"), "{episode}");
            assert_eq!(packet.text_or("outcome", ""), "success");
        }
    }

    #[test]
    fn tool_families() {
        assert_eq!(extract_tool_family("web_search"), "search");
        assert_eq!(extract_tool_family("Python_Exec"), "math");
        assert_eq!(extract_tool_family("vector_lookup"), "memory");
        assert_eq!(extract_tool_family("send_email"), "other");
    }

    #[test]
    fn confidence_buckets() {
        assert_eq!(compute_confidence_path(Some(0.95)), "/high_conf");
        assert_eq!(compute_confidence_path(Some(0.90)), "/high_conf");
        assert_eq!(compute_confidence_path(Some(0.8)), "/medium_conf");
        assert_eq!(compute_confidence_path(Some(0.1)), "/low_conf");
        assert_eq!(compute_confidence_path(None), "");
    }

    #[test]
    fn prepares_packet_with_derived_fields_and_defaults() {
        let log = Packet::from_value(&json!({
            "step": 1,
            "episode": 5,
            "action": "web_search",
            "outcome": "success",
            "confidence": 0.95
        }))
        .unwrap();
        let packet = prepare_agent_packet(&log);

        assert_eq!(packet.text_or("episode_group", ""), "0-9");
        assert_eq!(packet.text_or("tool_family", ""), "search");
        assert_eq!(packet.text_or("confidence_path", ""), "/high_conf");
        assert_eq!(packet.text_or("error_type", ""), "unknown");
        assert_eq!(packet.text_or("step", ""), "1");
    }

    #[test]
    fn keeps_explicit_tool_family() {
        let log = Packet::from_value(&json!({"action": "python", "tool_family": "custom"})).unwrap();
        let packet = prepare_agent_packet(&log);
        assert_eq!(packet.text_or("tool_family", ""), "custom");
        assert_eq!(packet.text_or("confidence_path", "x"), "");
        assert_eq!(packet.text_or("episode", ""), "unknown");
    }
}
