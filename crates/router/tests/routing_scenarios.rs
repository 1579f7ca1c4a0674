use coherence_router::{
    prepare_agent_packet, BuiltinSchema, Packet, QuarantineReason, RoutingSchema, SchemaRouter,
};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::path::{Path, PathBuf};

fn packet(value: serde_json::Value) -> Packet {
    Packet::from_value(&value).expect("packet object")
}

fn outcome_router(root: &Path) -> SchemaRouter {
    let schema = RoutingSchema::from_value(&json!({
        "outcome": {
            "success": "{tool}/{step}.json",
            "failure": "{error_type=unknown}/{step}.json"
        }
    }));
    SchemaRouter::new(schema, root)
}

#[test]
fn success_and_failure_packets_land_in_their_branches() {
    let root = PathBuf::from("data_lake");
    let router = outcome_router(&root);

    let success = router
        .transmit(&packet(json!({"outcome": "success", "tool": "search", "step": 3})), true)
        .unwrap();
    assert_eq!(success, root.join("outcome=success/search/3.json"));

    let failure = router
        .transmit(&packet(json!({"outcome": "failure", "step": 4})), true)
        .unwrap();
    assert_eq!(failure, root.join("outcome=failure/unknown/4.json"));
}

#[test]
fn dry_run_routing_is_deterministic() {
    let router = outcome_router(Path::new("lake"));
    let p = packet(json!({"outcome": "success", "tool": "math", "step": 9}));
    let first = router.transmit(&p, true).unwrap();
    for _ in 0..16 {
        assert_eq!(router.transmit(&p, true).unwrap(), first);
    }
}

#[test]
fn transmit_does_not_modify_the_callers_packet() {
    let router = outcome_router(Path::new("lake"));
    let p = packet(json!({"outcome": "failure", "step": 4}));
    let before = p.clone();
    router.transmit(&p, true).unwrap();
    assert_eq!(p, before);
}

#[test]
fn receive_on_two_level_schema_yields_two_wildcards() {
    let schema = RoutingSchema::from_value(&json!({
        "outcome": {
            "success": {"tool": {"search": "{step}.json"}},
            "failure": {"tool": {"search": "{step}.json"}}
        }
    }));
    let router = SchemaRouter::new(schema, "lake");
    let pattern = router.receive(&Packet::new());

    assert_eq!(pattern, "lake/outcome=*/tool=*/*");
    assert_eq!(pattern.matches("=*").count(), 2);
    assert!(pattern.ends_with("/*"));
}

#[test]
fn receive_patterns_match_transmitted_paths() {
    let dir = tempfile::tempdir().unwrap();
    let router = outcome_router(dir.path());

    let stored = router
        .transmit(&packet(json!({"outcome": "success", "tool": "search", "step": 1})), false)
        .unwrap();
    std::fs::write(&stored, "{}").unwrap();

    let pattern = router.receive(&packet(json!({"outcome": "success"})));
    let found: Vec<PathBuf> = glob::glob(&format!("{pattern}/*"))
        .unwrap()
        .filter_map(Result::ok)
        .collect();
    assert_eq!(found, vec![stored]);
}

#[test]
fn agent_schema_routes_prepared_logs() {
    let schema = BuiltinSchema::Agent.load().unwrap();
    let router = SchemaRouter::new(schema, "memory");

    let log = packet(json!({
        "step": 1,
        "episode": 5,
        "action": "web_search",
        "outcome": "success",
        "confidence": 0.95
    }));
    let path = router.transmit(&prepare_agent_packet(&log), true).unwrap();
    assert_eq!(
        path,
        PathBuf::from("memory/outcome=success/high_conf/search/0-9/1.json")
    );

    let failed = packet(json!({"step": 2, "episode": 12, "outcome": "failure", "action": "calc"}));
    let path = router.transmit(&prepare_agent_packet(&failed), true).unwrap();
    assert_eq!(path, PathBuf::from("memory/outcome=failure/unknown/10-19/2.json"));
}

#[test]
fn agent_schema_quarantines_logs_without_outcome() {
    let router = SchemaRouter::new(BuiltinSchema::Agent.load().unwrap(), "memory");
    let outcome = router.route(&packet(json!({"id": "ep3", "step": 1})));
    assert_eq!(
        outcome.quarantine_reason(),
        Some(&QuarantineReason::MissingMetadata {
            key: "outcome".to_string()
        })
    );
    assert!(outcome.path().starts_with("memory/_intake/missing_metadata"));
}

#[test]
fn memory_schema_routes_three_levels_deep() {
    let router = SchemaRouter::new(BuiltinSchema::Memory.load().unwrap(), "mem");
    let path = router
        .transmit(
            &packet(json!({
                "outcome": "failure",
                "tool": "code_interpreter",
                "error_type": "syntax",
                "timestamp": "20260101_120000",
                "summary": "missing_paren"
            })),
            true,
        )
        .unwrap();
    assert_eq!(
        path,
        PathBuf::from(
            "mem/outcome=failure/tool=code_interpreter/error_type=syntax/20260101_120000_missing_paren.json"
        )
    );
}
