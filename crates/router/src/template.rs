use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use thiserror::Error;

use crate::packet::{Packet, Scalar};

static DEFAULT_PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{(\w+)=([^}]+)\}").expect("valid placeholder regex"));

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TemplateError {
    #[error("template field '{0}' has no value")]
    MissingField(String),

    #[error("malformed template: {0}")]
    Malformed(String),
}

/// Expands a leaf path template against a packet.
///
/// `{field=default}` supplies `default` when the packet lacks `field`; the
/// default then applies to every later `{field}` in the same template too.
/// `{{` and `}}` are literal braces.
pub fn render_template(template: &str, packet: &Packet) -> Result<String, TemplateError> {
    let mut values = packet.clone();
    let template = DEFAULT_PLACEHOLDER.replace_all(template, |caps: &Captures<'_>| {
        values.insert_default(&caps[1], Scalar::from(&caps[2]));
        format!("{{{}}}", &caps[1])
    });
    substitute(&template, &values)
}

fn substitute(template: &str, values: &Packet) -> Result<String, TemplateError> {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                out.push('{');
            }
            '{' => {
                let mut field = String::new();
                loop {
                    match chars.next() {
                        Some('}') => break,
                        Some(ch) => field.push(ch),
                        None => {
                            return Err(TemplateError::Malformed(format!(
                                "unclosed placeholder in {template:?}"
                            )))
                        }
                    }
                }
                match values.get(&field) {
                    Some(value) => out.push_str(&value.to_string()),
                    None => return Err(TemplateError::MissingField(field)),
                }
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                out.push('}');
            }
            '}' => {
                return Err(TemplateError::Malformed(format!(
                    "single '}}' in {template:?}"
                )))
            }
            other => out.push(other),
        }
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn packet(value: serde_json::Value) -> Packet {
        Packet::from_value(&value).unwrap()
    }

    #[test]
    fn defaults_fill_missing_fields() {
        let rendered =
            render_template("{error_type=unknown}/{episode}.json", &packet(json!({"episode": 7})));
        assert_eq!(rendered.unwrap(), "unknown/7.json");
    }

    #[test]
    fn packet_values_win_over_defaults() {
        let rendered = render_template(
            "{error_type=unknown}/{step}.json",
            &packet(json!({"error_type": "timeout", "step": 2})),
        );
        assert_eq!(rendered.unwrap(), "timeout/2.json");
    }

    #[test]
    fn default_carries_to_later_placeholders() {
        let rendered = render_template("{op=general}/{op}.json", &Packet::new());
        assert_eq!(rendered.unwrap(), "general/general.json");
    }

    #[test]
    fn missing_field_is_reported() {
        assert_eq!(
            render_template("{foo}.json", &Packet::new()),
            Err(TemplateError::MissingField("foo".to_string()))
        );
    }

    #[test]
    fn escaped_and_malformed_braces() {
        assert_eq!(
            render_template("{{literal}}-{a}", &packet(json!({"a": 1}))).unwrap(),
            "{literal}-1"
        );
        assert!(matches!(
            render_template("{a", &packet(json!({"a": 1}))),
            Err(TemplateError::Malformed(_))
        ));
        assert!(matches!(
            render_template("a}", &Packet::new()),
            Err(TemplateError::Malformed(_))
        ));
    }
}
