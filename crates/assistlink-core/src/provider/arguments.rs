//! Lenient decoding of tool-call argument strings.
//!
//! Models occasionally emit arguments like `{"name": kitchen}`. Decoding never
//! fails: strict parse, then one repair pass that quotes bare identifier
//! values, then an empty object.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};
use tracing::{debug, error, warn};

static BARE_VALUE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r":\s*([a-zA-Z_][a-zA-Z0-9_]*)\s*([,}])").expect("valid regex")
});

/// Decode a raw argument string into a JSON value.
pub fn decode(raw: &str) -> Value {
    if raw.trim().is_empty() {
        return Value::Object(Map::new());
    }

    match serde_json::from_str::<Value>(raw) {
        Ok(value) => value,
        Err(e) => {
            error!(error = %e, "Failed to parse tool arguments");
            debug!(raw, "Raw tool arguments");

            let fixed = repair(raw);
            match serde_json::from_str::<Value>(&fixed) {
                Ok(value) => {
                    debug!("Parsed tool arguments after repair");
                    value
                }
                Err(_) => {
                    warn!(raw, "Could not repair tool arguments, using empty object");
                    Value::Object(Map::new())
                }
            }
        }
    }
}

/// Quote every bare identifier in value position.
fn repair(raw: &str) -> String {
    BARE_VALUE.replace_all(raw, r#": "$1"$2"#).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_well_formed_arguments() {
        assert_eq!(
            decode(r#"{"name": "kitchen", "brightness": 40}"#),
            json!({"name": "kitchen", "brightness": 40})
        );
    }

    #[test]
    fn test_repairs_bare_identifier() {
        assert_eq!(decode(r#"{"name": kitchen}"#), json!({"name": "kitchen"}));
        assert_eq!(
            decode(r#"{"domain": light, "area": living_room}"#),
            json!({"domain": "light", "area": "living_room"})
        );
    }

    #[test]
    fn test_repair_quotes_every_bare_word() {
        // Only reached when strict parsing already failed.
        assert_eq!(
            decode(r#"{"on": true, "room": den}"#),
            json!({"on": "true", "room": "den"})
        );
        assert_eq!(decode(r#"{"on": true}"#), json!({"on": true}));
    }

    #[test]
    fn test_unrepairable_falls_back_to_empty_object() {
        assert_eq!(decode("not json at all"), json!({}));
        assert_eq!(decode(""), json!({}));
        assert_eq!(decode("   "), json!({}));
        assert_eq!(decode("{not json at all"), json!({}));
        assert_eq!(decode(r#"{"name": "unterminated"#), json!({}));
    }
}
