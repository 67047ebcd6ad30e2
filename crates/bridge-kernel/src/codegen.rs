//! Guest-language code generation for the command kernel.
//!
//! Everything that ends up inside generated source is either validated as an
//! identifier or rendered as a quoted literal; caller-supplied strings never
//! reach the interpreter verbatim.

use serde_json::Value;

/// Accepts ASCII identifiers only. The guest language allows more, but
/// device and method names come from configuration and stay ASCII.
pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c == '_' || c.is_ascii_alphabetic() => {}
        _ => return false,
    }
    chars.all(|c| c == '_' || c.is_ascii_alphanumeric())
}

/// Dotted module path, each segment an identifier.
pub fn is_module_path(path: &str) -> bool {
    !path.is_empty() && path.split('.').all(is_identifier)
}

/// Render a JSON value as a guest-language literal.
pub fn literal(value: &Value) -> String {
    match value {
        Value::Null => "None".to_string(),
        Value::Bool(true) => "True".to_string(),
        Value::Bool(false) => "False".to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => string_literal(s),
        Value::Array(items) => {
            let rendered: Vec<String> = items.iter().map(literal).collect();
            format!("[{}]", rendered.join(", "))
        }
        Value::Object(map) => {
            let rendered: Vec<String> = map
                .iter()
                .map(|(k, v)| format!("{}: {}", string_literal(k), literal(v)))
                .collect();
            format!("{{{}}}", rendered.join(", "))
        }
    }
}

fn string_literal(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('\'');
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 => out.push_str(&format!("\\x{:02x}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('\'');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn identifiers_reject_injection_attempts() {
        assert!(is_identifier("reactor_1"));
        assert!(is_identifier("_private"));
        assert!(!is_identifier("1reactor"));
        assert!(!is_identifier("x; import os"));
        assert!(!is_identifier(""));
        assert!(!is_identifier("stir rate"));
    }

    #[test]
    fn module_paths_are_dotted_identifiers() {
        assert!(is_module_path("lab.devices.pumps"));
        assert!(!is_module_path("lab..pumps"));
        assert!(!is_module_path(".lab"));
        assert!(!is_module_path(""));
    }

    #[test]
    fn literals_render_each_json_shape() {
        assert_eq!(literal(&json!(null)), "None");
        assert_eq!(literal(&json!(true)), "True");
        assert_eq!(literal(&json!(false)), "False");
        assert_eq!(literal(&json!(42)), "42");
        assert_eq!(literal(&json!(2.5)), "2.5");
        assert_eq!(literal(&json!("plain")), "'plain'");
        assert_eq!(literal(&json!([1, "a"])), "[1, 'a']");
        assert_eq!(literal(&json!({"rate": 300})), "{'rate': 300}");
    }

    #[test]
    fn string_literals_escape_quotes_and_control_characters() {
        assert_eq!(literal(&json!("it's")), "'it\\'s'");
        assert_eq!(literal(&json!("a\nb")), "'a\\nb'");
        assert_eq!(literal(&json!("back\\slash")), "'back\\\\slash'");
        assert_eq!(literal(&json!("\u{1}")), "'\\x01'");
    }
}
