//! Read-only variables of the builtin namespace.

use crate::interpreter::Value;

/// Every name the builtin namespace defines.
pub const BUILTIN_VARS: &[&str] = &["true", "false", "ok", "pid"];

pub fn is_builtin_var(name: &str) -> bool {
    BUILTIN_VARS.contains(&name)
}

/// Current value of a builtin variable.
pub fn builtin_var(name: &str) -> Option<Value> {
    match name {
        "true" => Some(Value::Bool(true)),
        "false" => Some(Value::Bool(false)),
        "ok" => Some(Value::ok()),
        "pid" => Some(Value::String(std::process::id().to_string())),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_listed_name_has_a_value() {
        for name in BUILTIN_VARS {
            assert!(builtin_var(name).is_some(), "{name}");
        }
        assert!(builtin_var("nope").is_none());
        assert!(!is_builtin_var("nope"));
    }

    #[test]
    fn ok_is_true_and_false_is_not() {
        assert!(builtin_var("ok").unwrap().truthy());
        assert!(!builtin_var("false").unwrap().truthy());
    }
}
