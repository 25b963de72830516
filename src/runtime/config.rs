//! Execution limits for an instance.

use serde::Deserialize;

/// Default maximum nesting of calls.
pub const MAX_CALL_DEPTH: usize = 1024;

/// Default maximum number of value stack slots shared by all frames.
pub const MAX_VALUE_STACK: usize = 1 << 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub max_call_depth: usize,
    pub max_value_stack: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            max_call_depth: MAX_CALL_DEPTH,
            max_value_stack: MAX_VALUE_STACK,
        }
    }
}

impl Config {
    /// Load from a JSON object; missing fields keep their defaults.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.max_call_depth, 1024);
        assert_eq!(config.max_value_stack, 1 << 20);
    }

    #[test]
    fn test_from_json() {
        let config = Config::from_json(r#"{"max_call_depth": 64}"#).unwrap();
        assert_eq!(config.max_call_depth, 64);
        assert_eq!(config.max_value_stack, MAX_VALUE_STACK);

        assert_eq!(Config::from_json("{}").unwrap(), Config::default());
        assert!(Config::from_json(r#"{"max_depth": 1}"#).is_err());
        assert!(Config::from_json(r#"{"max_call_depth": -1}"#).is_err());
    }
}
