//! Rhai engine limits.

use rhai::Engine;
use serde::{Deserialize, Serialize};

/// Safety limits applied to every interpreter's engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineLimits {
    /// Maximum expression nesting depth (also used for function bodies).
    pub max_expr_depth: usize,
    /// Maximum operations per evaluation. Zero means unlimited.
    pub max_operations: u64,
    pub max_modules: usize,
    pub max_string_size: usize,
    pub max_array_size: usize,
    pub max_map_size: usize,
    /// Maximum nesting of function calls, including callbacks.
    pub max_call_levels: usize,
}

impl Default for EngineLimits {
    fn default() -> Self {
        Self {
            max_expr_depth: 64,
            max_operations: 100_000,
            max_modules: 10,
            max_string_size: 1_000_000,
            max_array_size: 10_000,
            max_map_size: 10_000,
            max_call_levels: 64,
        }
    }
}

impl EngineLimits {
    pub fn apply(&self, engine: &mut Engine) {
        engine.set_max_expr_depths(self.max_expr_depth, self.max_expr_depth);
        engine.set_max_operations(self.max_operations);
        engine.set_max_modules(self.max_modules);
        engine.set_max_string_size(self.max_string_size);
        engine.set_max_array_size(self.max_array_size);
        engine.set_max_map_size(self.max_map_size);
        engine.set_max_call_levels(self.max_call_levels);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let limits: EngineLimits = toml::from_str("max_operations = 500").unwrap();
        assert_eq!(limits.max_operations, 500);
        assert_eq!(limits.max_expr_depth, 64);
        assert_eq!(limits.max_map_size, 10_000);
    }

    #[test]
    fn test_apply() {
        let mut engine = Engine::new();
        let limits = EngineLimits {
            max_operations: 1_000,
            ..Default::default()
        };
        limits.apply(&mut engine);
        assert_eq!(engine.max_operations(), 1_000);
        assert_eq!(engine.max_array_size(), 10_000);
    }
}
