//! Model capability lookup.

use parking_lot::RwLock;
use std::collections::HashMap;

/// Capability questions the engine asks about the active model.
pub trait ModelCapabilities: Send + Sync {
    /// Whether the model emits reasoning tokens worth surfacing.
    fn supports_thinking(&self, model_id: &str) -> bool;
}

/// Prefix table of reasoning-capable model families, with per-model
/// overrides that hosts can record from provider metadata at runtime.
pub struct StaticCapabilities {
    thinking_prefixes: Vec<String>,
    overrides: RwLock<HashMap<String, bool>>,
}

impl StaticCapabilities {
    pub fn new() -> Self {
        Self {
            thinking_prefixes: [
                "o1",
                "o3",
                "o4-mini",
                "deepseek-r1",
                "deepseek-reasoner",
                "qwq",
                "gemini-2.5",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            overrides: RwLock::new(HashMap::new()),
        }
    }

    pub fn with_thinking_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.thinking_prefixes.push(prefix.into());
        self
    }

    /// Record what the provider reported for a specific model id; wins over
    /// the prefix table.
    pub fn set_override(&self, model_id: impl Into<String>, supports_thinking: bool) {
        self.overrides
            .write()
            .insert(model_id.into(), supports_thinking);
    }
}

impl Default for StaticCapabilities {
    fn default() -> Self {
        Self::new()
    }
}

impl ModelCapabilities for StaticCapabilities {
    fn supports_thinking(&self, model_id: &str) -> bool {
        if let Some(known) = self.overrides.read().get(model_id) {
            return *known;
        }
        let id = model_id.to_ascii_lowercase();
        self.thinking_prefixes
            .iter()
            .any(|prefix| id.starts_with(prefix.as_str()))
    }
}
