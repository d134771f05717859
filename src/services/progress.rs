//! Progress of long-running background actions, polled by the web page

use std::collections::HashMap;

use parking_lot::RwLock;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Progress {
    pub value: f64,
    pub text: String,
}

#[derive(Default)]
pub struct ProgressRegistry {
    entries: RwLock<HashMap<String, Progress>>,
}

impl ProgressRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start(&self, kind: &str) {
        self.update(kind, 0.0, "starting");
    }

    pub fn update(&self, kind: &str, value: f64, text: &str) {
        self.entries.write().insert(
            kind.to_string(),
            Progress {
                value: value.clamp(0.0, 100.0),
                text: text.to_string(),
            },
        );
    }

    pub fn end(&self, kind: &str) {
        self.entries.write().remove(kind);
    }

    pub fn get(&self, kind: &str) -> Option<Progress> {
        self.entries.read().get(kind).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lifecycle() {
        let registry = ProgressRegistry::new();
        assert!(registry.get("mediasync").is_none());
        registry.start("mediasync");
        registry.update("mediasync", 150.0, "movies");
        assert_eq!(
            registry.get("mediasync"),
            Some(Progress {
                value: 100.0,
                text: "movies".to_string()
            })
        );
        registry.end("mediasync");
        assert!(registry.get("mediasync").is_none());
    }
}
