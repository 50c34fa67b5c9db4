// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

//! Models selected by name with numeric parameters.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use wisp_engine::sim_error;
use wisp_engine::types::SimResult;

/// A model name plus key/value parameters.
///
/// Parameters that are not given take the model's defaults.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    pub kind: String,
    #[serde(default)]
    pub params: BTreeMap<String, f64>,
}

impl ModelConfig {
    #[must_use]
    pub fn new(kind: &str) -> Self {
        Self {
            kind: kind.to_string(),
            params: BTreeMap::new(),
        }
    }

    /// Builder-style parameter setter.
    #[must_use]
    pub fn with(mut self, name: &str, value: f64) -> Self {
        self.params.insert(name.to_string(), value);
        self
    }

    #[must_use]
    pub fn param_or(&self, name: &str, default: f64) -> f64 {
        self.params.get(name).copied().unwrap_or(default)
    }

    /// Reject parameters the model does not understand.
    pub fn check_params(&self, known: &[&str]) -> SimResult {
        for name in self.params.keys() {
            if !known.contains(&name.as_str()) {
                return sim_error!("{}: unknown parameter '{name}'", self.kind);
            }
        }
        Ok(())
    }
}
