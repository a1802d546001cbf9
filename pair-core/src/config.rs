// pair-core/src/config.rs

//! Configuration loaded from `Pair.toml`.

use crate::context::{DEFAULT_HISTORY_WINDOW, DEFAULT_SELECTION_WINDOW};
use crate::extract::DEFAULT_RETRY_BOUND;
use crate::providers::openai::DEFAULT_OPENAI_ENDPOINT;
use crate::tokens::{RateTable, Rates};
use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use url::Url;

pub const CONFIG_FILENAME: &str = "Pair.toml";
pub const DEFAULT_MODEL: &str = "gpt-4-turbo-2024-04-09";
pub const MODEL_ENV_VAR: &str = "PAIR_MODEL";

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct PairConfig {
    pub model: String,
    pub temperature: f64,
    pub max_tokens: Option<u32>,
    pub endpoint: String,
    pub api_key_env_var: String,
    pub history_window: usize,
    pub selection_window: usize,
    pub extraction_retries: usize,
    pub project_mode: bool,
    /// Extra or overriding per-1000-token rates, keyed by model.
    pub rates: HashMap<String, Rates>,
}

impl Default for PairConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            temperature: 0.0,
            max_tokens: Some(2048),
            endpoint: DEFAULT_OPENAI_ENDPOINT.to_string(),
            api_key_env_var: "OPENAI_API_KEY".to_string(),
            history_window: DEFAULT_HISTORY_WINDOW,
            selection_window: DEFAULT_SELECTION_WINDOW,
            extraction_retries: DEFAULT_RETRY_BOUND,
            project_mode: true,
            rates: HashMap::new(),
        }
    }
}

impl PairConfig {
    pub fn from_toml_str(config_toml_content: &str) -> Result<PairConfig> {
        let config: PairConfig = match toml::from_str(config_toml_content) {
            Ok(cfg) => cfg,
            Err(e) => {
                tracing::error!(error = %e, "Failed to parse TOML content");
                return Err(anyhow!(e))
                    .context("Failed to parse configuration TOML content. Check TOML syntax.");
            }
        };
        config.validate()?;
        tracing::info!(model = %config.model, "Successfully parsed and validated configuration.");
        Ok(config)
    }

    /// Replaces the model, e.g. from the environment or a command-line flag.
    pub fn with_model(mut self, model: impl Into<String>) -> Result<Self> {
        self.model = model.into();
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        if self.model.trim().is_empty() {
            return Err(anyhow!("'model' in config is empty."));
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(anyhow!(
                "'temperature' must be between 0.0 and 2.0, got {}.",
                self.temperature
            ));
        }
        if self.endpoint.trim().is_empty() {
            return Err(anyhow!("'endpoint' in config is empty."));
        }
        Url::parse(&self.endpoint)
            .with_context(|| format!("Invalid URL format for endpoint ('{}').", self.endpoint))?;
        if self.api_key_env_var.trim().is_empty() {
            return Err(anyhow!("'api_key_env_var' in config is empty."));
        }
        for (model, rates) in &self.rates {
            for (which, rate) in [("input", rates.input), ("output", rates.output)] {
                if !rate.is_finite() || rate < 0.0 {
                    return Err(anyhow!(
                        "Rate '{}' for model '{}' must be a non-negative number, got {}.",
                        which,
                        model,
                        rate
                    ));
                }
            }
        }
        if !self.rate_table().contains(&self.model) {
            return Err(anyhow!(
                "Model '{}' has no rate entry. Add [rates.\"{}\"] to {}.",
                self.model,
                self.model,
                CONFIG_FILENAME
            ));
        }
        Ok(())
    }

    /// The built-in rates with this config's entries merged over them.
    pub fn rate_table(&self) -> RateTable {
        let mut table = RateTable::default();
        for (model, rates) in &self.rates {
            table.insert(model.clone(), *rates);
        }
        table
    }
}
