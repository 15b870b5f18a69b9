//! Configuration management for the Symetrix gateway
//!
//! Handles loading, parsing, and hot-reloading of YAML configuration files.

pub mod watcher;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tokio::fs;

use crate::feedback::Feedback;
use crate::session::{Endpoint, DEFAULT_HOST, DEFAULT_PORT};
use crate::state::ControlId;

pub use watcher::{ConfigChange, ConfigWatcher};

/// Root configuration structure
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub dsp: DspConfig,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub feedbacks: Vec<NamedFeedback>,
}

/// DSP connection settings
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct DspConfig {
    #[serde(default = "default_dsp_host")]
    pub host: String,
    #[serde(default = "default_dsp_port")]
    pub port: u16,
}

impl Default for DspConfig {
    fn default() -> Self {
        Self {
            host: default_dsp_host(),
            port: default_dsp_port(),
        }
    }
}

/// Feedback shown in the console under a name
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct NamedFeedback {
    pub name: String,
    #[serde(flatten)]
    pub feedback: Feedback,
}

impl AppConfig {
    /// Load configuration from file with validation
    pub async fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config file: {}", path))?;

        let config: AppConfig = serde_yaml::from_str(&contents)
            .with_context(|| format!("Failed to parse YAML config: {}", path))?;

        config.validate()?;

        Ok(config)
    }

    #[cfg(test)]
    pub async fn save(&self, path: &str) -> Result<()> {
        let yaml = serde_yaml::to_string(self).context("Failed to serialize config to YAML")?;

        fs::write(path, yaml)
            .await
            .with_context(|| format!("Failed to write config file: {}", path))?;

        Ok(())
    }

    /// Validate configuration for correctness and consistency
    pub fn validate(&self) -> Result<()> {
        if self.dsp.port == 0 {
            anyhow::bail!("DSP port cannot be 0");
        }

        let mut names = HashSet::new();
        for (idx, named) in self.feedbacks.iter().enumerate() {
            if named.name.trim().is_empty() {
                anyhow::bail!("Feedback {} name cannot be empty", idx);
            }
            if !names.insert(named.name.as_str()) {
                anyhow::bail!("Duplicate feedback name '{}'", named.name);
            }
            if let Some(control) = named.feedback.control() {
                let n = control.get();
                if n == 0 || n > ControlId::MAX_UI {
                    anyhow::bail!(
                        "Feedback '{}' has invalid control number {} (must be 1-{})",
                        named.name,
                        n,
                        ControlId::MAX_UI
                    );
                }
            }
        }

        Ok(())
    }

    /// Address of the DSP
    pub fn endpoint(&self) -> Endpoint {
        Endpoint::new(self.dsp.host.clone(), self.dsp.port)
    }
}

// Default value functions
fn default_dsp_host() -> String { DEFAULT_HOST.to_string() }
fn default_dsp_port() -> u16 { DEFAULT_PORT }
