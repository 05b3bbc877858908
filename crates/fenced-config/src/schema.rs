// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Configuration schema (SPEC_FULL.md §2 [CONFIG]): turn cap, per-run
//! timeout, bind address, log level/format, and model provider selection.

use serde::{Deserialize, Serialize};

fn default_turn_cap() -> u32 {
    15
}

fn default_run_timeout_secs() -> u64 {
    60
}

fn default_bind_address() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_model_provider() -> String {
    "mock".to_string()
}

fn default_model_name() -> String {
    "claude-3-5-sonnet-latest".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelConfig {
    #[serde(default = "default_model_provider")]
    pub provider: String,
    #[serde(default = "default_model_name")]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: default_model_provider(),
            name: default_model_name(),
            api_key: None,
            base_url: None,
            max_tokens: None,
            temperature: None,
        }
    }
}

/// The interaction loop's (C5) policy dials: spec.md §4.5's turn cap (read
/// by `fenced-core::SessionHandle::spawn`) and §4.3's per-run timeout
/// (still a hardcoded constant in `fenced-interp`; `run_timeout_secs` here
/// only mirrors its default for `show-config` reporting).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RuntimeConfig {
    #[serde(default = "default_turn_cap")]
    pub turn_cap: u32,
    #[serde(default = "default_run_timeout_secs")]
    pub run_timeout_secs: u64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            turn_cap: default_turn_cap(),
            run_timeout_secs: default_run_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Config {
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub runtime: RuntimeConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_policy_dials() {
        let cfg = Config::default();
        assert_eq!(cfg.runtime.turn_cap, 15);
        assert_eq!(cfg.runtime.run_timeout_secs, 60);
        assert_eq!(cfg.model.provider, "mock");
    }

    #[test]
    fn partial_yaml_fills_in_remaining_defaults() {
        let cfg: Config = serde_yaml::from_str("model:\n  provider: anthropic\n").unwrap();
        assert_eq!(cfg.model.provider, "anthropic");
        assert_eq!(cfg.model.name, "claude-3-5-sonnet-latest");
        assert_eq!(cfg.server.bind_address, "127.0.0.1:8080");
    }
}
