// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! The LLM provider abstraction spec.md §1 keeps outside the interaction
//! loop's core: "a stream of text chunks with a history/rollback contract."
//! Ships exactly the two drivers SPEC_FULL.md §4.3 calls for: one
//! deterministic mock for tests, one real HTTP-backed provider (Anthropic)
//! for production use.

mod anthropic;
mod mock;
mod provider;
mod types;

pub use anthropic::AnthropicProvider;
pub use mock::{MockProvider, ScriptedMockProvider};
pub use provider::{ModelProvider, TextChunkStream};
pub use types::{Message, Role};

use fenced_config::ModelConfig;

/// Construct a boxed [`ModelProvider`] from configuration. `cfg.provider`
/// selects between `"anthropic"` and `"mock"` — this runtime ships only
/// those two drivers (SPEC_FULL.md §4.3); an unrecognized id is a
/// configuration error surfaced at startup, not at the first turn.
pub fn from_config(cfg: &ModelConfig) -> anyhow::Result<Box<dyn ModelProvider>> {
    match cfg.provider.as_str() {
        "anthropic" => {
            let api_key = cfg.api_key.clone().or_else(|| std::env::var("ANTHROPIC_API_KEY").ok());
            Ok(Box::new(AnthropicProvider::new(
                cfg.name.clone(),
                api_key,
                cfg.base_url.clone(),
                cfg.max_tokens,
                cfg.temperature,
            )))
        }
        "mock" => Ok(Box::new(MockProvider::default())),
        other => anyhow::bail!("unknown model provider {other:?} (expected \"anthropic\" or \"mock\")"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg(provider: &str) -> ModelConfig {
        ModelConfig {
            provider: provider.to_string(),
            ..ModelConfig::default()
        }
    }

    #[test]
    fn mock_provider_selected_by_name() {
        let provider = from_config(&cfg("mock")).unwrap();
        assert_eq!(provider.name(), "mock");
    }

    #[test]
    fn anthropic_provider_selected_by_name() {
        let provider = from_config(&cfg("anthropic")).unwrap();
        assert_eq!(provider.name(), "anthropic");
    }

    #[test]
    fn unknown_provider_is_a_config_error() {
        let err = from_config(&cfg("not-a-real-provider")).unwrap_err();
        assert!(err.to_string().contains("unknown model provider"));
    }
}
