use crate::config::Config;
use crate::providers::{OPENROUTER_BASE_URL, OpenAIProvider};
use crate::traits::Provider;
use anyhow::{Result, anyhow};
use std::sync::Arc;

pub fn create_provider(config: &Config) -> Result<Arc<dyn Provider>> {
    let provider_name = config.provider.as_deref().unwrap_or("openai");

    let provider = match provider_name.to_lowercase().as_str() {
        "openai" => {
            let api_key = resolve_api_key_with_fallback(
                &["OPENAI_API_KEY", "BATON_API_KEY"],
                &config.api_key,
            )?;
            OpenAIProvider::new(api_key)
        }
        "openrouter" => {
            let api_key = resolve_api_key_with_fallback(
                &["OPENROUTER_API_KEY", "BATON_API_KEY"],
                &config.api_key,
            )?;
            OpenAIProvider::new(api_key).with_base_url(OPENROUTER_BASE_URL)
        }
        "compatible" => {
            if config.base_url.is_none() {
                return Err(anyhow!("Provider 'compatible' needs base_url in the config"));
            }
            let api_key = resolve_api_key_with_fallback(&["BATON_API_KEY"], &config.api_key)
                .unwrap_or_default();
            OpenAIProvider::new(api_key)
        }
        _ => {
            return Err(anyhow!(
                "Unknown provider: {}. Available: openai, openrouter, compatible",
                provider_name
            ));
        }
    };

    let mut provider = provider.with_temperature(config.temperature);
    if let Some(base_url) = &config.base_url {
        provider = provider.with_base_url(base_url.clone());
    }
    Ok(Arc::new(provider))
}

fn resolve_api_key_with_fallback(env_vars: &[&str], config_key: &str) -> Result<String> {
    for var_name in env_vars {
        if let Ok(key) = std::env::var(var_name)
            && !key.is_empty()
        {
            return Ok(key);
        }
    }
    if !config_key.is_empty() {
        Ok(config_key.to_string())
    } else {
        Err(anyhow!(
            "No API key found. Set one of {} or run 'baton onboard'.",
            env_vars.join(", ")
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_key_is_the_last_resort() {
        let key = resolve_api_key_with_fallback(&["BATON_TEST_UNSET_KEY"], "from-config").unwrap();
        assert_eq!(key, "from-config");
        assert!(resolve_api_key_with_fallback(&["BATON_TEST_UNSET_KEY"], "").is_err());
    }

    #[test]
    fn rejects_unknown_providers() {
        let config = Config {
            provider: Some("carrier-pigeon".into()),
            ..Config::default()
        };
        let err = create_provider(&config).err().unwrap();
        assert!(err.to_string().contains("Unknown provider"));
    }

    #[test]
    fn compatible_provider_needs_a_base_url() {
        let config = Config {
            provider: Some("compatible".into()),
            ..Config::default()
        };
        assert!(create_provider(&config).is_err());

        let config = Config {
            provider: Some("compatible".into()),
            base_url: Some("http://localhost:8000/v1".into()),
            ..Config::default()
        };
        assert!(create_provider(&config).is_ok());
    }
}
