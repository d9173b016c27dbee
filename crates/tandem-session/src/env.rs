//! Environment composition for spawned agent processes.
//!
//! Three layers, lowest precedence first: the base environment, provider
//! credentials from settings, and the workspace's own overrides.

use tandem_db::ProviderConfig;
use tandem_pty::EnvMap;

const API_KEY_SUFFIX: &str = "_API_KEY";
const BASE_URL_SUFFIX: &str = "_BASE_URL";

/// Compose the environment for one spawn. Later layers win on collisions.
pub fn resolve(base: &EnvMap, providers: &[ProviderConfig], overrides: &EnvMap) -> EnvMap {
    let mut env = base.clone();
    env.extend(provider_env(providers));
    env.extend(overrides.iter().map(|(k, v)| (k.clone(), v.clone())));
    env
}

/// Variables contributed by enabled providers that have a credential.
pub fn provider_env(providers: &[ProviderConfig]) -> EnvMap {
    let mut env = EnvMap::new();
    for provider in providers {
        if !provider.enabled || provider.api_key.is_empty() || provider.env_var_name.is_empty() {
            continue;
        }
        env.insert(provider.env_var_name.clone(), provider.api_key.clone());

        if !provider.base_url.is_empty() {
            if let Some(var) = base_url_var(&provider.env_var_name) {
                env.insert(var, provider.base_url.clone());
            }
        }
    }
    env
}

/// `FOO_API_KEY` -> `FOO_BASE_URL`; `None` without the `_API_KEY` suffix.
pub fn base_url_var(env_var_name: &str) -> Option<String> {
    env_var_name
        .strip_suffix(API_KEY_SUFFIX)
        .map(|stem| format!("{stem}{BASE_URL_SUFFIX}"))
}

/// The default base layer: this process's environment plus terminal identification.
pub fn base_env() -> EnvMap {
    let mut env: EnvMap = std::env::vars().collect();
    env.insert("TERM".to_string(), "xterm-256color".to_string());
    env.insert("COLORTERM".to_string(), "truecolor".to_string());
    env
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(pairs: &[(&str, &str)]) -> EnvMap {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn provider(var: &str, key: &str, base_url: &str) -> ProviderConfig {
        ProviderConfig {
            id: var.to_lowercase(),
            name: var.to_string(),
            env_var_name: var.to_string(),
            api_key: key.to_string(),
            base_url: base_url.to_string(),
            enabled: true,
        }
    }

    #[test]
    fn test_layer_precedence() {
        let base = map(&[("A", "1")]);
        let providers = vec![provider("A", "2", ""), provider("B", "3", "")];
        let overrides = map(&[("B", "4")]);

        assert_eq!(
            resolve(&base, &providers, &overrides),
            map(&[("A", "2"), ("B", "4")])
        );
    }

    #[test]
    fn test_non_colliding_keys_survive() {
        let base = map(&[("PATH", "/bin")]);
        let providers = vec![provider("OPENAI_API_KEY", "sk", "")];
        let overrides = map(&[("PORT", "3000")]);

        assert_eq!(
            resolve(&base, &providers, &overrides),
            map(&[("OPENAI_API_KEY", "sk"), ("PATH", "/bin"), ("PORT", "3000")])
        );
    }

    #[test]
    fn test_base_url_derived_from_api_key_suffix() {
        let providers = vec![provider("ANTHROPIC_API_KEY", "sk-ant", "https://proxy.local")];
        let env = provider_env(&providers);

        assert_eq!(env.get("ANTHROPIC_API_KEY").map(String::as_str), Some("sk-ant"));
        assert_eq!(
            env.get("ANTHROPIC_BASE_URL").map(String::as_str),
            Some("https://proxy.local")
        );
    }

    #[test]
    fn test_no_base_url_without_suffix() {
        let providers = vec![provider("GEMINI_KEY", "g-key", "https://proxy.local")];
        let env = provider_env(&providers);

        assert_eq!(env, map(&[("GEMINI_KEY", "g-key")]));
    }

    #[test]
    fn test_empty_base_url_adds_nothing() {
        let providers = vec![provider("ANTHROPIC_API_KEY", "sk-ant", "")];
        assert!(!provider_env(&providers).contains_key("ANTHROPIC_BASE_URL"));
    }

    #[test]
    fn test_disabled_or_keyless_providers_skipped() {
        let mut disabled = provider("OPENAI_API_KEY", "sk", "");
        disabled.enabled = false;
        let keyless = provider("ANTHROPIC_API_KEY", "", "https://proxy.local");

        assert!(provider_env(&[disabled, keyless]).is_empty());
    }

    #[test]
    fn test_base_url_var() {
        assert_eq!(base_url_var("OPENAI_API_KEY").as_deref(), Some("OPENAI_BASE_URL"));
        assert_eq!(base_url_var("_API_KEY").as_deref(), Some("_BASE_URL"));
        assert_eq!(base_url_var("API_KEY_OPENAI"), None);
    }

    #[test]
    fn test_resolve_is_deterministic() {
        let base = map(&[("A", "1"), ("Z", "9")]);
        let providers = vec![provider("A", "2", "")];
        let first = resolve(&base, &providers, &EnvMap::new());
        let second = resolve(&base, &providers, &EnvMap::new());
        assert_eq!(first, second);
    }

    #[test]
    fn test_base_env_sets_term() {
        let env = base_env();
        assert_eq!(env.get("TERM").map(String::as_str), Some("xterm-256color"));
    }
}
