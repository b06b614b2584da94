use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::LLMError;
use crate::http::DynHttpTransport;
use crate::provider::DynProvider;
use crate::provider::anthropic_messages::AnthropicMessagesProvider;
use crate::provider::google_gemini::GoogleGeminiProvider;
use crate::provider::openai_chat::OpenAiChatProvider;
use crate::registry::ProviderRegistry;

/// 供应商类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    #[serde(rename = "openai")]
    OpenAi,
    Anthropic,
    Gemini,
}

impl ProviderKind {
    /// Registry name used when a config does not set one.
    pub fn default_name(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi => crate::provider::openai_chat::PROVIDER_NAME,
            ProviderKind::Anthropic => crate::provider::anthropic_messages::PROVIDER_NAME,
            ProviderKind::Gemini => crate::provider::google_gemini::PROVIDER_NAME,
        }
    }

    /// Environment variable consulted when no key is configured.
    pub fn api_key_env(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi => crate::provider::openai_chat::API_KEY_ENV,
            ProviderKind::Anthropic => crate::provider::anthropic_messages::API_KEY_ENV,
            ProviderKind::Gemini => crate::provider::google_gemini::API_KEY_ENV,
        }
    }
}

/// Provider 配置 描述一个可调用后端
///
/// ```
/// use hibiki_llm::config::{ProviderConfig, ProviderKind};
///
/// let config: ProviderConfig = serde_json::from_str(
///     r#"{"name": "local", "kind": "openai", "base_url": "http://localhost:8000/v1"}"#,
/// )
/// .unwrap();
/// assert_eq!(config.kind, ProviderKind::OpenAi);
/// assert_eq!(config.registered_name(), "local");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// 注册名 留空时按 kind 默认
    #[serde(default)]
    pub name: Option<String>,
    pub kind: ProviderKind,
    /// 显式密钥 优先于环境变量
    #[serde(default)]
    pub api_key: Option<String>,
    /// 覆盖默认的密钥环境变量名
    #[serde(default)]
    pub api_key_env: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub default_model: Option<String>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    /// 附加设置 例如 organization / project / beta
    #[serde(default)]
    pub extra: HashMap<String, Value>,
}

impl ProviderConfig {
    pub fn new(kind: ProviderKind) -> Self {
        Self {
            name: None,
            kind,
            api_key: None,
            api_key_env: None,
            base_url: None,
            default_model: None,
            timeout_secs: None,
            extra: HashMap::new(),
        }
    }

    pub fn registered_name(&self) -> String {
        self.name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .unwrap_or(self.kind.default_name())
            .to_string()
    }

    fn timeout(&self) -> Result<Option<Duration>, LLMError> {
        match self.timeout_secs {
            Some(0) => Err(LLMError::invalid_config(
                "timeout_secs",
                "timeout must be greater than zero",
            )),
            Some(secs) => Ok(Some(Duration::from_secs(secs))),
            None => Ok(None),
        }
    }

    fn extra_str(&self, key: &str) -> Result<Option<&str>, LLMError> {
        match self.extra.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(text)) => Ok(Some(text.as_str())),
            Some(_) => Err(LLMError::invalid_config(
                format!("extra.{key}"),
                "expected a string",
            )),
        }
    }

    fn extra_bool(&self, key: &str) -> Result<Option<bool>, LLMError> {
        match self.extra.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Bool(flag)) => Ok(Some(*flag)),
            Some(_) => Err(LLMError::invalid_config(
                format!("extra.{key}"),
                "expected a boolean",
            )),
        }
    }
}

/// Picks the explicit key when present, otherwise the named environment variable.
///
/// Blank values count as absent.
///
/// # Errors
///
/// Returns [`LLMError::InvalidConfig`] when neither source yields a key.
pub fn resolve_api_key(
    explicit: Option<&str>,
    env_var: &str,
    provider: &'static str,
) -> Result<String, LLMError> {
    if let Some(key) = explicit.map(str::trim).filter(|key| !key.is_empty()) {
        return Ok(key.to_string());
    }
    match std::env::var(env_var) {
        Ok(key) if !key.trim().is_empty() => Ok(key.trim().to_string()),
        _ => Err(LLMError::invalid_config(
            "api_key",
            format!("{provider} requires an API key: set {env_var} or configure api_key"),
        )),
    }
}

/// 根据配置构建 Provider
///
/// # Errors
///
/// Returns [`LLMError::InvalidConfig`] for a missing key, a zero timeout, or a mistyped
/// `extra` entry.
pub fn build_provider(
    config: &ProviderConfig,
    transport: DynHttpTransport,
) -> Result<DynProvider, LLMError> {
    let env_var = config
        .api_key_env
        .as_deref()
        .unwrap_or(config.kind.api_key_env());
    let api_key = resolve_api_key(config.api_key.as_deref(), env_var, config.kind.default_name())?;
    let timeout = config.timeout()?;

    let provider: DynProvider = match config.kind {
        ProviderKind::OpenAi => {
            let mut provider = OpenAiChatProvider::new(transport, api_key);
            if let Some(base_url) = &config.base_url {
                provider = provider.with_base_url(base_url.clone());
            }
            if let Some(model) = &config.default_model {
                provider = provider.with_default_model(model.clone());
            }
            if let Some(timeout) = timeout {
                provider = provider.with_timeout(timeout);
            }
            if let Some(org) = config.extra_str("organization")? {
                provider = provider.with_organization(org);
            }
            if let Some(project) = config.extra_str("project")? {
                provider = provider.with_project(project);
            }
            if let Some(enabled) = config.extra_bool("include_stream_usage")? {
                provider = provider.with_stream_usage(enabled);
            }
            Arc::new(provider)
        }
        ProviderKind::Anthropic => {
            let mut provider = AnthropicMessagesProvider::new(transport, api_key);
            if let Some(base_url) = &config.base_url {
                provider = provider.with_base_url(base_url.clone());
            }
            if let Some(model) = &config.default_model {
                provider = provider.with_default_model(model.clone());
            }
            if let Some(timeout) = timeout {
                provider = provider.with_timeout(timeout);
            }
            if let Some(version) = config.extra_str("version")? {
                provider = provider.with_version(version);
            }
            if let Some(beta) = config.extra_str("beta")? {
                provider = provider.with_beta(beta);
            }
            Arc::new(provider)
        }
        ProviderKind::Gemini => {
            let mut provider = GoogleGeminiProvider::new(transport, api_key);
            if let Some(base_url) = &config.base_url {
                provider = provider.with_base_url(base_url.clone());
            }
            if let Some(model) = &config.default_model {
                provider = provider.with_default_model(model.clone());
            }
            if let Some(timeout) = timeout {
                provider = provider.with_timeout(timeout);
            }
            Arc::new(provider)
        }
    };

    Ok(provider)
}

/// Registers every config into the global registry and returns the registered names.
///
/// # Errors
///
/// See [`register_configured_providers_in`].
pub fn register_configured_providers(
    configs: &[ProviderConfig],
    transport: DynHttpTransport,
) -> Result<Vec<String>, LLMError> {
    register_configured_providers_in(crate::registry::global(), configs, transport)
}

/// Registers every config into `registry`.
///
/// Each config is built once up front so configuration mistakes surface here rather than
/// on the first [`ProviderRegistry::get`]; the registered constructor rebuilds it per call.
///
/// # Errors
///
/// Returns the first configuration error; nothing is registered in that case.
pub fn register_configured_providers_in(
    registry: &ProviderRegistry,
    configs: &[ProviderConfig],
    transport: DynHttpTransport,
) -> Result<Vec<String>, LLMError> {
    for config in configs {
        build_provider(config, Arc::clone(&transport))?;
    }

    let mut names = Vec::with_capacity(configs.len());
    for config in configs {
        let name = config.registered_name();
        let config = config.clone();
        let transport = Arc::clone(&transport);
        registry.register(name.clone(), move || {
            build_provider(&config, Arc::clone(&transport))
        });
        names.push(name);
    }
    Ok(names)
}
