//! Process-wide name → constructor table for providers.
//!
//! Constructors run on every [`get`], outside the lock, so a slow or failing constructor
//! never blocks other callers. The global table starts with the built-in vendors, each built
//! from its environment credential on demand.

use std::collections::HashMap;
use std::sync::{Arc, LazyLock, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::error::LLMError;
use crate::http::reqwest::shared_transport;
use crate::provider::DynProvider;
use crate::provider::anthropic_messages::AnthropicMessagesProvider;
use crate::provider::google_gemini::GoogleGeminiProvider;
use crate::provider::openai_chat::OpenAiChatProvider;

/// 构造函数 每次 `get` 调用一次
pub type ProviderConstructor = Arc<dyn Fn() -> Result<DynProvider, LLMError> + Send + Sync>;

static GLOBAL: LazyLock<ProviderRegistry> = LazyLock::new(ProviderRegistry::with_builtins);

/// Provider 注册表
#[derive(Default)]
pub struct ProviderRegistry {
    constructors: RwLock<HashMap<String, ProviderConstructor>>,
}

impl ProviderRegistry {
    /// 空注册表
    pub fn new() -> Self {
        Self::default()
    }

    /// 预置 `openai` / `anthropic` / `gemini` 的注册表
    pub fn with_builtins() -> Self {
        let registry = Self::new();
        registry.reset();
        registry
    }

    /// Registers `constructor` under `name`, replacing any earlier registration.
    pub fn register<F>(&self, name: impl Into<String>, constructor: F)
    where
        F: Fn() -> Result<DynProvider, LLMError> + Send + Sync + 'static,
    {
        let name = name.into();
        tracing::debug!(provider = %name, "registering provider");
        self.write().insert(name, Arc::new(constructor));
    }

    /// Builds a fresh provider for `name`.
    ///
    /// # Errors
    ///
    /// Returns [`LLMError::UnknownProvider`] listing the registered names, or whatever
    /// error the constructor itself produced.
    pub fn get(&self, name: &str) -> Result<DynProvider, LLMError> {
        let constructor = self.read().get(name).cloned();
        match constructor {
            Some(constructor) => constructor(),
            None => Err(LLMError::UnknownProvider {
                name: name.to_string(),
                available: self.available(),
            }),
        }
    }

    /// Registered names, sorted.
    pub fn available(&self) -> Vec<String> {
        let mut names: Vec<String> = self.read().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.read().contains_key(name)
    }

    /// Removes every registration, built-ins included.
    pub fn clear(&self) {
        self.write().clear();
    }

    /// Drops custom registrations and restores the built-ins.
    pub fn reset(&self) {
        let mut constructors = self.write();
        constructors.clear();
        for (name, constructor) in builtin_constructors() {
            constructors.insert(name.to_string(), constructor);
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, ProviderConstructor>> {
        self.constructors
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, ProviderConstructor>> {
        self.constructors
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

fn builtin_constructors() -> [(&'static str, ProviderConstructor); 3] {
    [
        (
            crate::provider::openai_chat::PROVIDER_NAME,
            Arc::new(|| -> Result<DynProvider, LLMError> {
                let provider = OpenAiChatProvider::from_env(shared_transport()?)?;
                Ok(Arc::new(provider) as DynProvider)
            }),
        ),
        (
            crate::provider::anthropic_messages::PROVIDER_NAME,
            Arc::new(|| -> Result<DynProvider, LLMError> {
                let provider = AnthropicMessagesProvider::from_env(shared_transport()?)?;
                Ok(Arc::new(provider) as DynProvider)
            }),
        ),
        (
            crate::provider::google_gemini::PROVIDER_NAME,
            Arc::new(|| -> Result<DynProvider, LLMError> {
                let provider = GoogleGeminiProvider::from_env(shared_transport()?)?;
                Ok(Arc::new(provider) as DynProvider)
            }),
        ),
    ]
}

/// The process-wide registry used by the free functions below.
pub fn global() -> &'static ProviderRegistry {
    &GLOBAL
}

/// Registers a constructor in the global registry.
pub fn register<F>(name: impl Into<String>, constructor: F)
where
    F: Fn() -> Result<DynProvider, LLMError> + Send + Sync + 'static,
{
    GLOBAL.register(name, constructor);
}

/// Builds a provider from the global registry.
///
/// # Errors
///
/// See [`ProviderRegistry::get`].
pub fn get(name: &str) -> Result<DynProvider, LLMError> {
    GLOBAL.get(name)
}

pub fn available() -> Vec<String> {
    GLOBAL.available()
}

pub fn is_registered(name: &str) -> bool {
    GLOBAL.is_registered(name)
}

pub fn clear() {
    GLOBAL.clear();
}

pub fn reset() {
    GLOBAL.reset();
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use tokio_util::sync::CancellationToken;

    use super::*;
    use crate::provider::LLMProvider;
    use crate::types::{CapabilityDescriptor, ChatRequest, ChatResponse};

    struct Named(&'static str);

    #[async_trait]
    impl LLMProvider for Named {
        async fn chat(
            &self,
            _request: ChatRequest,
            _cancel: CancellationToken,
        ) -> Result<ChatResponse, LLMError> {
            Ok(ChatResponse {
                content: self.0.to_string(),
                ..ChatResponse::default()
            })
        }

        fn capabilities(&self) -> CapabilityDescriptor {
            CapabilityDescriptor::default()
        }

        fn name(&self) -> &'static str {
            self.0
        }
    }

    #[test]
    fn latest_registration_wins() {
        let registry = ProviderRegistry::new();
        registry.register("mock", || Ok(Arc::new(Named("first")) as DynProvider));
        registry.register("mock", || Ok(Arc::new(Named("second")) as DynProvider));
        assert_eq!(registry.get("mock").expect("provider").name(), "second");
    }

    #[test]
    fn unknown_name_lists_available() {
        let registry = ProviderRegistry::new();
        registry.register("zeta", || Ok(Arc::new(Named("zeta")) as DynProvider));
        registry.register("alpha", || Ok(Arc::new(Named("alpha")) as DynProvider));
        let err = registry.get("missing").err().expect("error");
        match &err {
            LLMError::UnknownProvider { name, available } => {
                assert_eq!(name, "missing");
                assert_eq!(available, &vec!["alpha".to_string(), "zeta".to_string()]);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(
            err.to_string(),
            r#"unknown provider: "missing" (available: alpha, zeta)"#
        );
    }

    #[test]
    fn constructor_errors_propagate() {
        let registry = ProviderRegistry::new();
        registry.register("broken", || {
            Err(LLMError::invalid_config("api_key", "missing"))
        });
        assert!(matches!(
            registry.get("broken"),
            Err(LLMError::InvalidConfig { .. })
        ));
    }

    #[test]
    fn clear_and_reset() {
        let registry = ProviderRegistry::with_builtins();
        assert_eq!(registry.available(), vec!["anthropic", "gemini", "openai"]);

        registry.register("custom", || Ok(Arc::new(Named("custom")) as DynProvider));
        registry.clear();
        assert!(registry.available().is_empty());

        registry.register("custom", || Ok(Arc::new(Named("custom")) as DynProvider));
        registry.reset();
        assert!(!registry.is_registered("custom"));
        assert!(registry.is_registered("openai"));
    }

    #[test]
    fn builtin_without_credentials_fails_at_construction() {
        let registry = ProviderRegistry::with_builtins();
        temp_env::with_var_unset("GEMINI_API_KEY", || {
            assert!(matches!(
                registry.get("gemini"),
                Err(LLMError::InvalidConfig { .. })
            ));
        });
    }

    #[test]
    fn poisoned_lock_is_recovered() {
        let registry = Arc::new(ProviderRegistry::new());
        let poisoner = Arc::clone(&registry);
        let _ = std::thread::spawn(move || {
            let _guard = poisoner.write();
            panic!("poison the registry lock");
        })
        .join();
        registry.register("after", || Ok(Arc::new(Named("after")) as DynProvider));
        assert!(registry.is_registered("after"));
    }
}
