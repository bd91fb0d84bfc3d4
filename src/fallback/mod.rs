//! Ordered fallback across endpoint configs.
//!
//! A [`FallbackChain`] walks its configs strictly in list order. Before each
//! attempt it consults the response cache, if one is given; after a success
//! it stores the response. A retryable failure (rate limit, timeout, network
//! fault, unavailable service) moves on to the next config. Any other failure
//! stops the chain with [`Error::EndpointFailed`]. When every config has
//! failed the chain reports [`Error::AllEndpointsExhausted`] with one cause
//! per config, in order. Configs are never reordered, skipped, or tried in
//! parallel.

pub mod invoker;

use std::time::Duration;

use derive_builder::Builder;
use serde_json::Value;

use crate::cache::ResponseCache;
use crate::config::types::EndpointConfig;
use crate::error::{EndpointFailure, Error, FailureKind, Result};

pub use invoker::{AttemptError, EndpointInvoker};

/// Knobs for a [`FallbackChain`].
#[derive(Debug, Clone, Default, Builder)]
#[builder(pattern = "owned", setter(into), build_fn(error = "Error"))]
pub struct FallbackSettings {
    /// Upper bound on one attempt. Expiry counts as a retryable timeout.
    #[builder(default, setter(strip_option))]
    pub attempt_timeout: Option<Duration>,
}

impl FallbackSettings {
    pub fn builder() -> FallbackSettingsBuilder {
        FallbackSettingsBuilder::default()
    }
}

/// The result of a successful run.
#[derive(Debug, Clone, PartialEq)]
pub struct FallbackOutcome {
    /// The endpoint's response.
    pub response: Value,
    /// Position of the config that produced the response.
    pub index: usize,
    /// Model of that config.
    pub model: String,
    /// Whether the response was served from the cache.
    pub from_cache: bool,
    /// Retryable failures of the configs tried before it.
    pub failures: Vec<EndpointFailure>,
}

/// Ordered list of endpoint configs to try one after another.
#[derive(Debug, Clone)]
pub struct FallbackChain {
    configs: Vec<EndpointConfig>,
    settings: FallbackSettings,
}

impl FallbackChain {
    pub fn new(configs: Vec<EndpointConfig>) -> Self {
        Self {
            configs,
            settings: FallbackSettings::default(),
        }
    }

    pub fn with_settings(mut self, settings: FallbackSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn configs(&self) -> &[EndpointConfig] {
        &self.configs
    }

    pub fn settings(&self) -> &FallbackSettings {
        &self.settings
    }

    /// Run `request` through the chain without a cache.
    pub async fn run<I>(&self, invoker: &I, request: &Value) -> Result<FallbackOutcome>
    where
        I: EndpointInvoker + ?Sized,
    {
        self.run_cached(invoker, request, None).await
    }

    /// Run `request` through the chain, consulting `cache` before each
    /// attempt and filling it after a success.
    ///
    /// # Errors
    ///
    /// - [`Error::EndpointFailed`] on the first non-retryable failure
    /// - [`Error::AllEndpointsExhausted`] when every config failed
    /// - [`Error::InvalidConfig`] before any attempt when a config has no model
    /// - any cache error, which is never swallowed
    pub async fn run_cached<I>(
        &self,
        invoker: &I,
        request: &Value,
        cache: Option<&ResponseCache>,
    ) -> Result<FallbackOutcome>
    where
        I: EndpointInvoker + ?Sized,
    {
        if let Some(index) = self.configs.iter().position(|c| c.model().is_empty()) {
            return Err(Error::InvalidConfig(format!(
                "endpoint config {} has no model; expand it with config_list_from_models",
                index
            )));
        }

        let mut failures = Vec::new();

        for (index, config) in self.configs.iter().enumerate() {
            let cached = match cache {
                Some(cache) => cache
                    .key_for(&cache_request(config, request))
                    .map(|key| (cache, key)),
                None => None,
            };

            if let Some((cache, key)) = &cached
                && let Some(response) = cache.get(key).await?
            {
                log::debug!("serving {} from cache", config.model());
                return Ok(FallbackOutcome {
                    response,
                    index,
                    model: config.model().to_string(),
                    from_cache: true,
                    failures,
                });
            }

            match self.attempt(invoker, config, request).await {
                Ok(response) => {
                    if let Some((cache, key)) = &cached {
                        cache.put(key, response.clone()).await?;
                    }
                    if index > 0 {
                        log::info!(
                            "endpoint {} ({}) succeeded after {} failures",
                            index,
                            config.model(),
                            failures.len()
                        );
                    }
                    return Ok(FallbackOutcome {
                        response,
                        index,
                        model: config.model().to_string(),
                        from_cache: false,
                        failures,
                    });
                }
                Err(err) => {
                    let failure = EndpointFailure {
                        index,
                        model: config.model().to_string(),
                        kind: err.kind,
                        message: err.message,
                    };

                    if !failure.kind.is_retryable() {
                        log::warn!("endpoint {} failed and will not be retried", failure);
                        return Err(Error::EndpointFailed(failure));
                    }

                    log::warn!("endpoint {} failed, trying the next config", failure);
                    failures.push(failure);
                }
            }
        }

        if self.configs.is_empty() {
            log::warn!("fallback chain has no endpoint configs");
        }
        Err(Error::AllEndpointsExhausted { causes: failures })
    }

    async fn attempt<I>(
        &self,
        invoker: &I,
        config: &EndpointConfig,
        request: &Value,
    ) -> std::result::Result<Value, AttemptError>
    where
        I: EndpointInvoker + ?Sized,
    {
        match self.settings.attempt_timeout {
            Some(limit) => tokio::time::timeout(limit, invoker.invoke(config, request))
                .await
                .unwrap_or_else(|_| {
                    Err(AttemptError::new(
                        FailureKind::Timeout,
                        format!("no response within {:?}", limit),
                    ))
                }),
            None => invoker.invoke(config, request).await,
        }
    }
}

/// The payload a response is cached under for `config`.
///
/// The config's model and extra parameters sit under `"endpoint"` and the
/// request under `"request"`, so a request field can never stand in for the
/// config's identity.
pub fn cache_request(config: &EndpointConfig, request: &Value) -> Value {
    serde_json::json!({
        "endpoint": Value::Object(config.cache_params()),
        "request": request,
    })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use serde_json::json;

    use super::*;
    use crate::cache::{CacheConfig, MemoryStore};

    /// Answers per model from a fixed script and records every call.
    struct ScriptedInvoker {
        script: HashMap<String, std::result::Result<Value, AttemptError>>,
        calls: Mutex<Vec<String>>,
    }

    impl ScriptedInvoker {
        fn new(script: Vec<(&str, std::result::Result<Value, AttemptError>)>) -> Self {
            Self {
                script: script
                    .into_iter()
                    .map(|(m, r)| (m.to_string(), r))
                    .collect(),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl EndpointInvoker for ScriptedInvoker {
        async fn invoke(
            &self,
            config: &EndpointConfig,
            _request: &Value,
        ) -> std::result::Result<Value, AttemptError> {
            self.calls.lock().unwrap().push(config.model().to_string());
            self.script
                .get(config.model())
                .cloned()
                .unwrap_or_else(|| Err(AttemptError::new(FailureKind::Other, "unscripted")))
        }
    }

    struct SlowInvoker;

    #[async_trait]
    impl EndpointInvoker for SlowInvoker {
        async fn invoke(
            &self,
            config: &EndpointConfig,
            _request: &Value,
        ) -> std::result::Result<Value, AttemptError> {
            if config.model() == "slow" {
                tokio::time::sleep(Duration::from_secs(60)).await;
            }
            Ok(json!(config.model()))
        }
    }

    fn chain(models: &[&str]) -> FallbackChain {
        FallbackChain::new(
            models
                .iter()
                .map(|m| EndpointConfig::builder(*m).build())
                .collect(),
        )
    }

    #[tokio::test]
    async fn test_first_success_stops_chain() {
        let invoker = ScriptedInvoker::new(vec![
            ("a", Err(AttemptError::rate_limited("429"))),
            ("b", Ok(json!("from b"))),
            ("c", Ok(json!("from c"))),
        ]);

        let outcome = chain(&["a", "b", "c"])
            .run(&invoker, &json!({}))
            .await
            .unwrap();

        assert_eq!(outcome.response, json!("from b"));
        assert_eq!(outcome.index, 1);
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(invoker.calls(), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_non_retryable_failure_aborts() {
        let invoker = ScriptedInvoker::new(vec![
            ("a", Err(AttemptError::new(FailureKind::ContentFilter, "blocked"))),
            ("b", Ok(json!("never"))),
        ]);

        let err = chain(&["a", "b"])
            .run(&invoker, &json!({}))
            .await
            .unwrap_err();

        match err {
            Error::EndpointFailed(failure) => {
                assert_eq!(failure.index, 0);
                assert_eq!(failure.kind, FailureKind::ContentFilter);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(invoker.calls(), vec!["a"]);
    }

    #[tokio::test]
    async fn test_empty_chain_is_exhausted() {
        let invoker = ScriptedInvoker::new(vec![]);
        let err = chain(&[]).run(&invoker, &json!({})).await.unwrap_err();
        assert!(matches!(err, Error::AllEndpointsExhausted { ref causes } if causes.is_empty()));
    }

    #[tokio::test]
    async fn test_config_without_model_is_rejected() {
        let invoker = ScriptedInvoker::new(vec![("a", Ok(json!("never")))]);
        let configs = crate::config::get_config_list(&["sk-1"], None, None, None).unwrap();
        let mut chain_configs = vec![EndpointConfig::builder("a").build()];
        chain_configs.extend(configs);

        let err = FallbackChain::new(chain_configs)
            .run(&invoker, &json!({}))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::InvalidConfig(ref msg) if msg.contains("config 1")));
        assert!(invoker.calls().is_empty());
    }

    #[tokio::test]
    async fn test_attempt_timeout_is_retryable() {
        let settings = FallbackSettings::builder()
            .attempt_timeout(Duration::from_millis(20))
            .build()
            .unwrap();
        let outcome = chain(&["slow", "fast"])
            .with_settings(settings)
            .run(&SlowInvoker, &json!({}))
            .await
            .unwrap();

        assert_eq!(outcome.response, json!("fast"));
        assert_eq!(outcome.failures[0].kind, FailureKind::Timeout);
    }

    #[tokio::test]
    async fn test_cache_hit_skips_invocation() {
        let store = MemoryStore::new();
        let cache = ResponseCache::open(CacheConfig::memory(41u64, store))
            .await
            .unwrap();
        let invoker = ScriptedInvoker::new(vec![("a", Ok(json!("fresh")))]);
        let chain = chain(&["a"]);
        let request = json!({"prompt": "hi"});

        let first = chain.run_cached(&invoker, &request, Some(&cache)).await.unwrap();
        let second = chain.run_cached(&invoker, &request, Some(&cache)).await.unwrap();

        assert!(!first.from_cache);
        assert!(second.from_cache);
        assert_eq!(second.response, json!("fresh"));
        assert_eq!(invoker.calls(), vec!["a"]);
    }

    #[test]
    fn test_cache_request_keeps_endpoint_apart() {
        let config = EndpointConfig::builder("gpt-4")
            .api_key("sk")
            .extra("temperature", 1)
            .build();

        let payload = cache_request(&config, &json!({"model": "other", "prompt": "x"}));
        assert_eq!(
            payload,
            json!({
                "endpoint": {"model": "gpt-4", "temperature": 1},
                "request": {"model": "other", "prompt": "x"},
            })
        );

        let payload = cache_request(&config, &json!("raw prompt"));
        assert_eq!(payload["request"], json!("raw prompt"));
    }

    #[tokio::test]
    async fn test_request_model_does_not_share_entries_across_configs() {
        let cache = ResponseCache::open(CacheConfig::memory(41u64, MemoryStore::new()))
            .await
            .unwrap();
        let chain = chain(&["gpt-4", "gpt-3.5-turbo"]);
        let request = json!({"model": "gpt-4", "prompt": "hi"});

        let first = ScriptedInvoker::new(vec![
            ("gpt-4", Err(AttemptError::rate_limited("429"))),
            ("gpt-3.5-turbo", Ok(json!("answer from gpt-3.5-turbo"))),
        ]);
        chain.run_cached(&first, &request, Some(&cache)).await.unwrap();

        let second = ScriptedInvoker::new(vec![
            ("gpt-4", Ok(json!("answer from gpt-4"))),
            ("gpt-3.5-turbo", Ok(json!("unused"))),
        ]);
        let outcome = chain.run_cached(&second, &request, Some(&cache)).await.unwrap();

        assert_eq!(outcome.index, 0);
        assert!(!outcome.from_cache);
        assert_eq!(outcome.response, json!("answer from gpt-4"));
        assert_eq!(second.calls(), vec!["gpt-4"]);
    }
}
