//! Integration tests for ordered fallback over resolved config lists.

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use llmconf::cache::{CacheConfig, MemoryStore, ResponseCache};
    use llmconf::config::{ConfigListResolver, MemoryFs};
    use llmconf::fallback::{AttemptError, EndpointInvoker, FallbackChain};
    use llmconf::{EndpointConfig, Error, FailureKind};
    use serde_json::{Value, json};
    use tempfile::TempDir;

    /// Fails the first `failures` calls with `kind`, then answers with the
    /// model name.
    struct FlakyInvoker {
        failures: usize,
        kind: FailureKind,
        calls: AtomicUsize,
        seen: Mutex<Vec<String>>,
    }

    impl FlakyInvoker {
        fn new(failures: usize, kind: FailureKind) -> Self {
            Self {
                failures,
                kind,
                calls: AtomicUsize::new(0),
                seen: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        fn seen(&self) -> Vec<String> {
            self.seen.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl EndpointInvoker for FlakyInvoker {
        async fn invoke(
            &self,
            config: &EndpointConfig,
            _request: &Value,
        ) -> Result<Value, AttemptError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            self.seen.lock().unwrap().push(config.model().to_string());
            if call < self.failures {
                Err(AttemptError::new(self.kind, format!("attempt {} failed", call)))
            } else {
                Ok(json!({"model": config.model()}))
            }
        }
    }

    fn resolved_chain() -> FallbackChain {
        let env = HashMap::from([(
            "OAI_CONFIG_LIST".to_string(),
            r#"[
                {"model": "primary", "tags": ["prod"]},
                {"model": "secondary", "tags": ["prod"]},
                {"model": "scratch", "tags": ["dev"]},
                {"model": "tertiary", "tags": ["prod"]}
            ]"#
            .to_string(),
        )]);
        let resolver = ConfigListResolver::builder()
            .environment(env)
            .filesystem(MemoryFs::new())
            .build();
        let filter = llmconf::FilterPredicate::new().tags(["prod"]);
        FallbackChain::new(resolver.resolve_default(Some(&filter)).unwrap())
    }

    #[tokio::test]
    async fn test_retryable_failures_then_success() {
        let chain = resolved_chain();
        let invoker = FlakyInvoker::new(2, FailureKind::RateLimit);

        let outcome = chain.run(&invoker, &json!({"prompt": "hi"})).await.unwrap();

        assert_eq!(invoker.calls(), 3);
        assert_eq!(invoker.seen(), vec!["primary", "secondary", "tertiary"]);
        assert_eq!(outcome.index, 2);
        assert_eq!(outcome.model, "tertiary");
        assert_eq!(outcome.response, json!({"model": "tertiary"}));
        assert_eq!(outcome.failures.len(), 2);
    }

    #[tokio::test]
    async fn test_exhaustion_reports_every_cause_in_order() {
        let chain = resolved_chain();
        let invoker = FlakyInvoker::new(usize::MAX, FailureKind::ServiceUnavailable);

        let err = chain.run(&invoker, &json!({})).await.unwrap_err();

        let causes = match err {
            Error::AllEndpointsExhausted { causes } => causes,
            other => panic!("expected exhaustion, got {other}"),
        };
        let models: Vec<&str> = causes.iter().map(|c| c.model.as_str()).collect();
        assert_eq!(models, vec!["primary", "secondary", "tertiary"]);
        assert!(causes.iter().enumerate().all(|(i, c)| c.index == i));
        assert!(
            causes
                .iter()
                .all(|c| c.kind == FailureKind::ServiceUnavailable)
        );
    }

    #[tokio::test]
    async fn test_authentication_failure_is_not_retried() {
        let chain = resolved_chain();
        let invoker = FlakyInvoker::new(1, FailureKind::Authentication);

        let err = chain.run(&invoker, &json!({})).await.unwrap_err();

        assert!(matches!(err, Error::EndpointFailed(ref f) if f.model == "primary"));
        assert_eq!(invoker.calls(), 1);
    }

    #[tokio::test]
    async fn test_cached_response_skips_endpoint() {
        let chain = resolved_chain();
        let cache = ResponseCache::open(CacheConfig::memory(41u64, MemoryStore::new()))
            .await
            .unwrap();
        let request = json!({"prompt": "cache me"});

        let first = FlakyInvoker::new(1, FailureKind::Timeout);
        let fresh = chain
            .run_cached(&first, &request, Some(&cache))
            .await
            .unwrap();
        assert!(!fresh.from_cache);
        assert_eq!(fresh.model, "secondary");

        // the primary endpoint still has no entry, the secondary one does
        let second = FlakyInvoker::new(1, FailureKind::Timeout);
        let cached = chain
            .run_cached(&second, &request, Some(&cache))
            .await
            .unwrap();
        assert!(cached.from_cache);
        assert_eq!(cached.model, "secondary");
        assert_eq!(cached.response, fresh.response);
        assert_eq!(second.seen(), vec!["primary"]);

        cache.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_disk_cache_serves_across_runs() {
        let dir = TempDir::new().unwrap();
        let chain = resolved_chain();
        let request = json!({"prompt": "persist"});

        let invoker = FlakyInvoker::new(0, FailureKind::Other);
        ResponseCache::scoped(CacheConfig::disk(7u64, dir.path()), |cache| {
            Box::pin(async move { chain.run_cached(&invoker, &request, Some(cache)).await })
        })
        .await
        .unwrap();

        let chain = resolved_chain();
        let request = json!({"prompt": "persist"});
        let invoker = FlakyInvoker::new(0, FailureKind::Other);
        let cache = ResponseCache::open(CacheConfig::disk(7u64, dir.path()))
            .await
            .unwrap();
        let outcome = chain
            .run_cached(&invoker, &request, Some(&cache))
            .await
            .unwrap();

        assert!(outcome.from_cache);
        assert_eq!(invoker.calls(), 0);
        cache.close().await.unwrap();
    }
}
