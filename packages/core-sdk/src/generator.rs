use std::sync::atomic::{AtomicU64, Ordering};

use time::{macros::format_description, OffsetDateTime};

use crate::{
    catalog,
    error::{Result, ServiceError},
    models::{CanonicalDocument, GenerationRequest},
    normalizer, prompt,
    providers::{AdapterSet, Invocation},
    telemetry,
};

/**
 * \brief 生成编排器：校验 → 构造提示词 → 调用适配器 → 归一化。
 * \details 不重试，每个请求只发起一次外部调用。会话计数器归实例所有。
 */
pub struct Generator {
    adapters: AdapterSet,
    session_counter: AtomicU64,
}

impl Generator {
    pub fn new(adapters: AdapterSet) -> Self {
        Self {
            adapters,
            session_counter: AtomicU64::new(0),
        }
    }

    pub fn adapters(&self) -> &AdapterSet {
        &self.adapters
    }

    /**
     * \brief 校验请求：关键词非空、字数为正、模型登记在目录中。
     */
    pub fn validate(request: &GenerationRequest) -> Result<()> {
        if request.keyword.trim().is_empty() {
            return Err(ServiceError::Validation("Keyword must not be empty".to_string()));
        }
        if request.word_count == 0 {
            return Err(ServiceError::Validation(
                "Word count must be a positive integer".to_string(),
            ));
        }
        if !catalog::is_supported(request.provider, &request.model) {
            return Err(ServiceError::Validation(format!(
                "Model {} is not available for provider {}",
                request.model, request.provider
            )));
        }
        Ok(())
    }

    /**
     * \brief 执行一次生成，成功时返回尚未持久化的规范文档。
     */
    pub async fn generate(&self, request: &GenerationRequest) -> Result<CanonicalDocument> {
        Self::validate(request)?;
        let adapter = self.adapters.get(request.provider).ok_or_else(|| {
            ServiceError::Validation(format!("Unsupported provider: {}", request.provider))
        })?;

        let prompts = prompt::build(request);
        let call = Invocation {
            provider: request.provider,
            model: request.model.clone(),
            system: Some(prompts.system),
            user: prompts.user,
            credential: request.api_key.clone(),
            max_output_tokens: prompt::max_output_tokens(request.word_count),
            session_id: Some(self.next_session_id()),
        };

        tracing::info!(
            provider = %request.provider,
            model = %request.model,
            style = adapter.style(),
            max_tokens = call.max_output_tokens,
            "dispatching generation"
        );

        let raw = match adapter.invoke(&call).await {
            Ok(raw) => raw,
            Err(err) => {
                telemetry::log_error("generator", &err.to_string());
                return Err(err.into());
            }
        };

        let doc = normalizer::normalize(&raw, request);
        telemetry::log_event(
            "generator",
            &format!(
                "generated id={} provider={} model={} words={}",
                doc.id, doc.provider, doc.model, doc.word_count
            ),
        );
        Ok(doc)
    }

    /**
     * \brief 形如 `seo_session_{n}_{YYYYmmdd_HHMMSS}` 的会话标识，进程内递增；时间取本地时区，无法确定时退回 UTC。
     */
    fn next_session_id(&self) -> String {
        let n = self.session_counter.fetch_add(1, Ordering::Relaxed) + 1;
        let stamp = OffsetDateTime::now_local()
            .unwrap_or_else(|_| OffsetDateTime::now_utc())
            .format(format_description!(
                "[year][month][day]_[hour][minute][second]"
            ))
            .unwrap_or_default();
        format!("seo_session_{}_{}", n, stamp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        error::ProviderError,
        models::Provider,
        providers::ProviderAdapter,
    };
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};

    /** \brief 记录调用并返回固定结果的替身适配器。 */
    struct StubAdapter {
        reply: std::result::Result<String, String>,
        calls: Mutex<Vec<Invocation>>,
    }

    impl StubAdapter {
        fn ok(text: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: Ok(text.to_string()),
                calls: Mutex::new(Vec::new()),
            })
        }

        fn failing(cause: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: Err(cause.to_string()),
                calls: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> Vec<Invocation> {
            self.calls.lock().expect("lock").clone()
        }
    }

    #[async_trait]
    impl ProviderAdapter for StubAdapter {
        fn style(&self) -> &'static str {
            "stub"
        }

        async fn invoke(&self, call: &Invocation) -> std::result::Result<String, ProviderError> {
            self.calls.lock().expect("lock").push(call.clone());
            self.reply
                .clone()
                .map_err(|cause| ProviderError::new(call.provider, cause))
        }
    }

    fn generator_with(provider: Provider, stub: Arc<StubAdapter>) -> Generator {
        Generator::new(AdapterSet::new().with(provider, stub))
    }

    #[tokio::test]
    async fn test_unknown_model_fails_without_network_call() {
        let stub = StubAdapter::ok("{}");
        let generator = generator_with(Provider::OpenAI, stub.clone());
        let req = GenerationRequest::new("tea", Provider::OpenAI, "claude-opus-4-20250514", "k");

        let err = generator.generate(&req).await.expect_err("must reject");
        assert!(matches!(err, ServiceError::Validation(_)));
        assert_eq!(
            err.to_string(),
            "Model claude-opus-4-20250514 is not available for provider openai"
        );
        assert!(stub.calls().is_empty());
    }

    #[tokio::test]
    async fn test_empty_keyword_and_zero_words_are_rejected() {
        let stub = StubAdapter::ok("{}");
        let generator = generator_with(Provider::Groq, stub.clone());

        let mut req = GenerationRequest::new("   ", Provider::Groq, "gemma-7b-it", "k");
        assert!(matches!(
            generator.generate(&req).await,
            Err(ServiceError::Validation(_))
        ));

        req.keyword = "tea".to_string();
        req.word_count = 0;
        assert!(matches!(
            generator.generate(&req).await,
            Err(ServiceError::Validation(_))
        ));
        assert!(stub.calls().is_empty());
    }

    #[tokio::test]
    async fn test_dispatches_with_prompts_and_token_cap() {
        let stub = StubAdapter::ok(r#"{"seo_title":"Tea Guide","content":"steep it"}"#);
        let generator = generator_with(Provider::Groq, stub.clone());
        let mut req = GenerationRequest::new("tea", Provider::Groq, "gemma-7b-it", "gsk-1");
        req.word_count = 300;

        let doc = generator.generate(&req).await.expect("generate");
        assert_eq!(doc.title, "Tea Guide");
        assert_eq!(doc.body, "steep it");
        assert_eq!(doc.provider, Provider::Groq);
        assert_eq!(doc.model, "gemma-7b-it");

        let calls = stub.calls();
        assert_eq!(calls.len(), 1);
        let expected = prompt::build(&req);
        assert_eq!(calls[0].system.as_deref(), Some(expected.system.as_str()));
        assert_eq!(calls[0].user, expected.user);
        assert_eq!(calls[0].credential, "gsk-1");
        assert_eq!(calls[0].max_output_tokens, 600);
    }

    #[tokio::test]
    async fn test_provider_failure_is_surfaced_once() {
        let stub = StubAdapter::failing("connection reset");
        let generator = generator_with(Provider::Grok, stub.clone());
        let req = GenerationRequest::new("tea", Provider::Grok, "grok-beta", "k");

        let err = generator.generate(&req).await.expect_err("provider error");
        match err {
            ServiceError::Provider(e) => {
                assert_eq!(e.provider, Provider::Grok);
                assert_eq!(e.cause, "connection reset");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(stub.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_missing_adapter_is_validation_error() {
        let generator = Generator::new(AdapterSet::new());
        let req = GenerationRequest::new("tea", Provider::Gemini, "gemini-1.5-pro", "k");
        assert!(matches!(
            generator.generate(&req).await,
            Err(ServiceError::Validation(_))
        ));
    }

    #[test]
    fn test_session_id_shape() {
        let generator = Generator::new(AdapterSet::new());
        let first = generator.next_session_id();
        let second = generator.next_session_id();

        let parts: Vec<&str> = first.split('_').collect();
        assert_eq!(parts.len(), 5, "{}", first);
        assert_eq!(&parts[..3], &["seo", "session", "1"]);
        assert_eq!(parts[3].len(), 8);
        assert_eq!(parts[4].len(), 6);
        assert!(parts[3..].iter().all(|p| p.chars().all(|c| c.is_ascii_digit())));
        assert!(second.starts_with("seo_session_2_"));
    }

    #[tokio::test]
    async fn test_session_ids_are_distinct_under_concurrency() {
        let stub = StubAdapter::ok("plain text");
        let generator = Arc::new(generator_with(Provider::OpenAI, stub.clone()));

        let mut handles = Vec::new();
        for _ in 0..16 {
            let generator = generator.clone();
            handles.push(tokio::spawn(async move {
                let req = GenerationRequest::new("tea", Provider::OpenAI, "gpt-4o", "k");
                generator.generate(&req).await.map(|_| ())
            }));
        }
        for handle in handles {
            handle.await.expect("join").expect("generate");
        }

        let mut ids: Vec<String> = stub
            .calls()
            .into_iter()
            .filter_map(|c| c.session_id)
            .collect();
        assert_eq!(ids.len(), 16);
        assert!(ids.iter().all(|id| id.starts_with("seo_session_")));
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 16);
    }
}
