use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde_json::{json, Value};
use tracing::Instrument;

use super::{openai_message_content, send_json, Invocation, ProviderAdapter, ProviderEndpoints};
use crate::{error::ProviderError, models::Provider};

const ANTHROPIC_VERSION: &str = "2023-06-01";

/**
 * \brief 统一会话风格：一个会话对象跨多家服务商，按 (provider, model) 选择后端。
 */
pub struct UnifiedChatAdapter {
    client: reqwest::Client,
    endpoints: ProviderEndpoints,
}

impl UnifiedChatAdapter {
    pub fn new(client: reqwest::Client, endpoints: ProviderEndpoints) -> Self {
        Self { client, endpoints }
    }
}

#[async_trait]
impl ProviderAdapter for UnifiedChatAdapter {
    fn style(&self) -> &'static str {
        "unified"
    }

    async fn invoke(&self, call: &Invocation) -> Result<String, ProviderError> {
        let session = ChatSession::new(
            call.session_id.clone().unwrap_or_default(),
            &call.credential,
            call.system.clone(),
        )
        .with_model(call.provider, &call.model)
        .with_max_tokens(call.max_output_tokens);
        let span = tracing::debug_span!(
            "chat_session",
            session_id = %session.session_id,
            provider = %call.provider,
            model = %call.model
        );
        session
            .send_message(&self.client, &self.endpoints, &call.user)
            .instrument(span)
            .await
    }
}

/**
 * \brief 单轮会话配置。
 */
#[derive(Clone)]
struct ChatSession<'a> {
    session_id: String,
    api_key: &'a str,
    system_message: Option<String>,
    provider: Provider,
    model: String,
    max_tokens: u32,
}

impl<'a> ChatSession<'a> {
    fn new(session_id: String, api_key: &'a str, system_message: Option<String>) -> Self {
        Self {
            session_id,
            api_key,
            system_message,
            provider: Provider::OpenAI,
            model: String::new(),
            max_tokens: 1024,
        }
    }

    fn with_model(mut self, provider: Provider, model: &str) -> Self {
        self.provider = provider;
        self.model = model.to_string();
        self
    }

    fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    async fn send_message(
        &self,
        client: &reqwest::Client,
        endpoints: &ProviderEndpoints,
        text: &str,
    ) -> Result<String, ProviderError> {
        let base = endpoints.base_for(self.provider);
        match self.provider {
            Provider::OpenAI => self.send_openai(client, base, text).await,
            Provider::Anthropic => self.send_anthropic(client, base, text).await,
            Provider::Gemini => self.send_gemini(client, base, text).await,
            other => Err(ProviderError::new(
                other,
                "provider is not available through the unified chat session",
            )),
        }
    }

    async fn send_openai(
        &self,
        client: &reqwest::Client,
        base: &str,
        text: &str,
    ) -> Result<String, ProviderError> {
        let url = format!("{}/v1/chat/completions", base);
        let mut messages = Vec::new();
        if let Some(sys) = &self.system_message {
            messages.push(json!({"role": "system", "content": sys}));
        }
        messages.push(json!({"role": "user", "content": text}));
        let body = json!({
            "model": self.model,
            "messages": messages,
            "max_completion_tokens": self.max_tokens,
            "stream": false
        });

        let request = client
            .post(url)
            .header(CONTENT_TYPE, "application/json")
            .header(AUTHORIZATION, format!("Bearer {}", self.api_key))
            .json(&body);
        let v = send_json(Provider::OpenAI, request).await?;
        openai_message_content(&v)
            .ok_or_else(|| ProviderError::malformed(Provider::OpenAI, "choices[0].message.content"))
    }

    async fn send_anthropic(
        &self,
        client: &reqwest::Client,
        base: &str,
        text: &str,
    ) -> Result<String, ProviderError> {
        let url = format!("{}/v1/messages", base);
        let mut body = json!({
            "model": self.model,
            "max_tokens": self.max_tokens,
            "messages": [{
                "role": "user",
                "content": [{"type": "text", "text": text}]
            }],
        });
        if let Some(sys) = &self.system_message {
            body["system"] = json!(sys);
        }

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            "x-api-key",
            HeaderValue::from_str(self.api_key)
                .map_err(|_| ProviderError::new(Provider::Anthropic, "invalid api key header"))?,
        );
        headers.insert(
            "anthropic-version",
            HeaderValue::from_static(ANTHROPIC_VERSION),
        );

        let v = send_json(Provider::Anthropic, client.post(url).headers(headers).json(&body)).await?;
        extract_anthropic_content(&v)
            .ok_or_else(|| ProviderError::malformed(Provider::Anthropic, "content[].text"))
    }

    async fn send_gemini(
        &self,
        client: &reqwest::Client,
        base: &str,
        text: &str,
    ) -> Result<String, ProviderError> {
        let url = format!(
            "{}/models/{}:generateContent",
            normalize_gemini_base(base),
            self.model
        );
        let mut body = json!({
            "contents": [{"role": "user", "parts": [{"text": text}]}],
            "generationConfig": {"maxOutputTokens": self.max_tokens},
        });
        if let Some(sys) = &self.system_message {
            body["system_instruction"] = json!({
                "parts": [{"text": sys}]
            });
        }

        let request = client
            .post(url)
            .query(&[("key", self.api_key)])
            .json(&body);
        let v = send_json(Provider::Gemini, request).await?;
        extract_gemini_content(&v).ok_or_else(|| {
            ProviderError::malformed(Provider::Gemini, "candidates[0].content.parts[].text")
        })
    }
}

fn extract_anthropic_content(v: &Value) -> Option<String> {
    let parts = v
        .get("content")?
        .as_array()?
        .iter()
        .filter_map(|item| item.get("text").and_then(|t| t.as_str()))
        .collect::<Vec<_>>();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join(""))
    }
}

fn extract_gemini_content(v: &Value) -> Option<String> {
    let parts = v
        .get("candidates")?
        .as_array()?
        .first()?
        .get("content")?
        .get("parts")?
        .as_array()?
        .iter()
        .filter_map(|p| p.get("text").and_then(|t| t.as_str()))
        .collect::<Vec<_>>();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join(""))
    }
}

fn normalize_gemini_base(api_base: &str) -> String {
    let trimmed = api_base.trim_end_matches('/');
    if trimmed.ends_with("/v1")
        || trimmed.ends_with("/v1beta")
        || trimmed.contains("/v1/")
        || trimmed.contains("/v1beta/")
    {
        trimmed.to_string()
    } else {
        format!("{}/v1beta", trimmed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use wiremock::matchers::{body_partial_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn call(provider: Provider, model: &str) -> Invocation {
        Invocation {
            provider,
            model: model.to_string(),
            system: Some("be an seo writer".to_string()),
            user: "write about tea".to_string(),
            credential: "test-key".to_string(),
            max_output_tokens: 400,
            session_id: Some("seo_session_1_20250101_000000".to_string()),
        }
    }

    fn adapter(server: &MockServer) -> UnifiedChatAdapter {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .expect("client");
        UnifiedChatAdapter::new(client, ProviderEndpoints::all(&server.uri()))
    }

    #[tokio::test]
    async fn test_openai_chat_completion() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("Authorization", "Bearer test-key"))
            .and(body_partial_json(json!({"model": "gpt-4o", "max_completion_tokens": 400})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"role": "assistant", "content": "{\"seo_title\":\"Tea\"}"}}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let text = adapter(&server)
            .invoke(&call(Provider::OpenAI, "gpt-4o"))
            .await
            .expect("invoke openai");
        assert_eq!(text, "{\"seo_title\":\"Tea\"}");
    }

    #[tokio::test]
    async fn test_openai_reasoning_model_uses_completion_token_cap() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(body_partial_json(json!({"model": "o3", "max_completion_tokens": 400})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"role": "assistant", "content": "ok"}}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let text = adapter(&server)
            .invoke(&call(Provider::OpenAI, "o3"))
            .await
            .expect("invoke o3");
        assert_eq!(text, "ok");

        let requests = server.received_requests().await.expect("recorded requests");
        let body: Value = serde_json::from_slice(&requests[0].body).expect("json body");
        assert!(body.get("max_tokens").is_none(), "{}", body);
    }

    #[tokio::test]
    async fn test_anthropic_joins_text_blocks() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .and(header("x-api-key", "test-key"))
            .and(header("anthropic-version", ANTHROPIC_VERSION))
            .and(body_partial_json(json!({"system": "be an seo writer", "max_tokens": 400})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "content": [{"type": "text", "text": "# Tea"}, {"type": "text", "text": "\nbody"}]
            })))
            .mount(&server)
            .await;

        let text = adapter(&server)
            .invoke(&call(Provider::Anthropic, "claude-3-5-haiku-20241022"))
            .await
            .expect("invoke anthropic");
        assert_eq!(text, "# Tea\nbody");
    }

    #[tokio::test]
    async fn test_gemini_generate_content() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1beta/models/gemini-1.5-pro:generateContent"))
            .and(query_param("key", "test-key"))
            .and(body_partial_json(json!({"generationConfig": {"maxOutputTokens": 400}})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [{"content": {"parts": [{"text": "part one "}, {"text": "part two"}]}}]
            })))
            .mount(&server)
            .await;

        let text = adapter(&server)
            .invoke(&call(Provider::Gemini, "gemini-1.5-pro"))
            .await
            .expect("invoke gemini");
        assert_eq!(text, "part one part two");
    }

    #[tokio::test]
    async fn test_non_success_status_is_provider_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(401).set_body_string("invalid api key"))
            .mount(&server)
            .await;

        let err = adapter(&server)
            .invoke(&call(Provider::OpenAI, "gpt-4o"))
            .await
            .expect_err("401 must fail");
        assert_eq!(err.provider, Provider::OpenAI);
        assert!(err.cause.contains("401"));
        assert!(err.cause.contains("invalid api key"));
    }

    #[tokio::test]
    async fn test_missing_envelope_field_is_malformed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "msg_1"})))
            .mount(&server)
            .await;

        let err = adapter(&server)
            .invoke(&call(Provider::Anthropic, "claude-3-5-haiku-20241022"))
            .await
            .expect_err("missing content must fail");
        assert!(err.cause.contains("malformed"));
    }

    #[tokio::test]
    async fn test_groq_is_not_served_by_unified_session() {
        let server = MockServer::start().await;
        let err = adapter(&server)
            .invoke(&call(Provider::Groq, "gemma-7b-it"))
            .await
            .expect_err("groq is not unified");
        assert_eq!(err.provider, Provider::Groq);
    }

    #[test]
    fn test_normalize_gemini_base() {
        assert_eq!(
            normalize_gemini_base("https://generativelanguage.googleapis.com"),
            "https://generativelanguage.googleapis.com/v1beta"
        );
        assert_eq!(
            normalize_gemini_base("https://generativelanguage.googleapis.com/v1/"),
            "https://generativelanguage.googleapis.com/v1"
        );
    }
}
