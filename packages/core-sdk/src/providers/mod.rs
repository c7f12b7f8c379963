//! 服务商适配层：统一的调用契约与按服务商查表的适配器集合。

pub mod direct;
pub mod raw_http;
pub mod unified;

use std::{collections::HashMap, fmt, sync::Arc, time::Duration};

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

use crate::{error::ProviderError, models::Provider};

pub use direct::DirectChatAdapter;
pub use raw_http::RawHttpAdapter;
pub use unified::UnifiedChatAdapter;

/**
 * \brief 单次服务商调用的全部输入。
 */
#[derive(Clone)]
pub struct Invocation {
    pub provider: Provider,
    pub model: String,
    /** \brief system 提示词；探测调用不带 */
    pub system: Option<String>,
    pub user: String,
    pub credential: String,
    pub max_output_tokens: u32,
    /** \brief 统一会话风格使用的会话标识 */
    pub session_id: Option<String>,
}

impl fmt::Debug for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Invocation")
            .field("provider", &self.provider)
            .field("model", &self.model)
            .field("max_output_tokens", &self.max_output_tokens)
            .field("session_id", &self.session_id)
            .finish_non_exhaustive()
    }
}

/**
 * \brief 所有服务商适配器实现的统一契约：给定提示词返回原始文本。
 */
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /** \brief 适配器风格名称，用于日志 */
    fn style(&self) -> &'static str;

    async fn invoke(&self, call: &Invocation) -> Result<String, ProviderError>;
}

/**
 * \brief 各服务商的 API 基地址。
 */
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderEndpoints {
    pub openai: String,
    pub anthropic: String,
    pub gemini: String,
    pub groq: String,
    pub grok: String,
}

impl Default for ProviderEndpoints {
    fn default() -> Self {
        Self {
            openai: "https://api.openai.com".to_string(),
            anthropic: "https://api.anthropic.com".to_string(),
            gemini: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            groq: "https://api.groq.com/openai".to_string(),
            grok: "https://api.x.ai".to_string(),
        }
    }
}

impl ProviderEndpoints {
    /**
     * \brief 所有服务商指向同一基地址（测试替身使用）。
     */
    pub fn all(base: &str) -> Self {
        Self {
            openai: base.to_string(),
            anthropic: base.to_string(),
            gemini: base.to_string(),
            groq: base.to_string(),
            grok: base.to_string(),
        }
    }

    pub fn base_for(&self, provider: Provider) -> &str {
        let base = match provider {
            Provider::OpenAI => &self.openai,
            Provider::Anthropic => &self.anthropic,
            Provider::Gemini => &self.gemini,
            Provider::Groq => &self.groq,
            Provider::Grok => &self.grok,
        };
        base.trim_end_matches('/')
    }
}

/**
 * \brief 服务商 → 适配器 的查找表。
 */
#[derive(Clone, Default)]
pub struct AdapterSet {
    adapters: HashMap<Provider, Arc<dyn ProviderAdapter>>,
}

impl AdapterSet {
    pub fn new() -> Self {
        Self::default()
    }

    /**
     * \brief 注册（或替换）某服务商的适配器。
     */
    pub fn with(mut self, provider: Provider, adapter: Arc<dyn ProviderAdapter>) -> Self {
        self.adapters.insert(provider, adapter);
        self
    }

    pub fn get(&self, provider: Provider) -> Option<Arc<dyn ProviderAdapter>> {
        self.adapters.get(&provider).cloned()
    }

    /**
     * \brief 标准适配器集合：openai/anthropic/gemini 走统一会话，groq 走直连客户端，grok 走原始 HTTP。
     * \param timeout 单次调用超时
     */
    pub fn standard(endpoints: &ProviderEndpoints, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        let unified: Arc<dyn ProviderAdapter> =
            Arc::new(UnifiedChatAdapter::new(client.clone(), endpoints.clone()));
        Ok(Self::new()
            .with(Provider::OpenAI, unified.clone())
            .with(Provider::Anthropic, unified.clone())
            .with(Provider::Gemini, unified)
            .with(
                Provider::Groq,
                Arc::new(DirectChatAdapter::new(
                    client.clone(),
                    endpoints.base_for(Provider::Groq),
                )),
            )
            .with(
                Provider::Grok,
                Arc::new(RawHttpAdapter::new(
                    client,
                    format!("{}/v1/chat/completions", endpoints.base_for(Provider::Grok)),
                )),
            ))
    }
}

/**
 * \brief 发送请求并读取 JSON 响应；非 2xx 状态携带响应正文作为错误原因。
 */
pub(crate) async fn send_json(
    provider: Provider,
    request: reqwest::RequestBuilder,
) -> Result<Value, ProviderError> {
    let resp = request
        .send()
        .await
        .map_err(|e| ProviderError::transport(provider, e))?;
    if !resp.status().is_success() {
        let status = resp.status();
        let text = resp.text().await.unwrap_or_default();
        return Err(ProviderError::new(
            provider,
            format!("request failed: {} -> {}", status, text),
        ));
    }
    resp.json::<Value>()
        .await
        .map_err(|e| ProviderError::undecodable(provider, e))
}

/**
 * \brief 读取 OpenAI 兼容响应中的 `choices[0].message.content`。
 */
pub(crate) fn openai_message_content(v: &Value) -> Option<String> {
    v.get("choices")?
        .get(0)?
        .get("message")?
        .get("content")?
        .as_str()
        .map(|s| s.to_string())
}
