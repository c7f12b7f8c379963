use async_trait::async_trait;
use reqwest::{
    header::{AUTHORIZATION, CONTENT_TYPE},
    StatusCode,
};
use serde_json::{json, Value};

use super::{openai_message_content, Invocation, ProviderAdapter};
use crate::{error::ProviderError, models::Provider};

/**
 * \brief 原始 HTTP 风格：固定端点 + Bearer 凭据 + JSON 请求体，用于没有原生客户端的服务商（Grok）。
 */
pub struct RawHttpAdapter {
    client: reqwest::Client,
    url: String,
}

impl RawHttpAdapter {
    pub fn new(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }
}

#[async_trait]
impl ProviderAdapter for RawHttpAdapter {
    fn style(&self) -> &'static str {
        "raw-http"
    }

    async fn invoke(&self, call: &Invocation) -> Result<String, ProviderError> {
        let provider = call.provider;
        let mut messages = Vec::new();
        if let Some(sys) = &call.system {
            messages.push(json!({"role": "system", "content": sys}));
        }
        messages.push(json!({"role": "user", "content": call.user}));

        let resp = self
            .client
            .post(&self.url)
            .header(AUTHORIZATION, format!("Bearer {}", call.credential))
            .header(CONTENT_TYPE, "application/json")
            .json(&json!({
                "messages": messages,
                "model": call.model,
                "max_tokens": call.max_output_tokens,
                "temperature": 0.7
            }))
            .send()
            .await
            .map_err(|e| ProviderError::transport(provider, e))?;

        // 端点只以 200 表示成功
        if resp.status() != StatusCode::OK {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(ProviderError::new(
                provider,
                format!("{} API error: {} -> {}", provider_label(provider), status, text),
            ));
        }

        let v: Value = resp
            .json()
            .await
            .map_err(|e| ProviderError::undecodable(provider, e))?;
        openai_message_content(&v)
            .ok_or_else(|| ProviderError::malformed(provider, "choices[0].message.content"))
    }
}

fn provider_label(provider: Provider) -> &'static str {
    match provider {
        Provider::Grok => "Grok",
        other => other.as_str(),
    }
}
