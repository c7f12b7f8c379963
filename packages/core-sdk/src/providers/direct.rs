use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use serde::{Deserialize, Serialize};

use super::{Invocation, ProviderAdapter};
use crate::{error::ProviderError, models::Provider};

/**
 * \brief 直连风格：针对单一服务商原生接口的类型化请求/响应调用（Groq）。
 */
pub struct DirectChatAdapter {
    client: reqwest::Client,
    base: String,
}

impl DirectChatAdapter {
    pub fn new(client: reqwest::Client, base: impl Into<String>) -> Self {
        Self {
            client,
            base: base.into(),
        }
    }
}

#[async_trait]
impl ProviderAdapter for DirectChatAdapter {
    fn style(&self) -> &'static str {
        "direct"
    }

    async fn invoke(&self, call: &Invocation) -> Result<String, ProviderError> {
        let groq = GroqClient {
            http: &self.client,
            base: &self.base,
            api_key: &call.credential,
        };

        let mut messages = Vec::with_capacity(2);
        if let Some(sys) = &call.system {
            messages.push(ChatMessage {
                role: "system",
                content: sys,
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: &call.user,
        });

        let response = groq
            .create_chat_completion(&ChatCompletionRequest {
                messages,
                model: &call.model,
                max_tokens: call.max_output_tokens,
                temperature: 0.7,
            })
            .await?;

        response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| ProviderError::malformed(Provider::Groq, "choices[0].message.content"))
    }
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    messages: Vec<ChatMessage<'a>>,
    model: &'a str,
    max_tokens: u32,
    temperature: f64,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

/**
 * \brief Groq 原生客户端（按请求绑定凭据）。
 */
struct GroqClient<'a> {
    http: &'a reqwest::Client,
    base: &'a str,
    api_key: &'a str,
}

impl GroqClient<'_> {
    async fn create_chat_completion(
        &self,
        request: &ChatCompletionRequest<'_>,
    ) -> Result<ChatCompletionResponse, ProviderError> {
        let url = format!("{}/v1/chat/completions", self.base.trim_end_matches('/'));
        let resp = self
            .http
            .post(url)
            .header(AUTHORIZATION, format!("Bearer {}", self.api_key))
            .json(request)
            .send()
            .await
            .map_err(|e| ProviderError::transport(Provider::Groq, e))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(ProviderError::new(
                Provider::Groq,
                format!("request failed: {} -> {}", status, text),
            ));
        }
        resp.json::<ChatCompletionResponse>()
            .await
            .map_err(|e| ProviderError::undecodable(Provider::Groq, e))
    }
}
