use serde_json::{Map, Value};

use crate::models::Provider;

const OPENAI_MODELS: &[&str] = &[
    "gpt-4o",
    "gpt-4o-mini",
    "gpt-4.1",
    "gpt-4.1-mini",
    "gpt-4.1-nano",
    "o1",
    "o1-mini",
    "o1-pro",
    "o3",
    "o3-mini",
    "o4-mini",
];

const ANTHROPIC_MODELS: &[&str] = &[
    "claude-sonnet-4-20250514",
    "claude-opus-4-20250514",
    "claude-3-7-sonnet-20250219",
    "claude-3-5-haiku-20241022",
    "claude-3-5-sonnet-20241022",
];

const GEMINI_MODELS: &[&str] = &[
    "gemini-2.5-flash-preview-04-17",
    "gemini-2.5-pro-preview-05-06",
    "gemini-2.0-flash",
    "gemini-2.0-flash-preview-image-generation",
    "gemini-2.0-flash-lite",
    "gemini-1.5-flash",
    "gemini-1.5-flash-8b",
    "gemini-1.5-pro",
];

const GROQ_MODELS: &[&str] = &[
    "llama-3.3-70b-versatile",
    "llama-3.1-70b-versatile",
    "llama-3.1-8b-instant",
    "mixtral-8x7b-32768",
    "gemma-7b-it",
];

const GROK_MODELS: &[&str] = &["grok-beta", "grok-vision-beta"];

/**
 * \brief 指定服务商的可用模型（有序）。
 */
pub fn models_for(provider: Provider) -> &'static [&'static str] {
    match provider {
        Provider::OpenAI => OPENAI_MODELS,
        Provider::Anthropic => ANTHROPIC_MODELS,
        Provider::Gemini => GEMINI_MODELS,
        Provider::Groq => GROQ_MODELS,
        Provider::Grok => GROK_MODELS,
    }
}

/**
 * \brief 判断 (provider, model) 是否登记在目录中。
 */
pub fn is_supported(provider: Provider, model: &str) -> bool {
    models_for(provider).contains(&model)
}

/**
 * \brief 目录的 JSON 形式：`{ "openai": [...], ... }`。
 */
pub fn to_json() -> Value {
    let mut map = Map::new();
    for provider in Provider::ALL {
        let models = models_for(provider)
            .iter()
            .map(|m| Value::String(m.to_string()))
            .collect();
        map.insert(provider.as_str().to_string(), Value::Array(models));
    }
    Value::Object(map)
}
