use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

/**
 * \brief 受支持的文本生成服务商。
 * \details 序列化名称与 HTTP 接口保持一致（全小写）。
 */
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    #[serde(rename = "openai")]
    OpenAI,
    Anthropic,
    Gemini,
    Groq,
    Grok,
}

impl Provider {
    /** \brief 全部服务商，顺序即目录展示顺序。 */
    pub const ALL: [Provider; 5] = [
        Provider::OpenAI,
        Provider::Anthropic,
        Provider::Gemini,
        Provider::Groq,
        Provider::Grok,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::OpenAI => "openai",
            Provider::Anthropic => "anthropic",
            Provider::Gemini => "gemini",
            Provider::Groq => "groq",
            Provider::Grok => "grok",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Provider::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| format!("Unsupported provider: {}", s))
    }
}

fn default_tone() -> String {
    "informative".to_string()
}

fn default_word_count() -> u32 {
    1000
}

fn default_true() -> bool {
    true
}

/**
 * \brief 内容生成请求，由调用方构造，核心流程只读使用。
 */
#[derive(Clone, Serialize, Deserialize)]
pub struct GenerationRequest {
    /** \brief 目标关键词（非空） */
    pub keyword: String,
    pub provider: Provider,
    pub model: String,
    /** \brief 写作语气，原样写入提示词 */
    #[serde(default = "default_tone")]
    pub tone: String,
    /** \brief 目标字数 */
    #[serde(default = "default_word_count")]
    pub word_count: u32,
    /** \brief 服务商凭据 */
    pub api_key: String,
    #[serde(default = "default_true")]
    pub include_faq: bool,
    #[serde(default = "default_true")]
    pub include_schema: bool,
}

impl GenerationRequest {
    /**
     * \brief 以默认语气、字数与开关构造请求。
     */
    pub fn new(
        keyword: impl Into<String>,
        provider: Provider,
        model: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        Self {
            keyword: keyword.into(),
            provider,
            model: model.into(),
            tone: default_tone(),
            word_count: default_word_count(),
            api_key: api_key.into(),
            include_faq: true,
            include_schema: true,
        }
    }
}

// 凭据不进日志。
impl fmt::Debug for GenerationRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GenerationRequest")
            .field("keyword", &self.keyword)
            .field("provider", &self.provider)
            .field("model", &self.model)
            .field("tone", &self.tone)
            .field("word_count", &self.word_count)
            .field("api_key", &"***")
            .field("include_faq", &self.include_faq)
            .field("include_schema", &self.include_schema)
            .finish()
    }
}

/**
 * \brief 归一化后的内容文档，每次成功生成恰好创建一次，之后不再修改。
 */
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalDocument {
    pub id: String,
    pub keyword: String,
    pub title: String,
    pub meta_description: String,
    /** \brief 正文 */
    #[serde(rename = "content")]
    pub body: String,
    #[serde(rename = "h1_tag")]
    pub h1: String,
    #[serde(rename = "h2_tags")]
    pub h2_list: Vec<String>,
    #[serde(rename = "h3_tags")]
    pub h3_list: Vec<String>,
    pub faq_section: Option<String>,
    pub schema_markup: Option<String>,
    /** \brief 原始输出的空白分词数 */
    pub word_count: u32,
    pub provider: Provider,
    pub model: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/**
 * \brief 各服务商凭据，均可缺省。
 */
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApiKeys {
    #[serde(default)]
    pub openai_key: Option<String>,
    #[serde(default)]
    pub anthropic_key: Option<String>,
    #[serde(default)]
    pub gemini_key: Option<String>,
    #[serde(default)]
    pub groq_key: Option<String>,
    #[serde(default)]
    pub grok_key: Option<String>,
}

impl ApiKeys {
    /**
     * \brief 读取指定服务商的凭据。
     */
    pub fn for_provider(&self, provider: Provider) -> Option<&str> {
        match provider {
            Provider::OpenAI => self.openai_key.as_deref(),
            Provider::Anthropic => self.anthropic_key.as_deref(),
            Provider::Gemini => self.gemini_key.as_deref(),
            Provider::Groq => self.groq_key.as_deref(),
            Provider::Grok => self.grok_key.as_deref(),
        }
    }
}

fn new_id() -> String {
    Uuid::new_v4().to_string()
}

fn now_utc() -> OffsetDateTime {
    OffsetDateTime::now_utc()
}

/**
 * \brief 用户设置，按 user_id 整体替换保存。
 */
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserSettings {
    #[serde(default = "new_id")]
    pub id: String,
    pub user_id: String,
    #[serde(default)]
    pub api_keys: ApiKeys,
    #[serde(default)]
    pub preferred_provider: Option<Provider>,
    #[serde(default)]
    pub preferred_model: Option<String>,
    #[serde(default = "now_utc", with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(default = "now_utc", with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl UserSettings {
    /**
     * \brief 未保存过设置的用户所对应的默认结构（凭据全空）。
     */
    pub fn default_for(user_id: &str) -> Self {
        let now = now_utc();
        Self {
            id: new_id(),
            user_id: user_id.to_string(),
            api_keys: ApiKeys::default(),
            preferred_provider: None,
            preferred_model: None,
            created_at: now,
            updated_at: now,
        }
    }
}
