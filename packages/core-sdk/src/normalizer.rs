//! 服务商原始输出 → 规范文档。
//!
//! 两段式：先严格按 JSON 对象解析，失败则退回逐行启发式提取；字段缺失时使用固定默认值。
//! 归一化本身永不失败。

use serde_json::{Map, Value};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    error::ParseAnomaly,
    models::{CanonicalDocument, GenerationRequest},
};

/** \brief 启发式提取中 meta 描述候选行的最小长度（不含） */
const META_MIN_CHARS: usize = 50;
/** \brief 启发式 meta 描述截取的字符数 */
const META_TAKE_CHARS: usize = 150;

pub fn default_title(keyword: &str) -> String {
    format!("Complete Guide to {}", keyword)
}

pub fn default_meta_description(keyword: &str) -> String {
    format!(
        "Learn everything about {}. Complete guide with expert insights and practical tips.",
        keyword
    )
}

/**
 * \brief 将原始文本归一化为规范文档。
 */
pub fn normalize(raw: &str, request: &GenerationRequest) -> CanonicalDocument {
    let fields = match parse_structured(raw) {
        Ok(object) => from_structured(&object, raw, request),
        Err(anomaly) => {
            tracing::debug!(keyword = %request.keyword, %anomaly, "structured parse skipped, using line heuristics");
            from_lines(raw, &request.keyword)
        }
    };

    CanonicalDocument {
        id: Uuid::new_v4().to_string(),
        keyword: request.keyword.clone(),
        title: fields.title,
        meta_description: fields.meta_description,
        body: fields.body,
        h1: fields.h1,
        h2_list: fields.h2_list,
        h3_list: fields.h3_list,
        faq_section: fields.faq_section,
        schema_markup: fields.schema_markup,
        word_count: count_words(raw),
        provider: request.provider,
        model: request.model.clone(),
        created_at: OffsetDateTime::now_utc(),
    }
}

/**
 * \brief 第一段：严格解析。仅当去除首尾空白后以 `{` 开头且整体是合法 JSON 对象时成功。
 */
pub fn parse_structured(raw: &str) -> Result<Map<String, Value>, ParseAnomaly> {
    let trimmed = raw.trim();
    if !trimmed.starts_with('{') {
        return Err(ParseAnomaly::NotAnObject);
    }
    match serde_json::from_str::<Value>(trimmed) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(ParseAnomaly::NotAnObject),
        Err(e) => Err(ParseAnomaly::InvalidJson(e.to_string())),
    }
}

/**
 * \brief 全文按空白分词的数量。
 */
pub fn count_words(raw: &str) -> u32 {
    u32::try_from(raw.split_whitespace().count()).unwrap_or(u32::MAX)
}

struct Extracted {
    title: String,
    meta_description: String,
    body: String,
    h1: String,
    h2_list: Vec<String>,
    h3_list: Vec<String>,
    faq_section: Option<String>,
    schema_markup: Option<String>,
}

fn from_structured(object: &Map<String, Value>, raw: &str, request: &GenerationRequest) -> Extracted {
    let keyword = &request.keyword;
    Extracted {
        title: string_field(object, "seo_title").unwrap_or_else(|| default_title(keyword)),
        meta_description: string_field(object, "meta_description")
            .unwrap_or_else(|| default_meta_description(keyword)),
        body: string_field(object, "content").unwrap_or_else(|| raw.to_string()),
        h1: string_field(object, "h1_tag").unwrap_or_else(|| default_title(keyword)),
        h2_list: string_list(object, "h2_tags"),
        h3_list: string_list(object, "h3_tags"),
        faq_section: request
            .include_faq
            .then(|| string_field(object, "faq_section"))
            .flatten(),
        schema_markup: request
            .include_schema
            .then(|| string_field(object, "schema_markup"))
            .flatten(),
    }
}

fn string_field(object: &Map<String, Value>, key: &str) -> Option<String> {
    object.get(key)?.as_str().map(str::to_string)
}

fn string_list(object: &Map<String, Value>, key: &str) -> Vec<String> {
    object
        .get(key)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

/**
 * \brief 第二段：逐行启发式提取。`# ` 行设置标题（后出现者覆盖），`## `/`### ` 行收集为小标题。
 */
fn from_lines(raw: &str, keyword: &str) -> Extracted {
    let mut title = default_title(keyword);
    let mut h2_list = Vec::new();
    let mut h3_list = Vec::new();

    for line in raw.split('\n').map(str::trim) {
        if let Some(rest) = line.strip_prefix("# ") {
            title = rest.trim().to_string();
        } else if let Some(rest) = line.strip_prefix("## ") {
            h2_list.push(rest.trim().to_string());
        } else if let Some(rest) = line.strip_prefix("### ") {
            h3_list.push(rest.trim().to_string());
        }
    }

    let meta_description = raw
        .split('\n')
        .map(str::trim)
        .find(|line| {
            !line.is_empty() && !line.starts_with('#') && line.chars().count() > META_MIN_CHARS
        })
        .map(|line| format!("{}...", line.chars().take(META_TAKE_CHARS).collect::<String>()))
        .unwrap_or_else(|| default_meta_description(keyword));

    Extracted {
        h1: title.clone(),
        title,
        meta_description,
        body: raw.to_string(),
        h2_list,
        h3_list,
        faq_section: None,
        schema_markup: None,
    }
}
