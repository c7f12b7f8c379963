use thiserror::Error;

use crate::models::Provider;

pub type Result<T> = std::result::Result<T, ServiceError>;

/**
 * \brief 失败发生的阶段。
 */
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderErrorKind {
    /** \brief 网络错误、超时或非成功状态 */
    Request,
    /** \brief 服务商已成功应答，但响应体无法取出文本 */
    Malformed,
}

/**
 * \brief 服务商调用失败：网络错误、非 2xx 状态或响应结构缺字段。
 */
#[derive(Error, Debug, Clone, PartialEq)]
#[error("Error generating content with {provider}: {cause}")]
pub struct ProviderError {
    pub provider: Provider,
    pub kind: ProviderErrorKind,
    pub cause: String,
}

impl ProviderError {
    pub fn new(provider: Provider, cause: impl Into<String>) -> Self {
        Self {
            provider,
            kind: ProviderErrorKind::Request,
            cause: cause.into(),
        }
    }

    /**
     * \brief 响应结构不完整。
     */
    pub fn malformed(provider: Provider, what: &str) -> Self {
        Self {
            kind: ProviderErrorKind::Malformed,
            ..Self::new(provider, format!("malformed response: missing {}", what))
        }
    }

    /**
     * \brief 成功状态下响应体无法解码。
     */
    pub fn undecodable(provider: Provider, err: impl std::fmt::Display) -> Self {
        Self {
            kind: ProviderErrorKind::Malformed,
            ..Self::new(provider, format!("malformed response: {}", err))
        }
    }

    /**
     * \brief 由 reqwest 错误转换，超时单独标注。
     */
    pub fn transport(provider: Provider, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::new(provider, format!("request timed out: {}", err))
        } else {
            Self::new(provider, err.to_string())
        }
    }
}

/**
 * \brief 对外暴露的错误分类。
 */
#[derive(Error, Debug)]
pub enum ServiceError {
    /** \brief 调用方输入错误，在任何外部调用之前检出 */
    #[error("{0}")]
    Validation(String),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("{0} not found")]
    NotFound(String),

    #[error("Storage error: {0}")]
    Storage(#[from] anyhow::Error),
}

/**
 * \brief 结构化解析失败的原因，仅在归一化内部使用，永不外抛。
 */
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseAnomaly {
    #[error("output does not start with an object")]
    NotAnObject,

    #[error("invalid JSON: {0}")]
    InvalidJson(String),
}
