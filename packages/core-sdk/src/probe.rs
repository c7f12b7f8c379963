use serde::Serialize;

use crate::{
    error::ProviderErrorKind,
    models::Provider,
    providers::{AdapterSet, Invocation},
    telemetry,
};

/** \brief 探测调用使用的固定提示词 */
const PROBE_PROMPT: &str = "Hello";
/** \brief 探测调用的 token 上限 */
const PROBE_MAX_TOKENS: u32 = 10;

/**
 * \brief 凭据探测结果。
 */
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProbeOutcome {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ProbeOutcome {
    fn accepted(provider: Provider, model: &str) -> Self {
        Self {
            valid: true,
            provider: Some(provider.to_string()),
            model: Some(model.to_string()),
            error: None,
        }
    }

    fn rejected(error: impl Into<String>) -> Self {
        Self {
            valid: false,
            provider: None,
            model: None,
            error: Some(error.into()),
        }
    }
}

/**
 * \brief 以最小代价的真实调用验证凭据，永不返回错误：任何失败都折叠为 `valid=false`。
 * \param provider 服务商名称（未识别时直接判定无效）
 */
pub async fn probe(adapters: &AdapterSet, provider: &str, model: &str, credential: &str) -> ProbeOutcome {
    let provider = match provider.parse::<Provider>() {
        Ok(p) => p,
        Err(_) => return ProbeOutcome::rejected("Unsupported provider"),
    };
    let Some(adapter) = adapters.get(provider) else {
        return ProbeOutcome::rejected("Unsupported provider");
    };

    let call = Invocation {
        provider,
        model: model.to_string(),
        system: None,
        user: PROBE_PROMPT.to_string(),
        credential: credential.to_string(),
        max_output_tokens: PROBE_MAX_TOKENS,
        session_id: None,
    };

    match adapter.invoke(&call).await {
        Ok(_) => {
            telemetry::log_event("probe", &format!("key accepted provider={} model={}", provider, model));
            ProbeOutcome::accepted(provider, model)
        }
        // 服务商已成功应答，凭据有效；文本为空（如低 token 上限被截断）不影响结论
        Err(err) if err.kind == ProviderErrorKind::Malformed => {
            telemetry::log_event(
                "probe",
                &format!("key accepted provider={} model={} ({})", provider, model, err.cause),
            );
            ProbeOutcome::accepted(provider, model)
        }
        Err(err) => {
            telemetry::log_event("probe", &format!("key rejected provider={} model={}", provider, model));
            ProbeOutcome::rejected(err.cause)
        }
    }
}
