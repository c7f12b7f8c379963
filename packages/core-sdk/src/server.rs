use std::{path::PathBuf, sync::Arc};

use anyhow::Result;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use time::OffsetDateTime;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::{
    catalog,
    config::AppConfig,
    db,
    error::ServiceError,
    generator::Generator,
    models::{CanonicalDocument, GenerationRequest, UserSettings},
    probe::{self, ProbeOutcome},
    providers::AdapterSet,
    telemetry,
};

const DEFAULT_HISTORY_LIMIT: u32 = 10;

/**
 * \brief 路由共享状态：编排器实例与数据库路径。
 */
#[derive(Clone)]
pub struct AppState {
    generator: Arc<Generator>,
    db_path: Arc<PathBuf>,
}

impl AppState {
    /**
     * \brief 按配置构造标准适配器集合与编排器，并完成数据库迁移。
     */
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let adapters = AdapterSet::standard(&config.endpoints, config.provider_timeout)?;
        Self::new(Generator::new(adapters), config.db_path.clone())
    }

    pub fn new(generator: Generator, db_path: PathBuf) -> Result<Self> {
        let conn = db::open_db(&db_path)?;
        db::migrate(&conn)?;
        Ok(Self {
            generator: Arc::new(generator),
            db_path: Arc::new(db_path),
        })
    }

    fn open_db(&self) -> Result<rusqlite::Connection> {
        db::open_db(self.db_path.as_path())
    }
}

/**
 * \brief 构造全部 API 路由。
 */
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api", get(root))
        .route("/api/", get(root))
        .route("/api/models", get(list_models))
        .route("/api/test-api-key", post(test_api_key))
        .route("/api/generate-content", post(generate_content))
        .route("/api/content", get(list_content))
        .route("/api/content/{id}", get(get_content))
        .route("/api/settings", post(save_settings))
        .route("/api/settings/{user_id}", get(get_settings))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/**
 * \brief 启动 HTTP 服务。
 */
pub async fn run(config: &AppConfig) -> Result<()> {
    let state = AppState::from_config(config)?;
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&config.addr).await?;
    tracing::info!(addr = %config.addr, db = %config.db_path.display(), "server listening");
    axum::serve(listener, app).await?;
    Ok(())
}

/**
 * \brief 存活检查与版本号。
 */
async fn root() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "message": "AI SEO Writer API",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn list_models() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "models": catalog::to_json() }))
}

#[derive(Deserialize, Debug)]
struct KeyProbeQuery {
    provider: String,
    api_key: String,
    model: String,
}

/**
 * \brief 凭据探测：始终返回 200 与 `{valid, ...}`。
 */
async fn test_api_key(
    State(state): State<AppState>,
    Query(q): Query<KeyProbeQuery>,
) -> Json<ProbeOutcome> {
    Json(probe::probe(state.generator.adapters(), &q.provider, &q.model, &q.api_key).await)
}

/**
 * \brief 生成内容并在成功后持久化。
 */
async fn generate_content(
    State(state): State<AppState>,
    Json(request): Json<GenerationRequest>,
) -> Result<Json<CanonicalDocument>, (StatusCode, String)> {
    let doc = state
        .generator
        .generate(&request)
        .await
        .map_err(service_err)?;
    let conn = state.open_db().map_err(internal_err)?;
    db::insert_content(&conn, &doc).map_err(internal_err)?;
    Ok(Json(doc))
}

#[derive(Deserialize, Debug)]
struct HistoryQuery {
    limit: Option<u32>,
}

/**
 * \brief 最近生成的内容，按创建时间倒序。
 */
async fn list_content(
    State(state): State<AppState>,
    Query(q): Query<HistoryQuery>,
) -> Result<Json<Vec<CanonicalDocument>>, (StatusCode, String)> {
    let conn = state.open_db().map_err(internal_err)?;
    let docs = db::list_recent_content(&conn, q.limit.unwrap_or(DEFAULT_HISTORY_LIMIT))
        .map_err(internal_err)?;
    Ok(Json(docs))
}

async fn get_content(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<CanonicalDocument>, (StatusCode, String)> {
    let conn = state.open_db().map_err(internal_err)?;
    match db::get_content(&conn, &id).map_err(internal_err)? {
        Some(doc) => Ok(Json(doc)),
        None => Err(service_err(ServiceError::NotFound("Content".to_string()))),
    }
}

/**
 * \brief 保存用户设置（按 user_id 替换）。
 */
async fn save_settings(
    State(state): State<AppState>,
    Json(mut settings): Json<UserSettings>,
) -> Result<Json<UserSettings>, (StatusCode, String)> {
    settings.updated_at = OffsetDateTime::now_utc();
    let conn = state.open_db().map_err(internal_err)?;
    db::upsert_settings(&conn, &settings).map_err(internal_err)?;
    telemetry::log_event("server.settings", &format!("saved user_id={}", settings.user_id));
    Ok(Json(settings))
}

/**
 * \brief 读取用户设置；未保存过的用户返回默认结构而非 404。
 */
async fn get_settings(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<UserSettings>, (StatusCode, String)> {
    let conn = state.open_db().map_err(internal_err)?;
    let settings = db::get_settings(&conn, &user_id)
        .map_err(internal_err)?
        .unwrap_or_else(|| UserSettings::default_for(&user_id));
    Ok(Json(settings))
}

fn service_err(e: ServiceError) -> (StatusCode, String) {
    let status = match &e {
        ServiceError::Validation(_) => StatusCode::BAD_REQUEST,
        ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
        ServiceError::Provider(_) | ServiceError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, e.to_string())
}

fn internal_err(e: anyhow::Error) -> (StatusCode, String) {
    let e = ServiceError::Storage(e);
    telemetry::log_error("server", &e.to_string());
    service_err(e)
}
