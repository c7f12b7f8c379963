pub mod catalog;
pub mod config;
pub mod db;
pub mod error;
pub mod generator;
pub mod models;
pub mod normalizer;
pub mod probe;
pub mod prompt;
pub mod providers;
pub mod server;
pub mod telemetry;

/**
 * \brief SDK 预导入集合，方便外部引用常用模块。
 */
pub mod prelude {
    pub use crate::catalog;
    pub use crate::config::AppConfig;
    pub use crate::db;
    pub use crate::error::{ProviderError, ServiceError};
    pub use crate::generator::Generator;
    pub use crate::models::{CanonicalDocument, GenerationRequest, Provider, UserSettings};
    pub use crate::probe;
    pub use crate::providers::{AdapterSet, ProviderEndpoints};
    pub use crate::server;
    pub use crate::telemetry;
}
