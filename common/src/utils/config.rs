use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

#[derive(Clone, Deserialize, Debug)]
pub struct AppConfig {
    pub surrealdb_address: String,
    pub surrealdb_username: String,
    pub surrealdb_password: String,
    pub surrealdb_namespace: String,
    pub surrealdb_database: String,
    #[serde(default)]
    pub openai_api_key: String,
    #[serde(default = "default_base_url")]
    pub openai_base_url: String,
    #[serde(default = "default_llm_backend")]
    pub llm_backend: String,
    #[serde(default = "default_llm_model")]
    pub llm_model: String,
    #[serde(default = "default_embedding_backend")]
    pub embedding_backend: String,
    #[serde(default)]
    pub embedding_model: Option<String>,
    #[serde(default = "default_embedding_dimensions")]
    pub embedding_dimensions: u32,
    #[serde(default = "default_collection_name")]
    pub collection_name: String,
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    #[serde(default = "default_cache_dir")]
    pub cache_dir: String,
    #[serde(default = "default_cache_ttl_seconds")]
    pub cache_ttl_seconds: u64,
    #[serde(default = "default_cache_max_size")]
    pub cache_max_size: usize,
    #[serde(default = "default_true")]
    pub use_cache: bool,
    #[serde(default = "default_monitoring_dir")]
    pub monitoring_dir: String,
    #[serde(default = "default_true")]
    pub monitoring_enabled: bool,
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_llm_backend() -> String {
    "openai".to_string()
}

fn default_llm_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_embedding_backend() -> String {
    "fastembed".to_string()
}

fn default_embedding_dimensions() -> u32 {
    384
}

fn default_collection_name() -> String {
    "docs".to_string()
}

fn default_data_dir() -> String {
    "./data".to_string()
}

fn default_cache_dir() -> String {
    "./data/query-cache".to_string()
}

fn default_cache_ttl_seconds() -> u64 {
    3600
}

fn default_cache_max_size() -> usize {
    100
}

fn default_monitoring_dir() -> String {
    "./data/monitoring".to_string()
}

fn default_true() -> bool {
    true
}

pub fn get_config() -> Result<AppConfig, ConfigError> {
    let config = Config::builder()
        .add_source(File::with_name("config").required(false))
        .add_source(Environment::default())
        .build()?;

    config.try_deserialize()
}
