use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct Config {
	pub service: Service,
	pub storage: Storage,
	pub providers: Providers,
	pub workflow: Workflow,
	pub sync: SyncConfig,
}

#[derive(Debug, Deserialize)]
pub struct Service {
	pub log_level: String,
}

#[derive(Debug, Deserialize)]
pub struct Storage {
	pub postgres: Postgres,
	pub qdrant: Qdrant,
	pub redis: Redis,
}

#[derive(Debug, Deserialize)]
pub struct Postgres {
	pub dsn: String,
	pub pool_max_conns: u32,
}

#[derive(Debug, Deserialize)]
pub struct Qdrant {
	pub url: String,
	pub exercises_collection: String,
	pub sessions_collection: String,
	pub vector_dim: u32,
}

#[derive(Debug, Deserialize)]
pub struct Redis {
	pub url: String,
	#[serde(default = "default_session_ttl_secs")]
	pub session_ttl_secs: u64,
}

#[derive(Debug, Deserialize)]
pub struct Providers {
	pub chat: ChatProviderConfig,
	pub embedding: EmbeddingProviderConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatProviderConfig {
	pub api_base: String,
	pub api_key: String,
	pub model: String,
	pub temperature: f32,
	pub timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmbeddingProviderConfig {
	pub api_base: String,
	pub api_key: String,
	pub model: String,
	pub dimensions: u32,
	pub timeout_ms: u64,
}

#[derive(Debug, Deserialize)]
pub struct Workflow {
	#[serde(default = "default_candidate_limit")]
	pub candidate_limit: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
	pub max_attempts: u32,
	pub retry_base_ms: u64,
	pub reconnect_max_attempts: u32,
	pub reconnect_base_ms: u64,
}

fn default_session_ttl_secs() -> u64 {
	86_400
}

fn default_candidate_limit() -> u64 {
	50
}
