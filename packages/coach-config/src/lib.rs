mod error;
mod types;

pub use error::{Error, Result};
pub use types::{
	ChatProviderConfig, Config, EmbeddingProviderConfig, Postgres, Providers, Qdrant, Redis,
	Service, Storage, SyncConfig, Workflow,
};

use std::{fs, path::Path};

pub fn load(path: &Path) -> Result<Config> {
	let raw = fs::read_to_string(path)
		.map_err(|err| Error::ReadConfig { path: path.to_path_buf(), source: err })?;
	let cfg: Config = toml::from_str(&raw)
		.map_err(|err| Error::ParseConfig { path: path.to_path_buf(), source: err })?;

	validate(&cfg)?;

	Ok(cfg)
}

pub fn validate(cfg: &Config) -> Result<()> {
	if cfg.service.log_level.trim().is_empty() {
		return Err(Error::Validation {
			message: "service.log_level must be non-empty.".to_string(),
		});
	}
	if cfg.storage.postgres.dsn.trim().is_empty() {
		return Err(Error::Validation {
			message: "storage.postgres.dsn must be non-empty.".to_string(),
		});
	}
	if cfg.storage.postgres.pool_max_conns == 0 {
		return Err(Error::Validation {
			message: "storage.postgres.pool_max_conns must be greater than zero.".to_string(),
		});
	}
	if cfg.storage.qdrant.url.trim().is_empty() {
		return Err(Error::Validation {
			message: "storage.qdrant.url must be non-empty.".to_string(),
		});
	}

	for (label, collection) in [
		("storage.qdrant.exercises_collection", &cfg.storage.qdrant.exercises_collection),
		("storage.qdrant.sessions_collection", &cfg.storage.qdrant.sessions_collection),
	] {
		if collection.trim().is_empty() {
			return Err(Error::Validation { message: format!("{label} must be non-empty.") });
		}
	}

	if cfg.storage.qdrant.vector_dim == 0 {
		return Err(Error::Validation {
			message: "storage.qdrant.vector_dim must be greater than zero.".to_string(),
		});
	}
	if cfg.storage.redis.url.trim().is_empty() {
		return Err(Error::Validation {
			message: "storage.redis.url must be non-empty.".to_string(),
		});
	}
	if cfg.storage.redis.session_ttl_secs == 0 {
		return Err(Error::Validation {
			message: "storage.redis.session_ttl_secs must be greater than zero.".to_string(),
		});
	}
	if cfg.providers.embedding.dimensions == 0 {
		return Err(Error::Validation {
			message: "providers.embedding.dimensions must be greater than zero.".to_string(),
		});
	}
	if cfg.providers.embedding.dimensions != cfg.storage.qdrant.vector_dim {
		return Err(Error::Validation {
			message: "providers.embedding.dimensions must match storage.qdrant.vector_dim."
				.to_string(),
		});
	}
	if !cfg.providers.chat.temperature.is_finite() || cfg.providers.chat.temperature < 0.0 {
		return Err(Error::Validation {
			message: "providers.chat.temperature must be a finite number of zero or greater."
				.to_string(),
		});
	}

	for (label, key) in [
		("chat", &cfg.providers.chat.api_key),
		("embedding", &cfg.providers.embedding.api_key),
	] {
		if key.trim().is_empty() {
			return Err(Error::Validation {
				message: format!("Provider {label} api_key must be non-empty."),
			});
		}
	}
	for (label, timeout) in [
		("providers.chat.timeout_ms", cfg.providers.chat.timeout_ms),
		("providers.embedding.timeout_ms", cfg.providers.embedding.timeout_ms),
	] {
		if timeout == 0 {
			return Err(Error::Validation {
				message: format!("{label} must be greater than zero."),
			});
		}
	}

	if cfg.workflow.candidate_limit == 0 {
		return Err(Error::Validation {
			message: "workflow.candidate_limit must be greater than zero.".to_string(),
		});
	}
	if cfg.sync.max_attempts == 0 {
		return Err(Error::Validation {
			message: "sync.max_attempts must be greater than zero.".to_string(),
		});
	}
	if cfg.sync.reconnect_max_attempts == 0 {
		return Err(Error::Validation {
			message: "sync.reconnect_max_attempts must be greater than zero.".to_string(),
		});
	}

	Ok(())
}
