pub mod prompts;
pub mod recommend;
pub mod workflow;

mod error;

pub use error::{Error, Result};
pub use recommend::ExerciseRetriever;
pub use workflow::TurnResponse;

use std::{collections::HashSet, future::Future, pin::Pin, sync::Arc};

use coach_config::Config;
use coach_domain::{CandidateItem, ChatMessage, SessionState};
use coach_storage::{models::CompletionRecord, queries, session::RedisSessionStore};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub trait ChatProvider
where
	Self: Send + Sync,
{
	fn generate<'a>(
		&'a self,
		system_instruction: &'a str,
		history: &'a [ChatMessage],
		message: &'a str,
	) -> BoxFuture<'a, Result<String>>;
}

pub trait SessionStore
where
	Self: Send + Sync,
{
	fn get<'a>(&'a self, session_id: &'a str) -> BoxFuture<'a, Result<Option<SessionState>>>;
	fn set<'a>(&'a self, session_id: &'a str, state: &'a SessionState) -> BoxFuture<'a, Result<()>>;
	fn delete<'a>(&'a self, session_id: &'a str) -> BoxFuture<'a, Result<()>>;
}

pub trait Recommender
where
	Self: Send + Sync,
{
	fn search<'a>(
		&'a self,
		query: &'a str,
		exclude_body_parts: &'a [String],
		limit: u64,
	) -> BoxFuture<'a, Result<Vec<CandidateItem>>>;
	/// Confirms which of the returned ids still exist in the relational store.
	/// The search index lags behind it, so hits there are not authoritative.
	fn verify_ids<'a>(&'a self, external_ids: &'a [String]) -> BoxFuture<'a, Result<HashSet<String>>>;
}

pub trait CompletionStore
where
	Self: Send + Sync,
{
	fn record<'a>(&'a self, record: &'a CompletionRecord) -> BoxFuture<'a, Result<()>>;
}

#[derive(Clone)]
pub struct Collaborators {
	pub chat: Arc<dyn ChatProvider>,
	pub sessions: Arc<dyn SessionStore>,
	pub recommender: Arc<dyn Recommender>,
	pub completions: Arc<dyn CompletionStore>,
}

pub struct Engine {
	pub cfg: Config,
	pub collaborators: Collaborators,
}

pub struct DefaultChat {
	pub cfg: coach_config::ChatProviderConfig,
}
impl ChatProvider for DefaultChat {
	fn generate<'a>(
		&'a self,
		system_instruction: &'a str,
		history: &'a [ChatMessage],
		message: &'a str,
	) -> BoxFuture<'a, Result<String>> {
		Box::pin(async move {
			Ok(coach_providers::chat::generate(&self.cfg, system_instruction, history, message)
				.await?)
		})
	}
}

impl SessionStore for RedisSessionStore {
	fn get<'a>(&'a self, session_id: &'a str) -> BoxFuture<'a, Result<Option<SessionState>>> {
		Box::pin(async move { Ok(RedisSessionStore::get(self, session_id).await?) })
	}

	fn set<'a>(&'a self, session_id: &'a str, state: &'a SessionState) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move { Ok(RedisSessionStore::set(self, session_id, state).await?) })
	}

	fn delete<'a>(&'a self, session_id: &'a str) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move { Ok(RedisSessionStore::delete(self, session_id).await?) })
	}
}

pub struct PgCompletions {
	pub db: Arc<coach_storage::db::Db>,
}
impl CompletionStore for PgCompletions {
	fn record<'a>(&'a self, record: &'a CompletionRecord) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			queries::insert_completion(&self.db, record).await?;

			Ok(())
		})
	}
}
