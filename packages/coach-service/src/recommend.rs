//! Vector-search-backed exercise retrieval.

use std::{collections::HashSet, sync::Arc};

use serde_json::Value;

use coach_config::EmbeddingProviderConfig;
use coach_domain::{CandidateItem, Difficulty, Position};
use coach_storage::{db::Db, qdrant, qdrant::QdrantStore};

use crate::{BoxFuture, Recommender, Result};

pub struct ExerciseRetriever {
	pub qdrant: Arc<QdrantStore>,
	pub db: Arc<Db>,
	pub embedding: EmbeddingProviderConfig,
}
impl Recommender for ExerciseRetriever {
	fn search<'a>(
		&'a self,
		query: &'a str,
		exclude_body_parts: &'a [String],
		limit: u64,
	) -> BoxFuture<'a, Result<Vec<CandidateItem>>> {
		Box::pin(async move {
			let vector = coach_providers::embedding::embed_one(&self.embedding, query).await?;
			let points = self
				.qdrant
				.search(&self.qdrant.exercises_collection, vector, limit, exclude_body_parts)
				.await?;
			let items = points
				.into_iter()
				.filter_map(|point| candidate_from_payload(qdrant::payload_to_json(point.payload)))
				.collect();

			Ok(items)
		})
	}

	fn verify_ids<'a>(
		&'a self,
		external_ids: &'a [String],
	) -> BoxFuture<'a, Result<HashSet<String>>> {
		Box::pin(async move {
			Ok(coach_storage::queries::existing_external_ids(&self.db, external_ids).await?)
		})
	}
}

/// Index payloads are written by the sync pipeline but treated as untrusted
/// on the way back out; anything missing falls back to a safe default rather
/// than dropping the whole point.
pub fn candidate_from_payload(payload: Value) -> Option<CandidateItem> {
	let external_id = text(&payload, "external_id");
	let title = text(&payload, "title");

	// Points with neither an id nor a title carry nothing worth showing. A
	// titled point without an id stays displayable but can never validate.
	if external_id.is_none() && title.is_none() {
		return None;
	}

	Some(CandidateItem {
		external_id,
		title: title.unwrap_or_else(|| "Unnamed exercise".to_string()),
		description: text(&payload, "description").unwrap_or_default(),
		body_parts: text_list(&payload, "bodyParts"),
		difficulty: text(&payload, "difLevel")
			.map(|raw| Difficulty::from_tag(&raw))
			.unwrap_or_default(),
		position: text(&payload, "position").map(|raw| Position::from_tag(&raw)).unwrap_or_default(),
		steps: text_list(&payload, "steps"),
		tips: text_list(&payload, "tips").join("; "),
		common_mistakes: text_list(&payload, "commonMistakes").join("; "),
		reps: None,
		duration_secs: None,
		include_rest: false,
		rest_secs: None,
	})
}

fn text(payload: &Value, key: &str) -> Option<String> {
	let raw = payload.get(key)?.as_str()?.trim();

	if raw.is_empty() { None } else { Some(raw.to_string()) }
}

fn text_list(payload: &Value, key: &str) -> Vec<String> {
	payload
		.get(key)
		.and_then(|v| v.as_array())
		.map(|items| {
			items
				.iter()
				.filter_map(|item| item.as_str())
				.map(|item| item.trim().to_string())
				.filter(|item| !item.is_empty())
				.collect()
		})
		.unwrap_or_default()
}
