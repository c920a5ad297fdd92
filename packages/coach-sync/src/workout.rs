//! Indexes completed workouts so future recommendations can draw on history.

use qdrant_client::{Payload, qdrant::PointStruct};
use serde_json::json;

use coach_providers::embedding;
use coach_storage::{models::ExerciseRow, queries};

use crate::{Result, SyncHandler, handler::WorkoutChange, retry::with_retry};

pub(crate) async fn index(handler: &SyncHandler, change: &WorkoutChange) -> Result<()> {
	with_retry(handler.retry, "workout index", || index_once(handler, change)).await
}

async fn index_once(handler: &SyncHandler, change: &WorkoutChange) -> Result<()> {
	let rows = queries::fetch_session_exercises(&handler.db, change.session_id).await?;
	let text = embedding_text(&rows);

	if text.is_empty() {
		tracing::warn!(session_id = %change.session_id, "Workout has no exercises; skipping index.");

		return Ok(());
	}

	let vector = embedding::embed_one(&handler.embedding, &text).await?;
	let payload = Payload::try_from(json!({
		"user_id": change.user_id,
		"session_id": change.source_session_id,
	}))
	.map_err(coach_storage::Error::from)?;
	let point = PointStruct::new(change.session_id.to_string(), vector, payload);

	handler.qdrant.upsert(&handler.qdrant.sessions_collection, point).await?;
	tracing::info!(session_id = %change.session_id, "Workout indexed.");

	Ok(())
}

/// One line per performed exercise, in execution order.
fn embedding_text(rows: &[ExerciseRow]) -> String {
	rows.iter()
		.map(|row| {
			if row.body_parts.is_empty() {
				row.title.clone()
			} else {
				format!("{} ({})", row.title, row.body_parts.join(", "))
			}
		})
		.collect::<Vec<_>>()
		.join("\n")
}
