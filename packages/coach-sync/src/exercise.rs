//! Keeps the exercise search index aligned with the relational catalogue.

use qdrant_client::{Payload, qdrant::PointStruct};
use serde_json::json;

use coach_providers::embedding;
use coach_storage::{models::ExerciseRow, queries};

use crate::{Result, SyncHandler, retry::with_retry};

pub(crate) async fn index(handler: &SyncHandler, external_id: &str) -> Result<()> {
	with_retry(handler.retry, "exercise index", || index_once(handler, external_id)).await
}

pub(crate) async fn remove(handler: &SyncHandler, external_id: &str) -> Result<()> {
	with_retry(handler.retry, "exercise delete", || remove_once(handler, external_id)).await
}

async fn index_once(handler: &SyncHandler, external_id: &str) -> Result<()> {
	let Some(row) = queries::fetch_exercise_by_external_id(&handler.db, external_id).await? else {
		// The row can vanish between the notification and this read; the
		// DELETE notification that follows cleans up the index.
		tracing::warn!(external_id, "Exercise row is gone; skipping index.");

		return Ok(());
	};
	let vector = embedding::embed_one(&handler.embedding, &embedding_text(&row)).await?;
	let point = exercise_point(&row, vector)?;

	handler.qdrant.upsert(&handler.qdrant.exercises_collection, point).await?;
	tracing::info!(external_id, "Exercise indexed.");

	Ok(())
}

async fn remove_once(handler: &SyncHandler, external_id: &str) -> Result<()> {
	handler.qdrant.delete_by_external_id(&handler.qdrant.exercises_collection, external_id).await?;
	tracing::info!(external_id, "Exercise removed from the index.");

	Ok(())
}

/// The text handed to the embedding model. Empty fields are skipped so sparse
/// rows do not embed a wall of labels.
fn embedding_text(row: &ExerciseRow) -> String {
	let mut parts = Vec::new();

	if !row.title.is_empty() {
		parts.push(row.title.clone());
	}
	if !row.description.is_empty() {
		parts.push(row.description.clone());
	}
	if !row.body_parts.is_empty() {
		parts.push(format!("Targets: {}", row.body_parts.join(", ")));
	}

	parts.push(format!("Difficulty: {}", row.dif_level));
	parts.push(format!("Position: {}", row.position));

	if !row.steps.is_empty() {
		parts.push(format!("Steps: {}", row.steps.join(" ")));
	}
	if !row.tips.is_empty() {
		parts.push(format!("Tips: {}", row.tips.join(" ")));
	}
	if !row.common_mistakes.is_empty() {
		parts.push(format!("Common mistakes: {}", row.common_mistakes.join(" ")));
	}

	parts.join("\n")
}

fn exercise_point(row: &ExerciseRow, vector: Vec<f32>) -> Result<PointStruct> {
	let payload = Payload::try_from(json!({
		"external_id": row.external_id,
		"title": row.title,
		"description": row.description,
		"bodyParts": row.body_parts,
		"difLevel": row.dif_level,
		"commonMistakes": row.common_mistakes,
		"position": row.position,
		"steps": row.steps,
		"tips": row.tips,
	}))
	.map_err(coach_storage::Error::from)?;

	Ok(PointStruct::new(row.id.to_string(), vector, payload))
}

#[cfg(test)]
mod tests {
	use time::OffsetDateTime;
	use uuid::Uuid;

	use super::*;

	fn row() -> ExerciseRow {
		ExerciseRow {
			id: Uuid::new_v4(),
			external_id: "ex_1".to_string(),
			title: "Push-up".to_string(),
			description: "Classic pressing movement.".to_string(),
			body_parts: vec!["CHEST".to_string(), "TRICEPS".to_string()],
			dif_level: "MEDIUM".to_string(),
			common_mistakes: Vec::new(),
			position: "FLOOR".to_string(),
			steps: vec!["Set up".to_string(), "Lower".to_string()],
			tips: Vec::new(),
			created_at: OffsetDateTime::now_utc(),
			updated_at: OffsetDateTime::now_utc(),
		}
	}

	#[test]
	fn embedding_text_skips_empty_fields() {
		let text = embedding_text(&row());

		assert!(text.contains("Push-up"));
		assert!(text.contains("Targets: CHEST, TRICEPS"));
		assert!(text.contains("Steps: Set up Lower"));
		assert!(!text.contains("Tips:"));
		assert!(!text.contains("Common mistakes:"));
	}

	#[test]
	fn point_id_is_the_row_uuid() {
		use qdrant_client::qdrant::point_id::PointIdOptions;

		let row = row();
		let point = exercise_point(&row, vec![0.0; 4]).expect("point build failed");
		let Some(PointIdOptions::Uuid(id)) = point.id.and_then(|id| id.point_id_options) else {
			panic!("point id should be a uuid");
		};

		assert_eq!(id, row.id.to_string());
	}
}
