use std::sync::Arc;

use uuid::Uuid;

use coach_config::EmbeddingProviderConfig;
use coach_storage::{db::Db, qdrant::QdrantStore};

use crate::{
	BoxFuture, Error, Result, RetryPolicy, exercise,
	listener::{ChangeHandler, ChangeNotification},
	workout,
};

pub const EXERCISE_CHANNEL: &str = "exercise_changes";
pub const WORKOUT_CHANNEL: &str = "workout_session_changes";

/// Routes change notifications to the matching indexer. Every indexing
/// operation runs under the configured retry policy.
pub struct SyncHandler {
	pub db: Arc<Db>,
	pub qdrant: Arc<QdrantStore>,
	pub embedding: EmbeddingProviderConfig,
	pub retry: RetryPolicy,
}

#[derive(Debug, serde::Deserialize)]
struct ExerciseChange {
	exercise_id: String,
	operation: String,
}

#[derive(Debug, serde::Deserialize)]
pub(crate) struct WorkoutChange {
	pub(crate) session_id: Uuid,
	pub(crate) user_id: String,
	pub(crate) source_session_id: String,
}

impl ChangeHandler for SyncHandler {
	fn handle<'a>(&'a self, notification: &'a ChangeNotification) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			match notification.channel.as_str() {
				EXERCISE_CHANNEL => {
					let change: ExerciseChange = decode(notification)?;

					tracing::info!(
						exercise_id = %change.exercise_id,
						operation = %change.operation,
						"Exercise change received."
					);

					match change.operation.as_str() {
						"DELETE" => exercise::remove(self, &change.exercise_id).await,
						// INSERT and UPDATE both resolve to a fresh index write.
						_ => exercise::index(self, &change.exercise_id).await,
					}
				},
				WORKOUT_CHANNEL => {
					let change: WorkoutChange = decode(notification)?;

					tracing::info!(
						session_id = %change.session_id,
						user_id = %change.user_id,
						"Workout completion received."
					);

					workout::index(self, &change).await
				},
				other => {
					tracing::warn!(channel = other, "Notification on unexpected channel.");

					Ok(())
				},
			}
		})
	}
}

fn decode<T: serde::de::DeserializeOwned>(notification: &ChangeNotification) -> Result<T> {
	serde_json::from_str(&notification.payload).map_err(|err| Error::MalformedNotification {
		channel: notification.channel.clone(),
		message: err.to_string(),
	})
}
