use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Clone, Debug, sqlx::FromRow)]
pub struct ExerciseRow {
	pub id: Uuid,
	pub external_id: String,
	pub title: String,
	pub description: String,
	pub body_parts: Vec<String>,
	pub dif_level: String,
	pub common_mistakes: Vec<String>,
	pub position: String,
	pub steps: Vec<String>,
	pub tips: Vec<String>,
	pub created_at: OffsetDateTime,
	pub updated_at: OffsetDateTime,
}

/// A finished workout as reported by the user, ready for the relational store.
/// Inserting one fires the session change trigger that feeds the search index.
#[derive(Clone, Debug)]
pub struct CompletionRecord {
	pub session_id: String,
	pub user_id: String,
	pub volume: f64,
	pub quality_score: f64,
	pub notes: Option<String>,
	pub exercise_ids: Vec<String>,
	pub form_errors: Vec<String>,
}
