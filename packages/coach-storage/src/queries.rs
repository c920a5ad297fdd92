use std::collections::HashSet;

use uuid::Uuid;

use crate::{
	Result,
	db::Db,
	models::{CompletionRecord, ExerciseRow},
};

pub async fn fetch_exercise_by_external_id(
	db: &Db,
	external_id: &str,
) -> Result<Option<ExerciseRow>> {
	let row = sqlx::query_as::<_, ExerciseRow>(
		"\
SELECT id, external_id, title, description, body_parts, dif_level, common_mistakes, position,
	steps, tips, created_at, updated_at
FROM exercises
WHERE external_id = $1",
	)
	.bind(external_id)
	.fetch_optional(&db.pool)
	.await?;

	Ok(row)
}

/// Returns the subset of `external_ids` that exist in the relational store.
pub async fn existing_external_ids(db: &Db, external_ids: &[String]) -> Result<HashSet<String>> {
	if external_ids.is_empty() {
		return Ok(HashSet::new());
	}

	let rows: Vec<String> =
		sqlx::query_scalar("SELECT external_id FROM exercises WHERE external_id = ANY($1)")
			.bind(external_ids)
			.fetch_all(&db.pool)
			.await?;

	Ok(rows.into_iter().collect())
}

/// Exercises of a completed workout, in the order the user performed them.
/// Repeats are preserved so multi-set sessions keep their full shape.
pub async fn fetch_session_exercises(db: &Db, past_session_id: Uuid) -> Result<Vec<ExerciseRow>> {
	let rows = sqlx::query_as::<_, ExerciseRow>(
		"\
SELECT e.id, e.external_id, e.title, e.description, e.body_parts, e.dif_level,
	e.common_mistakes, e.position, e.steps, e.tips, e.created_at, e.updated_at
FROM session_exercises se
INNER JOIN exercises e
	ON e.external_id = se.exercise_id
WHERE se.past_session_id = $1
ORDER BY se.order_index",
	)
	.bind(past_session_id)
	.fetch_all(&db.pool)
	.await?;

	Ok(rows)
}

pub async fn insert_completion(db: &Db, record: &CompletionRecord) -> Result<Uuid> {
	let mut tx = db.pool.begin().await?;
	let past_session_id: Uuid = sqlx::query_scalar(
		"\
INSERT INTO past_sessions (session_id, user_id, volume, quality_score, notes)
VALUES ($1, $2, $3, $4, $5)
RETURNING id",
	)
	.bind(&record.session_id)
	.bind(&record.user_id)
	.bind(record.volume)
	.bind(record.quality_score)
	.bind(&record.notes)
	.fetch_one(&mut *tx)
	.await?;

	for (index, exercise_id) in record.exercise_ids.iter().enumerate() {
		sqlx::query(
			"INSERT INTO session_exercises (past_session_id, exercise_id, order_index) VALUES ($1, $2, $3)",
		)
		.bind(past_session_id)
		.bind(exercise_id)
		.bind(index as i32)
		.execute(&mut *tx)
		.await?;
	}
	for error in &record.form_errors {
		sqlx::query("INSERT INTO session_form_errors (past_session_id, error) VALUES ($1, $2)")
			.bind(past_session_id)
			.bind(error)
			.execute(&mut *tx)
			.await?;
	}

	tx.commit().await?;

	Ok(past_session_id)
}
