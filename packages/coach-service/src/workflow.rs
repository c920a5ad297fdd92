//! The conversational turn loop. Each turn loads the session, dispatches on
//! its step, and persists the updated state. Concurrent turns on the same
//! session are not serialized; the last write wins.

use std::collections::{HashMap, HashSet};

use serde_json::Value;

use coach_domain::{
	CandidateItem, ChatMessage, Profile, SessionState, WorkflowStep,
	block::{self, Decoded},
	intent::{self, Intent},
};
use coach_storage::models::CompletionRecord;

use crate::{Engine, Error, Result, prompts};

const RESULTS_REPROMPT: &str = "Please submit your workout results.";
const EMPTY_SEARCH_REPLY: &str = "I could not find exercises matching your profile right now. \
	Tell me if you would like to adjust your goals or try again.";
const SESSION_DONE_REPLY: &str =
	"This session is complete. Start a new session whenever you want to train again.";

#[derive(Clone, Debug, serde::Serialize)]
pub struct TurnResponse {
	pub reply: String,
	pub step: WorkflowStep,
	pub requires_confirmation: bool,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub profile: Option<Profile>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub exercises: Option<Vec<CandidateItem>>,
}

impl TurnResponse {
	fn plain(reply: impl Into<String>, step: WorkflowStep) -> Self {
		Self {
			reply: reply.into(),
			step,
			requires_confirmation: false,
			profile: None,
			exercises: None,
		}
	}
}

impl Engine {
	pub async fn handle_turn(
		&self,
		session_id: &str,
		user_id: &str,
		message: &str,
	) -> Result<TurnResponse> {
		let mut state = self
			.collaborators
			.sessions
			.get(session_id)
			.await?
			.unwrap_or_else(|| SessionState::new(user_id));
		let response = match state.step {
			WorkflowStep::Intake => self.intake_turn(&mut state, message).await?,
			WorkflowStep::IntakeConfirm => self.intake_confirm_turn(&mut state, message).await?,
			WorkflowStep::Recommend => self.run_recommendation(&mut state).await?,
			WorkflowStep::RecommendConfirm =>
				self.recommend_confirm_turn(&mut state, message).await?,
			WorkflowStep::Summary => self.summary_turn(&mut state, session_id, message).await?,
			WorkflowStep::Completed => TurnResponse::plain(SESSION_DONE_REPLY, WorkflowStep::Completed),
		};

		state.conversation.push(ChatMessage::user(message));
		state.conversation.push(ChatMessage::model(response.reply.clone()));
		state.step = response.step;
		state.touch();

		// A completed session has already been flushed to the relational store;
		// keeping the conversation around would only resurrect a dead workflow.
		if response.step == WorkflowStep::Completed {
			self.collaborators.sessions.delete(session_id).await?;
		} else {
			self.collaborators.sessions.set(session_id, &state).await?;
		}

		Ok(response)
	}

	async fn absorb_profile(&self, state: &mut SessionState, message: &str) -> Result<String> {
		let raw =
			self.collaborators.chat.generate(prompts::INTAKE, &state.conversation, message).await?;

		match block::extract(&raw, block::PROFILE_TAG) {
			Decoded::Ok(value) => state.profile.merge(&value),
			Decoded::Malformed => {
				tracing::warn!("Profile payload was malformed; keeping previous fields.");
			},
			Decoded::Absent => {},
		}

		Ok(block::strip(&raw))
	}

	async fn intake_turn(&self, state: &mut SessionState, message: &str) -> Result<TurnResponse> {
		let reply = self.absorb_profile(state, message).await?;

		if state.profile.is_complete() {
			let summary = state.profile.summary_text();
			let reply = if reply.is_empty() {
				format!("Here is what I have: {summary}. Shall I pick exercises on this basis?")
			} else {
				format!("{reply}\n\nHere is what I have: {summary}. Shall I pick exercises on this basis?")
			};

			Ok(TurnResponse {
				reply,
				step: WorkflowStep::IntakeConfirm,
				requires_confirmation: true,
				profile: Some(state.profile.clone()),
				exercises: None,
			})
		} else {
			let reply = if reply.is_empty() {
				"Tell me a bit more about yourself so I can put a workout together.".to_string()
			} else {
				reply
			};

			Ok(TurnResponse::plain(reply, WorkflowStep::Intake))
		}
	}

	async fn intake_confirm_turn(
		&self,
		state: &mut SessionState,
		message: &str,
	) -> Result<TurnResponse> {
		match intent::classify(message) {
			Intent::Confirm => self.run_recommendation(state).await,
			// A cancel backs out to intake even though the merged profile is
			// still complete; the next turn re-runs intake and re-confirms.
			Intent::Cancel => {
				let reply = self.absorb_profile(state, message).await?;
				let reply = if reply.is_empty() {
					"No problem. What would you like to change?".to_string()
				} else {
					reply
				};

				Ok(TurnResponse {
					reply,
					step: WorkflowStep::Intake,
					requires_confirmation: false,
					profile: Some(state.profile.clone()),
					exercises: None,
				})
			},
			// Free dialogue routes back through intake so amended fields merge
			// into the profile before re-confirming.
			Intent::Other => self.intake_turn(state, message).await,
		}
	}

	/// Read access for callers that render session state without advancing it.
	pub async fn session(&self, session_id: &str) -> Result<SessionState> {
		self.collaborators
			.sessions
			.get(session_id)
			.await?
			.ok_or_else(|| Error::SessionNotFound { session_id: session_id.to_string() })
	}

	async fn run_recommendation(&self, state: &mut SessionState) -> Result<TurnResponse> {
		if !state.profile.is_complete() {
			return Err(Error::ProfileMissing);
		}

		let (query, exclude_body_parts) = self.rewrite_query(&state.profile).await;
		let candidates = self
			.collaborators
			.recommender
			.search(&query, &exclude_body_parts, self.cfg.workflow.candidate_limit)
			.await?;

		if candidates.is_empty() {
			tracing::warn!(query = %query, "Exercise search returned no candidates.");
			state.recommendations.clear();

			return Ok(TurnResponse::plain(EMPTY_SEARCH_REPLY, WorkflowStep::RecommendConfirm));
		}

		let raw = self
			.collaborators
			.chat
			.generate(prompts::RECOMMEND, &[], &prompts::recommend_request(&state.profile, &candidates))
			.await?;
		let program = block::extract(&raw, block::WORKOUT_TAG)
			.into_value()
			.map(parse_program)
			.unwrap_or_default();
		let offered: HashMap<&str, &CandidateItem> = candidates
			.iter()
			.filter_map(|item| item.external_id.as_deref().map(|id| (id, item)))
			.collect();
		let mut requested: Vec<String> = program.iter().map(|entry| entry.id.clone()).collect();

		requested.sort();
		requested.dedup();

		let verified = self.collaborators.recommender.verify_ids(&requested).await?;
		let plan = build_plan(&program, &offered, &verified);
		let reply = block::strip(&raw);

		if plan.is_empty() {
			tracing::warn!(
				requested = requested.len(),
				"No program entry survived validation; returning candidates without a plan."
			);
			state.recommendations.clear();

			let reply = format!(
				"I found these exercises but could not settle on a plan:\n{}\nAsk for a different selection to try again.",
				prompts::candidate_listing(&candidates[..candidates.len().min(5)]),
			);

			return Ok(TurnResponse::plain(reply, WorkflowStep::RecommendConfirm));
		}

		state.recommendations = plan.clone();

		Ok(TurnResponse {
			reply,
			step: WorkflowStep::RecommendConfirm,
			requires_confirmation: true,
			profile: None,
			exercises: Some(plan),
		})
	}

	async fn recommend_confirm_turn(
		&self,
		state: &mut SessionState,
		message: &str,
	) -> Result<TurnResponse> {
		match intent::classify(message) {
			Intent::Confirm => {
				if state.recommendations.is_empty() {
					return Err(Error::RecommendationsMissing);
				}

				state.selected = state.recommendations.clone();

				Ok(TurnResponse {
					reply: "Great, enjoy your workout! When you finish, send me your results: \
						volume, a quality score, any form errors, and notes."
						.to_string(),
					step: WorkflowStep::Summary,
					requires_confirmation: false,
					profile: None,
					exercises: Some(state.selected.clone()),
				})
			},
			_ if intent::wants_alternative(message) => self.run_recommendation(state).await,
			Intent::Cancel | Intent::Other => Ok(TurnResponse::plain(
				"Tell me what you would like instead, or ask for a different selection.",
				WorkflowStep::RecommendConfirm,
			)),
		}
	}

	async fn summary_turn(
		&self,
		state: &mut SessionState,
		session_id: &str,
		message: &str,
	) -> Result<TurnResponse> {
		let Some(results) = parse_results(message) else {
			return Ok(TurnResponse::plain(RESULTS_REPROMPT, WorkflowStep::Summary));
		};
		let recap_input = format!(
			"Performed exercises:\n{}\nReported results: volume {}, quality score {}, form errors: {}, notes: {}",
			prompts::candidate_listing(&state.selected),
			results.volume(),
			results.quality_score(),
			if results.form_errors.is_empty() { "none".to_string() } else { results.form_errors.join("; ") },
			results.notes.as_deref().unwrap_or("none"),
		);
		let raw = self.collaborators.chat.generate(prompts::SUMMARY, &[], &recap_input).await?;
		let reply = block::strip(&raw);
		let record = CompletionRecord {
			session_id: session_id.to_string(),
			user_id: state.user_id.clone(),
			volume: results.volume(),
			quality_score: results.quality_score(),
			notes: results.notes.clone(),
			exercise_ids: state
				.selected
				.iter()
				.filter_map(|item| item.external_id.clone())
				.collect(),
			form_errors: results.form_errors.clone(),
		};

		self.collaborators.completions.record(&record).await?;

		Ok(TurnResponse::plain(reply, WorkflowStep::Completed))
	}

	/// Distills the profile into a retrieval query. Rewrite failures are not
	/// fatal; the profile summary itself is an adequate query.
	async fn rewrite_query(&self, profile: &Profile) -> (String, Vec<String>) {
		let summary = profile.summary_text();
		let raw = match self
			.collaborators
			.chat
			.generate(prompts::QUERY_REWRITE, &[], &summary)
			.await
		{
			Ok(raw) => raw,
			Err(err) => {
				tracing::warn!(error = %err, "Query rewrite failed; using the profile summary.");

				return (summary, Vec::new());
			},
		};
		let Some(value) = block::extract(&raw, block::QUERY_TAG).into_value() else {
			return (summary, Vec::new());
		};
		let query = value
			.get("query")
			.and_then(|v| v.as_str())
			.map(|s| s.trim())
			.filter(|s| !s.is_empty())
			.map(str::to_string)
			.unwrap_or(summary);
		let exclude_body_parts = value
			.get("exclude_body_parts")
			.and_then(|v| v.as_array())
			.map(|parts| {
				parts
					.iter()
					.filter_map(|part| part.as_str())
					.map(|part| part.trim().to_uppercase())
					.filter(|part| !part.is_empty())
					.collect()
			})
			.unwrap_or_default();

		(query, exclude_body_parts)
	}
}

#[derive(Debug, serde::Deserialize)]
struct ProgramEntry {
	#[serde(alias = "external_id", alias = "exerciseId")]
	id: String,
	#[serde(default)]
	reps: Option<u32>,
	#[serde(default, alias = "duration", alias = "durationSecs")]
	duration_secs: Option<u32>,
	#[serde(default, alias = "includeRest", alias = "includeRestPeriod")]
	include_rest: Option<bool>,
	#[serde(default, alias = "restSecs", alias = "restDuration")]
	rest_secs: Option<u32>,
}

/// Accepts either a bare array of entries or an object with an `exercises`
/// array. Entries that fail to deserialize are dropped individually.
fn parse_program(value: Value) -> Vec<ProgramEntry> {
	let entries = match value {
		Value::Array(entries) => entries,
		Value::Object(mut obj) => match obj.remove("exercises") {
			Some(Value::Array(entries)) => entries,
			_ => return Vec::new(),
		},
		_ => return Vec::new(),
	};

	entries
		.into_iter()
		.filter_map(|entry| serde_json::from_value::<ProgramEntry>(entry).ok())
		.filter(|entry| !entry.id.trim().is_empty())
		.collect()
}

/// Applies the double validation gate: an entry survives only when its id was
/// actually offered this turn and still exists in the relational store. Order
/// and repeats are preserved so multi-set programs keep their shape.
fn build_plan(
	program: &[ProgramEntry],
	offered: &HashMap<&str, &CandidateItem>,
	verified: &HashSet<String>,
) -> Vec<CandidateItem> {
	let mut plan = Vec::new();

	for entry in program {
		let Some(candidate) = offered.get(entry.id.as_str()) else {
			continue;
		};

		if !verified.contains(entry.id.as_str()) {
			continue;
		}

		let mut item = (*candidate).clone();

		item.reps = entry.reps;
		item.duration_secs = entry.duration_secs;
		item.include_rest = entry.include_rest.unwrap_or(entry.rest_secs.is_some());
		item.rest_secs = entry.rest_secs;

		// Reps and duration are mutually exclusive; reps win.
		if item.reps.is_some() {
			item.duration_secs = None;
		}

		plan.push(item);
	}

	plan
}

#[derive(Debug, serde::Deserialize)]
struct ReportedResults {
	#[serde(default)]
	volume: Option<f64>,
	#[serde(default, alias = "qualityScore")]
	quality_score: Option<f64>,
	#[serde(default, alias = "formErrors")]
	form_errors: Vec<String>,
	#[serde(default)]
	notes: Option<String>,
}

impl ReportedResults {
	fn volume(&self) -> f64 {
		match self.volume {
			Some(volume) if volume.is_finite() && volume >= 0.0 => volume,
			_ => 0.0,
		}
	}

	fn quality_score(&self) -> f64 {
		match self.quality_score {
			Some(score) if score.is_finite() && (0.0..=1.0).contains(&score) => score,
			_ => 0.8,
		}
	}
}

fn parse_results(message: &str) -> Option<ReportedResults> {
	let value = match block::extract(message, block::WORKOUT_TAG) {
		Decoded::Ok(value) => value,
		Decoded::Malformed => return None,
		Decoded::Absent => block::decode(message).into_value()?,
	};

	serde_json::from_value(value).ok()
}

#[cfg(test)]
mod tests {
	use std::{
		collections::VecDeque,
		sync::{
			Arc, Mutex,
			atomic::{AtomicUsize, Ordering},
		},
	};

	use coach_config::{
		ChatProviderConfig, Config, EmbeddingProviderConfig, Postgres, Providers, Qdrant, Redis,
		Service, Storage, SyncConfig, Workflow,
	};

	use super::*;
	use crate::{
		BoxFuture, ChatProvider, Collaborators, CompletionStore, Recommender, SessionStore,
	};

	struct ScriptedChat {
		replies: Mutex<VecDeque<String>>,
	}
	impl ScriptedChat {
		fn new(replies: &[&str]) -> Arc<Self> {
			Arc::new(Self {
				replies: Mutex::new(replies.iter().map(|s| s.to_string()).collect()),
			})
		}
	}
	impl ChatProvider for ScriptedChat {
		fn generate<'a>(
			&'a self,
			_system_instruction: &'a str,
			_history: &'a [ChatMessage],
			_message: &'a str,
		) -> BoxFuture<'a, Result<String>> {
			let reply = self
				.replies
				.lock()
				.expect("poisoned")
				.pop_front()
				.unwrap_or_else(|| "Okay.".to_string());

			Box::pin(async move { Ok(reply) })
		}
	}

	#[derive(Default)]
	struct MemorySessions {
		map: Mutex<std::collections::HashMap<String, SessionState>>,
	}
	impl SessionStore for MemorySessions {
		fn get<'a>(&'a self, session_id: &'a str) -> BoxFuture<'a, Result<Option<SessionState>>> {
			let state = self.map.lock().expect("poisoned").get(session_id).cloned();

			Box::pin(async move { Ok(state) })
		}

		fn set<'a>(
			&'a self,
			session_id: &'a str,
			state: &'a SessionState,
		) -> BoxFuture<'a, Result<()>> {
			self.map.lock().expect("poisoned").insert(session_id.to_string(), state.clone());

			Box::pin(async move { Ok(()) })
		}

		fn delete<'a>(&'a self, session_id: &'a str) -> BoxFuture<'a, Result<()>> {
			self.map.lock().expect("poisoned").remove(session_id);

			Box::pin(async move { Ok(()) })
		}
	}

	struct StubRecommender {
		items: Vec<CandidateItem>,
		verified: HashSet<String>,
		searches: AtomicUsize,
	}
	impl Recommender for StubRecommender {
		fn search<'a>(
			&'a self,
			_query: &'a str,
			_exclude_body_parts: &'a [String],
			_limit: u64,
		) -> BoxFuture<'a, Result<Vec<CandidateItem>>> {
			self.searches.fetch_add(1, Ordering::SeqCst);

			let items = self.items.clone();

			Box::pin(async move { Ok(items) })
		}

		fn verify_ids<'a>(
			&'a self,
			external_ids: &'a [String],
		) -> BoxFuture<'a, Result<HashSet<String>>> {
			let verified = external_ids
				.iter()
				.filter(|id| self.verified.contains(*id))
				.cloned()
				.collect();

			Box::pin(async move { Ok(verified) })
		}
	}

	#[derive(Default)]
	struct RecordingCompletions {
		records: Mutex<Vec<CompletionRecord>>,
	}
	impl CompletionStore for RecordingCompletions {
		fn record<'a>(&'a self, record: &'a CompletionRecord) -> BoxFuture<'a, Result<()>> {
			self.records.lock().expect("poisoned").push(record.clone());

			Box::pin(async move { Ok(()) })
		}
	}

	fn test_config() -> Config {
		Config {
			service: Service { log_level: "info".to_string() },
			storage: Storage {
				postgres: Postgres {
					dsn: "postgres://localhost/coach".to_string(),
					pool_max_conns: 1,
				},
				qdrant: Qdrant {
					url: "http://localhost:6334".to_string(),
					exercises_collection: "exercises".to_string(),
					sessions_collection: "past_sessions".to_string(),
					vector_dim: 8,
				},
				redis: Redis { url: "redis://localhost".to_string(), session_ttl_secs: 60 },
			},
			providers: Providers {
				chat: ChatProviderConfig {
					api_base: "http://localhost".to_string(),
					api_key: "key".to_string(),
					model: "model".to_string(),
					temperature: 0.2,
					timeout_ms: 1_000,
				},
				embedding: EmbeddingProviderConfig {
					api_base: "http://localhost".to_string(),
					api_key: "key".to_string(),
					model: "model".to_string(),
					dimensions: 8,
					timeout_ms: 1_000,
				},
			},
			workflow: Workflow { candidate_limit: 10 },
			sync: SyncConfig {
				max_attempts: 3,
				retry_base_ms: 10,
				reconnect_max_attempts: 5,
				reconnect_base_ms: 10,
			},
		}
	}

	struct Harness {
		engine: Engine,
		sessions: Arc<MemorySessions>,
		recommender: Arc<StubRecommender>,
		completions: Arc<RecordingCompletions>,
	}

	fn harness(chat: Arc<ScriptedChat>, items: Vec<CandidateItem>, verified: &[&str]) -> Harness {
		let sessions = Arc::new(MemorySessions::default());
		let recommender = Arc::new(StubRecommender {
			items,
			verified: verified.iter().map(|id| id.to_string()).collect(),
			searches: AtomicUsize::new(0),
		});
		let completions = Arc::new(RecordingCompletions::default());
		let engine = Engine {
			cfg: test_config(),
			collaborators: Collaborators {
				chat,
				sessions: sessions.clone(),
				recommender: recommender.clone(),
				completions: completions.clone(),
			},
		};

		Harness { engine, sessions, recommender, completions }
	}

	fn candidate(id: &str, title: &str) -> CandidateItem {
		CandidateItem {
			external_id: Some(id.to_string()),
			title: title.to_string(),
			description: "A solid exercise.".to_string(),
			body_parts: vec!["CHEST".to_string()],
			difficulty: Default::default(),
			position: Default::default(),
			steps: Vec::new(),
			tips: String::new(),
			common_mistakes: String::new(),
			reps: None,
			duration_secs: None,
			include_rest: false,
			rest_secs: None,
		}
	}

	fn complete_profile() -> Profile {
		let mut profile = Profile::default();

		profile.merge(&serde_json::json!({
			"age": 30,
			"weight": 70,
			"height": 180,
			"gender": "FEMALE",
			"goals": "build strength",
			"injuries": "none",
		}));

		profile
	}

	fn seeded(harness: &Harness, session_id: &str, step: WorkflowStep) -> SessionState {
		let mut state = SessionState::new("user-1");

		state.step = step;
		state.profile = complete_profile();
		harness
			.sessions
			.map
			.lock()
			.expect("poisoned")
			.insert(session_id.to_string(), state.clone());

		state
	}

	#[tokio::test]
	async fn fresh_session_starts_at_intake_and_strips_payloads() {
		let chat = ScriptedChat::new(&[
			"Nice to meet you! How old are you?\n<START_DATA>\n<PROFILE_DATA>\ngoals: get fit\n</PROFILE_DATA>\n<END_DATA>",
		]);
		let harness = harness(chat, Vec::new(), &[]);
		let response = harness
			.engine
			.handle_turn("s1", "user-1", "Hi, I want to get fit")
			.await
			.expect("turn failed");

		assert_eq!(response.step, WorkflowStep::Intake);
		assert!(!response.requires_confirmation);
		assert!(!response.reply.contains("START_DATA"));
		assert!(response.profile.is_none());

		let stored = harness.sessions.map.lock().expect("poisoned").get("s1").cloned();
		let stored = stored.expect("session should persist");

		assert_eq!(stored.profile.goals.as_deref(), Some("get fit"));
		assert_eq!(stored.conversation.len(), 2);
	}

	#[tokio::test]
	async fn complete_profile_requests_confirmation() {
		let chat = ScriptedChat::new(&[
			"Got it!\n<START_DATA>\n<PROFILE_DATA>\n{\"age\": 30, \"weight\": 70, \"height\": 180, \"gender\": \"MALE\", \"goals\": \"strength\", \"injuries\": \"none\"}\n</PROFILE_DATA>\n<END_DATA>",
		]);
		let harness = harness(chat, Vec::new(), &[]);
		let response = harness
			.engine
			.handle_turn("s1", "user-1", "30, 70kg, 180cm, male, strength, no injuries")
			.await
			.expect("turn failed");

		assert_eq!(response.step, WorkflowStep::IntakeConfirm);
		assert!(response.requires_confirmation);

		let profile = response.profile.expect("profile should be echoed");

		assert_eq!(profile.age, Some(30));
		assert!(response.reply.contains("Age: 30"));
	}

	#[tokio::test]
	async fn cancel_at_confirmation_returns_to_intake() {
		let chat = ScriptedChat::new(&[
			"Sure, let's adjust.\n<START_DATA>\n<PROFILE_DATA>\n{\"weight\": 82}\n</PROFILE_DATA>\n<END_DATA>",
		]);
		let harness = harness(chat, Vec::new(), &[]);

		seeded(&harness, "s1", WorkflowStep::IntakeConfirm);

		let response = harness
			.engine
			.handle_turn("s1", "user-1", "no, change my weight to 82kg")
			.await
			.expect("turn failed");

		assert_eq!(response.step, WorkflowStep::Intake);
		assert!(!response.requires_confirmation);
		assert_eq!(harness.recommender.searches.load(Ordering::SeqCst), 0);

		// The correction carried by the cancel message still merges.
		let stored = harness.sessions.map.lock().expect("poisoned").get("s1").cloned();
		let stored = stored.expect("session should persist");

		assert_eq!(stored.step, WorkflowStep::Intake);
		assert_eq!(stored.profile.weight_kg, Some(82.0));
	}

	#[tokio::test]
	async fn confirmation_runs_recommendation_in_the_same_turn() {
		let chat = ScriptedChat::new(&[
			// Query rewrite.
			"<START_DATA>\n<QUERY_DATA>\n{\"query\": \"strength basics\", \"exclude_body_parts\": []}\n</QUERY_DATA>\n<END_DATA>",
			// Plan.
			"Here is your workout!\n<START_DATA>\n<WORKOUT_DATA>\n{\"exercises\": [{\"id\": \"ex_1\", \"reps\": 10}, {\"id\": \"ex_2\", \"duration_secs\": 45}]}\n</WORKOUT_DATA>\n<END_DATA>",
		]);
		let harness =
			harness(chat, vec![candidate("ex_1", "Push-up"), candidate("ex_2", "Plank")], &[
				"ex_1", "ex_2",
			]);

		seeded(&harness, "s1", WorkflowStep::IntakeConfirm);

		let response =
			harness.engine.handle_turn("s1", "user-1", "CONFIRM").await.expect("turn failed");

		assert_eq!(response.step, WorkflowStep::RecommendConfirm);
		assert!(response.requires_confirmation);
		assert_eq!(harness.recommender.searches.load(Ordering::SeqCst), 1);

		let exercises = response.exercises.expect("plan should be present");

		assert_eq!(exercises.len(), 2);
		assert_eq!(exercises[0].reps, Some(10));
		assert_eq!(exercises[1].duration_secs, Some(45));
	}

	#[tokio::test]
	async fn unknown_and_unverified_ids_never_reach_the_plan() {
		let chat = ScriptedChat::new(&[
			"<START_DATA>\n<QUERY_DATA>\n{\"query\": \"basics\"}\n</QUERY_DATA>\n<END_DATA>",
			"Plan below.\n<START_DATA>\n<WORKOUT_DATA>\n{\"exercises\": [{\"id\": \"ghost\", \"reps\": 8}, {\"id\": \"ex_stale\", \"reps\": 8}, {\"id\": \"ex_1\", \"reps\": 8}]}\n</WORKOUT_DATA>\n<END_DATA>",
		]);
		// "ex_stale" is offered by the index but no longer in the relational
		// store; "ghost" was never offered at all.
		let harness =
			harness(chat, vec![candidate("ex_1", "Push-up"), candidate("ex_stale", "Gone")], &[
				"ex_1",
			]);

		seeded(&harness, "s1", WorkflowStep::IntakeConfirm);

		let response =
			harness.engine.handle_turn("s1", "user-1", "yes").await.expect("turn failed");
		let exercises = response.exercises.expect("plan should be present");

		assert_eq!(exercises.len(), 1);
		assert_eq!(exercises[0].external_id.as_deref(), Some("ex_1"));
	}

	#[tokio::test]
	async fn confirm_without_recommendations_is_an_error() {
		let harness = harness(ScriptedChat::new(&[]), Vec::new(), &[]);

		seeded(&harness, "s1", WorkflowStep::RecommendConfirm);

		let result = harness.engine.handle_turn("s1", "user-1", "CONFIRM").await;

		assert!(matches!(result, Err(Error::RecommendationsMissing)));
	}

	#[tokio::test]
	async fn alternative_request_reruns_the_search() {
		let chat = ScriptedChat::new(&[
			"<START_DATA>\n<QUERY_DATA>\n{\"query\": \"fresh set\"}\n</QUERY_DATA>\n<END_DATA>",
			"New plan.\n<START_DATA>\n<WORKOUT_DATA>\n{\"exercises\": [{\"id\": \"ex_1\", \"reps\": 12}]}\n</WORKOUT_DATA>\n<END_DATA>",
		]);
		let harness = harness(chat, vec![candidate("ex_1", "Push-up")], &["ex_1"]);
		let mut state = seeded(&harness, "s1", WorkflowStep::RecommendConfirm);

		state.recommendations = vec![candidate("ex_old", "Old")];
		harness.sessions.map.lock().expect("poisoned").insert("s1".to_string(), state);

		let response = harness
			.engine
			.handle_turn("s1", "user-1", "give me something different")
			.await
			.expect("turn failed");

		assert_eq!(harness.recommender.searches.load(Ordering::SeqCst), 1);
		assert_eq!(
			response.exercises.expect("plan should be present")[0].external_id.as_deref(),
			Some("ex_1"),
		);
	}

	#[tokio::test]
	async fn malformed_results_reprompt_without_recording() {
		let harness = harness(ScriptedChat::new(&[]), Vec::new(), &[]);
		let mut state = seeded(&harness, "s1", WorkflowStep::Summary);

		state.selected = vec![candidate("ex_1", "Push-up")];
		harness.sessions.map.lock().expect("poisoned").insert("s1".to_string(), state);

		let response = harness
			.engine
			.handle_turn("s1", "user-1", "that was great!")
			.await
			.expect("turn failed");

		assert_eq!(response.step, WorkflowStep::Summary);
		assert_eq!(response.reply, RESULTS_REPROMPT);
		assert!(harness.completions.records.lock().expect("poisoned").is_empty());
	}

	#[tokio::test]
	async fn completed_workout_is_recorded_and_session_cleared() {
		let chat = ScriptedChat::new(&["Well done, strong session!"]);
		let harness = harness(chat, Vec::new(), &[]);
		let mut state = seeded(&harness, "s1", WorkflowStep::Summary);

		state.selected = vec![candidate("ex_1", "Push-up"), candidate("ex_2", "Plank")];
		harness.sessions.map.lock().expect("poisoned").insert("s1".to_string(), state);

		let response = harness
			.engine
			.handle_turn(
				"s1",
				"user-1",
				"{\"volume\": 1200, \"qualityScore\": 0.9, \"formErrors\": [\"knees in\"], \"notes\": \"tough\"}",
			)
			.await
			.expect("turn failed");

		assert_eq!(response.step, WorkflowStep::Completed);
		assert_eq!(response.reply, "Well done, strong session!");

		let records = harness.completions.records.lock().expect("poisoned");

		assert_eq!(records.len(), 1);
		assert_eq!(records[0].volume, 1200.0);
		assert_eq!(records[0].quality_score, 0.9);
		assert_eq!(records[0].exercise_ids, vec!["ex_1".to_string(), "ex_2".to_string()]);
		assert_eq!(records[0].form_errors, vec!["knees in".to_string()]);
		assert!(harness.sessions.map.lock().expect("poisoned").get("s1").is_none());
	}

	#[test]
	fn reps_win_over_duration() {
		let offered_item = candidate("ex_1", "Push-up");
		let offered = HashMap::from([("ex_1", &offered_item)]);
		let verified = HashSet::from(["ex_1".to_string()]);
		let program = parse_program(serde_json::json!({
			"exercises": [{ "id": "ex_1", "reps": 10, "duration_secs": 60 }]
		}));
		let plan = build_plan(&program, &offered, &verified);

		assert_eq!(plan[0].reps, Some(10));
		assert_eq!(plan[0].duration_secs, None);
	}

	#[test]
	fn repeats_and_order_are_preserved() {
		let offered_item = candidate("ex_1", "Push-up");
		let second = candidate("ex_2", "Plank");
		let offered = HashMap::from([("ex_1", &offered_item), ("ex_2", &second)]);
		let verified = HashSet::from(["ex_1".to_string(), "ex_2".to_string()]);
		let program = parse_program(serde_json::json!([
			{ "id": "ex_2", "duration_secs": 30 },
			{ "id": "ex_1", "reps": 10 },
			{ "id": "ex_2", "duration_secs": 30 },
		]));
		let plan = build_plan(&program, &offered, &verified);
		let ids: Vec<_> = plan.iter().filter_map(|item| item.external_id.as_deref()).collect();

		assert_eq!(ids, vec!["ex_2", "ex_1", "ex_2"]);
	}

	#[test]
	fn quality_score_defaults_when_missing_or_out_of_range() {
		let missing = parse_results("{\"volume\": 100}").expect("parse failed");
		let out_of_range =
			parse_results("{\"volume\": 100, \"quality_score\": 7.5}").expect("parse failed");

		assert_eq!(missing.quality_score(), 0.8);
		assert_eq!(out_of_range.quality_score(), 0.8);
	}

	#[test]
	fn line_format_results_are_accepted() {
		let results = parse_results("volume: 850\nnotes: solid effort").expect("parse failed");

		assert_eq!(results.volume(), 850.0);
		assert_eq!(results.notes.as_deref(), Some("solid effort"));
	}
}
