use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::profile::Profile;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkflowStep {
	Intake,
	IntakeConfirm,
	Recommend,
	RecommendConfirm,
	Summary,
	Completed,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
	User,
	Model,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
	pub role: Role,
	pub content: String,
}

impl ChatMessage {
	pub fn user(content: impl Into<String>) -> Self {
		Self { role: Role::User, content: content.into() }
	}

	pub fn model(content: impl Into<String>) -> Self {
		Self { role: Role::Model, content: content.into() }
	}
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Gender {
	Male,
	Female,
	Other,
}

impl Gender {
	pub fn from_tag(raw: &str) -> Option<Self> {
		match raw.trim().to_uppercase().as_str() {
			"MALE" => Some(Self::Male),
			"FEMALE" => Some(Self::Female),
			"OTHER" => Some(Self::Other),
			_ => None,
		}
	}

	pub fn as_tag(&self) -> &'static str {
		match self {
			Self::Male => "MALE",
			Self::Female => "FEMALE",
			Self::Other => "OTHER",
		}
	}
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Difficulty {
	Easy,
	#[default]
	Medium,
	Hard,
}

impl Difficulty {
	/// Index payloads are untrusted; unknown tags fall back to the default.
	pub fn from_tag(raw: &str) -> Self {
		match raw.trim().to_uppercase().as_str() {
			"EASY" => Self::Easy,
			"HARD" => Self::Hard,
			_ => Self::Medium,
		}
	}

	pub fn as_tag(&self) -> &'static str {
		match self {
			Self::Easy => "EASY",
			Self::Medium => "MEDIUM",
			Self::Hard => "HARD",
		}
	}
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Position {
	#[default]
	Standing,
	Seated,
	Floor,
}

impl Position {
	pub fn from_tag(raw: &str) -> Self {
		match raw.trim().to_uppercase().as_str() {
			"SEATED" => Self::Seated,
			"FLOOR" => Self::Floor,
			_ => Self::Standing,
		}
	}

	pub fn as_tag(&self) -> &'static str {
		match self {
			Self::Standing => "STANDING",
			Self::Seated => "SEATED",
			Self::Floor => "FLOOR",
		}
	}
}

/// A provisional recommendation out of the vector index. Items are only
/// trustworthy after validation against the relational store; validated items
/// always carry an `external_id` and use either `reps` or `duration_secs`,
/// never both.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CandidateItem {
	pub external_id: Option<String>,
	pub title: String,
	#[serde(default)]
	pub description: String,
	#[serde(default)]
	pub body_parts: Vec<String>,
	#[serde(default)]
	pub difficulty: Difficulty,
	#[serde(default)]
	pub position: Position,
	#[serde(default)]
	pub steps: Vec<String>,
	#[serde(default)]
	pub tips: String,
	#[serde(default)]
	pub common_mistakes: String,
	#[serde(default)]
	pub reps: Option<u32>,
	#[serde(default)]
	pub duration_secs: Option<u32>,
	#[serde(default)]
	pub include_rest: bool,
	#[serde(default)]
	pub rest_secs: Option<u32>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SessionState {
	pub user_id: String,
	pub step: WorkflowStep,
	#[serde(default)]
	pub conversation: Vec<ChatMessage>,
	#[serde(default)]
	pub profile: Profile,
	#[serde(default)]
	pub recommendations: Vec<CandidateItem>,
	#[serde(default)]
	pub selected: Vec<CandidateItem>,
	#[serde(with = "time::serde::rfc3339")]
	pub created_at: OffsetDateTime,
	#[serde(with = "time::serde::rfc3339")]
	pub updated_at: OffsetDateTime,
}

impl SessionState {
	pub fn new(user_id: impl Into<String>) -> Self {
		let now = OffsetDateTime::now_utc();

		Self {
			user_id: user_id.into(),
			step: WorkflowStep::Intake,
			conversation: Vec::new(),
			profile: Profile::default(),
			recommendations: Vec::new(),
			selected: Vec::new(),
			created_at: now,
			updated_at: now,
		}
	}

	pub fn touch(&mut self) {
		self.updated_at = OffsetDateTime::now_utc();
	}
}
