pub mod block;
pub mod intent;
pub mod profile;

mod types;

pub use profile::Profile;
pub use types::{
	CandidateItem, ChatMessage, Difficulty, Gender, Position, Role, SessionState, WorkflowStep,
};
