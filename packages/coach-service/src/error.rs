pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("Invalid request: {message}")]
	InvalidRequest { message: String },
	#[error("Session not found: {session_id}")]
	SessionNotFound { session_id: String },
	#[error("Profile is incomplete; recommendations need a confirmed profile.")]
	ProfileMissing,
	#[error("No recommendations to confirm.")]
	RecommendationsMissing,
	#[error("Provider error: {message}")]
	Provider { message: String },
	#[error("Storage error: {message}")]
	Storage { message: String },
}
impl From<coach_providers::Error> for Error {
	fn from(err: coach_providers::Error) -> Self {
		Self::Provider { message: err.to_string() }
	}
}
impl From<coach_storage::Error> for Error {
	fn from(err: coach_storage::Error) -> Self {
		match err {
			coach_storage::Error::InvalidArgument(message) => Self::InvalidRequest { message },
			other => Self::Storage { message: other.to_string() },
		}
	}
}
