pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error(transparent)]
	Sqlx(#[from] sqlx::Error),
	#[error(transparent)]
	Storage(#[from] coach_storage::Error),
	#[error(transparent)]
	Provider(#[from] coach_providers::Error),
	#[error("Malformed notification on {channel}: {message}")]
	MalformedNotification { channel: String, message: String },
}
