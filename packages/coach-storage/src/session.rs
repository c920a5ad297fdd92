use redis::{AsyncCommands, aio::ConnectionManager};

use coach_domain::SessionState;

use crate::Result;

/// Redis-backed conversation store. Every write refreshes the TTL, so a
/// session only expires after a full idle window.
pub struct RedisSessionStore {
	manager: ConnectionManager,
	ttl_secs: u64,
}
impl RedisSessionStore {
	pub async fn connect(cfg: &coach_config::Redis) -> Result<Self> {
		let client = redis::Client::open(cfg.url.as_str())?;
		let manager = client.get_connection_manager().await?;

		Ok(Self { manager, ttl_secs: cfg.session_ttl_secs })
	}

	pub async fn get(&self, session_id: &str) -> Result<Option<SessionState>> {
		let mut conn = self.manager.clone();
		let raw: Option<String> = conn.get(session_key(session_id)).await?;

		Ok(raw.as_deref().and_then(decode_state))
	}

	pub async fn set(&self, session_id: &str, state: &SessionState) -> Result<()> {
		let raw = serde_json::to_string(state)?;
		let mut conn = self.manager.clone();
		let _: () = conn.set_ex(session_key(session_id), raw, self.ttl_secs).await?;

		Ok(())
	}

	pub async fn delete(&self, session_id: &str) -> Result<()> {
		let mut conn = self.manager.clone();
		let _: () = conn.del(session_key(session_id)).await?;

		Ok(())
	}
}

fn session_key(session_id: &str) -> String {
	format!("session:{session_id}")
}

/// A stored blob that no longer parses is treated as absent rather than fatal,
/// so a poisoned key degrades to a fresh conversation.
pub fn decode_state(raw: &str) -> Option<SessionState> {
	serde_json::from_str(raw).ok()
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn round_trips_session_state() {
		let state = SessionState::new("user-1");
		let raw = serde_json::to_string(&state).expect("serialize failed");
		let decoded = decode_state(&raw).expect("decode failed");

		assert_eq!(decoded.user_id, "user-1");
		assert_eq!(decoded.step, state.step);
	}

	#[test]
	fn malformed_blob_reads_as_absent() {
		assert!(decode_state("{\"user_id\":").is_none());
		assert!(decode_state("not json at all").is_none());
	}

	#[test]
	fn keys_are_namespaced() {
		assert_eq!(session_key("abc"), "session:abc");
	}
}
