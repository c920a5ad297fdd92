use serde_json::{Value, json};

use coach_config::ChatProviderConfig;
use coach_domain::{ChatMessage, Role};

use crate::{Error, Result};

/// Stateless generation request: system instruction + prior history + the new
/// message. The service layer owns the history; nothing is cached here.
pub async fn generate(
	cfg: &ChatProviderConfig,
	system_instruction: &str,
	history: &[ChatMessage],
	message: &str,
) -> Result<String> {
	let client = crate::http_client(cfg.timeout_ms)?;
	let url = format!(
		"{}/models/{}:generateContent",
		cfg.api_base.trim_end_matches('/'),
		cfg.model
	);
	let mut contents: Vec<Value> = history
		.iter()
		.map(|msg| json!({ "role": role_tag(msg.role), "parts": [{ "text": msg.content }] }))
		.collect();

	contents.push(json!({ "role": "user", "parts": [{ "text": message }] }));

	let body = json!({
		"system_instruction": { "parts": [{ "text": system_instruction }] },
		"contents": contents,
		"generationConfig": { "temperature": cfg.temperature },
	});
	let res = client.post(url).header("x-goog-api-key", &cfg.api_key).json(&body).send().await?;
	let json: Value = res.error_for_status()?.json().await?;

	parse_generation_response(json)
}

fn role_tag(role: Role) -> &'static str {
	match role {
		Role::User => "user",
		Role::Model => "model",
	}
}

fn parse_generation_response(json: Value) -> Result<String> {
	let parts = json
		.get("candidates")
		.and_then(|v| v.as_array())
		.and_then(|candidates| candidates.first())
		.and_then(|candidate| candidate.pointer("/content/parts"))
		.and_then(|v| v.as_array())
		.ok_or_else(|| Error::InvalidResponse {
			message: "Generation response is missing candidate parts.".to_string(),
		})?;
	let mut out = String::new();

	for part in parts {
		if let Some(text) = part.get("text").and_then(|v| v.as_str()) {
			out.push_str(text);
		}
	}

	if out.is_empty() {
		return Err(Error::InvalidResponse {
			message: "Generation response contained no text.".to_string(),
		});
	}

	Ok(out)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn concatenates_candidate_parts() {
		let json = serde_json::json!({
			"candidates": [
				{ "content": { "parts": [{ "text": "Hello " }, { "text": "there." }] } }
			]
		});

		assert_eq!(parse_generation_response(json).expect("parse failed"), "Hello there.");
	}

	#[test]
	fn rejects_empty_candidates() {
		let json = serde_json::json!({ "candidates": [] });

		assert!(parse_generation_response(json).is_err());
	}
}
