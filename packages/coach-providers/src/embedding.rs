use serde_json::{Value, json};

use coach_config::EmbeddingProviderConfig;

use crate::{Error, Result};

pub async fn embed(cfg: &EmbeddingProviderConfig, texts: &[String]) -> Result<Vec<Vec<f32>>> {
	let client = crate::http_client(cfg.timeout_ms)?;
	let url = format!(
		"{}/models/{}:batchEmbedContents",
		cfg.api_base.trim_end_matches('/'),
		cfg.model
	);
	let requests: Vec<Value> = texts
		.iter()
		.map(|text| {
			json!({
				"model": format!("models/{}", cfg.model),
				"content": { "parts": [{ "text": text }] },
			})
		})
		.collect();
	let res = client
		.post(url)
		.header("x-goog-api-key", &cfg.api_key)
		.json(&json!({ "requests": requests }))
		.send()
		.await?;
	let json: Value = res.error_for_status()?.json().await?;
	let vectors = parse_embedding_response(json)?;

	if vectors.len() != texts.len() {
		return Err(Error::InvalidResponse {
			message: format!(
				"Embedding response returned {} vectors for {} inputs.",
				vectors.len(),
				texts.len()
			),
		});
	}
	for vector in &vectors {
		if vector.len() != cfg.dimensions as usize {
			return Err(Error::InvalidResponse {
				message: format!(
					"Embedding dimension {} does not match configured dimensions {}.",
					vector.len(),
					cfg.dimensions
				),
			});
		}
	}

	Ok(vectors)
}

pub async fn embed_one(cfg: &EmbeddingProviderConfig, text: &str) -> Result<Vec<f32>> {
	let vectors = embed(cfg, std::slice::from_ref(&text.to_string())).await?;

	vectors.into_iter().next().ok_or_else(|| Error::InvalidResponse {
		message: "Embedding response contained no vectors.".to_string(),
	})
}

fn parse_embedding_response(json: Value) -> Result<Vec<Vec<f32>>> {
	let embeddings =
		json.get("embeddings").and_then(|v| v.as_array()).ok_or_else(|| Error::InvalidResponse {
			message: "Embedding response is missing embeddings array.".to_string(),
		})?;
	let mut out = Vec::with_capacity(embeddings.len());

	for item in embeddings {
		let values = item.get("values").and_then(|v| v.as_array()).ok_or_else(|| {
			Error::InvalidResponse {
				message: "Embedding item is missing values array.".to_string(),
			}
		})?;
		let mut vector = Vec::with_capacity(values.len());

		for value in values {
			let number = value.as_f64().ok_or_else(|| Error::InvalidResponse {
				message: "Embedding value must be numeric.".to_string(),
			})?;

			vector.push(number as f32);
		}

		out.push(vector);
	}

	Ok(out)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn parses_embedding_vectors_in_order() {
		let json = serde_json::json!({
			"embeddings": [
				{ "values": [0.5, 1.5] },
				{ "values": [2.0, 3.0] }
			]
		});
		let parsed = parse_embedding_response(json).expect("parse failed");

		assert_eq!(parsed, vec![vec![0.5, 1.5], vec![2.0, 3.0]]);
	}

	#[test]
	fn rejects_non_numeric_values() {
		let json = serde_json::json!({ "embeddings": [{ "values": ["oops"] }] });

		assert!(parse_embedding_response(json).is_err());
	}
}
