use std::collections::HashMap;

use qdrant_client::qdrant::{
	Condition, CreateCollectionBuilder, DeletePointsBuilder, Distance, Filter, PointStruct, Query,
	QueryPointsBuilder, ScoredPoint, UpsertPointsBuilder, Value, VectorParamsBuilder, value::Kind,
};

use crate::Result;

pub struct QdrantStore {
	pub client: qdrant_client::Qdrant,
	pub exercises_collection: String,
	pub sessions_collection: String,
	pub vector_dim: u32,
}
impl QdrantStore {
	pub fn new(cfg: &coach_config::Qdrant) -> Result<Self> {
		let client = qdrant_client::Qdrant::from_url(&cfg.url).build()?;

		Ok(Self {
			client,
			exercises_collection: cfg.exercises_collection.clone(),
			sessions_collection: cfg.sessions_collection.clone(),
			vector_dim: cfg.vector_dim,
		})
	}

	pub async fn ensure_collections(&self) -> Result<()> {
		let existing = self.client.list_collections().await?;
		let names: Vec<String> =
			existing.collections.into_iter().map(|collection| collection.name).collect();

		for collection in [&self.exercises_collection, &self.sessions_collection] {
			if names.iter().any(|name| name == collection) {
				continue;
			}

			self.client
				.create_collection(CreateCollectionBuilder::new(collection.clone()).vectors_config(
					VectorParamsBuilder::new(self.vector_dim as u64, Distance::Cosine),
				))
				.await?;
		}

		Ok(())
	}

	pub async fn search(
		&self,
		collection: &str,
		vector: Vec<f32>,
		limit: u64,
		exclude_body_parts: &[String],
	) -> Result<Vec<ScoredPoint>> {
		let mut search = QueryPointsBuilder::new(collection.to_string())
			.query(Query::new_nearest(vector))
			.limit(limit)
			.with_payload(true);

		if !exclude_body_parts.is_empty() {
			let filter = Filter {
				must_not: vec![Condition::matches("bodyParts", exclude_body_parts.to_vec())],
				..Default::default()
			};

			search = search.filter(filter);
		}

		let response = self.client.query(search).await?;

		Ok(response.result)
	}

	pub async fn upsert(&self, collection: &str, point: PointStruct) -> Result<()> {
		self.client
			.upsert_points(UpsertPointsBuilder::new(collection.to_string(), vec![point]).wait(true))
			.await?;

		Ok(())
	}

	/// Removes the point indexed for an exercise. The relational row is gone by
	/// the time a delete notification arrives, so the payload field is the only
	/// handle left.
	pub async fn delete_by_external_id(&self, collection: &str, external_id: &str) -> Result<()> {
		let filter = Filter {
			must: vec![Condition::matches("external_id", external_id.to_string())],
			..Default::default()
		};

		self.client
			.delete_points(DeletePointsBuilder::new(collection.to_string()).points(filter).wait(true))
			.await?;

		Ok(())
	}
}

pub fn value_to_json(value: Value) -> serde_json::Value {
	match value.kind {
		None | Some(Kind::NullValue(_)) => serde_json::Value::Null,
		Some(Kind::BoolValue(flag)) => serde_json::Value::Bool(flag),
		Some(Kind::IntegerValue(number)) => serde_json::Value::from(number),
		Some(Kind::DoubleValue(number)) => serde_json::Number::from_f64(number)
			.map(serde_json::Value::Number)
			.unwrap_or(serde_json::Value::Null),
		Some(Kind::StringValue(text)) => serde_json::Value::String(text),
		Some(Kind::ListValue(list)) =>
			serde_json::Value::Array(list.values.into_iter().map(value_to_json).collect()),
		Some(Kind::StructValue(fields)) => serde_json::Value::Object(
			fields.fields.into_iter().map(|(key, value)| (key, value_to_json(value))).collect(),
		),
	}
}

pub fn payload_to_json(payload: HashMap<String, Value>) -> serde_json::Value {
	serde_json::Value::Object(
		payload.into_iter().map(|(key, value)| (key, value_to_json(value))).collect(),
	)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn converts_nested_payload_values() {
		let list = Value {
			kind: Some(Kind::ListValue(qdrant_client::qdrant::ListValue {
				values: vec![
					Value { kind: Some(Kind::StringValue("CHEST".to_string())) },
					Value { kind: Some(Kind::StringValue("BACK".to_string())) },
				],
			})),
		};
		let payload = HashMap::from([
			("title".to_string(), Value { kind: Some(Kind::StringValue("Push-up".to_string())) }),
			("bodyParts".to_string(), list),
			("missing".to_string(), Value { kind: None }),
		]);
		let json = payload_to_json(payload);

		assert_eq!(json["title"], "Push-up");
		assert_eq!(json["bodyParts"], serde_json::json!(["CHEST", "BACK"]));
		assert!(json["missing"].is_null());
	}
}
