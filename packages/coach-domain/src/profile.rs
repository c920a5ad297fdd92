use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::types::Gender;

/// A partially collected user profile. Fields only ever move from unknown to
/// known: merging a decoded block never clears a field that already holds a
/// valid value.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Profile {
	pub age: Option<u32>,
	pub weight_kg: Option<f32>,
	pub height_cm: Option<f32>,
	pub gender: Option<Gender>,
	pub goals: Option<String>,
	pub injuries: Option<String>,
	pub lifestyle: Option<String>,
	pub equipment: Option<String>,
}

impl Profile {
	pub fn merge(&mut self, value: &Value) {
		let Some(obj) = value.as_object() else {
			return;
		};

		if let Some(age) = number_field(obj, "age")
			&& (1.0..=150.0).contains(&age)
		{
			self.age = Some(age as u32);
		}
		if let Some(weight) = number_field(obj, "weight") {
			self.weight_kg = Some(weight as f32);
		}
		if let Some(height) = number_field(obj, "height") {
			self.height_cm = Some(height as f32);
		}
		if let Some(gender) = text_field(obj, "gender").and_then(|raw| Gender::from_tag(&raw)) {
			self.gender = Some(gender);
		}
		if let Some(goals) = text_field(obj, "goals") {
			self.goals = Some(goals);
		}
		if let Some(injuries) = text_field(obj, "injuries") {
			self.injuries = Some(injuries);
		}
		if let Some(lifestyle) = text_field(obj, "lifestyle") {
			self.lifestyle = Some(lifestyle);
		}
		if let Some(equipment) = text_field(obj, "equipment") {
			self.equipment = Some(equipment);
		}
	}

	pub fn is_complete(&self) -> bool {
		self.age.is_some()
			&& self.weight_kg.is_some()
			&& self.height_cm.is_some()
			&& self.gender.is_some()
			&& self.goals.as_deref().is_some_and(|goals| !goals.is_empty())
			&& self.injuries.as_deref().is_some_and(|injuries| !injuries.is_empty())
	}

	/// Natural-language rendition used to seed retrieval queries.
	pub fn summary_text(&self) -> String {
		let mut parts = Vec::new();

		if let Some(age) = self.age {
			parts.push(format!("Age: {age}"));
		}
		if let Some(weight) = self.weight_kg {
			parts.push(format!("Weight: {weight}kg"));
		}
		if let Some(height) = self.height_cm {
			parts.push(format!("Height: {height}cm"));
		}
		if let Some(gender) = self.gender {
			parts.push(format!("Gender: {}", gender.as_tag()));
		}
		if let Some(goals) = self.goals.as_deref() {
			parts.push(format!("Goals: {goals}"));
		}
		if let Some(injuries) = self.injuries.as_deref() {
			parts.push(format!("Injuries: {injuries}"));
		}
		if let Some(lifestyle) = self.lifestyle.as_deref() {
			parts.push(format!("Lifestyle: {lifestyle}"));
		}
		if let Some(equipment) = self.equipment.as_deref() {
			parts.push(format!("Equipment: {equipment}"));
		}

		parts.join(", ")
	}
}

fn number_field(obj: &Map<String, Value>, key: &str) -> Option<f64> {
	let number = obj.get(key)?.as_f64()?;

	(number.is_finite() && number > 0.0).then_some(number)
}

fn text_field(obj: &Map<String, Value>, key: &str) -> Option<String> {
	let raw = obj.get(key)?.as_str()?.trim();

	if raw.is_empty() || raw.eq_ignore_ascii_case("n/a") || raw.eq_ignore_ascii_case("null") {
		return None;
	}

	Some(raw.to_string())
}
