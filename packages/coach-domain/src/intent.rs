//! Confirmation-step message classification.

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Intent {
	Confirm,
	Cancel,
	Other,
}

/// Case-insensitive token matching: `CONFIRM`/`YES`/`OK` confirm,
/// `CANCEL`/`NO` or any mention of changing/modifying cancel, everything
/// else is free dialogue.
pub fn classify(message: &str) -> Intent {
	let upper = message.to_uppercase();
	let tokens: Vec<&str> =
		upper.split(|c: char| !c.is_alphanumeric()).filter(|token| !token.is_empty()).collect();

	if tokens.iter().any(|token| matches!(*token, "CONFIRM" | "YES" | "OK")) {
		return Intent::Confirm;
	}
	if tokens.iter().any(|token| matches!(*token, "CANCEL" | "NO"))
		|| upper.contains("CHANGE")
		|| upper.contains("MODIFY")
	{
		return Intent::Cancel;
	}

	Intent::Other
}

/// Whether a cancellation reason asks for a fresh set of recommendations
/// rather than a tweak to the current one.
pub fn wants_alternative(message: &str) -> bool {
	let upper = message.to_uppercase();

	upper.contains("NEW") || upper.contains("DIFFERENT")
}
