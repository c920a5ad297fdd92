//! System instructions for each workflow step. Every structured payload the
//! model is asked for follows the marker conventions in `coach_domain::block`.

use coach_domain::{CandidateItem, Profile};

pub const INTAKE: &str = "\
You are a friendly fitness coach gathering a training profile. Ask for any of
these that are still missing: age, weight (kg), height (cm), gender (MALE,
FEMALE or OTHER), training goals, and current or past injuries. Optionally ask
about lifestyle and available equipment. Ask for at most two things per
message and keep the tone conversational.

After every reply, append the fields you learned in this exact shape:
<START_DATA>
<PROFILE_DATA>
age: 34
weight: 72.5
gender: MALE
goals: build strength
</PROFILE_DATA>
<END_DATA>
Include only fields the user actually stated. Never invent values. If nothing
new was learned, omit the block entirely.";

pub const QUERY_REWRITE: &str = "\
You turn a training profile and conversation into one search query for an
exercise catalogue. Respond with nothing but this block:
<START_DATA>
<QUERY_DATA>
{\"query\": \"beginner knee-safe leg strengthening\", \"exclude_body_parts\": [\"KNEES\"]}
</QUERY_DATA>
<END_DATA>
`exclude_body_parts` lists body parts that must not be loaded because of the
user's injuries; use an empty array when there are none.";

pub const RECOMMEND: &str = "\
You are a fitness coach assembling a workout from the numbered catalogue
extract in the user message. Pick three to six suitable entries, explain the
workout briefly and warmly, then append the plan in this exact shape:
<START_DATA>
<WORKOUT_DATA>
{\"exercises\": [{\"id\": \"ex_12\", \"reps\": 10, \"rest_secs\": 30}, {\"id\": \"ex_4\", \"duration_secs\": 60}]}
</WORKOUT_DATA>
<END_DATA>
Only use `id` values that appear in the extract. Give each entry either reps
or a duration in seconds, plus an optional rest. Order the entries as they
should be performed; repeat an id for additional sets.";

pub const SUMMARY: &str = "\
You are a fitness coach wrapping up a completed workout. The user message
contains the performed exercises and the reported results. Congratulate the
user, comment on volume and quality, and mention any reported form errors
with one short correction tip each. Plain prose only, no data blocks.";

pub fn candidate_listing(items: &[CandidateItem]) -> String {
	let mut out = String::new();

	for item in items {
		let id = item.external_id.as_deref().unwrap_or("unknown");

		out.push_str(&format!(
			"- id: {id} | {} | targets: {} | difficulty: {} | {}\n",
			item.title,
			item.body_parts.join(", "),
			item.difficulty.as_tag(),
			item.description,
		));
	}

	out
}

pub fn recommend_request(profile: &Profile, items: &[CandidateItem]) -> String {
	format!(
		"Training profile:\n{}\n\nCatalogue extract:\n{}",
		profile.summary_text(),
		candidate_listing(items),
	)
}
