use agent_flow::{Context, NextAction, Task, TaskResult};
use async_trait::async_trait;
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::{info, warn};

use super::utils::{get_state, put_state, summarize_changes};
use crate::diff::diff_profiles;
use crate::llm::LlmGateway;
use crate::models::{AnswerSource, UpdateEntry, now_stamp};

const TOOL_SELECT_PREAMBLE: &str = r#"You select the tool that handles a patient-profile request.

Tools:
- read_patient_profile: return the patient profile as currently stored, without modification.
- update_patient_profile: apply the change the user asked for to existing profile fields.

Respond with exactly one tool name and nothing else."#;

const UPDATE_PREAMBLE: &str = r#"You update a patient profile JSON object according to the user's request.

Rules:
- Update only fields that already exist in the profile.
- Items may be appended to existing lists; keep existing items and their order unless the user asked to remove one.
- Adding entirely new fields is forbidden. If the request needs a field that does not exist, return the original profile unchanged.
- Always return valid JSON with double-quoted keys, preserving the structure of the input.
- Return only the JSON object, nothing else."#;

#[derive(Debug, PartialEq)]
enum ProfileOp {
    Read,
    Update,
}

/// Patient-profile node: a secondary LLM call picks read vs update; the
/// update path runs the guarded LLM rewrite, diffs before/after, and
/// appends one summarized update entry. The `recommendations` subtrees are
/// invisible to the LLM throughout and reinjected positionally afterwards.
pub struct ProfileToolTask {
    llm: Arc<LlmGateway>,
}

impl ProfileToolTask {
    pub fn new(llm: Arc<LlmGateway>) -> Self {
        Self { llm }
    }

    async fn select_operation(&self, utterance: &str) -> ProfileOp {
        match self.llm.complete(TOOL_SELECT_PREAMBLE, utterance, 0.0).await {
            Ok(answer) if answer.to_lowercase().contains("update_patient_profile") => {
                ProfileOp::Update
            }
            Ok(_) => ProfileOp::Read,
            Err(e) => {
                warn!(error = %e, "tool selection failed, defaulting to read");
                ProfileOp::Read
            }
        }
    }
}

#[async_trait]
impl Task for ProfileToolTask {
    fn id(&self) -> &str {
        std::any::type_name::<Self>()
    }

    async fn run(&self, context: Context) -> agent_flow::Result<TaskResult> {
        let mut state = get_state(&context).await?;

        if self.select_operation(&state.input).await == ProfileOp::Read {
            info!("profile read requested, state returned unchanged");
            context.emit("profile_read", json!({}));
            return Ok(TaskResult::new(None, NextAction::End));
        }

        let before = Value::Object(state.patient_profile.clone());

        // The protected subtrees never reach the LLM.
        let mut visible = before.clone();
        let protected = strip_recommendations(&mut visible);

        let user_prompt = format!(
            "Current patient profile:\n{visible}\n\nUser request:\n{}\n\nReturn the full updated profile JSON.",
            state.input
        );

        let after = match self.llm.complete(UPDATE_PREAMBLE, &user_prompt, 0.0).await {
            Ok(completion) => {
                let mut updated = extract_json_object(&completion)
                    .and_then(|raw| serde_json::from_str::<Value>(raw).ok())
                    .filter(Value::is_object)
                    .unwrap_or_else(|| {
                        warn!("no parseable profile object in completion, keeping original");
                        visible.clone()
                    });
                if introduces_new_keys(&visible, &updated) {
                    warn!("completion introduced new top-level fields, keeping original");
                    updated = visible.clone();
                }
                reinject_recommendations(&mut updated, protected);
                updated
            }
            Err(e) => {
                warn!(error = %e, "profile update completion failed");
                state.error = Some(e.to_string());
                before.clone()
            }
        };

        let changes = diff_profiles(&before, &after);
        info!(changes = changes.len(), "profile update diffed");

        if let Value::Object(map) = after {
            state.patient_profile = map;
        }
        state.final_answer = None;
        state.source = Some(AnswerSource::Patient);

        if !changes.is_empty() {
            match summarize_changes(&self.llm, &changes).await {
                Ok(summary) if !summary.is_empty() => {
                    context.emit(
                        "profile_updated",
                        json!({ "summary": summary, "changes": changes.len() }),
                    );
                    state.updates.push(UpdateEntry {
                        datetime: now_stamp(),
                        text: summary,
                    });
                }
                Ok(_) => {}
                // Fails open: the mutation stands, no update entry is logged.
                Err(e) => warn!(error = %e, "change summarization failed"),
            }
        }

        put_state(&context, &state).await;
        Ok(TaskResult::new(None, NextAction::End))
    }
}

/// First balanced `{...}` substring, string-aware.
pub fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, c) in text[start..].char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' if in_string => escaped = true,
            '"' => in_string = !in_string,
            '{' if !in_string => depth += 1,
            '}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Remove every `recommendations` entry from the tree, returning the removed
/// subtrees keyed by their structural path so they can be reinjected
/// positionally.
pub fn strip_recommendations(value: &mut Value) -> Vec<(String, Value)> {
    let mut removed = Vec::new();
    strip_inner("", value, &mut removed);
    removed
}

fn strip_inner(path: &str, value: &mut Value, removed: &mut Vec<(String, Value)>) {
    match value {
        Value::Object(map) => {
            if let Some(subtree) = map.remove("recommendations") {
                removed.push((join_path(path, "recommendations"), subtree));
            }
            for (key, child) in map.iter_mut() {
                strip_inner(&join_path(path, key), child, removed);
            }
        }
        Value::Array(items) => {
            for (index, child) in items.iter_mut().enumerate() {
                strip_inner(&format!("{path}[{index}]"), child, removed);
            }
        }
        _ => {}
    }
}

pub fn reinject_recommendations(value: &mut Value, removed: Vec<(String, Value)>) {
    for (path, subtree) in removed {
        if set_path(value, &path, subtree).is_none() {
            warn!(path = %path, "protected subtree position no longer exists");
        }
    }
}

fn join_path(path: &str, key: &str) -> String {
    if path.is_empty() {
        key.to_string()
    } else {
        format!("{path}.{key}")
    }
}

fn set_path(root: &mut Value, path: &str, value: Value) -> Option<()> {
    let (parent_path, key) = match path.rsplit_once('.') {
        Some((parent, key)) => (Some(parent), key),
        None => (None, path),
    };
    let parent = match parent_path {
        Some(p) => navigate_mut(root, p)?,
        None => root,
    };
    parent.as_object_mut()?.insert(key.to_string(), value);
    Some(())
}

fn navigate_mut<'a>(root: &'a mut Value, path: &str) -> Option<&'a mut Value> {
    let mut current = root;
    for segment in path.split('.') {
        let (name, indices) = parse_segment(segment);
        if !name.is_empty() {
            current = current.get_mut(name)?;
        }
        for index in indices {
            current = current.get_mut(index)?;
        }
    }
    Some(current)
}

fn parse_segment(segment: &str) -> (&str, Vec<usize>) {
    match segment.find('[') {
        None => (segment, Vec::new()),
        Some(pos) => {
            let indices = segment[pos..]
                .trim_matches(|c| c == '[' || c == ']')
                .split("][")
                .filter_map(|s| s.parse().ok())
                .collect();
            (&segment[..pos], indices)
        }
    }
}

fn introduces_new_keys(before: &Value, after: &Value) -> bool {
    match (before, after) {
        (Value::Object(before_map), Value::Object(after_map)) => after_map
            .keys()
            .any(|key| !before_map.contains_key(key)),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn extracts_first_balanced_object() {
        let text = "Sure, here is the profile:\n```json\n{\"a\": {\"b\": 1}}\n``` trailing { noise";
        assert_eq!(extract_json_object(text), Some(r#"{"a": {"b": 1}}"#));
    }

    #[test]
    fn extraction_ignores_braces_inside_strings() {
        let text = r#"{"note": "braces } inside { strings", "n": 1} {"second": 2}"#;
        assert_eq!(
            extract_json_object(text),
            Some(r#"{"note": "braces } inside { strings", "n": 1}"#)
        );
    }

    #[test]
    fn extraction_fails_on_unbalanced_input() {
        assert_eq!(extract_json_object("no object here"), None);
        assert_eq!(extract_json_object(r#"{"open": true"#), None);
    }

    #[test]
    fn strip_and_reinject_round_trips_flat_profile() {
        let mut profile = json!({
            "uid": "u1",
            "recommendations": ["drink water"],
            "sleepHours": 7
        });
        let original = profile.clone();

        let removed = strip_recommendations(&mut profile);
        assert_eq!(removed.len(), 1);
        assert!(profile.get("recommendations").is_none());

        reinject_recommendations(&mut profile, removed);
        assert_eq!(profile, original);
    }

    #[test]
    fn strip_covers_nested_treatment_entries_positionally() {
        let mut profile = json!({
            "treatments": [
                { "name": "a", "recommendations": ["r1"] },
                { "name": "b", "recommendations": ["r2"] }
            ]
        });
        let original = profile.clone();

        let removed = strip_recommendations(&mut profile);
        assert_eq!(removed.len(), 2);
        assert_eq!(removed[0].0, "treatments[0].recommendations");
        assert_eq!(removed[1].0, "treatments[1].recommendations");

        reinject_recommendations(&mut profile, removed);
        assert_eq!(profile, original);
    }

    #[test]
    fn reinjection_survives_value_edits_elsewhere() {
        let mut profile = json!({ "recommendations": ["keep me"], "sleepHours": 7 });
        let removed = strip_recommendations(&mut profile);

        // Simulate the LLM editing the visible profile.
        profile["sleepHours"] = json!(9);

        reinject_recommendations(&mut profile, removed);
        assert_eq!(profile["recommendations"], json!(["keep me"]));
        assert_eq!(profile["sleepHours"], json!(9));
    }

    #[test]
    fn new_top_level_keys_are_detected() {
        let before = json!({"a": 1});
        assert!(introduces_new_keys(&before, &json!({"a": 1, "b": 2})));
        assert!(!introduces_new_keys(&before, &json!({"a": 2})));
    }
}
