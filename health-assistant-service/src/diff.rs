use serde_json::Value;

use crate::models::{Change, ChangeKind};

/// Recursively compare two profile trees and produce a typed change list.
///
/// Traversal covers only the keys present in `before`: top-level keys are
/// invariant across a request, so a key that exists only in `after` would
/// indicate a contract violation upstream and is not reported here.
pub fn diff_profiles(before: &Value, after: &Value) -> Vec<Change> {
    let mut changes = Vec::new();
    diff_value("", before, after, &mut changes);
    changes
}

fn diff_value(path: &str, before: &Value, after: &Value, out: &mut Vec<Change>) {
    match (before, after) {
        (Value::Object(before_map), Value::Object(after_map)) => {
            for (key, before_value) in before_map {
                let child_path = if path.is_empty() {
                    key.clone()
                } else {
                    format!("{path}.{key}")
                };
                let after_value = after_map.get(key).unwrap_or(&Value::Null);
                diff_value(&child_path, before_value, after_value, out);
            }
        }
        (Value::Array(before_items), Value::Array(after_items)) => {
            if before_items.len() == after_items.len() {
                if before_items != after_items {
                    push(out, path, before, after, ChangeKind::Modified);
                }
            } else if after_items.len() > before_items.len() {
                push(out, path, before, after, ChangeKind::Added);
            } else {
                push(out, path, before, after, ChangeKind::Removed);
            }
        }
        (b, a) => {
            if b != a {
                push(out, path, b, a, ChangeKind::Modified);
            }
        }
    }
}

fn push(out: &mut Vec<Change>, path: &str, before: &Value, after: &Value, kind: ChangeKind) {
    out.push(Change {
        path: path.to_string(),
        before: before.clone(),
        after: after.clone(),
        kind,
    });
}

/// Render a change list as the fixed block format fed to the summarizer.
pub fn format_changes(changes: &[Change]) -> String {
    changes
        .iter()
        .map(|c| {
            format!(
                "Field: {}\nBefore: {}\nAfter: {}\nType: {}",
                c.path, c.before, c.after, c.kind
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn identical_trees_yield_no_changes() {
        let tree = json!({"a": 1, "b": {"c": [1, 2]}});
        assert!(diff_profiles(&tree, &tree).is_empty());
    }

    #[test]
    fn scalar_difference_is_modified_with_dotted_path() {
        let before = json!({"treatment": {"sleepHours": 7}});
        let after = json!({"treatment": {"sleepHours": 9}});
        let changes = diff_profiles(&before, &after);
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].path, "treatment.sleepHours");
        assert_eq!(changes[0].before, json!(7));
        assert_eq!(changes[0].after, json!(9));
        assert_eq!(changes[0].kind, ChangeKind::Modified);
    }

    #[test]
    fn sequence_growth_is_added_and_shrink_is_removed() {
        let before = json!({"allergies": ["pollen"]});
        let grown = json!({"allergies": ["pollen", "penicillin"]});
        let shrunk = json!({"allergies": []});

        let added = diff_profiles(&before, &grown);
        assert_eq!(added.len(), 1);
        assert_eq!(added[0].kind, ChangeKind::Added);

        let removed = diff_profiles(&before, &shrunk);
        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].kind, ChangeKind::Removed);
    }

    #[test]
    fn equal_length_sequences_with_different_content_are_modified() {
        let before = json!({"medicationList": ["aspirin"]});
        let after = json!({"medicationList": ["ibuprofen"]});
        let changes = diff_profiles(&before, &after);
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].kind, ChangeKind::Modified);
    }

    #[test]
    fn traversal_covers_only_before_keys_in_order() {
        let before = json!({"a": 1, "b": 2});
        let after = json!({"a": 2, "b": 3, "brand_new": true});
        let changes = diff_profiles(&before, &after);
        let paths: Vec<&str> = changes.iter().map(|c| c.path.as_str()).collect();
        assert_eq!(paths, vec!["a", "b"]);
    }

    #[test]
    fn key_missing_in_after_reports_against_null() {
        let before = json!({"name": "A"});
        let after = json!({});
        let changes = diff_profiles(&before, &after);
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].after, Value::Null);
        assert_eq!(changes[0].kind, ChangeKind::Modified);
    }

    #[test]
    fn formatting_is_one_block_per_change() {
        let changes = diff_profiles(
            &json!({"a": 1, "b": [1]}),
            &json!({"a": 2, "b": [1, 2]}),
        );
        let text = format_changes(&changes);
        assert!(text.contains("Field: a"));
        assert!(text.contains("Type: modified"));
        assert!(text.contains("Type: added"));
        assert_eq!(text.matches("Field:").count(), 2);
    }
}
