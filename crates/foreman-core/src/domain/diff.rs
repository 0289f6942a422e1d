//! Structural diff between two serializable snapshots.
//!
//! Both sides go through `serde_json`, then the two JSON trees are walked
//! together. Each change is keyed by a JSON pointer path (`/target_state`,
//! `/resources/cpu`, `/tags/0`). Object keys are visited in sorted order so
//! the output is deterministic. Nothing here knows about jobs or services.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::errors::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeOp {
    Add,
    Remove,
    Replace,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldChange {
    pub op: ChangeOp,
    pub path: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub before: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub after: Option<Value>,
}

impl FieldChange {
    fn add(path: String, after: &Value) -> Self {
        Self {
            op: ChangeOp::Add,
            path,
            before: None,
            after: Some(after.clone()),
        }
    }

    fn remove(path: String, before: &Value) -> Self {
        Self {
            op: ChangeOp::Remove,
            path,
            before: Some(before.clone()),
            after: None,
        }
    }

    fn replace(path: String, before: &Value, after: &Value) -> Self {
        Self {
            op: ChangeOp::Replace,
            path,
            before: Some(before.clone()),
            after: Some(after.clone()),
        }
    }
}

/// Serialize both snapshots and diff them. Fails only on serialization.
pub fn compute<B, A>(before: &B, after: &A) -> Result<Vec<FieldChange>>
where
    B: Serialize + ?Sized,
    A: Serialize + ?Sized,
{
    let before = serde_json::to_value(before)?;
    let after = serde_json::to_value(after)?;
    Ok(diff_values(&before, &after))
}

pub fn diff_values(before: &Value, after: &Value) -> Vec<FieldChange> {
    let mut changes = Vec::new();
    walk(String::new(), before, after, &mut changes);
    changes
}

fn walk(path: String, before: &Value, after: &Value, out: &mut Vec<FieldChange>) {
    match (before, after) {
        (Value::Object(b), Value::Object(a)) => {
            let keys: BTreeSet<&String> = b.keys().chain(a.keys()).collect();
            for key in keys {
                let child = format!("{path}/{}", escape(key));
                match (b.get(key), a.get(key)) {
                    (Some(bv), Some(av)) => walk(child, bv, av, out),
                    (Some(bv), None) => out.push(FieldChange::remove(child, bv)),
                    (None, Some(av)) => out.push(FieldChange::add(child, av)),
                    (None, None) => {}
                }
            }
        }
        (Value::Array(b), Value::Array(a)) => {
            for index in 0..b.len().max(a.len()) {
                let child = format!("{path}/{index}");
                match (b.get(index), a.get(index)) {
                    (Some(bv), Some(av)) => walk(child, bv, av, out),
                    (Some(bv), None) => out.push(FieldChange::remove(child, bv)),
                    (None, Some(av)) => out.push(FieldChange::add(child, av)),
                    (None, None) => {}
                }
            }
        }
        _ if before == after => {}
        _ => out.push(FieldChange::replace(path, before, after)),
    }
}

// RFC 6901
fn escape(key: &str) -> String {
    key.replace('~', "~0").replace('/', "~1")
}
