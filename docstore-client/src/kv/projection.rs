//! Reassembling projected paths into a single JSON document.

use serde_json::{Map, Value};

use docstore_core::{DocstoreError, Result};

/// One step of a sub-document path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Segment {
    Field(String),
    Index(usize),
    /// `[-n]`: the n-th element counted from the end, n >= 1.
    FromEnd(usize),
}

/// Splits `a.b[2].c` into fields and array indexes. `[-1]` addresses the last element.
pub(crate) fn parse_path(path: &str) -> Result<Vec<Segment>> {
    let invalid = || DocstoreError::Configuration(format!("invalid projection path: {path:?}"));
    if path.is_empty() {
        return Err(invalid());
    }

    let mut segments = Vec::new();
    for part in path.split('.') {
        let (field, mut rest) = match part.find('[') {
            Some(open) => part.split_at(open),
            None => (part, ""),
        };
        if field.is_empty() && segments.is_empty() && rest.is_empty() {
            return Err(invalid());
        }
        if !field.is_empty() {
            segments.push(Segment::Field(field.to_string()));
        } else if rest.is_empty() {
            return Err(invalid());
        }
        while !rest.is_empty() {
            let close = rest.find(']').ok_or_else(invalid)?;
            let index = &rest[1..close];
            let segment = match index.strip_prefix('-') {
                Some(back) => match back.parse::<usize>() {
                    Ok(n) if n > 0 => Segment::FromEnd(n),
                    _ => return Err(invalid()),
                },
                None => Segment::Index(index.parse::<usize>().map_err(|_| invalid())?),
            };
            segments.push(segment);
            rest = &rest[close + 1..];
            if !rest.is_empty() && !rest.starts_with('[') {
                return Err(invalid());
            }
        }
    }
    Ok(segments)
}

/// Places `value` at `path` inside `root`, creating objects and arrays on the way.
///
/// Returns false, leaving `root` untouched, if the path collides with a value
/// already placed (for example `a` followed by `a.b`).
pub(crate) fn insert_path(root: &mut Value, path: &[Segment], value: Value) -> bool {
    if !can_insert(root, path) {
        return false;
    }

    let mut node = root;
    for (i, segment) in path.iter().enumerate() {
        let last = i + 1 == path.len();
        let next = path.get(i + 1);
        node = match segment {
            Segment::Field(name) => {
                if node.is_null() {
                    *node = Value::Object(Map::new());
                }
                let Value::Object(map) = node else { return false };
                let slot = map.entry(name.clone()).or_insert(Value::Null);
                if last {
                    *slot = value;
                    return true;
                }
                init_container(slot, next);
                slot
            }
            Segment::Index(_) | Segment::FromEnd(_) => {
                if node.is_null() {
                    *node = Value::Array(Vec::new());
                }
                let Value::Array(items) = node else { return false };
                // Only the addressed element is fetched, so a counted-from-end
                // element is appended after whatever was placed before it.
                let index = match segment {
                    Segment::Index(index) => *index,
                    _ => items.len(),
                };
                if items.len() <= index {
                    items.resize(index + 1, Value::Null);
                }
                let slot = &mut items[index];
                if last {
                    *slot = value;
                    return true;
                }
                init_container(slot, next);
                slot
            }
        };
    }
    false
}

fn init_container(slot: &mut Value, next: Option<&Segment>) {
    if slot.is_null() {
        *slot = match next {
            Some(Segment::Index(_) | Segment::FromEnd(_)) => Value::Array(Vec::new()),
            _ => Value::Object(Map::new()),
        };
    }
}

fn can_insert(root: &Value, path: &[Segment]) -> bool {
    let mut node = root;
    for (i, segment) in path.iter().enumerate() {
        let last = i + 1 == path.len();
        let child = match (segment, node) {
            (_, Value::Null) => return true,
            (Segment::Field(name), Value::Object(map)) => map.get(name),
            (Segment::Index(index), Value::Array(items)) => items.get(*index),
            (Segment::FromEnd(_), Value::Array(_)) => return true,
            _ => return false,
        };
        match child {
            None | Some(Value::Null) => return true,
            Some(_) if last => return false,
            Some(existing) => node = existing,
        }
    }
    false
}

/// Looks up `path` inside `document`.
pub(crate) fn extract_path<'a>(document: &'a Value, path: &[Segment]) -> Option<&'a Value> {
    path.iter().try_fold(document, |node, segment| match segment {
        Segment::Field(name) => node.get(name.as_str()),
        Segment::Index(index) => node.get(*index),
        Segment::FromEnd(n) => {
            let items = node.as_array()?;
            items.get(items.len().checked_sub(*n)?)
        }
    })
}
