use std::collections::HashMap;
use std::sync::Arc;

use crate::error::MetricError;

/// A named label dimension constrained to a fixed, registration-time set of
/// allowed values. Field values may not contain `,`, the reserved
/// key delimiter.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct Field {
    pub name: String,
    pub allowed_values: Vec<String>,
}

impl Field {
    pub fn new(
        name: impl Into<String>,
        allowed_values: impl IntoIterator<Item = impl Into<String>>,
    ) -> Result<Self, MetricError> {
        let name = name.into();
        let allowed_values: Vec<String> = allowed_values.into_iter().map(Into::into).collect();
        for value in &allowed_values {
            if value.contains(',') {
                return Err(MetricError::FieldValueContainsIllegalChar {
                    field: name,
                    value: value.clone(),
                });
            }
        }
        Ok(Self {
            name,
            allowed_values,
        })
    }
}

/// Join the given field values into the canonical comma-delimited key.
/// Field values must not contain commas (enforced at [`Field`] construction).
pub fn multi_field_to_key(values: &[&str]) -> String {
    values.join(",")
}

/// Split a canonical key back into its constituent field values. The
/// inverse of [`multi_field_to_key`]; an empty key round-trips to an empty
/// vector.
pub fn key_to_multi_field(key: &str) -> Vec<String> {
    if key.is_empty() {
        Vec::new()
    } else {
        key.split(',').map(str::to_string).collect()
    }
}

#[derive(Debug)]
enum Node {
    Leaf(Arc<str>),
    Branch(HashMap<String, Node>),
}

/// Eagerly built allowed-value tree mapping a tuple of field values to a
/// stable key string, with zero allocation on lookup.
///
/// Construction is recursive (runs once at registration); lookup is an
/// explicit loop (runs on the hot path) — the two are deliberately kept
/// separate so the hot path never pays for recursion.
#[derive(Debug)]
pub struct FieldMapper {
    depth: usize,
    root: Node,
}

impl FieldMapper {
    pub fn new(fields: &[Field]) -> Self {
        Self {
            depth: fields.len(),
            root: Self::build(fields, ""),
        }
    }

    fn build(fields: &[Field], prefix: &str) -> Node {
        let Some((field, rest)) = fields.split_first() else {
            return Node::Leaf(Arc::from(prefix));
        };
        let mut branch = HashMap::with_capacity(field.allowed_values.len());
        for value in &field.allowed_values {
            let child_prefix = if prefix.is_empty() {
                value.clone()
            } else {
                format!("{prefix},{value}")
            };
            branch.insert(value.clone(), Self::build(rest, &child_prefix));
        }
        Node::Branch(branch)
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Descend the tree with exactly `depth` values, returning the leaf key.
    /// Panics on a depth mismatch or an unknown value — both are static
    /// wiring bugs.
    pub fn lookup(&self, values: &[&str]) -> &str {
        self.lookup_concat(values, &[])
    }

    /// Equivalent to `lookup(a ++ b)`, accepting two slices so callers never
    /// need to allocate a concatenation on the hot path. Used by
    /// [`crate::timer::Timer`]'s partial/extra field split.
    pub fn lookup_concat(&self, a: &[&str], b: &[&str]) -> &str {
        let mut node = &self.root;
        for value in a.iter().chain(b.iter()) {
            match node {
                Node::Branch(children) => {
                    node = children
                        .get(*value)
                        .unwrap_or_else(|| panic!("unknown field value {value:?}"));
                }
                Node::Leaf(_) => panic!("too many field values supplied to FieldMapper::lookup"),
            }
        }
        match node {
            Node::Leaf(key) => key,
            Node::Branch(_) => panic!("too few field values supplied to FieldMapper::lookup"),
        }
    }

    /// Iterate every leaf key. Used only at registration time to pre-size
    /// distribution sample arrays.
    pub fn enumerate(&self) -> Vec<String> {
        let mut keys = Vec::new();
        Self::collect_leaves(&self.root, &mut keys);
        keys
    }

    fn collect_leaves(node: &Node, out: &mut Vec<String>) {
        match node {
            Node::Leaf(key) => out.push(key.to_string()),
            Node::Branch(children) => {
                for child in children.values() {
                    Self::collect_leaves(child, out);
                }
            }
        }
    }
}
