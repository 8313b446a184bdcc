use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Type-tag fragments that mark a column as numeric. Substring match, so
/// "uint8", "Int64" and "decimal128(10,2)" all qualify.
const NUMERIC_TYPE_TOKENS: [&str; 4] = ["int", "float", "double", "decimal"];

const KNOWN_OPERATORS: [&str; 5] = ["=", ">", "<", ">=", "<="];

/// Filter capability of a column, resolved once when the schema is loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    NUMERIC,
    TEXT,
}

impl ColumnKind {
    pub fn classify(type_tag: &str) -> Self {
        let tag = type_tag.to_lowercase();
        if NUMERIC_TYPE_TOKENS.iter().any(|t| tag.contains(t)) {
            ColumnKind::NUMERIC
        } else {
            ColumnKind::TEXT
        }
    }
}

/// A per-column predicate, applied server-side before pagination. The wire
/// shape is `{"kind":"number","operator":">=","value":"90"}` or
/// `{"kind":"text","value":"alice"}`; the operand stays a string, numeric
/// parsing is the backend's concern.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Filter {
    Number { operator: String, value: String },
    Text { value: String },
}

impl Filter {
    /// The raw text that would reproduce this filter when committed again.
    pub fn input_text(&self) -> String {
        match self {
            Filter::Number { operator, value } => format!("{operator}{value}"),
            Filter::Text { value } => value.clone(),
        }
    }
}

/// Active filters keyed by column name; at most one per column.
pub type FilterSet = BTreeMap<String, Filter>;

/// Outcome of parsing one committed filter input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterUpdate {
    Set(Filter),
    /// Blank input: the column's filter is removed.
    Clear,
    /// Input a numeric column cannot express. Dropped without touching the
    /// filter map, never an error.
    Ignored,
}

pub fn parse(raw: &str, kind: ColumnKind) -> FilterUpdate {
    if raw.trim().is_empty() {
        return FilterUpdate::Clear;
    }
    match kind {
        ColumnKind::TEXT => FilterUpdate::Set(Filter::Text {
            value: raw.to_string(),
        }),
        ColumnKind::NUMERIC => {
            // Optional leading operator run over '>', '<', '=' (all ASCII,
            // so the char count is a valid byte offset), then the operand.
            let run = raw.chars().take_while(|c| matches!(c, '>' | '<' | '=')).count();
            let (op_run, rest) = raw.split_at(run);
            let operator = if op_run.is_empty() { "=" } else { op_run };
            let value = rest.trim();
            if value.is_empty() || !KNOWN_OPERATORS.contains(&operator) {
                debug!("Dropping unparsable numeric filter input {raw:?}");
                return FilterUpdate::Ignored;
            }
            FilterUpdate::Set(Filter::Number {
                operator: operator.to_string(),
                value: value.to_string(),
            })
        }
    }
}
