//! Wildcard lookup tables deriving one variable from others.
use crate::scope::VariableScope;
use serde::{Deserialize, Serialize};

/// Matches any value in an input column.
pub const WILDCARD: &str = "*";

pub const MALFORMED_VARIABLES: &str = "<malformed variables>";
pub const MALFORMED_TABLE: &str = "<malformed table>";
pub const UNDEFINED: &str = "<undefined>";

// One rank bit per input column.
const MAX_INPUTS: usize = u64::BITS as usize;

/// A lookup table deriving one output variable from a set of input variables.
///
/// `names` lists the input variables followed by the output variable. `table` is flat: every
/// `names.len()` consecutive cells form a row, inputs first and output last.
///
/// ```rust
/// use standin::{MappingRule, VariableScope};
///
/// let rule = MappingRule::new(
///     vec!["X".into(), "Y".into(), "Z".into()],
///     ["foo", "bar", "123", "foo", "*", "234", "*", "bar", "345", "*", "*", "456"]
///         .iter()
///         .map(|s| s.to_string())
///         .collect(),
/// );
///
/// let mut scope = VariableScope::new();
/// scope.insert("X", "foo");
/// scope.insert("Y", "tt");
///
/// assert_eq!(rule.lookup(&scope), ("Z".to_string(), "234".to_string()));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingRule {
    #[serde(rename = "vars")]
    names: Vec<String>,
    table: Vec<String>,
}

impl MappingRule {
    pub fn new(names: Vec<String>, table: Vec<String>) -> Self {
        Self { names, table }
    }

    /// The name of the variable this rule produces.
    pub fn output_name(&self) -> &str {
        self.names.last().map(String::as_str).unwrap_or_default()
    }

    /// Resolve the output variable against `scope`.
    ///
    /// Never fails: malformed rules, missing inputs and tables without a matching row all
    /// produce a diagnostic value instead (see the `MALFORMED_*` and [`UNDEFINED`] constants).
    pub fn lookup(&self, scope: &VariableScope) -> (String, String) {
        let output = self.output_name().to_string();
        let width = self.names.len();
        if width < 2 || width - 1 > MAX_INPUTS {
            return (output, MALFORMED_VARIABLES.to_string());
        }
        if self.table.len() % width != 0 {
            return (output, MALFORMED_TABLE.to_string());
        }

        let inputs = &self.names[..width - 1];
        let mut values = Vec::with_capacity(inputs.len());
        for name in inputs {
            match scope.get(name) {
                Some(value) => values.push(value),
                None => return (output, format!("<missing variable {}>", name)),
            }
        }

        let mut candidates: Vec<(&[String], u64)> =
            self.table.chunks(width).map(|row| (row, 0)).collect();
        for (column, value) in values.iter().enumerate() {
            let bit = 1u64 << (inputs.len() - 1 - column);
            candidates.retain_mut(|(row, rank)| {
                if row[column] == *value {
                    *rank |= bit;
                    true
                } else {
                    row[column] == WILDCARD
                }
            });
        }

        let mut best: Option<(&[String], u64)> = None;
        for (row, rank) in candidates {
            if best.map_or(true, |(_, best_rank)| rank > best_rank) {
                best = Some((row, rank));
            }
        }

        match best {
            Some((row, _)) => (output, row[width - 1].clone()),
            None => (output, UNDEFINED.to_string()),
        }
    }
}
