use std::collections::{BTreeMap, BTreeSet};

use crate::transcoder::{TableRow, TypedValue};

/// Column names that collide with keywords of the table store's expression
/// language and so must go through a `#` placeholder.
const DEFAULT_RESERVED: &[&str] = &[
    "count", "date", "key", "length", "name", "owner", "size", "status", "time", "type", "value",
];

/// Case-insensitive set of reserved column names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReservedWords {
    words: BTreeSet<String>,
}

impl Default for ReservedWords {
    fn default() -> Self {
        Self {
            words: DEFAULT_RESERVED.iter().map(|word| word.to_string()).collect(),
        }
    }
}

impl ReservedWords {
    /// The built-in list plus `extra`.
    pub fn with_extra<I, S>(extra: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut words = Self::default();
        words.extend(extra);
        words
    }

    pub fn extend<I, S>(&mut self, extra: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.words.extend(
            extra
                .into_iter()
                .map(|word| word.as_ref().trim().to_ascii_lowercase())
                .filter(|word| !word.is_empty()),
        );
    }

    pub fn contains(&self, column: &str) -> bool {
        self.words.contains(&column.to_ascii_lowercase())
    }
}

/// A `SET` expression with its name and value placeholder tables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateExpression {
    pub expression: String,
    pub names: BTreeMap<String, String>,
    pub values: BTreeMap<String, TypedValue>,
}

impl UpdateExpression {
    /// Builds `SET #note = :note, #widgetType = :widgetType, ...` over every
    /// column of `row` except `key_column`.
    ///
    /// Every column goes through a `#` placeholder, so no column name ever
    /// appears bare in the expression. Reserved columns use `#widget<Name>`,
    /// other identifiers use their own name, and anything else uses `#col<N>`.
    /// A placeholder already taken gets a numeric suffix, so two columns never
    /// share one. Returns `None` when nothing is left to set.
    pub fn build(row: &TableRow, key_column: &str, reserved: &ReservedWords) -> Option<Self> {
        let mut assignments = Vec::new();
        let mut names = BTreeMap::new();
        let mut values = BTreeMap::new();

        for (index, (column, value)) in row
            .iter()
            .filter(|(column, _)| column.as_str() != key_column)
            .enumerate()
        {
            let stem = if reserved.contains(column) {
                format!("widget{}", capitalize(column))
            } else if is_plain_identifier(column) {
                column.clone()
            } else {
                format!("col{index}")
            };
            let stem = unclaimed(stem, &names);
            let (name_ref, value_ref) = (format!("#{stem}"), format!(":{stem}"));

            assignments.push(format!("{name_ref} = {value_ref}"));
            names.insert(name_ref, column.clone());
            values.insert(value_ref, value.clone());
        }

        if assignments.is_empty() {
            return None;
        }

        Some(Self {
            expression: format!("SET {}", assignments.join(", ")),
            names,
            values,
        })
    }
}

/// First of `stem`, `stem_2`, `stem_3`, ... not yet used as a `#` placeholder.
fn unclaimed(stem: String, names: &BTreeMap<String, String>) -> String {
    if !names.contains_key(&format!("#{stem}")) {
        return stem;
    }
    let mut suffix = 2;
    loop {
        let candidate = format!("{stem}_{suffix}");
        if !names.contains_key(&format!("#{candidate}")) {
            return candidate;
        }
        suffix += 1;
    }
}

fn is_plain_identifier(column: &str) -> bool {
    let mut chars = column.chars();
    matches!(chars.next(), Some(first) if first.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn capitalize(column: &str) -> String {
    let mut chars = column.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
