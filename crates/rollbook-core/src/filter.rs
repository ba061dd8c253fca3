use crate::models::Document;

/// Query predicate over document fields.
///
/// Backends may translate a filter into their native query language, but the
/// result must agree with [`Filter::matches`].
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Everything,
    /// Exact match on a string field.
    Equals { field: String, value: String },
    /// Case-insensitive literal substring match on a string field.
    ContainsIgnoreCase { field: String, needle: String },
    Or(Vec<Filter>),
    And(Vec<Filter>),
}

impl Filter {
    pub fn equals(field: impl Into<String>, value: impl Into<String>) -> Self {
        Filter::Equals {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn contains(field: impl Into<String>, needle: impl Into<String>) -> Self {
        Filter::ContainsIgnoreCase {
            field: field.into(),
            needle: needle.into(),
        }
    }

    pub fn matches(&self, doc: &Document) -> bool {
        match self {
            Filter::Everything => true,
            Filter::Equals { field, value } => doc.text(field) == Some(value.as_str()),
            Filter::ContainsIgnoreCase { field, needle } => doc
                .text(field)
                .map(|text| text.to_lowercase().contains(&needle.to_lowercase()))
                .unwrap_or(false),
            Filter::Or(filters) => filters.iter().any(|f| f.matches(doc)),
            // an empty conjunction matches everything, mirroring `Everything`
            Filter::And(filters) => filters.iter().all(|f| f.matches(doc)),
        }
    }
}
