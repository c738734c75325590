use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDirection {
    #[default]
    Ascending,
    Descending,
}

/// One sort key: a property name and a direction.
///
/// Rendered as `prop` or `prop:desc` in the sort query parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortDescriptor {
    pub property: String,
    pub direction: SortDirection,
}

impl SortDescriptor {
    pub fn ascending(property: impl Into<String>) -> Self {
        Self {
            property: property.into(),
            direction: SortDirection::Ascending,
        }
    }

    pub fn descending(property: impl Into<String>) -> Self {
        Self {
            property: property.into(),
            direction: SortDirection::Descending,
        }
    }

    /// Parses `prop`, `prop:asc` or `prop:desc`. The direction is
    /// case-insensitive and anything other than `desc` sorts ascending.
    /// Returns `None` for an empty property.
    pub fn parse(expression: &str) -> Option<Self> {
        let (property, direction) = match expression.split_once(':') {
            Some((property, direction)) => (property, direction.trim()),
            None => (expression, ""),
        };
        let property = property.trim();
        if property.is_empty() {
            return None;
        }
        let direction = if direction.eq_ignore_ascii_case("desc") {
            SortDirection::Descending
        } else {
            SortDirection::Ascending
        };
        Some(Self {
            property: property.to_string(),
            direction,
        })
    }
}

impl fmt::Display for SortDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.direction {
            SortDirection::Ascending => f.write_str(&self.property),
            SortDirection::Descending => write!(f, "{}:desc", self.property),
        }
    }
}

/// Joins sort keys with commas.
pub fn format_sorts(sorts: &[SortDescriptor]) -> String {
    sorts
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

/// Splits a comma-separated sort expression, skipping empty entries.
pub fn parse_sorts(expression: &str) -> Vec<SortDescriptor> {
    expression.split(',').filter_map(SortDescriptor::parse).collect()
}
