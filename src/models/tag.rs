use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A label attachable to receipts. `month` is an optional `YYYY-MM` scope;
/// a tag named "Renovation2023" with no month and one scoped to "2023-10"
/// are distinct tags.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub id: Uuid,
    pub name: String,
    pub month: Option<String>,
}

/// Tag identity. Modelled as a sum type rather than a nullable column so the
/// "no month" case can never be confused with an empty-string month by
/// accident; the store flattens it back to (name, NULL) at the edge.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TagKey {
    Unscoped(String),
    MonthScoped(String, String),
}

impl TagKey {
    /// Empty or missing month collapses to the unscoped key, matching how
    /// clients omit the field.
    pub fn new(name: impl Into<String>, month: Option<String>) -> Self {
        let name = name.into();
        match month.filter(|m| !m.trim().is_empty()) {
            Some(month) => TagKey::MonthScoped(name, month),
            None => TagKey::Unscoped(name),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            TagKey::Unscoped(name) | TagKey::MonthScoped(name, _) => name,
        }
    }

    pub fn month(&self) -> Option<&str> {
        match self {
            TagKey::Unscoped(_) => None,
            TagKey::MonthScoped(_, month) => Some(month),
        }
    }

    pub fn matches(&self, tag: &Tag) -> bool {
        tag.name == self.name() && tag.month.as_deref() == self.month()
    }
}
