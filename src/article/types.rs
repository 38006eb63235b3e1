//! Article type.

use std::collections::BTreeMap;

use serde::Serialize;

/// A parsed feed entry as a flat map of named text fields.
///
/// Missing fields and empty values are equivalent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Article {
    fields: BTreeMap<String, String>,
}

impl Article {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an article from `(name, value)` pairs.
    pub fn from_fields<I, K, V>(fields: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut article = Self::new();
        for (name, value) in fields {
            article.set(name, value);
        }
        article
    }

    /// Set a field. Empty values remove the field.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        if value.is_empty() {
            self.fields.remove(&name);
        } else {
            self.fields.insert(name, value);
        }
    }

    /// Value of a field, `None` when absent or empty.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    /// Resolved dedup key, set after identity resolution.
    pub fn id(&self) -> Option<&str> {
        self.get("id")
    }

    pub fn fields(&self) -> &BTreeMap<String, String> {
        &self.fields
    }
}
