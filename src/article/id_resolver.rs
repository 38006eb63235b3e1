//! Article identity resolution.
//!
//! Feeds often lack a stable identifier, so the key scheme is chosen per
//! batch: each candidate field (and each pair of candidate fields) stays
//! usable while it is present and unique across the batch.

use std::collections::{HashMap, HashSet};

use super::types::Article;

/// Separator between the fields of a merged scheme name.
pub const MERGED_SEPARATOR: char = ',';

/// Per-batch identifier scheme selection.
#[derive(Debug, Clone)]
pub struct ArticleIdResolver {
    /// Base schemes in rank order followed by merged pairs in rank order.
    candidates: Vec<String>,
    base_count: usize,
    usable: HashSet<String>,
    recorded: HashMap<String, HashSet<String>>,
    failed: Vec<String>,
}

impl ArticleIdResolver {
    /// Create a resolver for ranked `names`. Duplicate names are ignored.
    pub fn new<S: AsRef<str>>(names: &[S]) -> Self {
        let mut base: Vec<String> = Vec::with_capacity(names.len());
        for name in names {
            let name = name.as_ref().trim();
            if !name.is_empty() && !base.iter().any(|b| b == name) {
                base.push(name.to_string());
            }
        }

        let mut candidates = base.clone();
        for i in 0..base.len() {
            for j in (i + 1)..base.len() {
                candidates.push(format!("{}{}{}", base[i], MERGED_SEPARATOR, base[j]));
            }
        }

        Self {
            usable: candidates.iter().cloned().collect(),
            recorded: candidates
                .iter()
                .map(|c| (c.clone(), HashSet::new()))
                .collect(),
            base_count: base.len(),
            candidates,
            failed: Vec::new(),
        }
    }

    /// Record one article of the batch, retiring every scheme whose value is
    /// missing or repeats an earlier article.
    pub fn record_article(&mut self, article: &Article) {
        for id_type in &self.candidates {
            if !self.usable.contains(id_type) {
                continue;
            }

            let value = Self::id_type_value(article, id_type);
            let seen = self.recorded.entry(id_type.clone()).or_default();
            if value.is_empty() || seen.contains(&value) {
                self.usable.remove(id_type);
                self.failed.push(id_type.clone());
            } else {
                seen.insert(value);
            }
        }
    }

    /// The scheme to key this batch by.
    ///
    /// The best usable base scheme, else the first usable merged scheme, else
    /// the scheme that failed last. `None` only for an empty candidate list.
    pub fn id_type(&self) -> Option<&str> {
        let (base, merged) = self.candidates.split_at(self.base_count);
        base.iter()
            .chain(merged.iter())
            .find(|c| self.usable.contains(*c))
            .or_else(|| self.failed.last())
            .map(String::as_str)
    }

    /// Value of `id_type` for an article. Merged schemes concatenate their
    /// fields and are empty when any field is missing.
    pub fn id_type_value(article: &Article, id_type: &str) -> String {
        if !id_type.contains(MERGED_SEPARATOR) {
            return article.get(id_type).unwrap_or_default().to_string();
        }

        let mut value = String::new();
        for field in id_type.split(MERGED_SEPARATOR) {
            match article.get(field) {
                Some(part) => value.push_str(part),
                None => return String::new(),
            }
        }
        value
    }

    /// Usable schemes in rank order.
    pub fn usable_id_types(&self) -> Vec<&str> {
        self.candidates
            .iter()
            .filter(|c| self.usable.contains(*c))
            .map(String::as_str)
            .collect()
    }

    /// Schemes retired in this batch, in the order they failed.
    pub fn failed_id_types(&self) -> &[String] {
        &self.failed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolver() -> ArticleIdResolver {
        ArticleIdResolver::new(&["guid", "pubdate", "title"])
    }

    fn article(guid: &str, pubdate: &str, title: &str) -> Article {
        Article::from_fields([("guid", guid), ("pubdate", pubdate), ("title", title)])
    }

    #[test]
    fn test_usable_set_includes_pairs() {
        let resolver = resolver();
        assert_eq!(
            resolver.usable_id_types(),
            vec![
                "guid",
                "pubdate",
                "title",
                "guid,pubdate",
                "guid,title",
                "pubdate,title"
            ]
        );

        for n in 0..6usize {
            let names: Vec<String> = (0..n).map(|i| format!("f{i}")).collect();
            let resolver = ArticleIdResolver::new(&names);
            assert_eq!(resolver.usable_id_types().len(), n + n * (n.saturating_sub(1)) / 2);
        }
    }

    #[test]
    fn test_duplicate_names_ignored() {
        let resolver = ArticleIdResolver::new(&["guid", "guid", "title"]);
        assert_eq!(resolver.usable_id_types(), vec!["guid", "title", "guid,title"]);
    }

    #[test]
    fn test_merged_value_concatenates() {
        let article = Article::from_fields([("first", "doe"), ("last", "joe")]);
        assert_eq!(
            ArticleIdResolver::id_type_value(&article, "first,last"),
            "doejoe"
        );
        assert_eq!(ArticleIdResolver::id_type_value(&article, "first"), "doe");
        assert_eq!(
            ArticleIdResolver::id_type_value(&article, "first,missing"),
            ""
        );
        assert_eq!(ArticleIdResolver::id_type_value(&article, "missing"), "");
    }

    #[test]
    fn test_collision_fails_scheme_once() {
        let mut resolver = resolver();
        resolver.record_article(&article("1", "mon", "Same"));
        resolver.record_article(&article("2", "tue", "Same"));
        resolver.record_article(&article("3", "wed", "Same"));

        assert_eq!(resolver.failed_id_types(), &["title".to_string()]);
        assert!(!resolver.usable_id_types().contains(&"title"));
        assert_eq!(resolver.id_type(), Some("guid"));
    }

    #[test]
    fn test_missing_value_fails_scheme() {
        let mut resolver = resolver();
        resolver.record_article(&article("", "mon", "A"));

        assert!(resolver.failed_id_types().contains(&"guid".to_string()));
        assert!(resolver.failed_id_types().contains(&"guid,pubdate".to_string()));
        assert!(resolver.failed_id_types().contains(&"guid,title".to_string()));
        assert_eq!(resolver.id_type(), Some("pubdate"));
    }

    #[test]
    fn test_base_preferred_over_merged() {
        let mut resolver = resolver();
        // guid missing, pubdate and title collide on their own but not together
        resolver.record_article(&article("", "mon", "A"));
        resolver.record_article(&article("", "mon", "B"));
        resolver.record_article(&article("", "tue", "A"));

        assert_eq!(resolver.usable_id_types(), vec!["pubdate,title"]);
        assert_eq!(resolver.id_type(), Some("pubdate,title"));
    }

    #[test]
    fn test_falls_back_to_last_failed() {
        let mut resolver = ArticleIdResolver::new(&["guid", "title"]);
        resolver.record_article(&Article::from_fields([("title", "A")]));
        resolver.record_article(&Article::from_fields([("title", "A")]));

        assert!(resolver.usable_id_types().is_empty());
        assert_eq!(
            resolver.failed_id_types(),
            &["guid".to_string(), "guid,title".to_string(), "title".to_string()]
        );
        assert_eq!(resolver.id_type(), Some("title"));
    }

    #[test]
    fn test_empty_batch_and_empty_names() {
        assert_eq!(resolver().id_type(), Some("guid"));
        let empty: [&str; 0] = [];
        assert_eq!(ArticleIdResolver::new(&empty).id_type(), None);
    }
}
