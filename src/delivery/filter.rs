//! Connection filter evaluation.

use serde_json::Value;

use crate::article::Article;

/// Decides whether an article passes a connection's filter expression.
pub trait FilterEvaluator: Send + Sync {
    fn passes(&self, article: &Article, expression: &Value) -> bool;
}

/// Evaluator that lets every article through.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAll;

impl FilterEvaluator for AcceptAll {
    fn passes(&self, _article: &Article, _expression: &Value) -> bool {
        true
    }
}

/// Whether `article` passes the optional `filters` of a medium.
///
/// Absent or null filters always pass.
pub fn passes_filters(evaluator: &dyn FilterEvaluator, article: &Article, filters: Option<&Value>) -> bool {
    match filters {
        None | Some(Value::Null) => true,
        Some(expression) => evaluator.passes(article, expression),
    }
}
