//! Articles: parsing, identity resolution and seen history.

pub mod history;
pub mod id_resolver;
pub mod parser;
pub mod types;

pub use history::{hash_value, ArticleHistoryRepository};
pub use id_resolver::ArticleIdResolver;
pub use parser::{parse_articles, strip_html};
pub use types::Article;
