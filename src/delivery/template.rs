//! `{{field}}` placeholder rendering.
//!
//! Placeholders name an article field; unknown or empty fields render as
//! an empty string. An unterminated `{{` is kept as text.

use crate::article::Article;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment<'a> {
    Text(&'a str),
    Placeholder(&'a str),
}

fn segments(input: &str) -> Vec<Segment<'_>> {
    let mut out = Vec::new();
    let mut rest = input;

    while !rest.is_empty() {
        let Some(open) = rest.find("{{") else {
            out.push(Segment::Text(rest));
            break;
        };
        let Some(close) = rest[open + 2..].find("}}") else {
            out.push(Segment::Text(rest));
            break;
        };

        if open > 0 {
            out.push(Segment::Text(&rest[..open]));
        }
        out.push(Segment::Placeholder(rest[open + 2..open + 2 + close].trim()));
        rest = &rest[open + 2 + close + 2..];
    }

    out
}

/// Render `template` against the fields of `article`.
pub fn render(template: &str, article: &Article) -> String {
    let mut out = String::with_capacity(template.len());
    for segment in segments(template) {
        match segment {
            Segment::Text(text) => out.push_str(text),
            Segment::Placeholder(name) => out.push_str(article.get(name).unwrap_or_default()),
        }
    }
    out
}

/// Render an optional template.
pub fn render_opt(template: Option<&str>, article: &Article) -> Option<String> {
    template.map(|t| render(t, article))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn article() -> Article {
        Article::from_fields([("title", "X"), ("link", "https://example.com/x")])
    }

    #[test]
    fn test_render_replaces_fields() {
        assert_eq!(render("content {{title}}", &article()), "content X");
        assert_eq!(
            render("{{ title }} at {{link}}", &article()),
            "X at https://example.com/x"
        );
    }

    #[test]
    fn test_unresolved_placeholder_is_empty() {
        assert_eq!(render("a{{missing}}b", &article()), "ab");
        assert_eq!(render("{{}}", &article()), "");
    }

    #[test]
    fn test_unterminated_kept_as_text() {
        assert_eq!(render("{{title}} and {{oops", &article()), "X and {{oops");
        assert_eq!(render("no placeholders", &article()), "no placeholders");
        assert_eq!(render("", &article()), "");
    }
}
