//! Feed body parsing.

use feed_rs::model::Entry;
use feed_rs::parser;

use super::types::Article;
use crate::{RelayError, Result};

/// Maximum length of text fields taken from entry bodies.
pub const MAX_TEXT_LENGTH: usize = 10_000;

/// Parse an RSS or Atom body into articles, in feed order.
///
/// Entries without an identifier keep an empty `guid` instead of a
/// generated one, so identity resolution can fall back to other fields.
pub fn parse_articles(body: &[u8]) -> Result<Vec<Article>> {
    let feed = parser::Builder::new()
        .id_generator(|_, _, _| String::new())
        .build()
        .parse(body)
        .map_err(|e| RelayError::Parse(format!("failed to parse feed: {}", e)))?;

    Ok(feed.entries.into_iter().map(entry_to_article).collect())
}

fn entry_to_article(entry: Entry) -> Article {
    let mut article = Article::new();

    article.set("guid", entry.id.trim());
    if let Some(title) = entry.title {
        article.set("title", strip_html(&title.content));
    }
    if let Some(link) = entry.links.first() {
        article.set("link", link.href.trim());
    }

    let summary = entry.summary.map(|s| truncate(&strip_html(&s.content)));
    let body = entry
        .content
        .and_then(|c| c.body)
        .map(|b| truncate(&strip_html(&b)));
    if let Some(description) = body.clone().or_else(|| summary.clone()) {
        article.set("description", description);
    }
    if let Some(summary) = summary.or(body) {
        article.set("summary", summary);
    }

    if let Some(author) = entry.authors.first() {
        article.set("author", author.name.trim());
    }
    if let Some(published) = entry.published {
        article.set("pubdate", published.to_rfc3339());
    }

    let image = entry.media.iter().find_map(|media| {
        media
            .thumbnails
            .first()
            .map(|t| t.image.uri.clone())
            .or_else(|| media.content.iter().find_map(|c| c.url.as_ref().map(|u| u.to_string())))
    });
    if let Some(image) = image {
        article.set("image", image);
    }

    article
}

/// Strip HTML tags and decode common entities, collapsing whitespace.
pub fn strip_html(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut in_tag = false;
    let mut entity: Option<String> = None;

    for ch in html.chars() {
        if let Some(name) = entity.as_mut() {
            if ch == ';' {
                push_entity(&mut out, name);
                entity = None;
                continue;
            }
            if ch.is_ascii_alphanumeric() || ch == '#' {
                name.push(ch);
                continue;
            }
            // not an entity after all
            out.push('&');
            out.push_str(name);
            entity = None;
        }

        match ch {
            '<' => in_tag = true,
            '>' if in_tag => {
                in_tag = false;
                out.push(' ');
            }
            '&' if !in_tag => entity = Some(String::new()),
            _ if !in_tag => out.push(ch),
            _ => {}
        }
    }
    if let Some(name) = entity {
        out.push('&');
        out.push_str(&name);
    }

    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn push_entity(out: &mut String, name: &str) {
    let decoded = match name {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" | "#39" => Some('\''),
        "nbsp" => Some(' '),
        _ => numeric_entity(name).and_then(char::from_u32),
    };
    match decoded {
        Some(c) => out.push(c),
        None => {
            out.push('&');
            out.push_str(name);
            out.push(';');
        }
    }
}

fn numeric_entity(name: &str) -> Option<u32> {
    let digits = name.strip_prefix('#')?;
    match digits.strip_prefix(['x', 'X']) {
        Some(hex) => u32::from_str_radix(hex, 16).ok(),
        None => digits.parse().ok(),
    }
}

fn truncate(text: &str) -> String {
    text.chars().take(MAX_TEXT_LENGTH).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_html() {
        assert_eq!(strip_html("<p>Hello <b>world</b></p>"), "Hello world");
        assert_eq!(strip_html("Fish &amp; chips &lt;3"), "Fish & chips <3");
        assert_eq!(strip_html("&#65;&#x42;&unknown;"), "AB&unknown;");
        assert_eq!(strip_html("a & b"), "a & b");
        assert_eq!(strip_html("line<br/>break\n\n  spaced"), "line break spaced");
    }

    #[test]
    fn test_parse_rss() {
        let rss = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0">
  <channel>
    <title>Test Feed</title>
    <link>https://example.com</link>
    <item>
      <title>First Article</title>
      <link>https://example.com/1</link>
      <guid>guid-1</guid>
      <description>&lt;p&gt;Description&lt;/p&gt;</description>
      <pubDate>Fri, 01 Mar 2024 10:00:00 GMT</pubDate>
    </item>
    <item>
      <title>No guid</title>
      <link>https://example.com/2</link>
    </item>
  </channel>
</rss>"#;

        let articles = parse_articles(rss.as_bytes()).unwrap();
        assert_eq!(articles.len(), 2);

        let first = &articles[0];
        assert_eq!(first.get("guid"), Some("guid-1"));
        assert_eq!(first.get("title"), Some("First Article"));
        assert_eq!(first.get("link"), Some("https://example.com/1"));
        assert_eq!(first.get("description"), Some("Description"));
        assert_eq!(first.get("pubdate"), Some("2024-03-01T10:00:00+00:00"));

        let second = &articles[1];
        assert_eq!(second.get("guid"), None);
        assert_eq!(second.get("pubdate"), None);
        assert_eq!(second.get("title"), Some("No guid"));
    }

    #[test]
    fn test_parse_atom() {
        let atom = r#"<?xml version="1.0" encoding="UTF-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title>Atom Feed</title>
  <id>urn:feed</id>
  <updated>2025-01-01T00:00:00Z</updated>
  <entry>
    <id>urn:uuid:1</id>
    <title>Atom Entry</title>
    <link href="https://example.com/entry"/>
    <summary>Entry summary</summary>
    <author><name>Author Name</name></author>
    <published>2025-01-01T00:00:00Z</published>
    <updated>2025-01-02T00:00:00Z</updated>
  </entry>
</feed>"#;

        let articles = parse_articles(atom.as_bytes()).unwrap();
        assert_eq!(articles.len(), 1);
        let entry = &articles[0];
        assert_eq!(entry.get("guid"), Some("urn:uuid:1"));
        assert_eq!(entry.get("author"), Some("Author Name"));
        assert_eq!(entry.get("summary"), Some("Entry summary"));
        assert_eq!(entry.get("pubdate"), Some("2025-01-01T00:00:00+00:00"));
    }

    #[test]
    fn test_parse_invalid() {
        let err = parse_articles(b"This is not XML").unwrap_err();
        assert!(matches!(err, RelayError::Parse(_)));
    }
}
