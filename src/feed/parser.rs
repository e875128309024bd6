use feed_rs::parser;

/// One item as delivered by the upstream feed, in upstream order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawItem {
    pub title: String,
    pub link: Option<String>,
    /// Publish time (falling back to update time) as Unix seconds
    pub published_at: Option<i64>,
    pub summary_html: Option<String>,
}

/// Parsed items plus the number of entries dropped for having no title.
#[derive(Debug)]
pub struct ParseResult {
    pub items: Vec<RawItem>,
    pub skipped: usize,
}

pub fn parse_items(bytes: &[u8]) -> Result<ParseResult, parser::ParseFeedError> {
    let feed = parser::parse(bytes)?;
    let total = feed.entries.len();

    // Title is the de-duplication key, so untitled entries cannot be tracked
    let items: Vec<RawItem> = feed
        .entries
        .into_iter()
        .filter_map(|entry| {
            let title = entry
                .title
                .map(|t| t.content.trim().to_string())
                .filter(|t| !t.is_empty())?;
            let link = entry
                .links
                .iter()
                .find(|l| matches!(l.rel.as_deref(), None | Some("alternate")))
                .or_else(|| entry.links.first())
                .map(|l| l.href.clone());
            let published_at = entry.published.or(entry.updated).map(|dt| dt.timestamp());
            let summary_html = entry
                .summary
                .map(|s| s.content)
                .or_else(|| entry.content.and_then(|c| c.body));

            Some(RawItem {
                title,
                link,
                published_at,
                summary_html,
            })
        })
        .collect();

    let skipped = total - items.len();
    Ok(ParseResult { items, skipped })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const RSS: &str = r#"<?xml version="1.0"?>
<rss version="2.0"><channel>
    <title>Test</title>
    <item>
        <title>Newest</title>
        <link>https://example.com/newest</link>
        <pubDate>Fri, 15 Mar 2024 10:00:00 GMT</pubDate>
        <description><![CDATA[<p>Hi <img src="https://example.com/a.png"></p>]]></description>
    </item>
    <item>
        <title>Older</title>
        <link>https://example.com/older</link>
    </item>
    <item>
        <link>https://example.com/untitled</link>
    </item>
</channel></rss>"#;

    #[test]
    fn test_parse_rss_keeps_order() {
        let result = parse_items(RSS.as_bytes()).unwrap();
        assert_eq!(result.skipped, 1);
        let titles: Vec<&str> = result.items.iter().map(|i| i.title.as_str()).collect();
        assert_eq!(titles, vec!["Newest", "Older"]);

        let newest = &result.items[0];
        assert_eq!(newest.link.as_deref(), Some("https://example.com/newest"));
        assert_eq!(newest.published_at, Some(1710496800));
        assert!(newest
            .summary_html
            .as_deref()
            .unwrap()
            .contains("https://example.com/a.png"));
        assert_eq!(result.items[1].published_at, None);
    }

    #[test]
    fn test_parse_atom_uses_updated_and_alternate_link() {
        let atom = r#"<?xml version="1.0" encoding="utf-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
    <title>Atom</title>
    <id>urn:test</id>
    <updated>2024-03-15T10:00:00Z</updated>
    <entry>
        <title>Atom entry</title>
        <id>urn:test:1</id>
        <link rel="self" href="https://example.com/self"/>
        <link rel="alternate" href="https://example.com/entry"/>
        <updated>2024-03-15T10:00:00Z</updated>
        <content type="html">&lt;img src="https://example.com/c.jpg"&gt;</content>
    </entry>
</feed>"#;

        let result = parse_items(atom.as_bytes()).unwrap();
        assert_eq!(result.items.len(), 1);
        let item = &result.items[0];
        assert_eq!(item.title, "Atom entry");
        assert_eq!(item.link.as_deref(), Some("https://example.com/entry"));
        assert_eq!(item.published_at, Some(1710496800));
        assert!(item.summary_html.as_deref().unwrap().contains("c.jpg"));
    }

    #[test]
    fn test_parse_invalid() {
        assert!(parse_items(b"<not valid xml").is_err());
    }

    #[test]
    fn test_parse_empty_channel() {
        let empty = r#"<?xml version="1.0"?><rss version="2.0"><channel><title>x</title></channel></rss>"#;
        let result = parse_items(empty.as_bytes()).unwrap();
        assert!(result.items.is_empty());
        assert_eq!(result.skipped, 0);
    }
}
