//! Atom feed

use crate::config::SiteConfig;
use crate::content::Document;

/// Atom document for the given posts, newest first
pub(super) fn atom(
    config: &SiteConfig,
    posts: &[&Document],
    content_of: &dyn Fn(&Document) -> String,
) -> String {
    let base_url = config.url.trim_end_matches('/');
    let updated = posts
        .iter()
        .filter_map(|p| p.date)
        .max()
        .map(|d| d.to_rfc3339())
        .unwrap_or_else(|| chrono::DateTime::<chrono::Utc>::UNIX_EPOCH.to_rfc3339());

    let mut feed = String::new();
    feed.push_str(r#"<?xml version="1.0" encoding="utf-8"?>"#);
    feed.push('\n');
    feed.push_str(r#"<feed xmlns="http://www.w3.org/2005/Atom">"#);
    feed.push('\n');
    feed.push_str(&format!("  <title>{}</title>\n", escape_xml(&config.title)));
    feed.push_str(&format!(
        "  <link href=\"{}\" rel=\"self\"/>\n",
        escape_xml(&config.full_url_for(&config.feed))
    ));
    feed.push_str(&format!(
        "  <link href=\"{}\"/>\n",
        escape_xml(&config.full_url_for("/"))
    ));
    feed.push_str(&format!("  <updated>{}</updated>\n", updated));
    feed.push_str(&format!(
        "  <id>{}</id>\n",
        escape_xml(&config.full_url_for("/"))
    ));
    if !config.author.is_empty() {
        feed.push_str(&format!(
            "  <author><name>{}</name></author>\n",
            escape_xml(&config.author)
        ));
    }

    for post in posts {
        let link = escape_xml(&config.full_url_for(&post.permalink));
        feed.push_str("  <entry>\n");
        feed.push_str(&format!("    <title>{}</title>\n", escape_xml(&post.title)));
        feed.push_str(&format!("    <link href=\"{}\"/>\n", link));
        feed.push_str(&format!("    <id>{}</id>\n", link));
        if let Some(date) = post.date {
            feed.push_str(&format!("    <published>{}</published>\n", date.to_rfc3339()));
            feed.push_str(&format!("    <updated>{}</updated>\n", date.to_rfc3339()));
        }
        for category in &post.categories {
            feed.push_str(&format!(
                "    <category term=\"{}\"/>\n",
                escape_xml(category)
            ));
        }
        let content = absolute_urls(&content_of(post), base_url);
        feed.push_str(&format!(
            "    <content type=\"html\"><![CDATA[{}]]></content>\n",
            strip_invalid_xml_chars(&content).replace("]]>", "]]]]><![CDATA[>")
        ));
        feed.push_str("  </entry>\n");
    }

    feed.push_str("</feed>\n");
    feed
}

fn escape_xml(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

/// Point root-relative `href`/`src` attributes at the absolute site URL
fn absolute_urls(content: &str, base_url: &str) -> String {
    content
        .replace("href=\"/", &format!("href=\"{}/", base_url))
        .replace("src=\"/", &format!("src=\"{}/", base_url))
        .replace("href='/", &format!("href='{}/", base_url))
        .replace("src='/", &format!("src='{}/", base_url))
}

/// XML 1.0 only allows tab, newline, carriage return and the ranges
/// `#x20-#xD7FF`, `#xE000-#xFFFD`, `#x10000-#x10FFFF`
fn strip_invalid_xml_chars(s: &str) -> String {
    s.chars()
        .filter(|&c| {
            c == '\t'
                || c == '\n'
                || c == '\r'
                || ('\u{0020}'..='\u{D7FF}').contains(&c)
                || ('\u{E000}'..='\u{FFFD}').contains(&c)
                || ('\u{10000}'..='\u{10FFFF}').contains(&c)
        })
        .collect()
}
