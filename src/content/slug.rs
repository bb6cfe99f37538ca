//! Slug generation for posts

use chrono::{DateTime, FixedOffset};

/// Normalize a title: lowercase, every run of non-alphanumerics becomes a
/// single hyphen, no leading or trailing hyphens. Non-ASCII letters are
/// transliterated first.
pub fn title_slug(title: &str) -> String {
    slug::slugify(title)
}

/// `YYYY-MM-DD-title-slug`, or `None` when the title has nothing to slugify
pub fn post_slug(date: &DateTime<FixedOffset>, title: &str) -> Option<String> {
    let title = title_slug(title);
    if title.is_empty() {
        return None;
    }
    Some(format!("{}-{}", date.format("%Y-%m-%d"), title))
}
