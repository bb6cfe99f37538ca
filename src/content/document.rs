//! Document model shared by every stage of the pipeline

use chrono::{DateTime, FixedOffset};
use indexmap::{IndexMap, IndexSet};
use serde::Serialize;
use std::fmt;

/// Stable key identifying where a document came from.
///
/// This is the document's path relative to the source directory. It shows up
/// in diagnostics and decides tie-breaks, but never in rendered output.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct SourceId(String);

impl SourceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into().replace('\\', "/"))
    }

    pub(crate) fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Kind of content unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DocumentKind {
    /// Dated entry, listed in the index and category pages
    Post,
    /// Standalone page such as "About"
    Page,
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocumentKind::Post => f.write_str("post"),
            DocumentKind::Page => f.write_str("page"),
        }
    }
}

/// One loaded content unit. Immutable once constructed.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub kind: DocumentKind,

    /// Layout named in the front matter
    pub layout: String,

    /// Non-empty title
    pub title: String,

    /// Publication date; always present for posts, never for pages
    pub date: Option<DateTime<FixedOffset>>,

    /// Lowercase category tokens in declaration order
    pub categories: IndexSet<String>,

    /// Free-form tags, kept as written
    pub tags: Vec<String>,

    /// `YYYY-MM-DD-title` identifier; posts only
    pub slug: Option<String>,

    /// Resolved output path (explicit or derived), always starting with `/`
    pub permalink: String,

    /// Raw markdown body
    pub body: String,

    /// 1-based line in the source file where the body starts
    pub body_line: usize,

    /// Front-matter fields not understood by the pipeline
    pub extra: IndexMap<String, serde_yaml::Value>,

    source_id: SourceId,
}

impl Document {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        source_id: SourceId,
        kind: DocumentKind,
        layout: String,
        title: String,
        date: Option<DateTime<FixedOffset>>,
        categories: IndexSet<String>,
        tags: Vec<String>,
        slug: Option<String>,
        permalink: String,
        body: String,
        body_line: usize,
        extra: IndexMap<String, serde_yaml::Value>,
    ) -> Self {
        Self {
            kind,
            layout,
            title,
            date,
            categories,
            tags,
            slug,
            permalink,
            body,
            body_line,
            extra,
            source_id,
        }
    }

    pub fn source_id(&self) -> &SourceId {
        &self.source_id
    }

    pub fn is_post(&self) -> bool {
        self.kind == DocumentKind::Post
    }

    pub fn in_category(&self, name: &str) -> bool {
        self.categories.contains(name)
    }
}

/// Turn a permalink pattern into a concrete path for a post.
///
/// Supported placeholders: `:year`, `:month`, `:day`, `:title`, `:slug`
/// and `:category` (the first category, or `uncategorized`).
pub(crate) fn expand_permalink(
    pattern: &str,
    date: &DateTime<FixedOffset>,
    title_slug: &str,
    slug: &str,
    categories: &IndexSet<String>,
) -> String {
    let category = categories
        .first()
        .map(|c| slug::slugify(c))
        .unwrap_or_else(|| "uncategorized".to_string());

    let result = pattern
        .replace(":slug", slug)
        .replace(":year", &date.format("%Y").to_string())
        .replace(":month", &date.format("%m").to_string())
        .replace(":day", &date.format("%d").to_string())
        .replace(":title", title_slug)
        .replace(":category", &category);

    normalize_permalink(&result)
}

/// Permalink for a page without an explicit one, from its source path.
/// `about.md` becomes `/about/`, `docs/index.md` becomes `/docs/`.
pub(crate) fn page_permalink(source_id: &SourceId) -> String {
    let path = source_id.as_str();
    let without_ext = match path.rfind('.') {
        Some(dot) if !path[dot..].contains('/') => &path[..dot],
        _ => path,
    };

    if without_ext == "index" {
        return "/".to_string();
    }
    if let Some(dir) = without_ext.strip_suffix("/index") {
        return normalize_permalink(&format!("{}/", dir));
    }
    normalize_permalink(&format!("{}/", without_ext))
}

/// Ensure a single leading slash and no doubled slashes
pub(crate) fn normalize_permalink(path: &str) -> String {
    let mut out = String::with_capacity(path.len() + 1);
    out.push('/');
    let mut last_slash = true;
    for c in path.trim().chars() {
        if c == '/' {
            if !last_slash {
                out.push('/');
            }
            last_slash = true;
        } else {
            out.push(c);
            last_slash = false;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> DateTime<FixedOffset> {
        DateTime::parse_from_rfc3339(s).unwrap()
    }

    #[test]
    fn test_expand_default_pattern() {
        let cats: IndexSet<String> = ["ruby".to_string()].into_iter().collect();
        let link = expand_permalink(
            "/:year/:month/:day/:title/",
            &date("2022-01-11T10:00:00+01:00"),
            "hello-world",
            "2022-01-11-hello-world",
            &cats,
        );
        assert_eq!(link, "/2022/01/11/hello-world/");
    }

    #[test]
    fn test_expand_category_and_slug() {
        let link = expand_permalink(
            ":category/:slug.html",
            &date("2021-05-01T00:00:00Z"),
            "x",
            "2021-05-01-x",
            &IndexSet::new(),
        );
        assert_eq!(link, "/uncategorized/2021-05-01-x.html");
    }

    #[test]
    fn test_page_permalink() {
        assert_eq!(page_permalink(&SourceId::new("about.md")), "/about/");
        assert_eq!(page_permalink(&SourceId::new("index.md")), "/");
        assert_eq!(page_permalink(&SourceId::new("docs/index.markdown")), "/docs/");
        assert_eq!(page_permalink(&SourceId::new("notes/setup.md")), "/notes/setup/");
    }

    #[test]
    fn test_normalize_permalink() {
        assert_eq!(normalize_permalink("about//me/"), "/about/me/");
        assert_eq!(normalize_permalink("/feed.xml"), "/feed.xml");
    }
}
