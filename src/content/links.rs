//! Link and reference validation
//!
//! Every root-relative link, image and embedded `src`/`href` in a document
//! body must resolve through the [`Registry`]. External URLs, fragments and
//! relative paths are not checked. Problems are collected into a report; the
//! caller decides whether they are fatal.

use lazy_static::lazy_static;
use pulldown_cmark::{Event, Options, Parser, Tag};
use rayon::prelude::*;
use regex::Regex;
use serde::Serialize;
use std::borrow::Cow;
use std::collections::HashSet;
use std::fmt;

use super::liquid;
use super::registry::route_key;
use super::{Document, Registry, Resolved, SourceId};
use crate::config::SiteConfig;
use crate::error::{ContentError, Result};

lazy_static! {
    static ref HTML_URL_ATTR: Regex =
        Regex::new(r#"(?i)\b(?:src|href)\s*=\s*(?:"([^"]*)"|'([^']*)')"#).unwrap();
    static ref URL_SCHEME: Regex = Regex::new(r"^[a-zA-Z][a-zA-Z0-9+.-]*:").unwrap();
}

/// Why a reference failed to resolve
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ReferenceProblem {
    AssetNotFound,
    DocumentNotFound,
}

impl fmt::Display for ReferenceProblem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReferenceProblem::AssetNotFound => f.write_str("asset not found"),
            ReferenceProblem::DocumentNotFound => f.write_str("document not found"),
        }
    }
}

/// One unresolved reference
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BrokenReference {
    pub document: SourceId,
    pub line: usize,
    pub reference: String,
    pub reason: ReferenceProblem,
}

impl fmt::Display for BrokenReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}: {} ({})",
            self.document, self.line, self.reference, self.reason
        )
    }
}

/// All broken references of a build, ordered by document and line
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    pub broken: Vec<BrokenReference>,
}

impl ValidationReport {
    pub fn is_clean(&self) -> bool {
        self.broken.is_empty()
    }

    pub fn len(&self) -> usize {
        self.broken.len()
    }

    pub fn is_empty(&self) -> bool {
        self.broken.is_empty()
    }

    pub fn count(&self, reason: ReferenceProblem) -> usize {
        self.broken.iter().filter(|b| b.reason == reason).count()
    }

    /// Log every entry and, in strict mode, turn a non-empty report into an error
    pub fn enforce(&self, strict: bool) -> Result<()> {
        for broken in &self.broken {
            if strict {
                tracing::error!("Broken reference {}", broken);
            } else {
                tracing::warn!("Broken reference {}", broken);
            }
        }
        if strict && !self.is_clean() {
            return Err(ContentError::BrokenReferences {
                count: self.broken.len(),
            });
        }
        Ok(())
    }
}

/// Checks document bodies against the registry
pub struct LinkValidator {
    config: SiteConfig,
    asset_prefix: String,
}

/// What a reference can point at besides registered content
struct Targets<'a> {
    registry: &'a Registry,
    /// Route keys of the index, the feed and category listings
    generated: HashSet<String>,
}

impl LinkValidator {
    pub fn new(config: &SiteConfig) -> Self {
        Self {
            config: config.clone(),
            asset_prefix: config.asset_prefix(),
        }
    }

    fn targets<'a>(&self, registry: &'a Registry) -> Targets<'a> {
        let mut generated: HashSet<String> = registry
            .categories()
            .map(|(name, _)| decoded_route(&self.config.category_url(name)))
            .collect();
        generated.insert(route_key("/"));
        if !self.config.feed.trim_matches('/').is_empty() {
            generated.insert(route_key(&self.config.feed));
        }
        Targets {
            registry,
            generated,
        }
    }

    /// Validate every registered document
    pub fn validate(&self, registry: &Registry) -> ValidationReport {
        let targets = self.targets(registry);
        let docs: Vec<&Document> = registry.documents().map(|(_, d)| d).collect();
        let mut broken: Vec<BrokenReference> = docs
            .par_iter()
            .flat_map_iter(|doc| self.check_links(&targets, doc))
            .collect();
        broken.sort_by(|a, b| (&a.document, a.line).cmp(&(&b.document, b.line)));

        tracing::info!(
            "Validated references in {} documents, {} broken",
            docs.len(),
            broken.len()
        );
        ValidationReport { broken }
    }

    /// Broken references of a single document
    pub fn check_document(&self, registry: &Registry, doc: &Document) -> Vec<BrokenReference> {
        self.check_links(&self.targets(registry), doc)
    }

    fn check_links(&self, targets: &Targets<'_>, doc: &Document) -> Vec<BrokenReference> {
        let registry = targets.registry;
        let mut broken = Vec::new();

        // Same expansion as rendering, so code in highlight blocks and raw
        // regions is never taken for links. Resolvable post_url tags become
        // their permalinks, unknown ones are reported and left blank.
        let expanded = liquid::expand(&doc.body, |line, slug| match registry.post_by_slug(slug) {
            Some(post) => post.permalink.clone(),
            None => {
                broken.push(BrokenReference {
                    document: doc.source_id().clone(),
                    line: doc.body_line + line,
                    reference: format!("post_url {}", slug),
                    reason: ReferenceProblem::DocumentNotFound,
                });
                String::new()
            }
        });
        // An unclosed highlight fails the render; check what is there
        let body = expanded.unwrap_or(Cow::Borrowed(doc.body.as_str()));
        let line_at = |offset: usize| doc.body_line + body[..offset].matches('\n').count();

        for (reference, offset) in references(&body) {
            if let Some(reason) = self.check_reference(targets, &reference) {
                broken.push(BrokenReference {
                    document: doc.source_id().clone(),
                    line: line_at(offset),
                    reference,
                    reason,
                });
            }
        }

        broken
    }

    fn check_reference(&self, targets: &Targets<'_>, reference: &str) -> Option<ReferenceProblem> {
        if !is_root_relative(reference) {
            return None;
        }

        let is_asset = !self.asset_prefix.is_empty()
            && reference
                .strip_prefix(self.asset_prefix.as_str())
                .is_some_and(|rest| rest.starts_with('/'));

        match (targets.registry.resolve(reference), is_asset) {
            (Some(Resolved::Static(_)), true) => None,
            (_, true) => Some(ReferenceProblem::AssetNotFound),
            (Some(_), false) => None,
            (None, false) if targets.is_generated(reference) => None,
            (None, false) => Some(ReferenceProblem::DocumentNotFound),
        }
    }
}

impl Targets<'_> {
    fn is_generated(&self, reference: &str) -> bool {
        let path = reference.split(['?', '#']).next().unwrap_or("");
        self.generated.contains(&decoded_route(path))
    }
}

fn decoded_route(path: &str) -> String {
    route_key(&percent_encoding::percent_decode_str(path).decode_utf8_lossy())
}

/// Site paths like `/about/`; not `//cdn.host/x`, `https://…`, `#top` or `img.png`
fn is_root_relative(reference: &str) -> bool {
    reference.starts_with('/') && !reference.starts_with("//") && !URL_SCHEME.is_match(reference)
}

/// Every link/image destination and HTML `src`/`href` in a markdown body,
/// with its byte offset
fn references(body: &str) -> Vec<(String, usize)> {
    let mut found = Vec::new();
    let parser = Parser::new_ext(body, Options::ENABLE_TABLES | Options::ENABLE_FOOTNOTES);

    for (event, range) in parser.into_offset_iter() {
        match event {
            Event::Start(Tag::Link { dest_url, .. }) | Event::Start(Tag::Image { dest_url, .. }) => {
                found.push((dest_url.trim().to_string(), range.start));
            }
            Event::Html(html) | Event::InlineHtml(html) => {
                for caps in HTML_URL_ATTR.captures_iter(&html) {
                    if let Some(url) = caps.get(1).or_else(|| caps.get(2)) {
                        found.push((url.as_str().trim().to_string(), range.start));
                    }
                }
            }
            _ => {}
        }
    }

    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::{DocumentKind, FrontMatter, StaticFile};

    fn registry_with(bodies: &[(&str, &str)]) -> Registry {
        let mut registry = Registry::new();
        for (i, (file, body)) in bodies.iter().enumerate() {
            let raw = format!(
                "---\nlayout: post\ntitle: Post {}\ndate: 2022-01-{:02} 10:00:00 +0000\n---\n{}",
                i,
                i + 1,
                body
            );
            let doc = FrontMatter::parse_document(
                &SourceId::new(*file),
                DocumentKind::Post,
                &raw,
                "/:slug/",
            )
            .unwrap();
            registry.register(doc).unwrap();
        }
        registry.register_static(StaticFile {
            url: "/assets/present.png".to_string(),
            path: "assets/present.png".into(),
        });
        registry
    }

    fn validator() -> LinkValidator {
        LinkValidator::new(&SiteConfig::default())
    }

    #[test]
    fn test_missing_asset_reported_once() {
        let registry = registry_with(&[(
            "a.md",
            "Intro\n\n![shot](/assets/missing.png)\n\n![ok](/assets/present.png)",
        )]);
        let report = validator().validate(&registry);
        assert_eq!(report.len(), 1);
        let broken = &report.broken[0];
        assert_eq!(broken.reason, ReferenceProblem::AssetNotFound);
        assert_eq!(broken.reference, "/assets/missing.png");
        assert_eq!(broken.document.to_string(), "a.md");
        assert_eq!(broken.line, 8);
    }

    #[test]
    fn test_cross_links() {
        let registry = registry_with(&[
            ("a.md", "See [b](/2022-01-02-post-1/) and [gone](/2019/01/01/gone/)."),
            ("b.md", "Back to [a](/2022-01-01-post-0/#intro)."),
        ]);
        let report = validator().validate(&registry);
        assert_eq!(report.len(), 1);
        assert_eq!(report.broken[0].reason, ReferenceProblem::DocumentNotFound);
        assert_eq!(report.broken[0].reference, "/2019/01/01/gone/");
    }

    #[test]
    fn test_external_and_relative_links_skipped() {
        let registry = registry_with(&[(
            "a.md",
            "[x](https://example.com/assets/missing.png) [y](//cdn.example.com/z.js) \
             [z](#section) [w](images/local.png) [m](mailto:me@example.com)",
        )]);
        assert!(validator().validate(&registry).is_clean());
    }

    #[test]
    fn test_html_attributes_checked() {
        let registry = registry_with(&[(
            "a.md",
            "<p align=\"center\"><img src=\"/assets/nope.gif\" width=\"300\"></p>\n\nText with <a href='/missing/'>inline</a>.",
        )]);
        let report = validator().validate(&registry);
        assert_eq!(report.count(ReferenceProblem::AssetNotFound), 1);
        assert_eq!(report.count(ReferenceProblem::DocumentNotFound), 1);
    }

    #[test]
    fn test_post_url_tags() {
        let registry = registry_with(&[
            ("a.md", "[b]({% post_url 2022-01-02-post-1 %})"),
            ("b.md", "[old]({% post_url 2010-01-01-nothing %})"),
        ]);
        let report = validator().validate(&registry);
        assert_eq!(report.len(), 1);
        assert_eq!(report.broken[0].document.to_string(), "b.md");
        assert_eq!(report.broken[0].reference, "post_url 2010-01-01-nothing");
    }

    #[test]
    fn test_links_in_code_are_ignored() {
        let registry = registry_with(&[(
            "a.md",
            "```html\n<img src=\"/assets/missing.png\">\n```\n\nAnd `![x](/assets/missing.png)`.",
        )]);
        assert!(validator().validate(&registry).is_clean());
    }

    #[test]
    fn test_links_in_highlight_and_raw_are_ignored() {
        let registry = registry_with(&[(
            "a.md",
            "{% highlight html %}\n<img src=\"/assets/example.png\">\n{% endhighlight %}\n\n\
             {% raw %}[old]({% post_url 2010-01-01-nothing %}){% endraw %}\n\n\
             ![gone](/assets/gone.png)",
        )]);
        let report = validator().validate(&registry);
        assert_eq!(report.len(), 1);
        assert_eq!(report.broken[0].reference, "/assets/gone.png");
        assert_eq!(report.broken[0].line, 12);
    }

    #[test]
    fn test_check_single_document() {
        let registry = registry_with(&[("a.md", "ok"), ("b.md", "[x](/nope/)")]);
        let validator = validator();
        let (_, a) = registry.documents().next().unwrap();
        assert!(validator.check_document(&registry, a).is_empty());
        let (_, b) = registry.documents().nth(1).unwrap();
        assert_eq!(validator.check_document(&registry, b).len(), 1);
    }

    #[test]
    fn test_generated_pages_resolve() {
        let registry = registry_with(&[(
            "a.md",
            "[home](/) [feed](/feed.xml) [ruby](/categories/uncategorized/) [none](/categories/go/)",
        )]);
        let report = validator().validate(&registry);
        assert_eq!(report.len(), 2);
        assert_eq!(report.broken[0].reference, "/categories/uncategorized/");
        assert_eq!(report.broken[1].reference, "/categories/go/");
    }

    #[test]
    fn test_category_listing_with_escaped_name() {
        let mut registry = Registry::new();
        let raw = "---\nlayout: post\ntitle: Langs\ndate: 2022-01-01 10:00:00 +0000\n\
                   categories: [\"c#\"]\n---\n[a](/categories/c%23/) [b](/categories/c/)";
        let doc = FrontMatter::parse_document(&SourceId::new("a.md"), DocumentKind::Post, raw, "/:slug/")
            .unwrap();
        registry.register(doc).unwrap();
        let report = validator().validate(&registry);
        assert_eq!(report.len(), 1);
        assert_eq!(report.broken[0].reference, "/categories/c/");
    }

    #[test]
    fn test_enforce_strict_and_lenient() {
        let registry = registry_with(&[("a.md", "![x](/assets/missing.png)")]);
        let report = validator().validate(&registry);
        assert!(report.enforce(false).is_ok());
        assert!(matches!(
            report.enforce(true),
            Err(ContentError::BrokenReferences { count: 1 })
        ));
    }
}
