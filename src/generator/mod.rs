//! Site assembler - plans every output file, then writes them
//!
//! Planning renders all HTML in memory and claims an output path for each
//! artifact. A path claimed twice fails the plan with
//! [`ContentError::OutputPathCollision`], so a failed plan never leaves a
//! half-written public directory behind.

mod feed;

use percent_encoding::percent_decode_str;
use rayon::prelude::*;
use std::borrow::Cow;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::config::SiteConfig;
use crate::content::html::escape;
use crate::content::{Block, Document, HtmlWriter, Registry, RenderedDocument, SourceId};
use crate::error::{ContentError, Result};
use crate::Site;

/// What ends up at a planned path
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputContent {
    /// Generated text (HTML pages, the feed)
    Text(String),
    /// A file copied from the source tree
    Copy(PathBuf),
}

/// One file of the final output set
#[derive(Debug, Clone)]
pub struct PlannedOutput {
    /// Path relative to the public directory
    pub path: PathBuf,
    /// Human readable producer, used in collision reports
    pub origin: String,
    pub content: OutputContent,
}

/// The complete, collision-free output set of a build
#[derive(Debug, Default)]
pub struct SitePlan {
    outputs: Vec<PlannedOutput>,
    claimed: HashMap<PathBuf, usize>,
}

impl SitePlan {
    fn add(&mut self, path: PathBuf, origin: String, content: OutputContent) -> Result<()> {
        if let Some(&existing) = self.claimed.get(&path) {
            return Err(ContentError::OutputPathCollision {
                path,
                first: self.outputs[existing].origin.clone(),
                second: origin,
            });
        }
        self.claimed.insert(path.clone(), self.outputs.len());
        self.outputs.push(PlannedOutput {
            path,
            origin,
            content,
        });
        Ok(())
    }

    pub fn outputs(&self) -> &[PlannedOutput] {
        &self.outputs
    }

    pub fn len(&self) -> usize {
        self.outputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outputs.is_empty()
    }

    pub fn get(&self, path: impl AsRef<Path>) -> Option<&PlannedOutput> {
        self.claimed
            .get(path.as_ref())
            .map(|&index| &self.outputs[index])
    }
}

/// Static site assembler
pub struct Generator<'a> {
    site: &'a Site,
    writer: HtmlWriter,
}

impl<'a> Generator<'a> {
    pub fn new(site: &'a Site) -> Self {
        Self {
            site,
            writer: HtmlWriter::new(&site.config.highlight),
        }
    }

    fn config(&self) -> &SiteConfig {
        &self.site.config
    }

    /// Build the full output set: one page per document, static files, one
    /// listing per non-empty category, the chronological index and the feed.
    pub fn plan(&self, registry: &Registry, rendered: &[RenderedDocument]) -> Result<SitePlan> {
        let by_source: HashMap<&SourceId, &RenderedDocument> = rendered
            .iter()
            .map(|r| (registry.get(r.id).source_id(), r))
            .collect();
        let excerpt_of = |doc: &Document| -> String {
            by_source
                .get(doc.source_id())
                .map(|r| self.writer.render(&r.excerpt))
                .unwrap_or_default()
        };

        // Highlighting dominates the cost of a build, so pages are rendered
        // in parallel and claimed in document order afterwards.
        let pages: Vec<(PathBuf, String, String)> = rendered
            .par_iter()
            .map(|r| {
                let doc = registry.get(r.id);
                (
                    output_path(&doc.permalink),
                    doc.source_id().to_string(),
                    self.document_page(doc, &r.blocks),
                )
            })
            .collect();

        let mut plan = SitePlan::default();
        for (path, origin, html) in pages {
            plan.add(path, origin, OutputContent::Text(html))?;
        }

        for file in registry.static_files() {
            let origin = file
                .path
                .strip_prefix(&self.site.source_dir)
                .unwrap_or(&file.path)
                .display()
                .to_string();
            plan.add(
                output_path(&file.url),
                origin,
                OutputContent::Copy(file.path.clone()),
            )?;
        }

        for (name, count) in registry.categories() {
            let url = self.config().category_url(name);
            let posts: Vec<&Document> = registry.by_category(name).collect();
            let html = self.listing_page(
                &format!("Category: {}", name),
                &posts,
                &excerpt_of,
            );
            tracing::debug!("Planned category {} ({} posts) at {}", name, count, url);
            plan.add(
                output_path(&url),
                format!("category listing `{}`", name),
                OutputContent::Text(html),
            )?;
        }

        let posts: Vec<&Document> = registry.all_posts().collect();
        let index = self.listing_page(&self.config().title, &posts, &excerpt_of);
        plan.add(
            PathBuf::from("index.html"),
            "post index".to_string(),
            OutputContent::Text(index),
        )?;

        if !self.config().feed.trim_matches('/').is_empty() {
            let limit = self.config().feed_limit;
            let xml = feed::atom(self.config(), &posts[..posts.len().min(limit)], &excerpt_of);
            plan.add(
                output_path(&self.config().feed),
                "atom feed".to_string(),
                OutputContent::Text(xml),
            )?;
        }

        tracing::info!("Planned {} output files", plan.len());
        Ok(plan)
    }

    /// Write a plan into the public directory
    pub fn emit(&self, plan: &SitePlan) -> Result<usize> {
        let public_dir = &self.site.public_dir;
        for output in plan.outputs() {
            let dest = public_dir.join(&output.path);
            if let Some(parent) = dest.parent() {
                fs::create_dir_all(parent).map_err(|e| ContentError::io(parent, e))?;
            }
            match &output.content {
                OutputContent::Text(text) => {
                    fs::write(&dest, text).map_err(|e| ContentError::io(&dest, e))?
                }
                OutputContent::Copy(source) => {
                    fs::copy(source, &dest).map_err(|e| ContentError::io(source, e))?;
                }
            }
            tracing::debug!("Generated: {:?}", dest);
        }
        tracing::info!("Wrote {} files to {:?}", plan.len(), public_dir);
        Ok(plan.len())
    }

    fn document_page(&self, doc: &Document, blocks: &[Block]) -> String {
        let mut body = format!("<article class=\"{}\">\n", escape(&doc.layout));
        body.push_str(&format!("<h1>{}</h1>\n", escape(&doc.title)));

        if let Some(date) = doc.date {
            body.push_str(&format!(
                "<p class=\"meta\"><time datetime=\"{}\">{}</time>",
                date.to_rfc3339(),
                date.format("%Y-%m-%d")
            ));
            for category in &doc.categories {
                body.push_str(&format!(
                    " <a class=\"category\" href=\"{}\">{}</a>",
                    escape(&self.config().url_for(&self.config().category_url(category))),
                    escape(category)
                ));
            }
            body.push_str("</p>\n");
        }

        body.push_str(&self.writer.render(blocks));

        if !doc.tags.is_empty() {
            body.push_str("<ul class=\"tags\">");
            for tag in &doc.tags {
                body.push_str(&format!("<li>{}</li>", escape(tag)));
            }
            body.push_str("</ul>\n");
        }
        body.push_str("</article>\n");

        self.layout(&doc.title, &body)
    }

    fn listing_page(
        &self,
        title: &str,
        posts: &[&Document],
        excerpt_of: &dyn Fn(&Document) -> String,
    ) -> String {
        let mut body = format!("<h1>{}</h1>\n<ul class=\"posts\">\n", escape(title));
        for post in posts {
            let date = post
                .date
                .map(|d| d.format("%Y-%m-%d").to_string())
                .unwrap_or_default();
            body.push_str(&format!(
                "<li><time>{}</time> <a href=\"{}\">{}</a>\n{}</li>\n",
                date,
                escape(&self.config().url_for(&post.permalink)),
                escape(&post.title),
                excerpt_of(post)
            ));
        }
        body.push_str("</ul>\n");
        self.layout(title, &body)
    }

    fn layout(&self, title: &str, body: &str) -> String {
        let config = self.config();
        let page_title = if title == config.title {
            escape(title)
        } else {
            format!("{} | {}", escape(title), escape(&config.title))
        };
        let feed_link = if config.feed.trim_matches('/').is_empty() {
            String::new()
        } else {
            format!(
                "\n<link rel=\"alternate\" type=\"application/atom+xml\" href=\"{}\">",
                escape(&config.url_for(&config.feed))
            )
        };

        format!(
            r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<title>{}</title>
<meta name="description" content="{}">{}
</head>
<body>
<header><a href="{}">{}</a></header>
<main>
{}</main>
</body>
</html>
"#,
            page_title,
            escape(&config.description),
            feed_link,
            escape(&config.url_for("/")),
            escape(&config.title),
            body
        )
    }
}

/// Where a site path is written, relative to the public directory.
///
/// `/a/b/` and `/a/b` become `a/b/index.html`; a last segment with an
/// extension (`/feed.xml`) is written as is. Percent-escapes are decoded
/// the way a web server decodes the request path.
pub fn output_path(url: &str) -> PathBuf {
    let segments: Vec<Cow<'_, str>> = url
        .split('/')
        .map(|s| match percent_decode_str(s).decode_utf8_lossy() {
            decoded if decoded.contains(['/', '\\']) => Cow::Borrowed(s),
            decoded => decoded,
        })
        .filter(|s| !s.is_empty() && s != "." && s != "..")
        .collect();

    let mut path: PathBuf = segments.iter().map(|s| &**s).collect();
    let is_file = !url.ends_with('/') && segments.last().is_some_and(|s| s.contains('.'));
    if !is_file {
        path.push("index.html");
    }
    path
}
