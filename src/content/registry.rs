//! Content registry - the single indexed view of a build's documents
//!
//! Every later stage takes `&Registry`. Indexes are maintained on insert, so
//! listings never rescan the document set, and the ordering of every index is
//! a function of the documents alone (date, then source identity), never of
//! the order they were registered in.

use percent_encoding::percent_decode_str;
use std::cmp::Reverse;
use std::collections::{BTreeMap, HashMap};

use super::{Document, LoadedContent, StaticFile};
use crate::error::{ContentError, IdentifierKind, Result};

/// Handle to a registered document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocId(pub(crate) usize);

/// What a site path points at
#[derive(Debug, Clone, Copy)]
pub enum Resolved<'a> {
    Document(&'a Document),
    Static(&'a StaticFile),
}

#[derive(Debug, Default)]
pub struct Registry {
    documents: Vec<Document>,
    by_route: HashMap<String, DocId>,
    by_slug: HashMap<String, DocId>,
    /// Posts, newest first
    posts: Vec<DocId>,
    /// Category name → posts, newest first
    categories: BTreeMap<String, Vec<DocId>>,
    static_files: BTreeMap<String, StaticFile>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register everything a loader produced
    pub fn from_content(content: LoadedContent) -> Result<Self> {
        let mut registry = Self::new();
        for doc in content.documents {
            registry.register(doc)?;
        }
        for file in content.static_files {
            registry.register_static(file);
        }
        tracing::info!(
            "Registered {} posts, {} pages, {} categories",
            registry.posts.len(),
            registry.documents.len() - registry.posts.len(),
            registry.categories.len()
        );
        Ok(registry)
    }

    /// Insert a document. On a permalink or slug clash nothing is changed.
    pub fn register(&mut self, doc: Document) -> Result<DocId> {
        let route = route_key(&doc.permalink);
        if let Some(existing) = self.by_route.get(&route) {
            return Err(self.duplicate(&doc, IdentifierKind::Permalink, &doc.permalink, *existing));
        }
        if let Some(slug) = &doc.slug {
            if let Some(existing) = self.by_slug.get(slug) {
                return Err(self.duplicate(&doc, IdentifierKind::Slug, slug, *existing));
            }
        }

        let id = DocId(self.documents.len());
        self.by_route.insert(route, id);
        if let Some(slug) = &doc.slug {
            self.by_slug.insert(slug.clone(), id);
        }
        if doc.is_post() {
            let key = sort_key(&doc);
            insert_sorted(&mut self.posts, &self.documents, id, &key);
            for category in &doc.categories {
                let list = self.categories.entry(category.clone()).or_default();
                insert_sorted(list, &self.documents, id, &key);
            }
        }
        tracing::debug!("Registered {} at {}", doc.source_id(), doc.permalink);
        self.documents.push(doc);
        Ok(id)
    }

    /// Make a static file resolvable
    pub fn register_static(&mut self, file: StaticFile) {
        self.static_files.insert(file.url.clone(), file);
    }

    fn duplicate(
        &self,
        doc: &Document,
        kind: IdentifierKind,
        identifier: &str,
        existing: DocId,
    ) -> ContentError {
        ContentError::DuplicateIdentifier {
            source_id: doc.source_id().clone(),
            kind,
            identifier: identifier.to_string(),
            existing: self.get(existing).source_id().clone(),
        }
    }

    pub fn get(&self, id: DocId) -> &Document {
        &self.documents[id.0]
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// All documents with their ids, in registration order
    pub fn documents(&self) -> impl Iterator<Item = (DocId, &Document)> + '_ {
        self.documents
            .iter()
            .enumerate()
            .map(|(i, doc)| (DocId(i), doc))
    }

    /// Pages, ordered by source identity
    pub fn pages(&self) -> Vec<&Document> {
        let mut pages: Vec<_> = self.documents.iter().filter(|d| !d.is_post()).collect();
        pages.sort_by(|a, b| a.source_id().cmp(b.source_id()));
        pages
    }

    /// All posts, newest first
    pub fn all_posts(&self) -> impl Iterator<Item = &Document> + '_ {
        self.posts.iter().map(move |id| self.get(*id))
    }

    /// Posts in one category, newest first. Matching is on the lowercased name.
    pub fn by_category(&self, name: &str) -> impl Iterator<Item = &Document> + '_ {
        self.categories
            .get(&name.trim().to_lowercase())
            .into_iter()
            .flatten()
            .map(move |id| self.get(*id))
    }

    /// Non-empty categories with their post counts, by name
    pub fn categories(&self) -> impl Iterator<Item = (&str, usize)> + '_ {
        self.categories
            .iter()
            .filter(|(_, posts)| !posts.is_empty())
            .map(|(name, posts)| (name.as_str(), posts.len()))
    }

    /// Look up a post by its `YYYY-MM-DD-title` slug
    pub fn post_by_slug(&self, slug: &str) -> Option<&Document> {
        self.by_slug.get(slug.trim()).map(|id| self.get(*id))
    }

    pub fn static_files(&self) -> impl Iterator<Item = &StaticFile> + '_ {
        self.static_files.values()
    }

    /// Find the document or static file served at a site path.
    ///
    /// Query strings and fragments are ignored and percent-escapes decoded.
    /// `/post`, `/post/` and `/post/index.html` all name the same document.
    pub fn resolve(&self, path: &str) -> Option<Resolved<'_>> {
        let path = path.split(['?', '#']).next().unwrap_or("");
        let decoded = percent_decode_str(path).decode_utf8_lossy();

        if let Some(id) = self.by_route.get(&route_key(&decoded)) {
            return Some(Resolved::Document(self.get(*id)));
        }
        self.static_files.get(decoded.as_ref()).map(Resolved::Static)
    }
}

/// Canonical lookup key for a document path
pub(crate) fn route_key(path: &str) -> String {
    let path = path.trim();
    let path = match path.strip_suffix("/index.html") {
        Some(dir) => dir,
        None if path == "index.html" => "",
        None => path,
    };
    let trimmed = path.trim_matches('/');
    format!("/{}", trimmed)
}

type SortKey = (Reverse<chrono::DateTime<chrono::FixedOffset>>, super::SourceId);

fn sort_key(doc: &Document) -> SortKey {
    (
        Reverse(doc.date.unwrap_or_default()),
        doc.source_id().clone(),
    )
}

/// Insert `id` into a newest-first list; `documents` does not contain it yet.
fn insert_sorted(list: &mut Vec<DocId>, documents: &[Document], id: DocId, key: &SortKey) {
    let pos = list.partition_point(|other| sort_key(&documents[other.0]) < *key);
    list.insert(pos, id);
}
