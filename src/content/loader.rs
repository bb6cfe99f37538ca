//! Content loader - scans the source directory for documents and static files

use glob::Pattern;
use rayon::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

use super::{Document, DocumentKind, FrontMatter, SourceId};
use crate::error::{ContentError, Result};
use crate::Site;

/// A file copied to the output unchanged
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticFile {
    /// Site-relative URL, e.g. `/assets/logo.png`
    pub url: String,
    /// Location on disk
    pub path: PathBuf,
}

/// Everything a single scan produced
#[derive(Debug, Default)]
pub struct LoadedContent {
    /// Documents ordered by source identity
    pub documents: Vec<Document>,
    /// Static files ordered by URL
    pub static_files: Vec<StaticFile>,
}

/// Loads content from the source directory
pub struct ContentLoader<'a> {
    site: &'a Site,
    exclude: Vec<Pattern>,
}

impl<'a> ContentLoader<'a> {
    /// Create a new content loader
    pub fn new(site: &'a Site) -> Self {
        let exclude = site
            .config
            .exclude
            .iter()
            .filter_map(|p| match Pattern::new(p) {
                Ok(pattern) => Some(pattern),
                Err(e) => {
                    tracing::warn!("Ignoring invalid exclude pattern {:?}: {}", p, e);
                    None
                }
            })
            .collect();
        Self { site, exclude }
    }

    /// Scan and parse everything. Any parse failure fails the whole load.
    pub fn load(&self) -> Result<LoadedContent> {
        let (sources, mut static_files) = self.scan()?;

        let results: Vec<Result<Document>> = sources
            .par_iter()
            .map(|(path, kind)| self.load_document(path, *kind))
            .collect();

        let mut documents = Vec::with_capacity(results.len());
        let mut first_error = None;
        for result in results {
            match result {
                Ok(doc) => documents.push(doc),
                Err(e) => {
                    tracing::error!("{}", e);
                    first_error.get_or_insert(e);
                }
            }
        }
        if let Some(e) = first_error {
            return Err(e);
        }

        documents.sort_by(|a, b| a.source_id().cmp(b.source_id()));
        static_files.sort_by(|a, b| a.url.cmp(&b.url));

        tracing::info!(
            "Loaded {} documents and {} static files",
            documents.len(),
            static_files.len()
        );

        Ok(LoadedContent {
            documents,
            static_files,
        })
    }

    /// Read and parse one document
    pub fn load_document(&self, path: &Path, kind: DocumentKind) -> Result<Document> {
        let raw = fs::read_to_string(path).map_err(|e| ContentError::io(path, e))?;
        let source_id = SourceId::new(self.relative(path).to_string_lossy());
        tracing::debug!("Parsing {} as {}", source_id, kind);
        FrontMatter::parse_document(&source_id, kind, &raw, &self.site.config.permalink)
    }

    /// Walk the source tree, sorting files into documents and static files
    fn scan(&self) -> Result<(Vec<(PathBuf, DocumentKind)>, Vec<StaticFile>)> {
        let mut sources = Vec::new();
        let mut static_files = Vec::new();

        let source_dir = &self.site.source_dir;
        if !source_dir.exists() {
            return Ok((sources, static_files));
        }

        let walker = WalkDir::new(source_dir)
            .follow_links(true)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !self.is_skipped(e));

        for entry in walker {
            let entry = entry.map_err(|e| {
                let path = e.path().map(Path::to_path_buf).unwrap_or_default();
                ContentError::io(path, e.into())
            })?;
            let path = entry.path();
            if !entry.file_type().is_file() {
                continue;
            }

            if path.starts_with(&self.site.static_dir) {
                let relative = path.strip_prefix(&self.site.static_dir).unwrap_or(path);
                static_files.push(StaticFile {
                    url: format!(
                        "{}/{}",
                        self.site.config.asset_prefix(),
                        to_url_path(relative)
                    ),
                    path: path.to_path_buf(),
                });
            } else if is_markdown_file(path) {
                let kind = if path.starts_with(&self.site.posts_dir) {
                    DocumentKind::Post
                } else {
                    DocumentKind::Page
                };
                sources.push((path.to_path_buf(), kind));
            } else if !path.starts_with(&self.site.posts_dir) {
                static_files.push(StaticFile {
                    url: format!("/{}", to_url_path(self.relative(path))),
                    path: path.to_path_buf(),
                });
            }
        }

        Ok((sources, static_files))
    }

    fn is_skipped(&self, entry: &DirEntry) -> bool {
        let path = entry.path();
        if path == self.site.posts_dir || path == self.site.static_dir {
            return false;
        }
        if path == self.site.public_dir {
            return true;
        }

        let name = entry.file_name().to_string_lossy();
        if name.starts_with('.') || name.starts_with('_') {
            return true;
        }

        let relative = self.relative(path);
        self.exclude.iter().any(|p| p.matches_path(relative))
    }

    fn relative<'p>(&self, path: &'p Path) -> &'p Path {
        path.strip_prefix(&self.site.source_dir).unwrap_or(path)
    }
}

/// Check if a file is a markdown file
fn is_markdown_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e == "md" || e == "markdown")
        .unwrap_or(false)
}

fn to_url_path(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SiteConfig;

    fn write(dir: &Path, rel: &str, content: &str) {
        let path = dir.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[test]
    fn test_scan_sorts_documents_and_assets() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path();
        write(
            root,
            "_posts/2022-01-11-b.md",
            "---\nlayout: post\ntitle: B\ndate: 2022-01-11 10:00:00 +0100\n---\nb",
        );
        write(
            root,
            "_posts/2021-03-01-a.md",
            "---\nlayout: post\ntitle: A\ndate: 2021-03-01 10:00:00 +0100\n---\na",
        );
        write(root, "about.md", "---\nlayout: page\ntitle: About\n---\nme");
        write(root, "assets/img/logo.png", "png");
        write(root, "favicon.ico", "ico");
        write(root, "_drafts/wip.md", "not loaded");
        write(root, "_site/old.html", "stale");
        write(root, ".git/HEAD", "ref");

        let site = Site::with_config(root, SiteConfig::default());
        let loaded = ContentLoader::new(&site).load().unwrap();

        let ids: Vec<_> = loaded
            .documents
            .iter()
            .map(|d| d.source_id().to_string())
            .collect();
        assert_eq!(
            ids,
            vec!["_posts/2021-03-01-a.md", "_posts/2022-01-11-b.md", "about.md"]
        );
        assert_eq!(loaded.documents[2].kind, DocumentKind::Page);

        let urls: Vec<_> = loaded.static_files.iter().map(|f| f.url.as_str()).collect();
        assert_eq!(urls, vec!["/assets/img/logo.png", "/favicon.ico"]);
    }

    #[test]
    fn test_exclude_patterns() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path();
        write(root, "README.md", "no front matter");
        write(root, "about.md", "---\nlayout: page\ntitle: About\n---\n");

        let config = SiteConfig {
            exclude: vec!["README.md".to_string()],
            ..Default::default()
        };
        let site = Site::with_config(root, config);
        let loaded = ContentLoader::new(&site).load().unwrap();
        assert_eq!(loaded.documents.len(), 1);
    }

    #[test]
    fn test_parse_failure_fails_load() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path();
        write(root, "_posts/bad.md", "---\nlayout: post\ntitle: Bad\n---\n");

        let site = Site::with_config(root, SiteConfig::default());
        let err = ContentLoader::new(&site).load().unwrap_err();
        assert!(matches!(
            err,
            ContentError::MissingRequiredField { field: "date", .. }
        ));
    }
}
