//! postpress: a strict static site builder for Jekyll-style Markdown blogs
//!
//! A build runs the same stages every time:
//! scan → parse → register → validate → render → plan → emit.
//! Nothing is written until every document has parsed, registered and
//! rendered, and the output plan is free of path collisions.

pub mod commands;
pub mod config;
pub mod content;
pub mod error;
pub mod generator;

pub use error::{ContentError, IdentifierKind};

use anyhow::Result;
use std::path::{Path, PathBuf};

/// A site on disk: its configuration plus resolved directories
#[derive(Debug, Clone)]
pub struct Site {
    /// Site configuration
    pub config: config::SiteConfig,
    /// Base directory (where `_config.yml` lives)
    pub base_dir: PathBuf,
    /// Source directory
    pub source_dir: PathBuf,
    /// Directory holding posts
    pub posts_dir: PathBuf,
    /// Directory holding static assets
    pub static_dir: PathBuf,
    /// Public (output) directory
    pub public_dir: PathBuf,
}

impl Site {
    /// Open a site directory, reading `_config.yml` if present
    pub fn new<P: AsRef<Path>>(base_dir: P) -> Result<Self> {
        let base_dir = base_dir.as_ref();
        let config_path = base_dir.join("_config.yml");

        let config = if config_path.exists() {
            config::SiteConfig::load(&config_path)?
        } else {
            tracing::debug!("No _config.yml in {:?}, using defaults", base_dir);
            config::SiteConfig::default()
        };

        Ok(Self::with_config(base_dir, config))
    }

    /// Build a site handle from an already loaded configuration
    pub fn with_config<P: AsRef<Path>>(base_dir: P, config: config::SiteConfig) -> Self {
        let base_dir = base_dir.as_ref().to_path_buf();
        let source_dir = match config.source_dir.trim_matches('/') {
            "" | "." => base_dir.clone(),
            dir => base_dir.join(dir),
        };
        let posts_dir = source_dir.join(&config.posts_dir);
        let static_dir = source_dir.join(&config.static_dir);
        let public_dir = base_dir.join(&config.public_dir);

        Self {
            config,
            base_dir,
            source_dir,
            posts_dir,
            static_dir,
            public_dir,
        }
    }

    /// Run the full pipeline and write the site
    pub fn generate(&self, strict: bool) -> Result<()> {
        commands::generate::run(self, strict).map(|_| ())
    }

    /// Remove the public directory
    pub fn clean(&self) -> Result<()> {
        commands::clean::run(self)
    }
}
