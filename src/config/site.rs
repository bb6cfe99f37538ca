//! Site configuration (_config.yml)

use anyhow::{Context, Result};
use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Characters escaped in a category's path segment
const SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'\\')
    .add(b'`')
    .add(b'{')
    .add(b'}');

/// Main site configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteConfig {
    // Site
    pub title: String,
    pub description: String,
    pub author: String,

    // URL
    pub url: String,
    pub root: String,
    pub permalink: String,

    // Directory
    pub source_dir: String,
    pub public_dir: String,
    pub posts_dir: String,
    pub static_dir: String,
    pub asset_prefix: String,
    pub category_dir: String,
    #[serde(default)]
    pub exclude: Vec<String>,

    // Feed
    pub feed: String,
    pub feed_limit: usize,

    // Validation
    pub strict: bool,

    #[serde(default)]
    pub highlight: HighlightConfig,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            title: "Postpress".to_string(),
            description: String::new(),
            author: String::new(),

            url: "http://example.com".to_string(),
            root: "/".to_string(),
            permalink: "/:year/:month/:day/:title/".to_string(),

            source_dir: ".".to_string(),
            public_dir: "_site".to_string(),
            posts_dir: "_posts".to_string(),
            static_dir: "assets".to_string(),
            asset_prefix: "/assets".to_string(),
            category_dir: "categories".to_string(),
            exclude: Vec::new(),

            feed: "feed.xml".to_string(),
            feed_limit: 20,

            strict: false,

            highlight: HighlightConfig::default(),
        }
    }
}

impl SiteConfig {
    /// Load configuration from a file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content =
            fs::read_to_string(path).with_context(|| format!("Failed to read {:?}", path))?;
        let config: SiteConfig = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse {:?}", path))?;
        Ok(config)
    }

    /// Asset prefix normalized to `/prefix` without a trailing slash
    pub fn asset_prefix(&self) -> String {
        let trimmed = self.asset_prefix.trim_matches('/');
        if trimmed.is_empty() {
            String::new()
        } else {
            format!("/{}", trimmed)
        }
    }

    /// Prefix a site-relative path with the configured root
    pub fn url_for(&self, path: &str) -> String {
        let root = self.root.trim_end_matches('/');
        let path = path.trim_start_matches('/');
        format!("{}/{}", root, path)
    }

    /// Site path of a category's listing page. The lowercased name is
    /// percent-encoded, so distinct categories never share a path.
    pub fn category_url(&self, name: &str) -> String {
        let name = name.trim().to_lowercase();
        format!(
            "/{}/{}/",
            self.category_dir.trim_matches('/'),
            utf8_percent_encode(&name, SEGMENT)
        )
    }

    /// Absolute URL for a site-relative path
    pub fn full_url_for(&self, path: &str) -> String {
        format!("{}{}", self.url.trim_end_matches('/'), self.url_for(path))
    }
}

/// Syntax highlighting configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HighlightConfig {
    pub enable: bool,
    pub theme: String,
    pub line_number: bool,
}

impl Default for HighlightConfig {
    fn default() -> Self {
        Self {
            enable: true,
            theme: "base16-ocean.dark".to_string(),
            line_number: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SiteConfig::default();
        assert_eq!(config.posts_dir, "_posts");
        assert_eq!(config.asset_prefix(), "/assets");
        assert!(!config.strict);
    }

    #[test]
    fn test_parse_config() {
        let yaml = r#"
title: My Blog
url: https://blog.example.com/
asset_prefix: media/
strict: true
highlight:
  enable: false
"#;
        let config: SiteConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.title, "My Blog");
        assert_eq!(config.asset_prefix(), "/media");
        assert!(config.strict);
        assert!(!config.highlight.enable);
        assert_eq!(config.highlight.theme, "base16-ocean.dark");
        assert_eq!(config.public_dir, "_site");
    }

    #[test]
    fn test_urls_respect_root() {
        let config = SiteConfig {
            url: "https://example.com/".to_string(),
            root: "/blog/".to_string(),
            ..Default::default()
        };
        assert_eq!(config.url_for("/about/"), "/blog/about/");
        assert_eq!(config.full_url_for("/about/"), "https://example.com/blog/about/");
    }

    #[test]
    fn test_category_url() {
        let config = SiteConfig::default();
        assert_eq!(config.category_url("Ruby"), "/categories/ruby/");
        assert_eq!(config.category_url("ruby on rails"), "/categories/ruby%20on%20rails/");
        assert_eq!(config.category_url("c++"), "/categories/c++/");
        assert_eq!(config.category_url("c#"), "/categories/c%23/");
        assert_eq!(config.category_url("a/b"), "/categories/a%2Fb/");
    }
}
