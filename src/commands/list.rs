//! List site content

use anyhow::Result;
use std::collections::BTreeMap;

use crate::content::Registry;
use crate::Site;

/// List site content by type
pub fn run(site: &Site, content_type: &str) -> Result<()> {
    let registry = super::load_registry(site)?;
    println!("{}", render(&registry, content_type)?);
    Ok(())
}

/// The listing as printed by [`run`]
pub fn render(registry: &Registry, content_type: &str) -> Result<String> {
    let mut lines = Vec::new();

    match content_type {
        "post" | "posts" => {
            let posts: Vec<_> = registry.all_posts().collect();
            lines.push(format!("Posts ({}):", posts.len()));
            for post in posts {
                lines.push(format!(
                    "  {} - {} [{}] {}",
                    post.date
                        .map(|d| d.format("%Y-%m-%d").to_string())
                        .unwrap_or_default(),
                    post.title,
                    post.source_id(),
                    post.permalink
                ));
            }
        }
        "page" | "pages" => {
            let pages = registry.pages();
            lines.push(format!("Pages ({}):", pages.len()));
            for page in pages {
                lines.push(format!(
                    "  {} [{}] {}",
                    page.title,
                    page.source_id(),
                    page.permalink
                ));
            }
        }
        "category" | "categories" => {
            let categories: Vec<_> = registry.categories().collect();
            lines.push(format!("Categories ({}):", categories.len()));
            for (name, count) in categories {
                lines.push(format!("  {} ({})", name, count));
            }
        }
        "tag" | "tags" => {
            let mut tags: BTreeMap<&str, usize> = BTreeMap::new();
            for post in registry.all_posts() {
                for tag in &post.tags {
                    *tags.entry(tag.as_str()).or_insert(0) += 1;
                }
            }
            lines.push(format!("Tags ({}):", tags.len()));
            for (tag, count) in tags {
                lines.push(format!("  {} ({})", tag, count));
            }
        }
        _ => {
            anyhow::bail!(
                "Unknown type: {}. Available: posts, pages, categories, tags",
                content_type
            );
        }
    }

    Ok(lines.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::{DocumentKind, FrontMatter, SourceId};

    fn registry() -> Registry {
        let mut registry = Registry::new();
        for (file, kind, raw) in [
            (
                "_posts/a.md",
                DocumentKind::Post,
                "---\nlayout: post\ntitle: Older\ndate: 2021-05-01 08:00:00 +0000\ncategories: Ruby\ntags: [cli]\n---\nx",
            ),
            (
                "_posts/b.md",
                DocumentKind::Post,
                "---\nlayout: post\ntitle: Newer\ndate: 2022-05-01 08:00:00 +0000\ncategories: ruby rails\ntags: cli web\n---\nx",
            ),
            ("about.md", DocumentKind::Page, "---\nlayout: page\ntitle: About\n---\nx"),
        ] {
            let doc =
                FrontMatter::parse_document(&SourceId::new(file), kind, raw, "/:year/:title/")
                    .unwrap();
            registry.register(doc).unwrap();
        }
        registry
    }

    #[test]
    fn test_list_posts_newest_first() {
        let out = render(&registry(), "posts").unwrap();
        let lines: Vec<_> = out.lines().collect();
        assert_eq!(lines[0], "Posts (2):");
        assert_eq!(lines[1], "  2022-05-01 - Newer [_posts/b.md] /2022/newer/");
        assert_eq!(lines[2], "  2021-05-01 - Older [_posts/a.md] /2021/older/");
    }

    #[test]
    fn test_list_pages_categories_and_tags() {
        let registry = registry();
        assert_eq!(
            render(&registry, "pages").unwrap(),
            "Pages (1):\n  About [about.md] /about/"
        );
        assert_eq!(
            render(&registry, "categories").unwrap(),
            "Categories (2):\n  rails (1)\n  ruby (2)"
        );
        assert_eq!(
            render(&registry, "tags").unwrap(),
            "Tags (2):\n  cli (2)\n  web (1)"
        );
        assert!(render(&registry, "routes").is_err());
    }
}
