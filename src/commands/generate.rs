//! Generate static files

use anyhow::Result;
use notify::RecursiveMode;
use notify_debouncer_mini::new_debouncer;
use std::path::Path;
use std::time::{Duration, Instant};

use crate::content::{LinkValidator, MarkdownRenderer};
use crate::generator::Generator;
use crate::Site;

/// What a successful build produced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildStats {
    pub documents: usize,
    pub files: usize,
    pub broken_references: usize,
}

/// Run the whole pipeline. `strict` (or `strict: true` in the config) makes
/// broken references fatal.
pub fn run(site: &Site, strict: bool) -> Result<BuildStats> {
    let start = Instant::now();
    let strict = strict || site.config.strict;

    let registry = super::load_registry(site)?;

    let validator = LinkValidator::new(&site.config);
    let renderer = MarkdownRenderer::new();
    let (report, rendered) = rayon::join(
        || validator.validate(&registry),
        || renderer.render_all(&registry),
    );
    report.enforce(strict)?;
    let rendered = rendered?;

    let generator = Generator::new(site);
    let plan = generator.plan(&registry, &rendered)?;
    let files = generator.emit(&plan)?;

    tracing::info!(
        "Generated {} files from {} documents in {:.2}s",
        files,
        registry.len(),
        start.elapsed().as_secs_f64()
    );

    Ok(BuildStats {
        documents: registry.len(),
        files,
        broken_references: report.len(),
    })
}

/// Build once before watching. With `keep_going` a failed build is logged
/// and `None` returned, so the watcher still starts.
pub fn first_build(site: &Site, strict: bool, keep_going: bool) -> Result<Option<BuildStats>> {
    match run(site, strict) {
        Ok(stats) => Ok(Some(stats)),
        Err(e) if keep_going => {
            tracing::error!("Generation failed: {:#}", e);
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

/// Rebuild whenever the source tree or `_config.yml` changes. Failed builds
/// are logged and the watcher keeps running.
pub fn watch(site: &Site, strict: bool) -> Result<()> {
    let (tx, rx) = std::sync::mpsc::channel();
    let mut debouncer = new_debouncer(Duration::from_millis(500), tx)?;

    debouncer
        .watcher()
        .watch(&site.source_dir, RecursiveMode::Recursive)?;
    tracing::debug!("Watching: {:?}", site.source_dir);

    let config_path = site.base_dir.join("_config.yml");
    if config_path.exists() && !config_path.starts_with(&site.source_dir) {
        debouncer
            .watcher()
            .watch(&config_path, RecursiveMode::NonRecursive)?;
        tracing::debug!("Watching: {:?}", config_path);
    }

    tracing::info!("Watching for changes. Press Ctrl+C to stop.");

    let mut site = site.clone();
    loop {
        match rx.recv() {
            Ok(Ok(events)) => {
                let changed: Vec<&Path> = events
                    .iter()
                    .map(|e| e.path.as_path())
                    .filter(|p| is_relevant(&site, p))
                    .collect();
                if changed.is_empty() {
                    continue;
                }
                for path in &changed {
                    tracing::info!("File changed: {}", path.display());
                }

                if changed.iter().any(|p| *p == config_path) {
                    match Site::new(&site.base_dir) {
                        Ok(reloaded) => site = reloaded,
                        Err(e) => {
                            tracing::error!("Failed to reload configuration: {:#}", e);
                            continue;
                        }
                    }
                }

                if let Err(e) = run(&site, strict) {
                    tracing::error!("Generation failed: {:#}", e);
                }
            }
            Ok(Err(e)) => tracing::error!("Watch error: {:?}", e),
            Err(_) => break,
        }
    }

    Ok(())
}

/// Output and editor droppings never trigger a rebuild
fn is_relevant(site: &Site, path: &Path) -> bool {
    if path.starts_with(&site.public_dir) {
        return false;
    }
    let path_str = path.to_string_lossy();
    !path_str.contains("/.git")
        && !path_str.ends_with(".DS_Store")
        && !path_str.ends_with('~')
        && !path_str.ends_with(".swp")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SiteConfig;

    #[test]
    fn test_is_relevant() {
        let site = Site::with_config("/site", SiteConfig::default());
        assert!(is_relevant(&site, Path::new("/site/_posts/a.md")));
        assert!(is_relevant(&site, Path::new("/site/_config.yml")));
        assert!(!is_relevant(&site, Path::new("/site/_site/index.html")));
        assert!(!is_relevant(&site, Path::new("/site/.git/index")));
        assert!(!is_relevant(&site, Path::new("/site/_posts/a.md~")));
    }

    #[test]
    fn test_first_build_keeps_going_when_watching() {
        let tmp = tempfile::tempdir().unwrap();
        let posts = tmp.path().join("_posts");
        std::fs::create_dir_all(&posts).unwrap();
        std::fs::write(posts.join("2022-01-11-x.md"), "---\nlayout: post\ntitle: X\n").unwrap();
        let site = Site::with_config(tmp.path(), SiteConfig::default());

        assert!(first_build(&site, false, false).is_err());
        assert_eq!(first_build(&site, false, true).unwrap(), None);

        std::fs::write(
            posts.join("2022-01-11-x.md"),
            "---\nlayout: post\ntitle: X\ndate: 2022-01-11 10:00:00 +0000\n---\nFixed",
        )
        .unwrap();
        let stats = first_build(&site, false, true).unwrap().unwrap();
        assert_eq!(stats.documents, 1);
    }
}
