//! Build driver commands

pub mod check;
pub mod clean;
pub mod generate;
pub mod list;

use crate::content::{ContentLoader, Registry};
use crate::error::Result;
use crate::Site;

/// Scan, parse and register the site's content
pub fn load_registry(site: &Site) -> Result<Registry> {
    let content = ContentLoader::new(site).load()?;
    Registry::from_content(content)
}
