//! Content module - documents, parsing, indexing, validation and rendering

mod document;
pub mod frontmatter;
pub mod html;
pub mod links;
mod liquid;
pub mod loader;
pub mod markdown;
pub mod registry;
pub mod slug;

pub use document::{Document, DocumentKind, SourceId};
pub use frontmatter::{FrontMatter, Header};
pub use html::HtmlWriter;
pub use links::{BrokenReference, LinkValidator, ReferenceProblem, ValidationReport};
pub use loader::{ContentLoader, LoadedContent, StaticFile};
pub use markdown::{Block, Inline, MarkdownRenderer, RenderedDocument};
pub use registry::{DocId, Registry, Resolved};
