//! Markdown rendering into a block-level node tree
//!
//! The tree is a pure function of the body text (plus post lookups for
//! `{% post_url %}`), so rendering twice yields equal trees. HTML is produced
//! from the tree separately, see [`super::html`].

use pulldown_cmark::{CodeBlockKind, Event, Options, Parser, Tag};
use rayon::prelude::*;

use super::liquid;
use super::{DocId, Document, Registry};
use crate::error::{ContentError, Result};

const EXCERPT_SEPARATOR: &str = "<!-- more -->";

/// Block-level content
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Block {
    Paragraph(Vec<Inline>),
    Heading {
        level: u8,
        id: Option<String>,
        content: Vec<Inline>,
    },
    /// Fenced or indented code. `lang` is the fence's info string as written.
    CodeBlock {
        lang: Option<String>,
        code: String,
    },
    BlockQuote(Vec<Block>),
    List {
        /// Start number for ordered lists
        start: Option<u64>,
        items: Vec<Vec<Block>>,
    },
    /// A paragraph holding nothing but one image
    Image {
        src: String,
        alt: String,
        title: String,
    },
    Html(String),
    Rule,
}

/// Inline content
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inline {
    Text(String),
    Code(String),
    Emphasis(Vec<Inline>),
    Strong(Vec<Inline>),
    Strikethrough(Vec<Inline>),
    Link {
        dest: String,
        title: String,
        content: Vec<Inline>,
    },
    Image {
        src: String,
        alt: String,
        title: String,
    },
    Html(String),
    SoftBreak,
    HardBreak,
}

/// Render output for one document
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedDocument {
    pub id: DocId,
    pub blocks: Vec<Block>,
    /// Content before `<!-- more -->`, or the first paragraph
    pub excerpt: Vec<Block>,
}

/// Markdown renderer
#[derive(Debug, Default, Clone)]
pub struct MarkdownRenderer;

impl MarkdownRenderer {
    pub fn new() -> Self {
        Self
    }

    /// Render every registered document. Fails on the first (by registration
    /// order) document with an authoring error.
    pub fn render_all(&self, registry: &Registry) -> Result<Vec<RenderedDocument>> {
        let docs: Vec<(DocId, &Document)> = registry.documents().collect();
        let results: Vec<Result<RenderedDocument>> = docs
            .par_iter()
            .map(|(id, doc)| self.render_document(registry, *id, doc))
            .collect();
        let rendered = results.into_iter().collect::<Result<Vec<_>>>()?;
        tracing::info!("Rendered {} documents", rendered.len());
        Ok(rendered)
    }

    pub fn render_document(
        &self,
        registry: &Registry,
        id: DocId,
        doc: &Document,
    ) -> Result<RenderedDocument> {
        let blocks = self.render(registry, doc)?;
        let excerpt = match blocks.iter().position(is_excerpt_separator) {
            Some(pos) => blocks[..pos].to_vec(),
            None => blocks
                .iter()
                .find(|b| matches!(b, Block::Paragraph(_)))
                .cloned()
                .into_iter()
                .collect(),
        };
        Ok(RenderedDocument {
            id,
            blocks,
            excerpt,
        })
    }

    /// Render a document body into blocks
    pub fn render(&self, registry: &Registry, doc: &Document) -> Result<Vec<Block>> {
        let text = liquid::expand(&doc.body, |_, slug| match registry.post_by_slug(slug) {
            Some(post) => post.permalink.clone(),
            None => format!("/{}", slug),
        })
        .map_err(|unclosed| unterminated(doc, unclosed.line))?;

        let options = Options::ENABLE_STRIKETHROUGH | Options::ENABLE_HEADING_ATTRIBUTES;
        let mut builder = TreeBuilder::new();
        for (event, range) in Parser::new_ext(&text, options).into_offset_iter() {
            if let Event::Start(Tag::CodeBlock(CodeBlockKind::Fenced(_))) = &event {
                if !is_closed_fence(&text[range.clone()]) {
                    return Err(unterminated(doc, text[..range.start].matches('\n').count()));
                }
            }
            builder.event(event);
        }
        Ok(builder.finish())
    }
}

/// `<!-- more -->` on its own, outside any container or code
fn is_excerpt_separator(block: &Block) -> bool {
    matches!(block, Block::Html(html) if html.trim() == EXCERPT_SEPARATOR)
}

fn unterminated(doc: &Document, body_line: usize) -> ContentError {
    ContentError::UnterminatedCodeFence {
        source_id: doc.source_id().clone(),
        line: doc.body_line + body_line,
    }
}

/// Marker, length and trailing text of a fence line
fn fence_line(line: &str) -> Option<(char, usize, &str)> {
    let trimmed = line.trim_start_matches([' ', '\t', '>']);
    let marker = trimmed.chars().next().filter(|c| *c == '`' || *c == '~')?;
    let run = trimmed.chars().take_while(|c| *c == marker).count();
    (run >= 3).then(|| (marker, run, &trimmed[run..]))
}

/// A fenced block that never met its closing fence runs to the end of its
/// container, so its last line is content rather than a matching fence.
fn is_closed_fence(block: &str) -> bool {
    let mut lines = block.lines();
    let Some((marker, run, _)) = lines.next().and_then(fence_line) else {
        return true;
    };
    match lines.last().and_then(fence_line) {
        Some((m, r, rest)) => m == marker && r >= run && rest.trim().is_empty(),
        None => false,
    }
}

enum InlineKind {
    Paragraph,
    Heading(u8, Option<String>),
    Emphasis,
    Strong,
    Strikethrough,
    Link { dest: String, title: String },
}

enum Frame {
    /// Root, block quote or list item
    Blocks {
        blocks: Vec<Block>,
        /// Inlines of a tight list item, which come without a paragraph
        loose: Vec<Inline>,
    },
    Inlines(InlineKind, Vec<Inline>),
    List(Option<u64>, Vec<Vec<Block>>),
    Code(Option<String>, String),
    Image { src: String, title: String, alt: String },
    HtmlBlock(String),
    /// Containers without a node of their own; content goes to the parent
    Transparent,
}

/// Builds the node tree from pulldown-cmark events. Every `Start` pushes a
/// frame and every `End` pops one, so frames close by position rather than by
/// matching tag payloads.
struct TreeBuilder {
    stack: Vec<Frame>,
    /// Kind of each `Blocks` frame above the root, to know what to emit on pop
    quotes: Vec<bool>,
}

impl TreeBuilder {
    fn new() -> Self {
        Self {
            stack: vec![Frame::Blocks {
                blocks: Vec::new(),
                loose: Vec::new(),
            }],
            quotes: Vec::new(),
        }
    }

    fn event(&mut self, event: Event<'_>) {
        match event {
            Event::Start(tag) => self.start(tag),
            Event::End(_) => self.end(),
            Event::Text(text) => self.text(&text),
            Event::Code(code) => self.push_inline(Inline::Code(code.into_string())),
            Event::InlineHtml(html) => self.push_inline(Inline::Html(html.into_string())),
            Event::Html(html) => match self.stack.last_mut() {
                Some(Frame::HtmlBlock(buf)) => buf.push_str(&html),
                _ => self.push_inline(Inline::Html(html.into_string())),
            },
            Event::SoftBreak => self.push_inline(Inline::SoftBreak),
            Event::HardBreak => self.push_inline(Inline::HardBreak),
            Event::Rule => self.push_block(Block::Rule),
            _ => {}
        }
    }

    fn start(&mut self, tag: Tag<'_>) {
        let frame = match tag {
            Tag::Paragraph => Frame::Inlines(InlineKind::Paragraph, Vec::new()),
            Tag::Heading { level, id, .. } => Frame::Inlines(
                InlineKind::Heading(level as u8, id.map(|s| s.into_string())),
                Vec::new(),
            ),
            Tag::Emphasis => Frame::Inlines(InlineKind::Emphasis, Vec::new()),
            Tag::Strong => Frame::Inlines(InlineKind::Strong, Vec::new()),
            Tag::Strikethrough => Frame::Inlines(InlineKind::Strikethrough, Vec::new()),
            Tag::Link {
                dest_url, title, ..
            } => Frame::Inlines(
                InlineKind::Link {
                    dest: dest_url.into_string(),
                    title: title.into_string(),
                },
                Vec::new(),
            ),
            Tag::Image {
                dest_url, title, ..
            } => Frame::Image {
                src: dest_url.into_string(),
                title: title.into_string(),
                alt: String::new(),
            },
            Tag::CodeBlock(kind) => {
                let lang = match kind {
                    CodeBlockKind::Fenced(info) => {
                        let info = info.trim();
                        (!info.is_empty()).then(|| info.to_string())
                    }
                    CodeBlockKind::Indented => None,
                };
                Frame::Code(lang, String::new())
            }
            Tag::BlockQuote(_) => {
                self.quotes.push(true);
                Frame::Blocks {
                    blocks: Vec::new(),
                    loose: Vec::new(),
                }
            }
            Tag::Item => {
                self.quotes.push(false);
                Frame::Blocks {
                    blocks: Vec::new(),
                    loose: Vec::new(),
                }
            }
            Tag::List(start) => Frame::List(start, Vec::new()),
            Tag::HtmlBlock => Frame::HtmlBlock(String::new()),
            _ => Frame::Transparent,
        };
        self.stack.push(frame);
    }

    fn end(&mut self) {
        if self.stack.len() <= 1 {
            return;
        }
        let Some(frame) = self.stack.pop() else {
            return;
        };
        match frame {
            Frame::Inlines(kind, content) => match kind {
                InlineKind::Paragraph => match content.as_slice() {
                    [Inline::Image { src, alt, title }] => self.push_block(Block::Image {
                        src: src.clone(),
                        alt: alt.clone(),
                        title: title.clone(),
                    }),
                    _ => self.push_block(Block::Paragraph(content)),
                },
                InlineKind::Heading(level, id) => self.push_block(Block::Heading {
                    level,
                    id,
                    content,
                }),
                InlineKind::Emphasis => self.push_inline(Inline::Emphasis(content)),
                InlineKind::Strong => self.push_inline(Inline::Strong(content)),
                InlineKind::Strikethrough => self.push_inline(Inline::Strikethrough(content)),
                InlineKind::Link { dest, title } => self.push_inline(Inline::Link {
                    dest,
                    title,
                    content,
                }),
            },
            Frame::Image { src, title, alt } => self.push_inline(Inline::Image { src, alt, title }),
            Frame::Code(lang, code) => self.push_block(Block::CodeBlock { lang, code }),
            Frame::HtmlBlock(html) => self.push_block(Block::Html(html)),
            Frame::List(start, items) => self.push_block(Block::List { start, items }),
            Frame::Blocks { mut blocks, loose } => {
                if !loose.is_empty() {
                    blocks.push(Block::Paragraph(loose));
                }
                let is_quote = self.quotes.pop().unwrap_or(false);
                if is_quote {
                    self.push_block(Block::BlockQuote(blocks));
                } else if let Some(Frame::List(_, items)) = self.stack.last_mut() {
                    items.push(blocks);
                }
            }
            Frame::Transparent => {}
        }
    }

    fn text(&mut self, text: &str) {
        for frame in self.stack.iter_mut().rev() {
            match frame {
                Frame::Code(_, code) => return code.push_str(text),
                Frame::Image { alt, .. } => return alt.push_str(text),
                Frame::HtmlBlock(html) => return html.push_str(text),
                Frame::Transparent => continue,
                _ => break,
            }
        }
        self.push_inline(Inline::Text(text.to_string()));
    }

    fn push_inline(&mut self, inline: Inline) {
        for frame in self.stack.iter_mut().rev() {
            match frame {
                Frame::Inlines(_, content) => return push_merged(content, inline),
                Frame::Blocks { loose, .. } => return push_merged(loose, inline),
                Frame::Image { alt, .. } => return push_plain(alt, &inline),
                _ => continue,
            }
        }
    }

    fn push_block(&mut self, block: Block) {
        for frame in self.stack.iter_mut().rev() {
            if let Frame::Blocks { blocks, loose } = frame {
                if !loose.is_empty() {
                    blocks.push(Block::Paragraph(std::mem::take(loose)));
                }
                blocks.push(block);
                return;
            }
        }
    }

    fn finish(mut self) -> Vec<Block> {
        while self.stack.len() > 1 {
            self.end();
        }
        match self.stack.pop() {
            Some(Frame::Blocks { mut blocks, loose }) => {
                if !loose.is_empty() {
                    blocks.push(Block::Paragraph(loose));
                }
                blocks
            }
            _ => Vec::new(),
        }
    }
}

/// Image alt text keeps the words of nested formatting
fn push_plain(out: &mut String, inline: &Inline) {
    match inline {
        Inline::Text(t) | Inline::Code(t) => out.push_str(t),
        Inline::Emphasis(content)
        | Inline::Strong(content)
        | Inline::Strikethrough(content)
        | Inline::Link { content, .. } => {
            for inner in content {
                push_plain(out, inner);
            }
        }
        Inline::Image { alt, .. } => out.push_str(alt),
        Inline::SoftBreak | Inline::HardBreak => out.push(' '),
        Inline::Html(_) => {}
    }
}

/// Adjacent text runs are merged so equal bodies give equal trees
fn push_merged(content: &mut Vec<Inline>, inline: Inline) {
    if let (Some(Inline::Text(prev)), Inline::Text(next)) = (content.last_mut(), &inline) {
        prev.push_str(next);
        return;
    }
    content.push(inline);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::{DocumentKind, FrontMatter, SourceId};

    fn doc(file: &str, title: &str, body: &str) -> Document {
        let raw = format!(
            "---\nlayout: post\ntitle: {}\ndate: 2022-01-11 10:00:00 +0100\n---\n{}",
            title, body
        );
        FrontMatter::parse_document(&SourceId::new(file), DocumentKind::Post, &raw, "/:year/:title/")
            .unwrap()
    }

    fn render(body: &str) -> Result<Vec<Block>> {
        let registry = Registry::new();
        MarkdownRenderer::new().render(&registry, &doc("_posts/a.md", "A", body))
    }

    #[test]
    fn test_render_basic_blocks() {
        let blocks = render("# Hello World\n\nThis is *a* test.\n\n> quoted\n\n---").unwrap();
        assert_eq!(
            blocks[0],
            Block::Heading {
                level: 1,
                id: None,
                content: vec![Inline::Text("Hello World".to_string())],
            }
        );
        assert_eq!(
            blocks[1],
            Block::Paragraph(vec![
                Inline::Text("This is ".to_string()),
                Inline::Emphasis(vec![Inline::Text("a".to_string())]),
                Inline::Text(" test.".to_string()),
            ])
        );
        assert_eq!(
            blocks[2],
            Block::BlockQuote(vec![Block::Paragraph(vec![Inline::Text("quoted".to_string())])])
        );
        assert_eq!(blocks[3], Block::Rule);
    }

    #[test]
    fn test_fenced_code_keeps_language_tag() {
        let blocks = render("```swift\nlet x = 1\n```\n\n```\nplain\n```").unwrap();
        assert_eq!(
            blocks,
            vec![
                Block::CodeBlock {
                    lang: Some("swift".to_string()),
                    code: "let x = 1\n".to_string(),
                },
                Block::CodeBlock {
                    lang: None,
                    code: "plain\n".to_string(),
                },
            ]
        );
    }

    #[test]
    fn test_highlight_tag_becomes_code_block() {
        let blocks = render("{% highlight ruby %}\nputs 1\n{% endhighlight %}").unwrap();
        assert_eq!(
            blocks,
            vec![Block::CodeBlock {
                lang: Some("ruby".to_string()),
                code: "puts 1\n".to_string(),
            }]
        );
    }

    #[test]
    fn test_unterminated_fence_names_document_and_line() {
        let registry = Registry::new();
        let d = doc("_posts/broken.md", "Broken", "Intro\n\n```js\nconsole.log(1)\n");
        let err = MarkdownRenderer::new().render(&registry, &d).unwrap_err();
        match err {
            ContentError::UnterminatedCodeFence { source_id, line } => {
                assert_eq!(source_id.to_string(), "_posts/broken.md");
                // header is 5 lines, body starts on 6, fence is its third line
                assert_eq!(line, 8);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_unterminated_highlight_tag() {
        let err = render("{% highlight ruby %}\nputs 1\n").unwrap_err();
        assert!(matches!(err, ContentError::UnterminatedCodeFence { line: 6, .. }));
    }

    #[test]
    fn test_fence_with_shorter_close_is_unterminated() {
        assert!(render("````\ncode\n```\n").is_err());
        assert!(render("~~~\ncode\n~~~\n").is_ok());
        assert!(render("Use ```inline``` code").is_ok());
    }

    #[test]
    fn test_lists_and_images() {
        let blocks = render("- one\n- **two**\n\n![alt text](/assets/a.png \"T\")").unwrap();
        assert_eq!(
            blocks[0],
            Block::List {
                start: None,
                items: vec![
                    vec![Block::Paragraph(vec![Inline::Text("one".to_string())])],
                    vec![Block::Paragraph(vec![Inline::Strong(vec![Inline::Text(
                        "two".to_string()
                    )])])],
                ],
            }
        );
        assert_eq!(
            blocks[1],
            Block::Image {
                src: "/assets/a.png".to_string(),
                alt: "alt text".to_string(),
                title: "T".to_string(),
            }
        );
    }

    #[test]
    fn test_links_and_html() {
        let blocks = render("A [link](/about/ \"About\") and <br> here.\n\n<div>raw</div>").unwrap();
        assert_eq!(
            blocks[0],
            Block::Paragraph(vec![
                Inline::Text("A ".to_string()),
                Inline::Link {
                    dest: "/about/".to_string(),
                    title: "About".to_string(),
                    content: vec![Inline::Text("link".to_string())],
                },
                Inline::Text(" and ".to_string()),
                Inline::Html("<br>".to_string()),
                Inline::Text(" here.".to_string()),
            ])
        );
        assert_eq!(blocks[1], Block::Html("<div>raw</div>".to_string()));
    }

    #[test]
    fn test_render_is_idempotent() {
        let body = "# T\n\n- a\n- b\n\n```rb\nx\n```\n\n> q *e*";
        assert_eq!(render(body).unwrap(), render(body).unwrap());
    }

    #[test]
    fn test_post_url_resolves_through_registry() {
        let mut registry = Registry::new();
        let target = doc("_posts/t.md", "Target Post", "x");
        let permalink = target.permalink.clone();
        let id = registry.register(target).unwrap();
        let linking = doc("_posts/l.md", "Linking", "[t]({% post_url 2022-01-11-target-post %})");
        let blocks = MarkdownRenderer::new().render(&registry, &linking).unwrap();
        match &blocks[0] {
            Block::Paragraph(inlines) => match &inlines[0] {
                Inline::Link { dest, .. } => assert_eq!(dest, &permalink),
                other => panic!("unexpected inline: {other:?}"),
            },
            other => panic!("unexpected block: {other:?}"),
        }
        assert_eq!(registry.get(id).permalink, "/2022/target-post/");
    }

    #[test]
    fn test_excerpt() {
        let registry = Registry::new();
        let with_marker = doc("_posts/a.md", "A", "First.\n\nSecond.\n\n<!-- more -->\n\nRest.");
        let rendered = MarkdownRenderer::new()
            .render_document(&registry, DocId(0), &with_marker)
            .unwrap();
        assert_eq!(rendered.excerpt.len(), 2);

        let without = doc("_posts/b.md", "B", "# Head\n\nOnly this.\n\nNot this.");
        let rendered = MarkdownRenderer::new()
            .render_document(&registry, DocId(0), &without)
            .unwrap();
        assert_eq!(
            rendered.excerpt,
            vec![Block::Paragraph(vec![Inline::Text("Only this.".to_string())])]
        );
    }

    #[test]
    fn test_highlight_block_showing_a_fence() {
        let blocks =
            render("{% highlight markdown %}\n```ruby\nputs 1\n```\n{% endhighlight %}").unwrap();
        assert_eq!(
            blocks,
            vec![Block::CodeBlock {
                lang: Some("markdown".to_string()),
                code: "```ruby\nputs 1\n```\n".to_string(),
            }]
        );
    }

    #[test]
    fn test_fence_inside_indented_code_is_content() {
        let blocks = render("Indented example:\n\n    ```\n\nDone.").unwrap();
        assert_eq!(
            blocks[1],
            Block::CodeBlock {
                lang: None,
                code: "```\n".to_string(),
            }
        );
        assert!(render("> ```\n> quoted\n> ```\n\nafter").is_ok());
        assert!(render("- item\n\n  ```\n  listed\n  ```\n").is_ok());
    }

    #[test]
    fn test_excerpt_marker_inside_code_is_ignored() {
        let registry = Registry::new();
        let d = doc(
            "_posts/a.md",
            "A",
            "Jekyll splits here:\n\n```html\n<!-- more -->\n```\n\nEnd.",
        );
        let rendered = MarkdownRenderer::new()
            .render_document(&registry, DocId(0), &d)
            .unwrap();
        assert_eq!(rendered.blocks.len(), 3);
        assert_eq!(
            rendered.excerpt,
            vec![Block::Paragraph(vec![Inline::Text("Jekyll splits here:".to_string())])]
        );
    }

    #[test]
    fn test_raw_region_keeps_post_url_tag() {
        let blocks = render("{% raw %}`{% post_url 2022-01-01-x %}`{% endraw %}").unwrap();
        assert_eq!(
            blocks,
            vec![Block::Paragraph(vec![Inline::Code(
                "{% post_url 2022-01-01-x %}".to_string()
            )])]
        );
    }

    #[test]
    fn test_image_alt_flattens_formatting() {
        let blocks = render("![*big* **fat** cat](/assets/cat.png)").unwrap();
        assert_eq!(
            blocks,
            vec![Block::Image {
                src: "/assets/cat.png".to_string(),
                alt: "big fat cat".to_string(),
                title: String::new(),
            }]
        );
    }
}
