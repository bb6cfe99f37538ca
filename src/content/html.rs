//! HTML output for rendered node trees, with syntax highlighting

use syntect::highlighting::{Theme, ThemeSet};
use syntect::html::highlighted_html_for_string;
use syntect::parsing::SyntaxSet;

use super::{Block, Inline};
use crate::config::HighlightConfig;

struct Highlighter {
    syntax_set: SyntaxSet,
    theme: Theme,
    line_numbers: bool,
}

/// Writes [`Block`] trees as HTML
pub struct HtmlWriter {
    highlighter: Option<Highlighter>,
}

impl HtmlWriter {
    /// A writer that emits code blocks as plain `<pre><code>`
    pub fn plain() -> Self {
        Self { highlighter: None }
    }

    /// A writer configured from the site's highlight settings
    pub fn new(config: &HighlightConfig) -> Self {
        if !config.enable {
            return Self::plain();
        }

        let mut theme_set = ThemeSet::load_defaults();
        let theme = match theme_set.themes.remove(&config.theme) {
            Some(theme) => theme,
            None => {
                tracing::warn!(
                    "Unknown highlight theme {:?}, code blocks will not be highlighted",
                    config.theme
                );
                return Self::plain();
            }
        };

        Self {
            highlighter: Some(Highlighter {
                syntax_set: SyntaxSet::load_defaults_newlines(),
                theme,
                line_numbers: config.line_number,
            }),
        }
    }

    pub fn render(&self, blocks: &[Block]) -> String {
        let mut out = String::new();
        for block in blocks {
            self.write_block(&mut out, block);
        }
        out
    }

    fn write_block(&self, out: &mut String, block: &Block) {
        match block {
            Block::Paragraph(inlines) => {
                out.push_str("<p>");
                write_inlines(out, inlines);
                out.push_str("</p>\n");
            }
            Block::Heading { level, id, content } => {
                match id {
                    Some(id) => out.push_str(&format!("<h{} id=\"{}\">", level, escape(id))),
                    None => out.push_str(&format!("<h{}>", level)),
                }
                write_inlines(out, content);
                out.push_str(&format!("</h{}>\n", level));
            }
            Block::CodeBlock { lang, code } => {
                out.push_str(&self.code_block(code, lang.as_deref()));
                out.push('\n');
            }
            Block::BlockQuote(blocks) => {
                out.push_str("<blockquote>\n");
                for b in blocks {
                    self.write_block(out, b);
                }
                out.push_str("</blockquote>\n");
            }
            Block::List { start, items } => {
                match start {
                    Some(1) => out.push_str("<ol>\n"),
                    Some(n) => out.push_str(&format!("<ol start=\"{}\">\n", n)),
                    None => out.push_str("<ul>\n"),
                }
                for item in items {
                    out.push_str("<li>");
                    for b in item {
                        self.write_block(out, b);
                    }
                    out.push_str("</li>\n");
                }
                out.push_str(if start.is_some() { "</ol>\n" } else { "</ul>\n" });
            }
            Block::Image { src, alt, title } => {
                out.push_str("<figure>");
                write_image(out, src, alt, title);
                out.push_str("</figure>\n");
            }
            Block::Html(html) => {
                out.push_str(html);
                if !html.ends_with('\n') {
                    out.push('\n');
                }
            }
            Block::Rule => out.push_str("<hr />\n"),
        }
    }

    fn code_block(&self, code: &str, lang: Option<&str>) -> String {
        let class = lang
            .and_then(|l| l.split_whitespace().next())
            .map(|l| format!(" class=\"language-{}\"", escape(l)))
            .unwrap_or_default();

        let (Some(highlighter), Some(lang)) = (&self.highlighter, lang) else {
            return format!("<pre><code{}>{}</code></pre>", class, escape(code));
        };

        let token = lang.split_whitespace().next().unwrap_or(lang);
        let syntax = highlighter
            .syntax_set
            .find_syntax_by_token(token)
            .or_else(|| highlighter.syntax_set.find_syntax_by_extension(token))
            .unwrap_or_else(|| highlighter.syntax_set.find_syntax_plain_text());

        match highlighted_html_for_string(code, &highlighter.syntax_set, syntax, &highlighter.theme)
        {
            Ok(highlighted) if highlighter.line_numbers => add_line_numbers(&highlighted, token),
            Ok(highlighted) => format!(
                "<figure class=\"highlight {}\">{}</figure>",
                escape(token),
                highlighted
            ),
            Err(e) => {
                tracing::debug!("Highlighting {} failed: {}", token, e);
                format!("<pre><code{}>{}</code></pre>", class, escape(code))
            }
        }
    }
}

/// Wrap highlighted code in a two-column table with a line-number gutter
fn add_line_numbers(code: &str, lang: &str) -> String {
    let lines: Vec<&str> = code.lines().collect();

    let gutter = (1..=lines.len())
        .map(|i| format!(r#"<span class="line-number">{}</span>"#, i))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        r#"<figure class="highlight {}"><table><tr><td class="gutter"><pre>{}</pre></td><td class="code">{}</td></tr></table></figure>"#,
        escape(lang),
        gutter,
        lines.join("\n")
    )
}

fn write_inlines(out: &mut String, inlines: &[Inline]) {
    for inline in inlines {
        match inline {
            Inline::Text(text) => out.push_str(&escape(text)),
            Inline::Code(code) => {
                out.push_str("<code>");
                out.push_str(&escape(code));
                out.push_str("</code>");
            }
            Inline::Emphasis(content) => wrap(out, "em", content),
            Inline::Strong(content) => wrap(out, "strong", content),
            Inline::Strikethrough(content) => wrap(out, "del", content),
            Inline::Link {
                dest,
                title,
                content,
            } => {
                out.push_str(&format!("<a href=\"{}\"", escape(dest)));
                if !title.is_empty() {
                    out.push_str(&format!(" title=\"{}\"", escape(title)));
                }
                out.push('>');
                write_inlines(out, content);
                out.push_str("</a>");
            }
            Inline::Image { src, alt, title } => write_image(out, src, alt, title),
            Inline::Html(html) => out.push_str(html),
            Inline::SoftBreak => out.push('\n'),
            Inline::HardBreak => out.push_str("<br />\n"),
        }
    }
}

fn wrap(out: &mut String, tag: &str, content: &[Inline]) {
    out.push_str(&format!("<{}>", tag));
    write_inlines(out, content);
    out.push_str(&format!("</{}>", tag));
}

fn write_image(out: &mut String, src: &str, alt: &str, title: &str) {
    out.push_str(&format!("<img src=\"{}\" alt=\"{}\"", escape(src), escape(alt)));
    if !title.is_empty() {
        out.push_str(&format!(" title=\"{}\"", escape(title)));
    }
    out.push_str(" />");
}

/// Simple HTML escaping
pub fn escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}
