//! Jekyll tags found in blog bodies
//!
//! `{% highlight %}` blocks become fenced code, `{% raw %}` tags are dropped
//! with their contents kept verbatim, and every `{% post_url %}` outside a
//! raw region is handed to the caller. Line structure is preserved so
//! offsets into the expanded text still map to source lines.

use lazy_static::lazy_static;
use regex::Regex;
use std::borrow::Cow;

lazy_static! {
    pub(crate) static ref POST_URL_TAG: Regex =
        Regex::new(r"\{%-?\s*post_url\s+(\S+?)\s*-?%\}").unwrap();
    static ref HIGHLIGHT_OPEN: Regex =
        Regex::new(r"^\s*\{%-?\s*highlight\s+([^\s%`]+)[^%]*-?%\}\s*$").unwrap();
    static ref HIGHLIGHT_CLOSE: Regex = Regex::new(r"^\s*\{%-?\s*endhighlight\s*-?%\}\s*$").unwrap();
    static ref RAW_TAG: Regex = Regex::new(r"\{%-?\s*(end)?raw\s*-?%\}").unwrap();
}

/// A `{% highlight %}` without its `{% endhighlight %}`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct UnclosedHighlight {
    /// Zero-based line of the opening tag
    pub line: usize,
}

struct Highlight<'t> {
    line: usize,
    lang: String,
    lines: Vec<&'t str>,
}

impl Highlight<'_> {
    /// The fence is one backtick longer than any run inside the block, so
    /// fences shown as sample code stay content.
    fn write_to(&self, out: &mut String, closing_newline: bool) {
        let longest = self
            .lines
            .iter()
            .map(|l| longest_backtick_run(l))
            .max()
            .unwrap_or(0);
        let fence = "`".repeat(longest.max(2) + 1);

        out.push_str(&fence);
        out.push_str(&self.lang);
        out.push('\n');
        for line in &self.lines {
            out.push_str(line);
        }
        out.push_str(&fence);
        if closing_newline {
            out.push('\n');
        }
    }
}

/// Expand the tags in `text`. `post_url` gets the zero-based line and the
/// slug of each tag outside raw regions and returns its replacement.
pub(crate) fn expand<'t, F>(text: &'t str, mut post_url: F) -> Result<Cow<'t, str>, UnclosedHighlight>
where
    F: FnMut(usize, &str) -> String,
{
    if !text.contains("{%") {
        return Ok(Cow::Borrowed(text));
    }

    let mut out = String::with_capacity(text.len());
    let mut highlight: Option<Highlight<'t>> = None;
    let mut in_raw = false;

    for (idx, line) in text.split_inclusive('\n').enumerate() {
        if let Some(mut block) = highlight.take() {
            if HIGHLIGHT_CLOSE.is_match(line) {
                block.write_to(&mut out, line.ends_with('\n'));
            } else {
                block.lines.push(line);
                highlight = Some(block);
            }
            continue;
        }

        if !in_raw {
            if let Some(caps) = HIGHLIGHT_OPEN.captures(line) {
                highlight = Some(Highlight {
                    line: idx,
                    lang: caps[1].to_string(),
                    lines: Vec::new(),
                });
                continue;
            }
        }

        let mut last = 0;
        for caps in RAW_TAG.captures_iter(line) {
            let Some(tag) = caps.get(0) else { continue };
            push_segment(&mut out, &line[last..tag.start()], in_raw, idx, &mut post_url);
            in_raw = caps.get(1).is_none();
            last = tag.end();
        }
        push_segment(&mut out, &line[last..], in_raw, idx, &mut post_url);
    }

    match highlight {
        Some(block) => Err(UnclosedHighlight { line: block.line }),
        None => Ok(Cow::Owned(out)),
    }
}

fn push_segment<F>(out: &mut String, segment: &str, in_raw: bool, line: usize, post_url: &mut F)
where
    F: FnMut(usize, &str) -> String,
{
    if in_raw {
        out.push_str(segment);
        return;
    }
    let expanded = POST_URL_TAG.replace_all(segment, |caps: &regex::Captures| post_url(line, &caps[1]));
    out.push_str(&expanded);
}

fn longest_backtick_run(line: &str) -> usize {
    line.split(|c: char| c != '`').map(str::len).max().unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn expand_plain(text: &str) -> String {
        expand(text, |_, slug| format!("/{}/", slug)).unwrap().into_owned()
    }

    #[test]
    fn test_highlight_becomes_fence() {
        assert_eq!(
            expand_plain("{% highlight ruby %}\nputs 1\n{% endhighlight %}\n"),
            "```ruby\nputs 1\n```\n"
        );
    }

    #[test]
    fn test_highlight_fence_outgrows_inner_fences() {
        let text = "{% highlight markdown %}\n```ruby\nputs 1\n```\n{% endhighlight %}";
        assert_eq!(expand_plain(text), "````markdown\n```ruby\nputs 1\n```\n````");
    }

    #[test]
    fn test_line_structure_is_kept() {
        let text = "a\n{% highlight js %}\nx\n{% endhighlight %}\n{% raw %}\nb {% post_url p %}\n";
        let out = expand_plain(text);
        assert_eq!(out.lines().count(), text.lines().count());
    }

    #[test]
    fn test_raw_region_is_verbatim() {
        let text = "{% raw %}{% post_url a %}{% endraw %} {% post_url b %}\n{% raw %}\n{% post_url c %}\n{% endraw %}\n";
        assert_eq!(
            expand_plain(text),
            "{% post_url a %} /b/\n\n{% post_url c %}\n\n"
        );
    }

    #[test]
    fn test_post_url_gets_line() {
        let mut seen = Vec::new();
        expand("x\n\n[a]({% post_url 2022-01-01-a %})", |line, slug| {
            seen.push((line, slug.to_string()));
            String::new()
        })
        .unwrap();
        assert_eq!(seen, vec![(2, "2022-01-01-a".to_string())]);
    }

    #[test]
    fn test_unclosed_highlight() {
        let err = expand("x\n{% highlight ruby %}\nputs 1\n", |_, _| String::new()).unwrap_err();
        assert_eq!(err, UnclosedHighlight { line: 1 });
    }
}
