//! Front-matter parsing
//!
//! A document starts with a `---` line, followed by a flat YAML mapping and a
//! closing `---` line. Everything after the closing marker is the markdown body.
//! The mapping is validated into a [`Header`], which is either a post header
//! (with a mandatory date) or a page header.

use chrono::{DateTime, FixedOffset};
use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Deserializer};
use std::fmt;

use super::document::{expand_permalink, normalize_permalink, page_permalink};
use super::slug::{post_slug, title_slug};
use super::{Document, DocumentKind, SourceId};
use crate::error::{ContentError, Result};

const DELIMITER: &str = "---";

/// Accepts a whitespace-separated string or a list of strings
fn words_or_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::{self, SeqAccess, Visitor};

    struct WordsOrList;

    impl<'de> Visitor<'de> for WordsOrList {
        type Value = Vec<String>;

        fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
            formatter.write_str("a string or a list of strings")
        }

        fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(value.split_whitespace().map(str::to_string).collect())
        }

        fn visit_seq<S>(self, mut seq: S) -> Result<Self::Value, S::Error>
        where
            S: SeqAccess<'de>,
        {
            let mut vec = Vec::new();
            while let Some(item) = seq.next_element::<Scalar>()? {
                vec.push(item.0);
            }
            Ok(vec)
        }

        fn visit_none<E>(self) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(Vec::new())
        }

        fn visit_unit<E>(self) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(Vec::new())
        }
    }

    deserializer.deserialize_any(WordsOrList)
}

/// A YAML scalar read back as text, so `title: 1984` is still a title
struct Scalar(String);

impl<'de> Deserialize<'de> for Scalar {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        use serde::de::{self, Visitor};

        struct ScalarVisitor;

        impl<'de> Visitor<'de> for ScalarVisitor {
            type Value = Scalar;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a scalar value")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Scalar, E> {
                Ok(Scalar(v.to_string()))
            }

            fn visit_bool<E: de::Error>(self, v: bool) -> Result<Scalar, E> {
                Ok(Scalar(v.to_string()))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<Scalar, E> {
                Ok(Scalar(v.to_string()))
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<Scalar, E> {
                Ok(Scalar(v.to_string()))
            }

            fn visit_f64<E: de::Error>(self, v: f64) -> Result<Scalar, E> {
                Ok(Scalar(v.to_string()))
            }
        }

        deserializer.deserialize_any(ScalarVisitor)
    }
}

fn optional_scalar<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Scalar>::deserialize(deserializer)?.map(|s| s.0))
}

/// The header exactly as written, before validation
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawFrontMatter {
    #[serde(deserialize_with = "optional_scalar")]
    layout: Option<String>,
    #[serde(deserialize_with = "optional_scalar")]
    title: Option<String>,
    #[serde(deserialize_with = "optional_scalar")]
    date: Option<String>,
    #[serde(deserialize_with = "words_or_list")]
    categories: Vec<String>,
    #[serde(deserialize_with = "words_or_list")]
    category: Vec<String>,
    #[serde(deserialize_with = "words_or_list")]
    tags: Vec<String>,
    #[serde(deserialize_with = "optional_scalar")]
    permalink: Option<String>,

    #[serde(flatten)]
    extra: IndexMap<String, serde_yaml::Value>,
}

/// Fields shared by every document kind
#[derive(Debug, Clone, PartialEq)]
pub struct CommonHeader {
    pub layout: String,
    pub title: String,
    pub categories: IndexSet<String>,
    pub tags: Vec<String>,
    pub permalink: Option<String>,
    pub extra: IndexMap<String, serde_yaml::Value>,
}

/// Validated front matter
#[derive(Debug, Clone, PartialEq)]
pub enum Header {
    Post {
        common: CommonHeader,
        date: DateTime<FixedOffset>,
    },
    Page {
        common: CommonHeader,
    },
}

impl Header {
    pub fn kind(&self) -> DocumentKind {
        match self {
            Header::Post { .. } => DocumentKind::Post,
            Header::Page { .. } => DocumentKind::Page,
        }
    }

    pub fn common(&self) -> &CommonHeader {
        match self {
            Header::Post { common, .. } | Header::Page { common } => common,
        }
    }
}

/// Result of splitting a raw document
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedDocument {
    pub header: Header,
    pub body: String,
    /// 1-based line in the source where the body starts
    pub body_line: usize,
}

/// Front-matter parser
pub struct FrontMatter;

impl FrontMatter {
    /// Split `raw` into a validated header and its body.
    pub fn parse(source_id: &SourceId, kind: DocumentKind, raw: &str) -> Result<ParsedDocument> {
        let (yaml, body, body_line) = split(source_id, raw)?;
        let fm = parse_mapping(source_id, yaml)?;
        let header = validate(source_id, kind, fm)?;
        Ok(ParsedDocument {
            header,
            body: body.to_string(),
            body_line,
        })
    }

    /// Parse `raw` and build the final [`Document`], resolving its permalink.
    ///
    /// Posts without an explicit permalink expand `post_pattern`; pages fall
    /// back to a path derived from their source location.
    pub fn parse_document(
        source_id: &SourceId,
        kind: DocumentKind,
        raw: &str,
        post_pattern: &str,
    ) -> Result<Document> {
        let ParsedDocument {
            header,
            body,
            body_line,
        } = Self::parse(source_id, kind, raw)?;

        let (common, date) = match header {
            Header::Post { common, date } => (common, Some(date)),
            Header::Page { common } => (common, None),
        };

        let slug = match &date {
            Some(date) => Some(post_slug(date, &common.title).ok_or_else(|| {
                ContentError::MalformedHeader {
                    source_id: source_id.clone(),
                    line: 1,
                    message: format!("title `{}` produces an empty slug", common.title),
                }
            })?),
            None => None,
        };

        let permalink = match (&common.permalink, &date, &slug) {
            (Some(explicit), _, _) => normalize_permalink(explicit),
            (None, Some(date), Some(slug)) => expand_permalink(
                post_pattern,
                date,
                &title_slug(&common.title),
                slug,
                &common.categories,
            ),
            _ => page_permalink(source_id),
        };

        Ok(Document::new(
            source_id.clone(),
            kind,
            common.layout,
            common.title,
            date,
            common.categories,
            common.tags,
            slug,
            permalink,
            body,
            body_line,
            common.extra,
        ))
    }
}

/// Locate the delimited header. Returns (yaml, body, body_line).
fn split<'a>(source_id: &SourceId, raw: &'a str) -> Result<(&'a str, &'a str, usize)> {
    let raw = raw.strip_prefix('\u{feff}').unwrap_or(raw);
    let malformed = |line: usize, message: &str| ContentError::MalformedHeader {
        source_id: source_id.clone(),
        line,
        message: message.to_string(),
    };

    let mut lines = raw.split_inclusive('\n');
    let first = lines.next().unwrap_or("");
    if first.trim_end() != DELIMITER {
        return Err(malformed(1, "document does not start with `---`"));
    }

    let header_start = first.len();
    let mut offset = header_start;
    let mut line_no = 1;
    for line in lines {
        line_no += 1;
        if line.trim_end() == DELIMITER {
            let yaml = &raw[header_start..offset];
            let rest = &raw[offset + line.len()..];

            // Blank lines between the marker and the body do not count
            let mut body_line = line_no + 1;
            let mut body_start = 0;
            for blank in rest.split_inclusive('\n') {
                if !blank.trim().is_empty() {
                    break;
                }
                body_start += blank.len();
                body_line += 1;
            }
            let body = rest[body_start..].trim_end();
            return Ok((yaml, body, body_line));
        }
        offset += line.len();
    }

    Err(malformed(1, "front matter opened here is never closed"))
}

fn parse_mapping(source_id: &SourceId, yaml: &str) -> Result<RawFrontMatter> {
    let malformed = |line: usize, message: String| ContentError::MalformedHeader {
        source_id: source_id.clone(),
        line,
        message,
    };

    let value: serde_yaml::Value = serde_yaml::from_str(yaml).map_err(|e| {
        // Header text starts on line 2 of the file
        let line = e.location().map(|l| l.line() + 1).unwrap_or(1);
        malformed(line, e.to_string())
    })?;

    let mapping = match value {
        serde_yaml::Value::Mapping(mapping) => mapping,
        serde_yaml::Value::Null => serde_yaml::Mapping::new(),
        _ => return Err(malformed(2, "header is not a key/value mapping".to_string())),
    };

    for (key, value) in &mapping {
        let Some(key) = key.as_str() else {
            return Err(malformed(2, format!("non-string key {:?}", key)));
        };
        let nested = match value {
            serde_yaml::Value::Mapping(_) => true,
            serde_yaml::Value::Sequence(items) => items
                .iter()
                .any(|v| matches!(v, serde_yaml::Value::Mapping(_) | serde_yaml::Value::Sequence(_))),
            _ => false,
        };
        if nested {
            return Err(malformed(
                line_of_key(yaml, key),
                format!("field `{}` is nested; only flat values are allowed", key),
            ));
        }
    }

    serde_yaml::from_value(serde_yaml::Value::Mapping(mapping))
        .map_err(|e| malformed(2, e.to_string()))
}

/// Best-effort source line of a top-level key, for diagnostics
fn line_of_key(yaml: &str, key: &str) -> usize {
    yaml.lines()
        .position(|line| {
            line.strip_prefix(key)
                .is_some_and(|rest| rest.trim_start().starts_with(':'))
        })
        .map(|i| i + 2)
        .unwrap_or(2)
}

fn validate(source_id: &SourceId, kind: DocumentKind, fm: RawFrontMatter) -> Result<Header> {
    let missing = |field: &'static str| ContentError::MissingRequiredField {
        source_id: source_id.clone(),
        field,
    };

    let layout = non_empty(fm.layout).ok_or_else(|| missing("layout"))?;
    let title = non_empty(fm.title).ok_or_else(|| missing("title"))?;

    let mut categories = IndexSet::new();
    for raw in fm.categories.into_iter().chain(fm.category) {
        let name = raw.trim().to_lowercase();
        if name.is_empty() {
            return Err(ContentError::MalformedHeader {
                source_id: source_id.clone(),
                line: 2,
                message: "empty category name".to_string(),
            });
        }
        categories.insert(name);
    }

    let common = CommonHeader {
        layout,
        title,
        categories,
        tags: fm.tags,
        permalink: non_empty(fm.permalink),
        extra: fm.extra,
    };

    match kind {
        DocumentKind::Post => {
            let raw_date = non_empty(fm.date).ok_or_else(|| missing("date"))?;
            let date = parse_date(&raw_date).ok_or_else(|| ContentError::InvalidDate {
                source_id: source_id.clone(),
                value: raw_date.clone(),
            })?;
            Ok(Header::Post { common, date })
        }
        DocumentKind::Page => {
            if fm.date.is_some() {
                tracing::debug!("Ignoring date on page {}", source_id);
            }
            Ok(Header::Page { common })
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Parse a date with time and explicit UTC offset
pub fn parse_date(s: &str) -> Option<DateTime<FixedOffset>> {
    let s = s.trim();

    let formats = [
        "%Y-%m-%d %H:%M:%S %z",
        "%Y-%m-%d %H:%M:%S %:z",
        "%Y-%m-%d %H:%M %z",
        "%Y-%m-%d %H:%M %:z",
        "%Y-%m-%dT%H:%M:%S%z",
        "%Y-%m-%dT%H:%M:%S%.f%z",
    ];

    for fmt in formats {
        if let Ok(dt) = DateTime::parse_from_str(s, fmt) {
            return Some(dt);
        }
    }

    DateTime::parse_from_rfc3339(s).ok()
}
