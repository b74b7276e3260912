//! Template tokenizer.

use std::fmt;

use super::ResolutionError;

const OPEN: &str = "{{";
const CLOSE: &str = "}}";
const HISTORY_PREFIX: &str = "output[";

/// What a placeholder refers to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaceholderKind {
    /// `{{name}}`
    Context { name: String },

    /// `{{output[-back]}}` with an optional `.field.path`
    History { back: usize, path: Vec<String> },
}

/// A placeholder and its byte offset in the template source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placeholder {
    pub kind: PlaceholderKind,
    pub offset: usize,
}

/// A token of a parsed template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Literal(String),
    Placeholder(Placeholder),
}

/// A parsed prompt template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    source: String,
    segments: Vec<Segment>,
}

impl Template {
    /// Tokenize a template in a single left-to-right pass.
    ///
    /// Text outside `{{...}}` is kept verbatim. A `{{` without a matching
    /// `}}`, or braces around anything other than a recognized placeholder,
    /// is an error.
    pub fn parse(source: &str) -> Result<Self, ResolutionError> {
        let mut segments = Vec::new();
        let mut literal_start = 0;
        let mut cursor = 0;

        while let Some(found) = source[cursor..].find(OPEN) {
            let open = cursor + found;
            let body_start = open + OPEN.len();
            let close = source[body_start..]
                .find(CLOSE)
                .map(|found| body_start + found)
                .ok_or(ResolutionError::UnterminatedPlaceholder { at: open })?;

            if open > literal_start {
                segments.push(Segment::Literal(source[literal_start..open].to_string()));
            }

            let body = &source[body_start..close];
            let kind = parse_placeholder(body).ok_or_else(|| {
                ResolutionError::InvalidPlaceholder {
                    text: body.to_string(),
                    at: open,
                }
            })?;
            segments.push(Segment::Placeholder(Placeholder { kind, offset: open }));

            cursor = close + CLOSE.len();
            literal_start = cursor;
        }

        if literal_start < source.len() {
            segments.push(Segment::Literal(source[literal_start..].to_string()));
        }

        Ok(Self {
            source: source.to_string(),
            segments,
        })
    }

    /// The original template text.
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn placeholders(&self) -> impl Iterator<Item = &Placeholder> {
        self.segments.iter().filter_map(|segment| match segment {
            Segment::Placeholder(p) => Some(p),
            Segment::Literal(_) => None,
        })
    }

    /// Context variable names referenced by this template, in order.
    pub fn variables(&self) -> impl Iterator<Item = &str> {
        self.placeholders().filter_map(|p| match &p.kind {
            PlaceholderKind::Context { name } => Some(name.as_str()),
            PlaceholderKind::History { .. } => None,
        })
    }

    /// How far back into the history this template reaches (0 if it has no
    /// history references).
    pub fn history_depth(&self) -> usize {
        self.placeholders()
            .filter_map(|p| match p.kind {
                PlaceholderKind::History { back, .. } => Some(back),
                PlaceholderKind::Context { .. } => None,
            })
            .max()
            .unwrap_or(0)
    }
}

impl fmt::Display for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

impl std::str::FromStr for Template {
    type Err = ResolutionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

fn parse_placeholder(body: &str) -> Option<PlaceholderKind> {
    if let Some(rest) = body.strip_prefix(HISTORY_PREFIX) {
        let end = rest.find(']')?;
        let back = parse_negative_index(&rest[..end])?;
        let path = parse_field_path(&rest[end + 1..])?;
        return Some(PlaceholderKind::History { back, path });
    }

    is_identifier(body).then(|| PlaceholderKind::Context {
        name: body.to_string(),
    })
}

/// `-N` with N >= 1, returned as N. Magnitudes beyond `usize` saturate.
fn parse_negative_index(index: &str) -> Option<usize> {
    let digits = index.strip_prefix('-')?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    match digits.parse::<usize>() {
        Ok(n) => (n >= 1).then_some(n),
        Err(_) => Some(usize::MAX),
    }
}

/// Empty, or `.key` segments with no empty keys.
fn parse_field_path(tail: &str) -> Option<Vec<String>> {
    if tail.is_empty() {
        return Some(Vec::new());
    }

    let keys: Vec<String> = tail.strip_prefix('.')?.split('.').map(str::to_string).collect();
    if keys.iter().any(|k| k.is_empty() || k.chars().any(char::is_whitespace)) {
        return None;
    }
    Some(keys)
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}
