//! Compound CSS selector subset used for protected regions and queries.
//!
//! Supported: type selectors (`div`, `*`), `#id`, `.class`, attribute
//! selectors (`[attr]`, `[attr=v]`, `[attr*=v]`, `[attr^=v]`, `[attr$=v]`,
//! `[attr~=v]`) and comma separated selector lists. Combinators are rejected.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::ElementSummary;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum SelectorError {
    #[error("empty selector")]
    Empty,
    #[error("invalid selector `{selector}`: {reason}")]
    Invalid { selector: String, reason: String },
    #[error("combinators are not supported in `{0}`")]
    UnsupportedCombinator(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum AttrOp {
    Exists,
    Equals(String),
    Contains(String),
    Prefix(String),
    Suffix(String),
    Word(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
struct AttrMatcher {
    name: String,
    op: AttrOp,
}

impl AttrMatcher {
    fn matches(&self, element: &ElementSummary) -> bool {
        let Some(value) = element.attributes.get(&self.name) else {
            return false;
        };
        match &self.op {
            AttrOp::Exists => true,
            AttrOp::Equals(expected) => value == expected,
            AttrOp::Contains(needle) => !needle.is_empty() && value.contains(needle.as_str()),
            AttrOp::Prefix(prefix) => !prefix.is_empty() && value.starts_with(prefix.as_str()),
            AttrOp::Suffix(suffix) => !suffix.is_empty() && value.ends_with(suffix.as_str()),
            AttrOp::Word(word) => value.split_whitespace().any(|w| w == word),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
struct Compound {
    tag: Option<String>,
    ids: Vec<String>,
    classes: Vec<String>,
    attrs: Vec<AttrMatcher>,
}

impl Compound {
    fn matches(&self, element: &ElementSummary) -> bool {
        if let Some(tag) = &self.tag {
            if !element.tag.eq_ignore_ascii_case(tag) {
                return false;
            }
        }
        if !self.ids.iter().all(|id| element.id() == Some(id.as_str())) {
            return false;
        }
        if !self
            .classes
            .iter()
            .all(|class| element.classes().any(|c| c == class))
        {
            return false;
        }
        self.attrs.iter().all(|attr| attr.matches(element))
    }
}

/// A parsed selector list. Displays (and serializes) as its source text.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Selector {
    source: String,
    alternatives: Vec<Compound>,
}

impl Selector {
    pub fn parse(source: &str) -> Result<Self, SelectorError> {
        let trimmed = source.trim();
        if trimmed.is_empty() {
            return Err(SelectorError::Empty);
        }
        let alternatives = split_list(trimmed)
            .into_iter()
            .map(|part| parse_compound(trimmed, part.trim()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            source: trimmed.to_string(),
            alternatives,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub fn matches(&self, element: &ElementSummary) -> bool {
        self.alternatives.iter().any(|c| c.matches(element))
    }
}

impl PartialEq for Selector {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

impl Eq for Selector {}

impl std::hash::Hash for Selector {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.source.hash(state);
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

impl FromStr for Selector {
    type Err = SelectorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Selector::parse(s)
    }
}

impl TryFrom<String> for Selector {
    type Error = SelectorError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Selector::parse(&value)
    }
}

impl From<Selector> for String {
    fn from(value: Selector) -> Self {
        value.source
    }
}

/// Splits a selector list on top-level commas, ignoring commas inside quotes or brackets.
fn split_list(source: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut start = 0usize;
    for (idx, ch) in source.char_indices() {
        match (quote, ch) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '"') | (None, '\'') => quote = Some(ch),
            (None, '[') => depth += 1,
            (None, ']') => depth = depth.saturating_sub(1),
            (None, ',') if depth == 0 => {
                parts.push(&source[start..idx]);
                start = idx + 1;
            }
            _ => {}
        }
    }
    parts.push(&source[start..]);
    parts
}

fn is_ident_char(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || ch == '-' || ch == '_'
}

fn invalid(selector: &str, reason: impl Into<String>) -> SelectorError {
    SelectorError::Invalid {
        selector: selector.to_string(),
        reason: reason.into(),
    }
}

fn parse_compound(full: &str, part: &str) -> Result<Compound, SelectorError> {
    if part.is_empty() {
        return Err(invalid(full, "empty entry in selector list"));
    }
    let chars: Vec<char> = part.chars().collect();
    let mut compound = Compound::default();
    let mut pos = 0usize;

    let read_ident = |pos: &mut usize| -> String {
        let start = *pos;
        while *pos < chars.len() && is_ident_char(chars[*pos]) {
            *pos += 1;
        }
        chars[start..*pos].iter().collect()
    };

    if chars[0] == '*' {
        pos = 1;
    } else if is_ident_char(chars[0]) {
        compound.tag = Some(read_ident(&mut pos).to_ascii_lowercase());
    }

    while pos < chars.len() {
        match chars[pos] {
            '.' => {
                pos += 1;
                let class = read_ident(&mut pos);
                if class.is_empty() {
                    return Err(invalid(full, "expected class name after `.`"));
                }
                compound.classes.push(class);
            }
            '#' => {
                pos += 1;
                let id = read_ident(&mut pos);
                if id.is_empty() {
                    return Err(invalid(full, "expected id after `#`"));
                }
                compound.ids.push(id);
            }
            '[' => {
                let mut end = pos + 1;
                let mut quote: Option<char> = None;
                while end < chars.len() {
                    let ch = chars[end];
                    match quote {
                        Some(q) if ch == q => quote = None,
                        Some(_) => {}
                        None if ch == '"' || ch == '\'' => quote = Some(ch),
                        None if ch == ']' => break,
                        None => {}
                    }
                    end += 1;
                }
                if end >= chars.len() {
                    return Err(invalid(full, "unterminated attribute selector"));
                }
                let body: String = chars[pos + 1..end].iter().collect();
                compound.attrs.push(parse_attr(full, &body)?);
                pos = end + 1;
            }
            c if c.is_whitespace() || c == '>' || c == '+' || c == '~' => {
                return Err(SelectorError::UnsupportedCombinator(full.to_string()));
            }
            c => return Err(invalid(full, format!("unexpected character `{c}`"))),
        }
    }
    Ok(compound)
}

fn parse_attr(full: &str, body: &str) -> Result<AttrMatcher, SelectorError> {
    let body = body.trim();
    let Some(eq) = body.find('=') else {
        if body.is_empty() || !body.chars().all(is_ident_char) {
            return Err(invalid(full, "bad attribute name"));
        }
        return Ok(AttrMatcher {
            name: body.to_string(),
            op: AttrOp::Exists,
        });
    };
    let (lhs, rhs) = body.split_at(eq);
    let rhs = rhs[1..].trim();
    let value = strip_quotes(rhs).to_string();
    let (name, op) = match lhs.chars().last() {
        Some('*') => (&lhs[..lhs.len() - 1], AttrOp::Contains(value)),
        Some('^') => (&lhs[..lhs.len() - 1], AttrOp::Prefix(value)),
        Some('$') => (&lhs[..lhs.len() - 1], AttrOp::Suffix(value)),
        Some('~') => (&lhs[..lhs.len() - 1], AttrOp::Word(value)),
        _ => (lhs, AttrOp::Equals(value)),
    };
    let name = name.trim();
    if name.is_empty() || !name.chars().all(is_ident_char) {
        return Err(invalid(full, "bad attribute name"));
    }
    Ok(AttrMatcher {
        name: name.to_string(),
        op,
    })
}

fn strip_quotes(raw: &str) -> &str {
    let bytes = raw.as_bytes();
    if bytes.len() >= 2
        && ((bytes[0] == b'"' && bytes[bytes.len() - 1] == b'"')
            || (bytes[0] == b'\'' && bytes[bytes.len() - 1] == b'\''))
    {
        &raw[1..raw.len() - 1]
    } else {
        raw
    }
}
