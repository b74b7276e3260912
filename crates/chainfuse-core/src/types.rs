//! Core value types shared by every layer of a chain run.

use serde::{Deserialize, Serialize};
use serde_json::ser::Formatter;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::io;

use crate::output::parse_output;

/// Variables available to `{{name}}` placeholders.
///
/// Backed by a `BTreeMap` so iteration and serialization are deterministic.
/// A context is never mutated by a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Context(BTreeMap<String, Value>);

impl Context {
    /// Create an empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(name, value);
        self
    }

    /// Insert or replace a variable.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(name.into(), value.into());
    }

    /// Look up a variable.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate variables in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }
}

impl From<BTreeMap<String, Value>> for Context {
    fn from(map: BTreeMap<String, Value>) -> Self {
        Self(map)
    }
}

impl<K, V> FromIterator<(K, V)> for Context
where
    K: Into<String>,
    V: Into<Value>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// One entry of an output history.
///
/// A raw model response becomes `Structured` when it parses as JSON (plain or
/// inside a ```` ```json ```` fence) and stays `Text` otherwise.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum StepOutput {
    /// Response kept verbatim
    Text(String),

    /// Parsed JSON value (object, array or scalar)
    Structured(Value),
}

impl StepOutput {
    /// Create a text output.
    pub fn text(content: impl Into<String>) -> Self {
        Self::Text(content.into())
    }

    /// Create a structured output.
    pub fn structured(value: impl Into<Value>) -> Self {
        Self::Structured(value.into())
    }

    /// Classify a raw model response. See [`parse_output`].
    pub fn from_response(raw: &str) -> Self {
        parse_output(raw)
    }

    pub fn is_structured(&self) -> bool {
        matches!(self, Self::Structured(_))
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            Self::Structured(_) => None,
        }
    }

    pub fn as_structured(&self) -> Option<&Value> {
        match self {
            Self::Text(_) => None,
            Self::Structured(value) => Some(value),
        }
    }
}

/// Renders the output the way it is substituted into a later prompt:
/// text verbatim, structured values through [`value_to_prompt_text`].
impl fmt::Display for StepOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(text) => f.write_str(text),
            Self::Structured(value) => f.write_str(&value_to_prompt_text(value)),
        }
    }
}

impl From<&str> for StepOutput {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<String> for StepOutput {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<Value> for StepOutput {
    fn from(value: Value) -> Self {
        Self::Structured(value)
    }
}

/// String form of a JSON value inside a prompt.
///
/// Strings are unquoted and other scalars use their natural form. Objects
/// and arrays render on a single line with `": "` and `", "` separators.
pub fn value_to_prompt_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Object(_) | Value::Array(_) => {
            single_line_json(value).unwrap_or_else(|| value.to_string())
        }
        other => other.to_string(),
    }
}

fn single_line_json(value: &Value) -> Option<String> {
    let mut buf = Vec::new();
    {
        let mut serializer = serde_json::Serializer::with_formatter(&mut buf, SpacedFormatter);
        value.serialize(&mut serializer).ok()?;
    }
    String::from_utf8(buf).ok()
}

/// Compact JSON with a space after every `:` and `,`.
struct SpacedFormatter;

impl Formatter for SpacedFormatter {
    fn begin_array_value<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_key<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_value<W>(&mut self, writer: &mut W) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        writer.write_all(b": ")
    }
}
