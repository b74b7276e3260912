//! Rendering templates against a context and an output history.

use serde_json::Value;

use super::parser::{Placeholder, PlaceholderKind, Segment, Template};
use super::ResolutionError;
use crate::types::{value_to_prompt_text, Context, StepOutput};

/// Parse and render a template in one call.
///
/// ```
/// use chainfuse_core::{resolve, Context, StepOutput};
///
/// let context = Context::new().with("name", "World");
/// let history = vec![StepOutput::text("earlier answer")];
///
/// let prompt = resolve("Hi {{name}}, you said: {{output[-1]}}", &context, &history).unwrap();
/// assert_eq!(prompt, "Hi World, you said: earlier answer");
/// ```
pub fn resolve(
    template: &str,
    context: &Context,
    history: &[StepOutput],
) -> Result<String, ResolutionError> {
    Template::parse(template)?.render(context, history)
}

impl Template {
    /// Substitute every placeholder.
    ///
    /// Substituted text is never scanned again, so values containing `{{...}}`
    /// are inserted literally.
    pub fn render(
        &self,
        context: &Context,
        history: &[StepOutput],
    ) -> Result<String, ResolutionError> {
        let mut rendered = String::with_capacity(self.source().len());

        for segment in self.segments() {
            match segment {
                Segment::Literal(text) => rendered.push_str(text),
                Segment::Placeholder(placeholder) => {
                    rendered.push_str(&placeholder.resolve(context, history)?)
                }
            }
        }

        Ok(rendered)
    }
}

impl Placeholder {
    /// Resolve this placeholder to the text it stands for.
    pub fn resolve(
        &self,
        context: &Context,
        history: &[StepOutput],
    ) -> Result<String, ResolutionError> {
        let at = self.offset;

        match &self.kind {
            PlaceholderKind::Context { name } => context
                .get(name)
                .map(value_to_prompt_text)
                .ok_or_else(|| ResolutionError::UnknownVariable {
                    name: name.clone(),
                    at,
                }),
            PlaceholderKind::History { back, path } => {
                let entry = lookup(history, *back).ok_or(ResolutionError::HistoryOutOfRange {
                    back: *back,
                    len: history.len(),
                    at,
                })?;

                if path.is_empty() {
                    return Ok(entry.to_string());
                }

                match entry {
                    StepOutput::Text(_) => Err(ResolutionError::FieldAccessOnText {
                        reference: reference(*back, &[]),
                        at,
                    }),
                    StepOutput::Structured(root) => {
                        walk(root, *back, path, at).map(value_to_prompt_text)
                    }
                }
            }
        }
    }
}

/// `history[len - back]`, or `None` when `back` reaches past the start.
fn lookup(history: &[StepOutput], back: usize) -> Option<&StepOutput> {
    history
        .len()
        .checked_sub(back)
        .and_then(|index| history.get(index))
}

/// Follow `path` key by key; every value walked through must be an object.
fn walk<'v>(
    root: &'v Value,
    back: usize,
    path: &[String],
    at: usize,
) -> Result<&'v Value, ResolutionError> {
    let mut current = root;

    for (depth, key) in path.iter().enumerate() {
        let object = current.as_object().ok_or_else(|| ResolutionError::NotAnObject {
            reference: reference(back, &path[..depth]),
            at,
        })?;

        current = object.get(key).ok_or_else(|| ResolutionError::MissingField {
            reference: reference(back, &path[..=depth]),
            at,
        })?;
    }

    Ok(current)
}

fn reference(back: usize, path: &[String]) -> String {
    let mut reference = format!("output[-{}]", back);
    for key in path {
        reference.push('.');
        reference.push_str(key);
    }
    reference
}
