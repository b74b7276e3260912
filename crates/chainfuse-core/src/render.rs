//! Plain-text rendering of an output history.

use crate::types::StepOutput;

const LINK: &str = "🔗";

/// Render outputs as delimited text blocks, one per step.
///
/// Step `i` (1-based) gets a header of `i` link markers followed by
/// `-------- Prompt Chain Result #i -------------`.
pub fn render_delimited(outputs: &[StepOutput]) -> String {
    let mut rendered = String::new();

    for (i, output) in outputs.iter().enumerate() {
        let step = i + 1;
        rendered.push_str(&LINK.repeat(step));
        rendered.push_str(&format!(
            " -------- Prompt Chain Result #{} -------------\n\n",
            step
        ));
        rendered.push_str(&output.to_string());
        rendered.push_str("\n\n");
    }

    rendered
}
