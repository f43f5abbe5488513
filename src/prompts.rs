//! Prompts sent alongside each picture.
//!
//! Callers override the base prompt via
//! [`crate::config::PictureDescriptionOptions::prompt`]; the constants here
//! are the defaults and the fixed context instruction shared by every
//! backend.

/// Default base prompt when none is configured.
pub const DEFAULT_PROMPT: &str = "Describe this image in a few sentences.";

/// Instruction appended after the base prompt when context is supplied.
pub const CONTEXT_INSTRUCTION: &str =
    "Consider the text context provided above when describing the image.";

/// Build the effective prompt for one picture.
///
/// Context augments the base prompt rather than replacing it:
///
/// ```text
/// <context>
///
/// <base prompt>
/// Consider the text context provided above when describing the image.
/// ```
///
/// Blank context yields the base prompt unchanged.
pub fn context_prompt(context: &str, base_prompt: &str) -> String {
    if context.trim().is_empty() {
        return base_prompt.to_string();
    }
    format!("{context}\n\n{base_prompt}\n{CONTEXT_INSTRUCTION}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_is_prepended_and_instruction_appended() {
        let p = context_prompt("Figure 2 shows revenue.", "Describe the chart.");
        assert_eq!(
            p,
            "Figure 2 shows revenue.\n\nDescribe the chart.\nConsider the text context provided above when describing the image."
        );
    }

    #[test]
    fn blank_context_keeps_base_prompt() {
        assert_eq!(context_prompt("", DEFAULT_PROMPT), DEFAULT_PROMPT);
        assert_eq!(context_prompt("  \n ", "x"), "x");
    }
}
