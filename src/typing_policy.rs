use serde::{Deserialize, Serialize};

/// What happens to the cursor when a keystroke does not match the target.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TypingPolicy {
    /// The cursor waits on the mistyped position until it is typed correctly.
    #[default]
    StopOnError,
    /// The mismatch is recorded and the cursor moves on anyway.
    TypePastErrors,
}

impl TypingPolicy {
    pub fn advances_on_mismatch(self) -> bool {
        matches!(self, TypingPolicy::TypePastErrors)
    }
}

/// Characters a practice session evaluates. Everything else (modifiers, tab,
/// navigation, non-ASCII) is dropped before it can count as a mistake.
///
/// Newline is accepted so multi-line code lessons can be finished; the host
/// maps Enter to `'\n'`.
pub fn is_practice_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == ' ' || c == '\n' || c.is_ascii_punctuation()
}
