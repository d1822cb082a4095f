use runbot_core::models::ExtractedCommand;

pub const FENCE: &str = "```";

/// Return the interior of the first fenced block in `text`, verbatim.
///
/// The opening fence is the first ``` in the text and the block ends at the next
/// ``` after it. Nothing is trimmed: an info string such as `python` on the
/// opening line stays part of the returned code. An unterminated fence is no block.
pub fn first_fenced_block(text: &str) -> Option<&str> {
    let start = text.find(FENCE)? + FENCE.len();
    let len = text[start..].find(FENCE)?;
    Some(&text[start..start + len])
}

#[derive(Debug, Clone)]
pub struct CommandExtractor {
    trigger: String,
}

impl CommandExtractor {
    pub fn new(trigger: impl Into<String>) -> Self { Self { trigger: trigger.into() } }

    pub fn trigger(&self) -> &str { &self.trigger }

    /// The trigger may appear anywhere in the body. Only the first code block counts.
    pub fn extract(&self, body: &str) -> ExtractedCommand {
        if !body.contains(&self.trigger) {
            return ExtractedCommand::NotACommand;
        }
        match first_fenced_block(body) {
            Some(code) => ExtractedCommand::Code(code.to_string()),
            None => ExtractedCommand::MissingCodeBlock,
        }
    }
}
