use std::fmt;

use thiserror::Error;

/// Posted when the trigger is present but the comment has no fenced block.
pub const NO_CODE_BLOCK_MESSAGE: &str = "No code block found in the comment.";
/// Posted for every failure after a command was recognized.
pub const GENERIC_ERROR_MESSAGE: &str = "An error occurred while processing the request.";
/// Substituted when the execution service returns no output.
pub const NO_OUTPUT_PLACEHOLDER: &str = "No output available";

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum SenderKind {
    Human,
    Automation,
}

impl SenderKind {
    /// Classify a GitHub `sender.type` value. Only `Bot` accounts are automation.
    pub fn from_github_type(value: &str) -> Self {
        if value.eq_ignore_ascii_case("bot") { Self::Automation } else { Self::Human }
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Sender {
    pub login: String,
    pub kind: SenderKind,
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct RepositoryRef {
    pub owner: String,
    pub name: String,
}

impl fmt::Display for RepositoryRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum CommentAction {
    Created,
    Edited,
    Deleted,
    Other,
}

impl CommentAction {
    pub fn from_github_action(value: &str) -> Self {
        match value {
            "created" => Self::Created,
            "edited" => Self::Edited,
            "deleted" => Self::Deleted,
            _ => Self::Other,
        }
    }
}

/// An issue or pull request comment, reduced to what the pipeline reads.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct CommentEvent {
    pub action: CommentAction,
    pub sender: Sender,
    pub repository: RepositoryRef,
    pub issue_number: u64,
    pub body: String,
    pub installation_id: Option<u64>,
}

impl CommentEvent {
    pub fn report_target(&self) -> ReportTarget {
        ReportTarget {
            owner: self.repository.owner.clone(),
            repo: self.repository.name.clone(),
            issue_number: self.issue_number,
            installation_id: self.installation_id,
        }
    }
}

/// Result of scanning a comment body for the trigger and a code block.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum ExtractedCommand {
    NotACommand,
    MissingCodeBlock,
    Code(String),
}

impl ExtractedCommand {
    pub fn is_command(&self) -> bool { !matches!(self, Self::NotACommand) }

    pub fn code(&self) -> Option<&str> {
        match self {
            Self::Code(code) => Some(code),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum ExecutionResult {
    Success(String),
    Failure(String),
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ReportTarget {
    pub owner: String,
    pub repo: String,
    pub issue_number: u64,
    pub installation_id: Option<u64>,
}

impl fmt::Display for ReportTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}#{}", self.owner, self.repo, self.issue_number)
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ReportAction {
    pub target: ReportTarget,
    pub body: String,
}

/// Failures a delivery can end in. Silent no-ops are not errors and live elsewhere.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("webhook signature invalid")]
    SignatureInvalid,
    #[error("no code block found")]
    NoCodeBlockFound,
    #[error("execution service error: {0}")]
    ExecutionServiceError(String),
    #[error("failed to report to {target}")]
    ReportingError {
        target: ReportTarget,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl PipelineError {
    /// The comment body shown to the user, if this error is reported at all.
    pub fn user_message(&self) -> Option<&'static str> {
        match self {
            Self::SignatureInvalid | Self::ReportingError { .. } => None,
            Self::NoCodeBlockFound => Some(NO_CODE_BLOCK_MESSAGE),
            Self::ExecutionServiceError(_) => Some(GENERIC_ERROR_MESSAGE),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sender_kind() {
        assert_eq!(SenderKind::from_github_type("Bot"), SenderKind::Automation);
        assert_eq!(SenderKind::from_github_type("bot"), SenderKind::Automation);
        assert_eq!(SenderKind::from_github_type("User"), SenderKind::Human);
        assert_eq!(SenderKind::from_github_type("Organization"), SenderKind::Human);
    }

    #[test]
    fn test_user_messages() {
        assert_eq!(PipelineError::SignatureInvalid.user_message(), None);
        assert_eq!(PipelineError::NoCodeBlockFound.user_message(), Some(NO_CODE_BLOCK_MESSAGE));
        assert_eq!(
            PipelineError::ExecutionServiceError("timed out".into()).user_message(),
            Some(GENERIC_ERROR_MESSAGE)
        );
    }
}
