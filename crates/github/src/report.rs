use anyhow::{Context, Result};
use async_trait::async_trait;
use runbot_core::{
    models::ReportAction,
    util::{escape_markdown, truncate_chars},
};

use crate::GitHub;

pub const OUTPUT_HEADER: &str = "Code Output:\n\n";

/// Posts the single comment that closes out a delivery.
#[async_trait]
pub trait Reporter: Send + Sync {
    async fn report(&self, action: &ReportAction) -> Result<()>;
}

/// Render execution output as a comment body. The output comes from an
/// untrusted service, so it is escaped and never rendered as markup.
pub fn output_comment(output: &str, max_chars: usize) -> String {
    format!("{OUTPUT_HEADER}{}", truncate_chars(&escape_markdown(output), max_chars))
}

#[async_trait]
impl Reporter for GitHub {
    async fn report(&self, action: &ReportAction) -> Result<()> {
        let target = &action.target;
        let client = self.client_for(target.installation_id)?;
        let issues = client.issues(&target.owner, &target.repo);
        let create = issues.create_comment(target.issue_number, &action.body);
        let comment = tokio::time::timeout(self.timeout, create)
            .await
            .with_context(|| format!("Timed out creating comment on {target}"))?
            .with_context(|| format!("Failed to create comment on {target}"))?;
        tracing::info!("Created comment {} on {}", comment.id, target);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_comment() {
        assert_eq!(output_comment("hi\n", 100), "Code Output:\n\nhi\n");
        assert_eq!(
            output_comment("No output available", 100),
            "Code Output:\n\nNo output available"
        );
        assert_eq!(
            output_comment("**bold** @here", 100),
            "Code Output:\n\n\\*\\*bold\\*\\* @\u{200B}here"
        );
    }

    #[test]
    fn test_output_comment_truncates() {
        let output = "x".repeat(50);
        assert_eq!(
            output_comment(&output, 10),
            format!("Code Output:\n\n{}\n\n(output truncated)", "x".repeat(10))
        );
    }
}
