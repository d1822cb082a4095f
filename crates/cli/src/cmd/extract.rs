use anyhow::{Context, Result};
use argp::FromArgs;
use runbot_core::{config::DEFAULT_TRIGGER, models::ExtractedCommand};
use runbot_github::command::CommandExtractor;
use typed_path::Utf8NativePathBuf;

use crate::util::native_path;

#[derive(FromArgs, PartialEq, Eq, Debug)]
/// Show what code a comment would submit for execution.
#[argp(subcommand, name = "extract")]
pub struct Args {
    #[argp(option, short = 't')]
    /// trigger token (default: /execute)
    trigger: Option<String>,
    #[argp(positional, from_str_fn(native_path))]
    /// file containing the comment body
    comment: Utf8NativePathBuf,
}

pub fn run(args: Args) -> Result<()> {
    let body = std::fs::read_to_string(args.comment.with_platform_encoding())
        .with_context(|| format!("Failed to read {}", args.comment))?;
    let extractor = CommandExtractor::new(args.trigger.as_deref().unwrap_or(DEFAULT_TRIGGER));
    match extractor.extract(&body) {
        ExtractedCommand::NotACommand => {
            eprintln!("Not a command: {:?} does not appear in the comment", extractor.trigger());
        }
        ExtractedCommand::MissingCodeBlock => eprintln!("No code block found in the comment."),
        ExtractedCommand::Code(code) => print!("{code}"),
    }
    Ok(())
}
