use anyhow::{Context, Result};
use argp::FromArgs;
use runbot_github::webhook::{SIGNATURE_HEADER, sign};
use typed_path::Utf8NativePathBuf;

use crate::util::native_path;

#[derive(FromArgs, PartialEq, Eq, Debug)]
/// Print the X-Hub-Signature-256 header GitHub would send for a payload file.
#[argp(subcommand, name = "sign")]
pub struct Args {
    #[argp(option, short = 's')]
    /// webhook secret (default: $WEBHOOK_SECRET)
    secret: Option<String>,
    #[argp(positional, from_str_fn(native_path))]
    /// payload file, signed byte-for-byte
    payload: Utf8NativePathBuf,
}

pub fn run(args: Args) -> Result<()> {
    let secret = match args.secret {
        Some(secret) => secret,
        None => std::env::var("WEBHOOK_SECRET")
            .context("No secret given and WEBHOOK_SECRET is not set")?,
    };
    let body = std::fs::read(args.payload.with_platform_encoding())
        .with_context(|| format!("Failed to read {}", args.payload))?;
    println!("{}: {}", SIGNATURE_HEADER, sign(secret.as_bytes(), &body));
    Ok(())
}
