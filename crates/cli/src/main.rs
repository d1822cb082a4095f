mod cmd;
mod util;

use argp::FromArgs;
use tracing_subscriber::{EnvFilter, filter::LevelFilter};

#[derive(FromArgs, PartialEq, Debug)]
/// Operator tools for runbot.
struct TopLevel {
    #[argp(subcommand)]
    command: SubCommand,
}

#[derive(FromArgs, PartialEq, Debug)]
#[argp(subcommand)]
enum SubCommand {
    Sign(cmd::sign::Args),
    Extract(cmd::extract::Args),
}

fn main() {
    let env_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::WARN.into())
        .from_env_lossy();
    tracing_subscriber::fmt().with_env_filter(env_filter).with_writer(std::io::stderr).init();

    let args: TopLevel = argp::parse_args_or_exit(argp::DEFAULT);
    let result = match args.command {
        SubCommand::Sign(args) => cmd::sign::run(args),
        SubCommand::Extract(args) => cmd::extract::run(args),
    };
    if let Err(e) = result {
        tracing::error!("{e:?}");
        std::process::exit(1);
    }
}
