use clap::Parser;
use env_logger::Env;

use hotdog::Opts;
use hotdog::cli::SubCommandExtend;
use hotdog::config::SubCommand;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let opts = Opts::parse();

    let level = if opts.debug { "debug" } else { "info" };
    env_logger::Builder::from_env(Env::default().default_filter_or(level)).init();

    match &opts.subcmd {
        SubCommand::Server(config) => config.run(&opts).await,
        SubCommand::Analyze(config) => config.run(&opts).await,
    }
}
