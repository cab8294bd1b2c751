use {
    std::{
        path::PathBuf,
        process::ExitCode,
    },
    clap::Parser as _,
    crate::{
        poll::Poller,
        prelude::*,
        reddit::Game,
    },
};

mod classify;
mod config;
mod http;
mod model;
mod poll;
mod prelude;
mod reddit;
mod report;
mod startgg;

include!(concat!(env!("OUT_DIR"), "/version.rs"));

/// Keeps a reddit post listing the upsets, notable sets, and DQs of a start.gg event up to date.
#[derive(clap::Parser)]
#[clap(version = CLAP_VERSION)]
struct Args {
    /// Event slug (tournament/<tournament>/event/<event>) or a link to the event on start.gg
    event: String,
    /// Seed difference at which a loss counts as an upset
    #[clap(short, long, default_value_t = 5)]
    differential: u32,
    /// Lowest seed whose losses and DQs are reported
    #[clap(short, long, default_value_t = 64)]
    cutoff: u32,
    /// Seconds between polls
    #[clap(short, long, default_value_t = 300)]
    interval: u64,
    /// Game of the event, selects the post flair
    #[clap(short, long, value_enum)]
    game: Option<Game>,
    /// ID of or link to an existing post to keep editing instead of creating a new one
    #[clap(long)]
    post: Option<String>,
    /// Only report sets updated after this Unix timestamp
    #[clap(long)]
    since: Option<i64>,
    /// Path to the config file with API credentials
    #[clap(long)]
    config: Option<PathBuf>,
}

#[derive(Debug, thiserror::Error)]
enum Error {
    #[error(transparent)] Config(#[from] config::Error),
    #[error(transparent)] Poll(#[from] poll::Error),
    #[error(transparent)] Reqwest(#[from] reqwest::Error),
}

async fn run(args: Args) -> Result<(), Error> {
    // operator input is checked before anything touches the network
    let settings = Settings::from_args(&args)?;
    let config = Config::load(args.config.as_deref()).await?;
    let http_client = http::client()?;
    let source = startgg::Client::new(http_client.clone(), config.startgg, settings.event_slug.clone());
    let publisher = reddit::Client::new(http_client, config.reddit, settings.game);
    Poller::new(source, publisher, settings).run().await?;
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    match run(Args::parse()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{e} ({e:?})");
            ExitCode::FAILURE
        }
    }
}
