mod cli;
mod output;

use std::io;

use anyhow::Result;
use clap::Parser;
use futures::StreamExt;
use tracing::debug;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use cli::Cli;
use fswatch_stream::WatchSession;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr; stdout carries only events.
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(io::stderr),
        )
        .init();

    let session = WatchSession::new(cli.paths)?;
    let mut events = session.into_stream();

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            next = events.next() => match next {
                Some(Ok(event)) => {
                    if let Err(err) = output::print_event(&event) {
                        if err.kind() == io::ErrorKind::BrokenPipe {
                            break;
                        }
                        return Err(err.into());
                    }
                }
                Some(Err(err)) => return Err(err.into()),
                None => break,
            },
            _ = &mut shutdown => {
                debug!("interrupted, stopping");
                break;
            }
        }
    }

    // Dropping the stream tears the native registration down.
    drop(events);
    Ok(())
}
