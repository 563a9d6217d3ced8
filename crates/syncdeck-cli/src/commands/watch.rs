use std::sync::Arc;

use syncdeck_core::Engine;
use tokio::sync::broadcast::error::RecvError;

use crate::commands::common::format_event_line;
use crate::error::CliError;

pub async fn run_watch(engine: Engine) -> Result<(), CliError> {
    let engine = Arc::new(engine);
    let mut events = engine.subscribe();
    let poller = engine.spawn_background(engine.config().poll_interval);
    println!("Watching sessions; press Ctrl-C to stop");

    loop {
        tokio::select! {
            received = events.recv() => match received {
                Ok(event) => println!("{}", format_event_line(&event)),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Watcher fell behind; events dropped");
                }
                Err(RecvError::Closed) => break,
            },
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    poller.abort();
    Ok(())
}
