use std::sync::Arc;

use anyhow::Result;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Duration};

use crate::core::shutdown::{self, ShutdownTrigger};
use crate::core::state::AppState;
use crate::tasks::dispatcher::Dispatcher;

/// Runs the dispatcher until Ctrl+C or SIGTERM.
pub(crate) async fn run(state: AppState) -> Result<()> {
    let (trigger, shutdown_rx) = ShutdownTrigger::new();
    let handle = spawn(&state, shutdown_rx)?;

    shutdown::shutdown_signal().await;
    trigger.fire();

    if let Err(err) = handle.await {
        tracing::error!(error = %err, "Dispatcher task join failed");
    }

    Ok(())
}

pub(crate) fn spawn(state: &AppState, shutdown: watch::Receiver<bool>) -> Result<JoinHandle<()>> {
    let dispatcher = Arc::new(Dispatcher::from_state(state)?);
    let interval = state.settings().dispatcher().poll_interval();
    Ok(tokio::spawn(dispatcher_loop(dispatcher, interval, shutdown)))
}

/// Sleeps, then runs one cycle in its own task so that neither an error nor a
/// panic inside a cycle ends the loop.
pub(crate) async fn dispatcher_loop(
    dispatcher: Arc<Dispatcher>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    tracing::info!(
        interval_seconds = interval.as_secs_f64(),
        policy = dispatcher.drain_policy().as_str(),
        "Dispatcher started"
    );

    loop {
        if *shutdown.borrow() {
            break;
        }

        tokio::select! {
            _ = shutdown.changed() => break,
            _ = sleep(interval) => {}
        }

        let cycle = tokio::spawn({
            let dispatcher = Arc::clone(&dispatcher);
            async move { dispatcher.run_cycle().await }
        });

        match cycle.await {
            Ok(Ok(report)) if report.pending > 0 => {
                tracing::info!(
                    pending = report.pending,
                    processed = report.processed,
                    failed = report.failed,
                    "Dispatcher cycle finished"
                );
            }
            Ok(Ok(_)) => {}
            Ok(Err(err)) => {
                tracing::error!(error = %format!("{err:#}"), "Dispatcher cycle failed");
            }
            Err(err) => {
                tracing::error!(error = %err, "Dispatcher cycle aborted");
            }
        }
    }

    tracing::info!("Dispatcher stopped");
}
