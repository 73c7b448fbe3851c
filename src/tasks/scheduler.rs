use anyhow::Result;
use tokio::sync::watch;
use tokio::time::{interval, sleep, Duration};

use crate::core::state::AppState;
use crate::tasks::grading;

const IDLE_POLL: Duration = Duration::from_secs(2);
const STALE_CHECK_INTERVAL: Duration = Duration::from_secs(60);

pub(crate) async fn run(state: AppState) -> Result<()> {
    let concurrency = state.settings().exam().grading_worker_concurrency;
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let mut handles = Vec::with_capacity(concurrency + 2);
    for _ in 0..concurrency {
        handles.push(tokio::spawn(grading_worker(state.clone(), shutdown_rx.clone())));
    }
    handles.push(tokio::spawn(timer_sweep_loop(state.clone(), shutdown_rx.clone())));
    handles.push(tokio::spawn(requeue_stale_loop(state.clone(), shutdown_rx.clone())));

    tracing::info!(concurrency, "Grading worker started");

    crate::core::shutdown::shutdown_signal().await;
    if shutdown_tx.send(true).is_err() {
        tracing::warn!("Failed to broadcast shutdown signal to background tasks");
    }

    for handle in handles {
        if let Err(err) = handle.await {
            tracing::error!(error = %err, "Background task join failed");
        }
    }

    Ok(())
}

async fn grading_worker(state: AppState, mut shutdown: watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow() {
            break;
        }

        match grading::claim_next_session(state.db()).await {
            Ok(Some(claim)) => {
                grading::process_session(&state, &claim).await;
                continue;
            }
            Ok(None) => {}
            Err(err) => tracing::error!(error = %format!("{err:#}"), "Failed to claim session"),
        }

        tokio::select! {
            _ = shutdown.changed() => break,
            _ = sleep(IDLE_POLL) => {}
        }
    }
}

async fn timer_sweep_loop(state: AppState, mut shutdown: watch::Receiver<bool>) {
    let period = Duration::from_secs(state.settings().exam().timer_sweep_interval_seconds);
    let mut tick = interval(period);
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = tick.tick() => {
                if let Err(err) = grading::auto_submit_expired_sessions(&state).await {
                    tracing::error!(error = %format!("{err:#}"), "auto_submit_expired_sessions failed");
                }
            }
        }
    }
}

async fn requeue_stale_loop(state: AppState, mut shutdown: watch::Receiver<bool>) {
    let mut tick = interval(STALE_CHECK_INTERVAL);
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = tick.tick() => {
                if let Err(err) = grading::requeue_stale_grading(&state).await {
                    tracing::error!(error = %format!("{err:#}"), "requeue_stale_grading failed");
                }
            }
        }
    }
}
