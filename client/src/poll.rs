//! The refresh loop behind `leaderboard --repeat`.

use anyhow::Result;
use std::future::Future;
use std::time::Duration;

/// Resolves once the user presses Ctrl-C. If the listener cannot be
/// installed it never resolves.
pub async fn interrupted() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        log::warn!("Could not listen for Ctrl-C: {e}");
        std::future::pending::<()>().await;
    }
    log::info!("Interrupted, stopping");
}

/// Call `fetch` and hand each result to `on_update`, waiting `interval`
/// between rounds, until `shutdown` resolves.
///
/// `shutdown` is polled for the whole run, so it cuts a slow fetch short as
/// well as a sleep. Without `repeat` a single round runs and its error is
/// returned; with `repeat` errors are logged and polling continues.
///
/// # Errors
/// Returns the first fetch or update error when `repeat` is off.
pub async fn poll_until<T, F, Fut, U, S>(
    mut fetch: F,
    mut on_update: U,
    shutdown: S,
    repeat: bool,
    interval: Duration,
) -> Result<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
    U: FnMut(T) -> Result<()>,
    S: Future<Output = ()>,
{
    tokio::pin!(shutdown);

    loop {
        let outcome = tokio::select! {
            () = &mut shutdown => return Ok(()),
            fetched = fetch() => fetched.and_then(&mut on_update),
        };

        match outcome {
            Ok(()) => {}
            Err(e) if repeat => log::error!("Refresh failed: {e:#}"),
            Err(e) => return Err(e),
        }

        if !repeat {
            return Ok(());
        }

        tokio::select! {
            () = &mut shutdown => return Ok(()),
            () = tokio::time::sleep(interval) => {}
        }
    }
}
