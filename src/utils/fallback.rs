use anyhow::{anyhow, Result};
use futures_util::future::BoxFuture;
use log::{info, warn};

/// A named attempt in a fallback chain.
pub type Strategy<'a, T> = (String, BoxFuture<'a, Result<T>>);

/// Runs `strategies` in order and returns the first success. Later strategies
/// are never started once one succeeds. If all fail, the error lists each
/// failure in order.
pub async fn try_in_order<T>(strategies: Vec<Strategy<'_, T>>) -> Result<T> {
    let mut failures = Vec::new();
    for (label, attempt) in strategies {
        match attempt.await {
            Ok(value) => {
                if !failures.is_empty() {
                    info!("{} succeeded after {} failed attempt(s)", label, failures.len());
                }
                return Ok(value);
            }
            Err(e) => {
                warn!("{} failed: {:#}", label, e);
                failures.push(format!("{}: {:#}", label, e));
            }
        }
    }

    if failures.is_empty() {
        return Err(anyhow!("No strategies to try"));
    }
    Err(anyhow!("All attempts failed: {}", failures.join("; ")))
}
