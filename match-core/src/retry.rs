use std::thread;
use std::time::Duration;
use tracing::debug;

/// Run `op` up to `attempts` times, sleeping `base_delay`, then twice that,
/// and so on between attempts. Only errors for which `is_transient` holds are
/// retried; anything else is returned immediately.
pub fn with_backoff<T, E, F, P>(
    attempts: u32,
    base_delay: Duration,
    mut op: F,
    is_transient: P,
) -> Result<T, E>
where
    F: FnMut() -> Result<T, E>,
    P: Fn(&E) -> bool,
    E: std::fmt::Display,
{
    let attempts = attempts.max(1);
    let mut delay = base_delay;
    let mut attempt = 1;

    loop {
        match op() {
            Ok(value) => return Ok(value),
            Err(err) if attempt < attempts && is_transient(&err) => {
                debug!("attempt {}/{} failed ({}), retrying in {:?}", attempt, attempts, err, delay);
                thread::sleep(delay);
                delay = delay.saturating_mul(2);
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}
