//! Exponential backoff with jitter. The caller decides which operations
//! warrant retry; this module performs no automatic classification.

use crate::error::{Error, Result};
use crate::pipeline::CancellationToken;
use rand::Rng;
use std::time::Duration;

#[derive(Debug, Clone, Copy)]
pub struct Config {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
    /// Fraction of `delay` to jitter by, in `[0, 1]`. Clamped non-negative.
    pub jitter: f64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(10),
            multiplier: 2.0,
            jitter: 0.1,
        }
    }
}

fn jittered_delay(delay: Duration, jitter: f64) -> Duration {
    let jitter = jitter.max(0.0);
    let factor: f64 = rand::thread_rng().gen_range(-1.0..=1.0) * jitter;
    let seconds = (delay.as_secs_f64() * (1.0 + factor)).max(0.0);
    Duration::from_secs_f64(seconds)
}

/// Runs `f` up to `cfg.max_attempts` times, waiting with exponential
/// backoff (capped at `max_delay`) between attempts. Cancellation during
/// the wait returns immediately with the cancellation error.
pub fn do_with_data<T>(
    token: &CancellationToken,
    cfg: &Config,
    mut f: impl FnMut() -> Result<T>,
) -> Result<T> {
    let mut delay = cfg.initial_delay;
    let mut last_err = None;
    for attempt in 1..=cfg.max_attempts {
        token.check("retry")?;
        match f() {
            Ok(value) => return Ok(value),
            Err(e) => {
                last_err = Some(e);
                if attempt == cfg.max_attempts {
                    break;
                }
                token.check("retry-backoff")?;
                std::thread::sleep(jittered_delay(delay, cfg.jitter));
                delay = Duration::from_secs_f64((delay.as_secs_f64() * cfg.multiplier).min(cfg.max_delay.as_secs_f64()));
            }
        }
    }
    Err(last_err.unwrap_or(Error::NotImplemented("retry exhausted with no recorded error".to_string())))
}

pub fn do_retry(token: &CancellationToken, cfg: &Config, mut f: impl FnMut() -> Result<()>) -> Result<()> {
    do_with_data(token, cfg, || f())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn succeeds_after_transient_failures() {
        let attempts = AtomicU32::new(0);
        let token = CancellationToken::new();
        let cfg = Config { initial_delay: Duration::from_millis(1), max_delay: Duration::from_millis(2), ..Default::default() };
        let result = do_with_data(&token, &cfg, || {
            let n = attempts.fetch_add(1, Ordering::SeqCst);
            if n < 2 {
                Err(Error::NotImplemented("transient".to_string()))
            } else {
                Ok(42)
            }
        });
        assert_eq!(result.unwrap(), 42);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn exhausts_attempts_and_returns_last_error() {
        let token = CancellationToken::new();
        let cfg = Config { max_attempts: 2, initial_delay: Duration::from_millis(1), max_delay: Duration::from_millis(1), ..Default::default() };
        let result: Result<()> = do_with_data(&token, &cfg, || Err(Error::NotImplemented("nope".to_string())));
        assert!(result.is_err());
    }

    #[test]
    fn cancellation_short_circuits_before_first_attempt() {
        let token = CancellationToken::new();
        token.cancel();
        let cfg = Config::default();
        let result: Result<()> = do_with_data(&token, &cfg, || Ok(()));
        assert!(matches!(result, Err(Error::ExecutionCancelled { .. })));
    }
}
