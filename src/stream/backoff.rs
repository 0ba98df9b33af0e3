use std::time::Duration;

/// Bounded exponential backoff: `base * 2^n`, clamped to `cap`, for at most
/// `max_retries` retries.
pub struct Backoff {
    attempt: u32,
    base: Duration,
    cap: Duration,
    max_retries: u32,
}

impl Backoff {
    pub fn new(base: Duration, cap: Duration, max_retries: u32) -> Self {
        Self {
            attempt: 0,
            base,
            cap,
            max_retries,
        }
    }

    pub fn next(&mut self) -> Duration {
        self.attempt += 1;
        let factor = 2u32.saturating_pow((self.attempt - 1).min(16));
        self.base.saturating_mul(factor).min(self.cap)
    }

    pub fn is_exhausted(&self) -> bool {
        self.attempt >= self.max_retries
    }

    pub fn retries(&self) -> u32 {
        self.attempt
    }
}
