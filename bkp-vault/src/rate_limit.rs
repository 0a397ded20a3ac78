use std::io::{self, Read, Write};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Token-bucket rate limiter in bytes/second. `rate_kb_per_sec == 0` means
/// unlimited, in which case the transport wrapper becomes a no-op passthrough.
pub struct RateLimiter {
    rate_bytes_per_sec: u64,
    state: Mutex<BucketState>,
}

struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

impl RateLimiter {
    pub fn new(rate_kb_per_sec: u64) -> Self {
        let rate_bytes_per_sec = rate_kb_per_sec * 1024;
        Self {
            rate_bytes_per_sec,
            state: Mutex::new(BucketState {
                tokens: rate_bytes_per_sec as f64,
                last_refill: Instant::now(),
            }),
        }
    }

    pub fn unlimited() -> Self {
        Self::new(0)
    }

    pub fn is_unlimited(&self) -> bool {
        self.rate_bytes_per_sec == 0
    }

    /// Blocks until `amount` bytes worth of tokens are available.
    pub fn acquire(&self, amount: usize) {
        if self.is_unlimited() {
            return;
        }
        let mut state = self.state.lock().unwrap();
        loop {
            let elapsed = state.last_refill.elapsed();
            state.tokens = (state.tokens + elapsed.as_secs_f64() * self.rate_bytes_per_sec as f64)
                .min(self.rate_bytes_per_sec as f64);
            state.last_refill = Instant::now();

            if state.tokens >= amount as f64 {
                state.tokens -= amount as f64;
                return;
            }

            let shortfall = amount as f64 - state.tokens;
            let wait = Duration::from_secs_f64(shortfall / self.rate_bytes_per_sec as f64);
            drop(state);
            std::thread::sleep(wait);
            state = self.state.lock().unwrap();
        }
    }
}

/// Wraps a [`Read`] so every read is shaped by a [`RateLimiter`], the way
/// the HTTP transport wraps request/response bodies as a round-tripper.
pub struct ThrottledReader<'a, R> {
    inner: R,
    limiter: &'a RateLimiter,
}

impl<'a, R: Read> ThrottledReader<'a, R> {
    pub fn new(inner: R, limiter: &'a RateLimiter) -> Self {
        Self { inner, limiter }
    }
}

impl<R: Read> Read for ThrottledReader<'_, R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.limiter.acquire(n);
        Ok(n)
    }
}

/// Wraps a [`Write`] so every write is shaped by a [`RateLimiter`].
pub struct ThrottledWriter<'a, W> {
    inner: W,
    limiter: &'a RateLimiter,
}

impl<'a, W: Write> ThrottledWriter<'a, W> {
    pub fn new(inner: W, limiter: &'a RateLimiter) -> Self {
        Self { inner, limiter }
    }
}

impl<W: Write> Write for ThrottledWriter<'_, W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.limiter.acquire(buf.len());
        self.inner.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_rate_is_unlimited_and_never_blocks() {
        let limiter = RateLimiter::unlimited();
        let start = Instant::now();
        limiter.acquire(10_000_000);
        assert!(start.elapsed() < Duration::from_millis(50));
    }

    #[test]
    fn bounded_rate_throttles_large_acquire() {
        let limiter = RateLimiter::new(100); // 100 KB/s
        let start = Instant::now();
        limiter.acquire(100 * 1024); // exactly one second of budget
        limiter.acquire(50 * 1024); // needs to wait for more tokens
        assert!(start.elapsed() >= Duration::from_millis(400));
    }
}
