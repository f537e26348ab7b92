/// Wall-clock milliseconds since the Unix epoch.
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Strictly increasing nonce source for signed requests.
///
/// Bitfinex rejects a nonce that is not larger than the previous one for
/// the same key, so two calls within the same microsecond must still differ.
#[derive(Debug, Default)]
pub struct NonceGenerator {
    last: std::sync::atomic::AtomicU64,
}

impl NonceGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next(&self) -> u64 {
        use std::sync::atomic::Ordering;

        let now_us = chrono::Utc::now().timestamp_micros().max(0) as u64;

        let mut prev = self.last.load(Ordering::Relaxed);
        loop {
            let candidate = now_us.max(prev + 1);
            match self
                .last
                .compare_exchange_weak(prev, candidate, Ordering::AcqRel, Ordering::Relaxed)
            {
                Ok(_) => return candidate,
                Err(actual) => prev = actual,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_now_ms_is_recent() {
        // 2020-01-01 in ms
        assert!(now_ms() > 1_577_836_800_000);
    }

    #[test]
    fn test_nonce_strictly_increasing() {
        let gen = NonceGenerator::new();
        let mut prev = gen.next();
        for _ in 0..1000 {
            let next = gen.next();
            assert!(next > prev);
            prev = next;
        }
    }
}
