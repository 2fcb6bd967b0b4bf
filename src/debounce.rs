use std::time::{Duration, Instant};

/// Holds the latest value until no new value has arrived for `delay`.
#[derive(Debug, Clone)]
pub struct Debouncer<T> {
    delay: Duration,
    pending: Option<(T, Instant)>,
}

impl<T> Debouncer<T> {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            pending: None,
        }
    }

    /// Replaces any pending value and restarts the quiet period.
    pub fn push(&mut self, value: T, now: Instant) {
        self.pending = Some((value, now));
    }

    /// Hands out the pending value once the quiet period is over.
    pub fn poll(&mut self, now: Instant) -> Option<T> {
        let (_, at) = self.pending.as_ref()?;
        if now.duration_since(*at) < self.delay {
            return None;
        }
        self.pending.take().map(|(value, _)| value)
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn cancel(&mut self) {
        self.pending = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_the_last_value_survives_a_burst() {
        let mut d = Debouncer::new(Duration::from_millis(400));
        let t0 = Instant::now();
        d.push("a", t0);
        d.push("ab", t0 + Duration::from_millis(100));
        d.push("abc", t0 + Duration::from_millis(200));

        assert_eq!(d.poll(t0 + Duration::from_millis(500)), None);
        assert_eq!(d.poll(t0 + Duration::from_millis(600)), Some("abc"));
        assert_eq!(d.poll(t0 + Duration::from_millis(900)), None);
    }
}
