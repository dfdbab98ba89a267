use std::{iter::Take, time::Duration};

/// An infinite stream of delays for retrying an operation: the first delay is
/// `start`, and each one after that grows by `factor`, up to `max`.
///
/// The `Retry` trait below drives an operation with these delays, using
/// [std::thread::sleep] between attempts; do NOT use it from asynchronous
/// code.
pub struct ExponentialBackoff {
    next: Duration,
    max: Duration,
    factor: u32,
}

impl ExponentialBackoff {
    pub fn new(start: Duration, max: Duration, factor: u32) -> ExponentialBackoff {
        ExponentialBackoff {
            next: start.min(max),
            max,
            factor,
        }
    }
}

impl Iterator for ExponentialBackoff {
    type Item = Duration;

    fn next(&mut self) -> Option<Self::Item> {
        let curr = self.next;
        self.next = (curr * self.factor).min(self.max);
        Some(curr)
    }
}

/// Retry a fallible operation once per delay yielded by an iterator of
/// [Duration] values.
pub trait Retry {
    /// Call `f` until it returns [Ok], or the iterator is exhausted. After
    /// every failed attempt but the last, `sleep` is given the error and the
    /// delay; it is expected to log and then sleep. Returns the first [Ok],
    /// the last [Err], or `None` if the iterator was empty.
    ///
    /// An operation that fails in a way not worth retrying should return
    /// `Ok(Err(e))`, so that `e` is handed back immediately.
    fn retry<F, S, T, E>(&mut self, mut f: F, sleep: S) -> Option<Result<T, E>>
    where
        F: FnMut() -> Result<T, E>,
        S: Fn(&E, Duration),
        Self: Iterator<Item = Duration> + Sized,
    {
        let mut last_err = None;
        let mut iter = self.peekable();
        while let Some(delay) = iter.next() {
            match f() {
                Ok(v) => return Some(Ok(v)),
                Err(e) => {
                    if iter.peek().is_some() {
                        sleep(&e, delay);
                    }
                    last_err = Some(Err(e));
                }
            }
        }
        last_err
    }
}

impl Retry for ExponentialBackoff {}

impl Retry for Take<ExponentialBackoff> {}




// ============================================================================
#[cfg(test)]
mod test {

    use std::cell::Cell;
    use std::time::Duration;
    use super::{ExponentialBackoff, Retry};

    #[test]
    fn delays_grow_to_the_maximum() {
        let delays: Vec<_> = ExponentialBackoff::new(Duration::from_millis(10), Duration::from_millis(50), 2).take(4).collect();
        assert_eq!(delays, vec![10, 20, 40, 50].into_iter().map(Duration::from_millis).collect::<Vec<_>>());
    }

    #[test]
    fn retry_stops_at_first_success() {
        let calls = Cell::new(0);
        let result = ExponentialBackoff::new(Duration::ZERO, Duration::ZERO, 2).take(5).retry(
            || {
                calls.set(calls.get() + 1);
                if calls.get() < 3 { Err("busy") } else { Ok(calls.get()) }
            },
            |_, _| {});
        assert_eq!(result, Some(Ok(3)));
    }

    #[test]
    fn retry_gives_up_with_the_last_error() {
        let sleeps = Cell::new(0);
        let result: Option<Result<(), _>> = ExponentialBackoff::new(Duration::ZERO, Duration::ZERO, 2)
            .take(3)
            .retry(|| Err("down"), |_, _| sleeps.set(sleeps.get() + 1));
        assert_eq!(result, Some(Err("down")));
        assert_eq!(sleeps.get(), 2);
    }
}
