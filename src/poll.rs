use std::time::Duration;

use crate::timings::pause;

/// A polling loop with a fixed interval and a hard cap on iterations.
#[derive(Debug, Clone, Copy)]
pub struct Poll {
    interval: Duration,
    max_ticks: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// The condition held on tick `ticks`.
    Done { ticks: u32 },
    /// The cap was reached without the condition holding.
    Exhausted { ticks: u32 },
}

impl PollOutcome {
    pub fn is_done(&self) -> bool {
        matches!(self, PollOutcome::Done { .. })
    }
}

impl Poll {
    /// Poll every `interval` for at most `cap` of wall time. Always allows at
    /// least one tick.
    pub fn within(interval: Duration, cap: Duration) -> Self {
        let max_ticks = if interval.is_zero() {
            1
        } else {
            (cap.as_millis() / interval.as_millis().max(1)).max(1) as u32
        };
        Self {
            interval,
            max_ticks,
        }
    }

    pub fn ticks(interval: Duration, max_ticks: u32) -> Self {
        Self {
            interval,
            max_ticks: max_ticks.max(1),
        }
    }

    pub fn max_ticks(&self) -> u32 {
        self.max_ticks
    }

    /// Run `tick` until it returns `true` or the cap is hit. Errors from
    /// `tick` end the loop immediately.
    pub fn run<E>(&self, mut tick: impl FnMut(u32) -> Result<bool, E>) -> Result<PollOutcome, E> {
        for i in 0..self.max_ticks {
            if tick(i)? {
                return Ok(PollOutcome::Done { ticks: i + 1 });
            }
            if i + 1 < self.max_ticks {
                pause(self.interval);
            }
        }
        Ok(PollOutcome::Exhausted {
            ticks: self.max_ticks,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stops_on_first_success() {
        let poll = Poll::ticks(Duration::ZERO, 10);
        let outcome = poll.run::<()>(|i| Ok(i == 3)).unwrap();
        assert_eq!(outcome, PollOutcome::Done { ticks: 4 });
    }

    #[test]
    fn exhausts_at_cap() {
        let mut calls = 0;
        let poll = Poll::ticks(Duration::ZERO, 5);
        let outcome = poll
            .run::<()>(|_| {
                calls += 1;
                Ok(false)
            })
            .unwrap();
        assert_eq!(outcome, PollOutcome::Exhausted { ticks: 5 });
        assert_eq!(calls, 5);
    }

    #[test]
    fn cap_is_derived_from_duration() {
        let poll = Poll::within(Duration::from_millis(100), Duration::from_secs(15));
        assert_eq!(poll.max_ticks(), 150);
        assert_eq!(Poll::within(Duration::ZERO, Duration::ZERO).max_ticks(), 1);
    }

    #[test]
    fn errors_abort_polling() {
        let poll = Poll::ticks(Duration::ZERO, 5);
        let res = poll.run(|i| if i == 1 { Err("boom") } else { Ok(false) });
        assert_eq!(res, Err("boom"));
    }
}
