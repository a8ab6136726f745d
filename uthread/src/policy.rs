//! Thread selection policies.
//!
//! The dispatch loop asks its [`Policy`] which runnable slot to run next.

/// Thread selection strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Policy {
    /// Scan forward from the slot after the last dispatched one, wrapping
    /// around. Every runnable thread gets a turn before any runs twice.
    #[default]
    RoundRobin,
    /// Always pick the lowest-indexed runnable slot.
    ///
    /// Not fair: a thread that keeps yielding starves every slot above
    /// it until it exits.
    LowestIndex,
}

impl Policy {
    /// Pick the next slot among `0..capacity`.
    ///
    /// `previous` is the slot dispatched last, if any.
    pub fn select<F>(self, capacity: usize, previous: Option<usize>, is_runnable: F) -> Option<usize>
    where
        F: Fn(usize) -> bool,
    {
        if capacity == 0 {
            return None;
        }

        let start = match self {
            Policy::LowestIndex => 0,
            Policy::RoundRobin => previous.map_or(0, |prev| (prev + 1) % capacity),
        };

        (0..capacity)
            .map(|offset| (start + offset) % capacity)
            .find(|&slot| is_runnable(slot))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lowest_index_ignores_previous() {
        let runnable = [false, true, true];
        let pick = Policy::LowestIndex.select(3, Some(1), |i| runnable[i]);
        assert_eq!(pick, Some(1));
    }

    #[test]
    fn test_round_robin_rotates() {
        let runnable = [true, true, true];
        let rr = Policy::RoundRobin;
        assert_eq!(rr.select(3, None, |i| runnable[i]), Some(0));
        assert_eq!(rr.select(3, Some(0), |i| runnable[i]), Some(1));
        assert_eq!(rr.select(3, Some(1), |i| runnable[i]), Some(2));
        assert_eq!(rr.select(3, Some(2), |i| runnable[i]), Some(0));
    }

    #[test]
    fn test_round_robin_skips_idle_slots() {
        let runnable = [true, false, false, true];
        assert_eq!(Policy::RoundRobin.select(4, Some(0), |i| runnable[i]), Some(3));
        assert_eq!(Policy::RoundRobin.select(4, Some(3), |i| runnable[i]), Some(0));
    }

    #[test]
    fn test_round_robin_returns_to_sole_thread() {
        let runnable = [false, true, false];
        assert_eq!(Policy::RoundRobin.select(3, Some(1), |i| runnable[i]), Some(1));
    }

    #[test]
    fn test_nothing_runnable() {
        assert_eq!(Policy::RoundRobin.select(3, None, |_| false), None);
        assert_eq!(Policy::LowestIndex.select(0, None, |_| true), None);
    }
}
