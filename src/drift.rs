//! One periodic-task registry for every resonance peak's drift tick.
//!
//! Each peak registers a fixed period when it is created. A single driver
//! polls `due()` and dispatches ticks, so a few hundred peaks cost one
//! thread instead of one timer each, and a slow peak never delays another's
//! deadline.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::time::Duration;

/// Address of a peak: the note's pitch bucket and the peak's index within the note.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeakId {
    pub note: usize,
    pub peak: usize,
}

/// Deadline-ordered registry of fixed-period tasks keyed by peak.
#[derive(Debug, Default)]
pub struct DriftSchedule {
    /// Period and registration generation per peak
    periods: HashMap<PeakId, (Duration, u64)>,
    /// Min-heap of (deadline, id, generation). Entries whose generation no
    /// longer matches (deregistered or re-registered) are skipped lazily.
    deadlines: BinaryHeap<Reverse<(Duration, PeakId, u64)>>,
    generation: u64,
}

impl DriftSchedule {
    pub fn new() -> Self {
        Self::default()
    }

    /// First tick fires one period after `now`. Re-registering replaces the
    /// earlier registration.
    pub fn register(&mut self, id: PeakId, period: Duration, now: Duration) {
        let period = period.max(Duration::from_millis(1));
        self.generation += 1;
        self.periods.insert(id, (period, self.generation));
        self.deadlines.push(Reverse((now + period, id, self.generation)));
    }

    pub fn deregister(&mut self, id: PeakId) -> bool {
        self.periods.remove(&id).is_some()
    }

    pub fn len(&self) -> usize {
        self.periods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.periods.is_empty()
    }

    /// Earliest pending deadline, for sleeping until work is due.
    pub fn next_deadline(&mut self) -> Option<Duration> {
        self.drop_stale();
        self.deadlines.peek().map(|Reverse((t, _, _))| *t)
    }

    /// Pop every task due at `now` and reschedule it one period later.
    ///
    /// A task that fell several periods behind fires once and skips ahead,
    /// rather than bursting to catch up.
    pub fn due(&mut self, now: Duration) -> Vec<PeakId> {
        let mut fired = Vec::new();
        loop {
            self.drop_stale();
            let Some(&Reverse((deadline, id, generation))) = self.deadlines.peek() else {
                break;
            };
            if deadline > now {
                break;
            }
            self.deadlines.pop();
            let Some(&(period, _)) = self.periods.get(&id) else {
                continue;
            };
            let mut next = deadline + period;
            while next <= now {
                next += period;
            }
            self.deadlines.push(Reverse((next, id, generation)));
            fired.push(id);
        }
        fired
    }

    fn drop_stale(&mut self) {
        while let Some(Reverse((_, id, generation))) = self.deadlines.peek() {
            if self.periods.get(id).map(|&(_, g)| g) == Some(*generation) {
                break;
            }
            self.deadlines.pop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn test_fires_every_period() {
        let mut s = DriftSchedule::new();
        let a = PeakId { note: 0, peak: 0 };
        s.register(a, ms(33), ms(0));
        assert!(s.due(ms(32)).is_empty());
        assert_eq!(s.due(ms(33)), vec![a]);
        assert!(s.due(ms(40)).is_empty());
        assert_eq!(s.due(ms(66)), vec![a]);
        assert_eq!(s.next_deadline(), Some(ms(99)));
    }

    #[test]
    fn test_peaks_are_independent() {
        let mut s = DriftSchedule::new();
        let a = PeakId { note: 0, peak: 0 };
        let b = PeakId { note: 3, peak: 1 };
        s.register(a, ms(33), ms(0));
        s.register(b, ms(33), ms(10));
        assert_eq!(s.due(ms(33)), vec![a]);
        assert_eq!(s.due(ms(43)), vec![b]);
        assert_eq!(s.len(), 2);
    }

    #[test]
    fn test_deregistered_peak_never_fires() {
        let mut s = DriftSchedule::new();
        let a = PeakId { note: 1, peak: 0 };
        s.register(a, ms(33), ms(0));
        assert!(s.deregister(a));
        assert!(!s.deregister(a));
        assert!(s.due(ms(1000)).is_empty());
        assert_eq!(s.next_deadline(), None);
        assert!(s.is_empty());
    }

    #[test]
    fn test_reregister_does_not_double_fire() {
        let mut s = DriftSchedule::new();
        let a = PeakId { note: 2, peak: 1 };
        s.register(a, ms(33), ms(0));
        s.deregister(a);
        s.register(a, ms(50), ms(0));
        assert!(s.due(ms(40)).is_empty());
        assert_eq!(s.due(ms(50)), vec![a]);
        assert_eq!(s.due(ms(100)), vec![a]);
    }

    #[test]
    fn test_late_poll_fires_once() {
        let mut s = DriftSchedule::new();
        let a = PeakId { note: 0, peak: 0 };
        s.register(a, ms(33), ms(0));
        assert_eq!(s.due(ms(200)), vec![a]);
        assert_eq!(s.next_deadline(), Some(ms(231)));
    }
}
