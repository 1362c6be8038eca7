//! Timestamp-scheduled parameter automation.
//!
//! A parameter holds a timeline of events on the audio clock. Its value at
//! any time is derived from the timeline, so scheduling never sleeps and a
//! renderer running ahead of the scheduler still sees consistent values.

#[derive(Debug, Clone, Copy, PartialEq)]
enum EventKind {
    /// Jump to the value at the event time
    Set,
    /// Move linearly from the previous event's value, arriving at the event time
    LinearRamp,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct AutomationEvent {
    kind: EventKind,
    value: f32,
    time: f64,
}

/// A single automatable value (filter Q, gain, ...).
#[derive(Debug, Clone)]
pub struct AutomatedParam {
    default_value: f32,
    /// Sorted by time; equal times keep insertion order.
    events: Vec<AutomationEvent>,
}

impl AutomatedParam {
    pub fn new(value: f32) -> Self {
        Self {
            default_value: value,
            events: Vec::new(),
        }
    }

    /// Value at time `t` (seconds on the audio clock).
    pub fn value_at(&self, t: f64) -> f32 {
        // Index of the first event strictly after t
        let next = self.events.partition_point(|e| e.time <= t);

        let (prev_value, prev_time) = if next == 0 {
            (self.default_value, None)
        } else {
            let e = self.events[next - 1];
            (e.value, Some(e.time))
        };

        match self.events.get(next) {
            Some(e) if e.kind == EventKind::LinearRamp => {
                // A ramp with nothing before it starts from the default at t=0
                let start = prev_time.unwrap_or(0.0);
                let span = e.time - start;
                if span <= 0.0 {
                    return e.value;
                }
                let frac = ((t - start) / span).clamp(0.0, 1.0) as f32;
                prev_value + (e.value - prev_value) * frac
            }
            _ => prev_value,
        }
    }

    pub fn set_value_at_time(&mut self, value: f32, time: f64) {
        self.insert(AutomationEvent {
            kind: EventKind::Set,
            value,
            time,
        });
    }

    pub fn linear_ramp_to_value_at_time(&mut self, value: f32, time: f64) {
        self.insert(AutomationEvent {
            kind: EventKind::LinearRamp,
            value,
            time,
        });
    }

    /// Drop every event at or after `time`.
    pub fn cancel_scheduled_values(&mut self, time: f64) {
        self.events.retain(|e| e.time < time);
    }

    /// Freeze the parameter at its current value at `time`, discarding
    /// everything scheduled around it. New segments can then be appended
    /// without overlapping an in-flight ramp.
    pub fn cancel_and_hold_at_time(&mut self, time: f64) {
        let held = self.value_at(time);
        self.events.clear();
        self.default_value = held;
        self.set_value_at_time(held, time);
    }

    /// Time of the last scheduled event, if any.
    pub fn end_time(&self) -> Option<f64> {
        self.events.last().map(|e| e.time)
    }

    pub fn scheduled_len(&self) -> usize {
        self.events.len()
    }

    fn insert(&mut self, event: AutomationEvent) {
        let at = self.events.partition_point(|e| e.time <= event.time);
        self.events.insert(at, event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_value_without_events() {
        let p = AutomatedParam::new(0.3);
        assert_eq!(p.value_at(0.0), 0.3);
        assert_eq!(p.value_at(100.0), 0.3);
    }

    #[test]
    fn test_attack_release_ramp() {
        let mut p = AutomatedParam::new(0.0);
        p.set_value_at_time(0.0, 1.0);
        p.linear_ramp_to_value_at_time(1.0, 1.5);
        p.linear_ramp_to_value_at_time(0.0, 2.5);

        assert_eq!(p.value_at(0.5), 0.0);
        assert!((p.value_at(1.25) - 0.5).abs() < 1e-6);
        assert!((p.value_at(1.5) - 1.0).abs() < 1e-6);
        assert!((p.value_at(2.0) - 0.5).abs() < 1e-6);
        assert_eq!(p.value_at(2.5), 0.0);
        assert_eq!(p.value_at(10.0), 0.0);
    }

    #[test]
    fn test_cancel_and_hold_mid_ramp() {
        let mut p = AutomatedParam::new(0.0);
        p.set_value_at_time(0.0, 0.0);
        p.linear_ramp_to_value_at_time(1.0, 1.0);
        p.linear_ramp_to_value_at_time(0.0, 2.0);

        p.cancel_and_hold_at_time(0.5);
        assert_eq!(p.scheduled_len(), 1);
        assert!((p.value_at(0.5) - 0.5).abs() < 1e-6);
        // Nothing scheduled after the hold: stays put
        assert!((p.value_at(5.0) - 0.5).abs() < 1e-6);

        p.linear_ramp_to_value_at_time(0.8, 1.0);
        assert!((p.value_at(0.75) - 0.65).abs() < 1e-6);
    }

    #[test]
    fn test_cancel_scheduled_values_keeps_past() {
        let mut p = AutomatedParam::new(0.0);
        p.set_value_at_time(0.2, 1.0);
        p.linear_ramp_to_value_at_time(1.0, 2.0);
        p.cancel_scheduled_values(1.5);
        assert_eq!(p.scheduled_len(), 1);
        assert_eq!(p.value_at(3.0), 0.2);
    }
}
