//! Texture offset animation between keyframes.
//!
//! A move list is circular. Entry `i` is a resting position and the time allotted to
//! reach it from the previous entry. Starting lands on entry 0 and immediately begins
//! the leg towards entry 1.

use std::time::Instant;

use serde::Deserialize;

// Durations at or below zero would divide by zero; treat them as "instant".
const MIN_STEP_SECS: f32 = 1e-3;

/// One keyframe, written in manifests as `[x, y, duration_seconds]`.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(from = "[f32; 3]")]
pub struct MoveStep {
    pub x: f32,
    pub y: f32,
    pub duration: f32,
}

impl From<[f32; 3]> for MoveStep {
    fn from([x, y, duration]: [f32; 3]) -> Self {
        Self { x, y, duration }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Leg {
    index: usize,
    from: (f32, f32),
    to: (f32, f32),
    started: Instant,
    duration: f32,
}

#[derive(Debug, Clone, PartialEq)]
enum State {
    Idle,
    Stepping(Leg),
}

#[derive(Debug, Clone)]
pub struct MoveScheduler {
    steps: Vec<MoveStep>,
    state: State,
}

impl MoveScheduler {
    pub fn new(steps: Vec<MoveStep>) -> Self {
        Self {
            steps,
            state: State::Idle,
        }
    }

    pub fn is_idle(&self) -> bool {
        self.state == State::Idle
    }

    /// Index of the keyframe currently being approached.
    pub fn current_index(&self) -> Option<usize> {
        match &self.state {
            State::Idle => None,
            State::Stepping(leg) => Some(leg.index),
        }
    }

    /// (Re)start at keyframe 0. Does nothing without keyframes.
    pub fn start(&mut self, now: Instant) {
        let Some(first) = self.steps.first().copied() else {
            self.state = State::Idle;
            return;
        };
        let at = (first.x, first.y);
        let leg = Leg {
            index: 0,
            from: at,
            to: at,
            started: now,
            duration: first.duration.max(MIN_STEP_SECS),
        };
        self.state = State::Stepping(self.next_leg(&leg, now));
    }

    pub fn stop(&mut self) {
        self.state = State::Idle;
    }

    fn next_leg(&self, leg: &Leg, now: Instant) -> Leg {
        let index = (leg.index + 1) % self.steps.len();
        let step = self.steps[index];
        Leg {
            index,
            from: leg.to,
            to: (step.x, step.y),
            started: now,
            duration: step.duration.max(MIN_STEP_SECS),
        }
    }

    /// Offset at `now`. A finished leg reports its target and the next leg starts at
    /// `now`. Idle always reports (0, 0).
    pub fn advance(&mut self, now: Instant) -> (f32, f32) {
        let leg = match &self.state {
            State::Idle => return (0.0, 0.0),
            State::Stepping(leg) => *leg,
        };

        let elapsed = now.saturating_duration_since(leg.started).as_secs_f32();
        let ratio = elapsed / leg.duration;
        if ratio >= 1.0 {
            self.state = State::Stepping(self.next_leg(&leg, now));
            return leg.to;
        }

        (
            leg.from.0 + (leg.to.0 - leg.from.0) * ratio,
            leg.from.1 + (leg.to.1 - leg.from.1) * ratio,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn steps(raw: &[[f32; 3]]) -> Vec<MoveStep> {
        raw.iter().copied().map(MoveStep::from).collect()
    }

    fn at(t0: Instant, secs: f32) -> Instant {
        t0 + Duration::from_secs_f32(secs)
    }

    fn close(a: (f32, f32), b: (f32, f32)) -> bool {
        (a.0 - b.0).abs() < 1e-4 && (a.1 - b.1).abs() < 1e-4
    }

    #[test]
    fn idle_reports_origin() {
        let t0 = Instant::now();
        let mut m = MoveScheduler::new(Vec::new());
        m.start(t0);
        assert!(m.is_idle());
        assert_eq!(m.advance(at(t0, 5.0)), (0.0, 0.0));
    }

    #[test]
    fn start_lands_on_first_keyframe_then_interpolates() {
        let t0 = Instant::now();
        let mut m = MoveScheduler::new(steps(&[[0.0, 0.0, 1.0], [1.0, 1.0, 1.0]]));
        m.start(t0);
        assert_eq!(m.current_index(), Some(1));
        assert!(close(m.advance(t0), (0.0, 0.0)));
        assert!(close(m.advance(at(t0, 0.5)), (0.5, 0.5)));
    }

    #[test]
    fn finished_leg_snaps_and_wraps() {
        let t0 = Instant::now();
        let mut m = MoveScheduler::new(steps(&[[0.0, 0.0, 1.0], [1.0, 1.0, 1.0]]));
        m.start(t0);

        // late frame: still reports the exact target, not an overshoot
        assert_eq!(m.advance(at(t0, 1.3)), (1.0, 1.0));
        assert_eq!(m.current_index(), Some(0));

        // next leg is timed from the snap, back towards keyframe 0
        assert!(close(m.advance(at(t0, 1.8)), (0.5, 0.5)));
        assert_eq!(m.advance(at(t0, 2.4)), (0.0, 0.0));
        assert_eq!(m.current_index(), Some(1));
    }

    #[test]
    fn restart_resets_to_first_keyframe() {
        let t0 = Instant::now();
        let mut m = MoveScheduler::new(steps(&[[0.2, 0.0, 2.0], [-0.2, 0.0, 2.0], [0.0, 0.4, 1.0]]));
        m.start(t0);
        m.advance(at(t0, 2.5));
        m.start(at(t0, 3.0));
        assert!(close(m.advance(at(t0, 3.0)), (0.2, 0.0)));
        m.stop();
        assert_eq!(m.advance(at(t0, 4.0)), (0.0, 0.0));
    }

    #[test]
    fn single_keyframe_holds_still() {
        let t0 = Instant::now();
        let mut m = MoveScheduler::new(steps(&[[0.3, -0.1, 1.0]]));
        m.start(t0);
        assert!(close(m.advance(at(t0, 0.4)), (0.3, -0.1)));
        assert!(close(m.advance(at(t0, 1.5)), (0.3, -0.1)));
    }

    #[test]
    fn zero_duration_does_not_divide_by_zero() {
        let t0 = Instant::now();
        let mut m = MoveScheduler::new(steps(&[[0.0, 0.0, 0.0], [1.0, 0.0, 0.0]]));
        m.start(t0);
        let p = m.advance(at(t0, 0.01));
        assert!(p.0.is_finite() && p.1.is_finite());
        assert_eq!(p, (1.0, 0.0));
    }

    #[test]
    fn deserializes_from_triples() {
        let parsed: Vec<MoveStep> = serde_json::from_str("[[0.2, 0.0, 2.0], [-0.2, 0, 2]]").unwrap();
        assert_eq!(parsed, steps(&[[0.2, 0.0, 2.0], [-0.2, 0.0, 2.0]]));
        assert!(serde_json::from_str::<Vec<MoveStep>>("[[1, 2]]").is_err());
    }
}
