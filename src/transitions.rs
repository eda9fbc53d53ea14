//! Transition manager
//!
//! Schedules linear automation curves on backend scalar controls and keeps
//! a registration-ordered list of what is in flight so the UI can display
//! elapsed seconds. The timer list is display-only; it never drives control
//! flow.

use tracing::debug;

use crate::backend::{AudioBackend, ParamRef};

/// Registration record for one in-flight ramp.
#[derive(Debug, Clone, Copy)]
struct ActiveTransition {
    param: ParamRef,
    end: f64,
    duration: f64,
    begin_time: f64,
}

#[derive(Debug, Default)]
pub struct TransitionManager {
    active: Vec<ActiveTransition>,
}

impl TransitionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Program one linear ramp (start to end over `duration`), or two when
    /// `middle` is present (start to middle over half the duration, middle
    /// to end over the rest), beginning at `begin_time`.
    pub fn schedule<B: AudioBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        param: ParamRef,
        start: f64,
        end: f64,
        duration: f64,
        begin_time: f64,
        middle: Option<f64>,
    ) {
        backend.set_value_at(param, start, begin_time);
        match middle {
            Some(mid) => {
                backend.ramp_to_value_at(param, mid, begin_time + duration / 2.0);
                backend.ramp_to_value_at(param, end, begin_time + duration);
            }
            None => {
                backend.ramp_to_value_at(param, end, begin_time + duration);
            }
        }
        self.active.push(ActiveTransition {
            param,
            end,
            duration,
            begin_time,
        });
    }

    /// Prune finished transitions and return whole elapsed seconds for the
    /// rest, in registration order. Entries whose begin time lies in the
    /// future report negative values; the orchestrator filters those out.
    pub fn active_timers(&mut self, now: f64) -> Vec<i64> {
        self.active.retain(|t| {
            let live = now - t.begin_time < t.duration;
            if !live {
                debug!(param = ?t.param, end = t.end, "transition finished");
            }
            live
        });
        self.active
            .iter()
            .map(|t| (now - t.begin_time).floor() as i64)
            .collect()
    }

    /// Wipe all entries. Called on every stop.
    pub fn clear(&mut self) {
        self.active.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::ParamKind;
    use crate::mock_backend::{BackendCall, MockBackend};

    fn setup() -> (MockBackend, ParamRef) {
        let mut backend = MockBackend::new(44100);
        let g = backend.create_gain();
        (backend, ParamRef::new(g, ParamKind::Gain))
    }

    #[test]
    fn two_point_ramp_is_one_set_plus_one_ramp() {
        let (mut backend, param) = setup();
        let mut tm = TransitionManager::new();
        tm.schedule(&mut backend, param, 2.0, 8.0, 3.0, 0.0, None);

        let sets: Vec<_> = backend
            .calls
            .iter()
            .filter(|c| matches!(c, BackendCall::SetValueAt(p, _, _) if *p == param))
            .collect();
        let ramps: Vec<_> = backend
            .calls
            .iter()
            .filter(|c| matches!(c, BackendCall::RampToValueAt(p, _, _) if *p == param))
            .collect();
        assert_eq!(sets.len(), 1);
        assert_eq!(ramps.len(), 1);
        assert_eq!(*sets[0], BackendCall::SetValueAt(param, 2.0, 0.0));
        assert_eq!(*ramps[0], BackendCall::RampToValueAt(param, 8.0, 3.0));
    }

    #[test]
    fn three_point_ramp_splits_the_duration() {
        let (mut backend, param) = setup();
        let mut tm = TransitionManager::new();
        tm.schedule(&mut backend, param, 0.0, 0.0, 4.0, 1.0, Some(9.0));

        let ramps: Vec<_> = backend
            .calls
            .iter()
            .filter_map(|c| match c {
                BackendCall::RampToValueAt(p, v, t) if *p == param => Some((*v, *t)),
                _ => None,
            })
            .collect();
        assert_eq!(ramps, vec![(9.0, 3.0), (0.0, 5.0)]);
    }

    #[test]
    fn timers_report_floored_elapsed_and_prune() {
        let (mut backend, param) = setup();
        let mut tm = TransitionManager::new();
        tm.schedule(&mut backend, param, 0.0, 1.0, 3.0, 0.0, None);
        tm.schedule(&mut backend, param, 0.0, 1.0, 10.0, 0.0, None);

        assert_eq!(tm.active_timers(1.7), vec![1, 1]);
        assert_eq!(tm.active_timers(4.0), vec![4], "3s ramp pruned");
        assert_eq!(tm.active_timers(11.0), Vec::<i64>::new());
    }

    #[test]
    fn future_transitions_report_negative_elapsed() {
        let (mut backend, param) = setup();
        let mut tm = TransitionManager::new();
        tm.schedule(&mut backend, param, 0.0, 1.0, 5.0, 2.0, None);
        assert_eq!(tm.active_timers(0.5), vec![-2]);
    }

    #[test]
    fn clear_wipes_everything() {
        let (mut backend, param) = setup();
        let mut tm = TransitionManager::new();
        tm.schedule(&mut backend, param, 0.0, 1.0, 3.0, 0.0, None);
        tm.clear();
        assert!(tm.is_empty());
        assert_eq!(tm.active_timers(0.0), Vec::<i64>::new());
    }
}
