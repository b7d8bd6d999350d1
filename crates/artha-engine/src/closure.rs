//! Closure phase controller.
//!
//! A pure function of wall-clock session time against the configured T0 < T1
//! < T2 boundaries. No state beyond the thresholds; the engine logs a
//! transition whenever the returned phase differs from the previous cycle's.

use crate::config::{ConfigError, SessionConfig};
use artha_models::ClosurePhase;
use chrono::NaiveTime;

#[derive(Debug, Clone)]
pub struct ClosureController {
    gradual_start: NaiveTime,
    urgent_start: NaiveTime,
    immediate_start: NaiveTime,
}

impl ClosureController {
    /// Boundary order is validated again here so the controller cannot be
    /// constructed inconsistent even outside `EngineConfig::load`.
    pub fn new(session: &SessionConfig) -> Result<Self, ConfigError> {
        if session.gradual_start >= session.urgent_start
            || session.urgent_start >= session.immediate_start
        {
            return Err(ConfigError::PhaseOrder(format!(
                "gradual {} < urgent {} < immediate {} required",
                session.gradual_start, session.urgent_start, session.immediate_start
            )));
        }
        Ok(Self {
            gradual_start: session.gradual_start,
            urgent_start: session.urgent_start,
            immediate_start: session.immediate_start,
        })
    }

    /// Phase for a given session wall-clock time.
    pub fn phase_at(&self, session_time: NaiveTime) -> ClosurePhase {
        if session_time >= self.immediate_start {
            ClosurePhase::Immediate
        } else if session_time >= self.urgent_start {
            ClosurePhase::Urgent
        } else if session_time >= self.gradual_start {
            ClosurePhase::Gradual
        } else {
            ClosurePhase::Normal
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SessionConfig;

    fn controller() -> ClosureController {
        ClosureController::new(&SessionConfig::default()).unwrap()
    }

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn test_escalation_across_boundaries() {
        let c = controller();
        assert_eq!(c.phase_at(t(9, 15)), ClosurePhase::Normal);
        assert_eq!(c.phase_at(t(14, 59)), ClosurePhase::Normal);
        assert_eq!(c.phase_at(t(15, 0)), ClosurePhase::Gradual);
        assert_eq!(c.phase_at(t(15, 9)), ClosurePhase::Gradual);
        assert_eq!(c.phase_at(t(15, 10)), ClosurePhase::Urgent);
        assert_eq!(c.phase_at(t(15, 19)), ClosurePhase::Urgent);
        assert_eq!(c.phase_at(t(15, 20)), ClosurePhase::Immediate);
        assert_eq!(c.phase_at(t(23, 59)), ClosurePhase::Immediate);
    }

    #[test]
    fn test_misordered_boundaries_refused() {
        let mut s = SessionConfig::default();
        s.immediate_start = t(15, 5);
        assert!(matches!(
            ClosureController::new(&s),
            Err(ConfigError::PhaseOrder(_))
        ));
    }
}
