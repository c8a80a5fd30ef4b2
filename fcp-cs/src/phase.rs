//! Production/evaluation phase gate

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Evaluation,
    Production,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Evaluation => f.write_str("evaluation"),
            Phase::Production => f.write_str("production"),
        }
    }
}

/// Two-phase session counter
///
/// Each inference counts towards the current phase; reaching that phase's
/// quota switches phase and resets the counter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseGate {
    phase: Phase,
    counter: u32,
    evaluation_sessions: u32,
    production_sessions: u32,
}

impl PhaseGate {
    /// Gate starting in the evaluation phase
    pub fn new(evaluation_sessions: u32, production_sessions: u32) -> Self {
        Self {
            phase: Phase::Evaluation,
            counter: 0,
            evaluation_sessions,
            production_sessions,
        }
    }

    /// Keep the persisted position but apply the current quotas
    pub fn with_quotas(mut self, evaluation_sessions: u32, production_sessions: u32) -> Self {
        self.evaluation_sessions = evaluation_sessions;
        self.production_sessions = production_sessions;
        self
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn counter(&self) -> u32 {
        self.counter
    }

    /// Count one session; returns the new phase when a switch happened
    pub fn record_session(&mut self) -> Option<Phase> {
        self.counter += 1;
        let quota = match self.phase {
            Phase::Evaluation => self.evaluation_sessions,
            Phase::Production => self.production_sessions,
        };
        if self.counter < quota {
            return None;
        }
        self.counter = 0;
        self.phase = match self.phase {
            Phase::Evaluation => Phase::Production,
            Phase::Production => Phase::Evaluation,
        };
        Some(self.phase)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cycle_follows_quotas() {
        let mut gate = PhaseGate::new(2, 3);
        assert_eq!(gate.phase(), Phase::Evaluation);
        assert_eq!(gate.record_session(), None);
        assert_eq!(gate.record_session(), Some(Phase::Production));
        assert_eq!(gate.counter(), 0);

        assert_eq!(gate.record_session(), None);
        assert_eq!(gate.record_session(), None);
        assert_eq!(gate.record_session(), Some(Phase::Evaluation));
    }

    #[test]
    fn test_quota_of_one_switches_every_session() {
        let mut gate = PhaseGate::new(1, 1);
        assert_eq!(gate.record_session(), Some(Phase::Production));
        assert_eq!(gate.record_session(), Some(Phase::Evaluation));
    }

    #[test]
    fn test_with_quotas_keeps_position() {
        let mut gate = PhaseGate::new(5, 5);
        gate.record_session();
        let gate = gate.with_quotas(2, 2);
        assert_eq!(gate.counter(), 1);
        assert_eq!(gate.phase(), Phase::Evaluation);
    }
}
