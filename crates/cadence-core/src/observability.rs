//! Status views.

use serde::{Deserialize, Serialize};

use crate::domain::Phase;

/// Number of jobs in each phase.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseCounts {
    pub pending: usize,
    pub running: usize,
    pub restarting: usize,
    pub aborting: usize,
    pub aborted: usize,
    pub completing: usize,
    pub completed: usize,
    pub terminating: usize,
    pub terminated: usize,
}

impl PhaseCounts {
    pub fn record(&mut self, phase: Phase) {
        *self.slot(phase) += 1;
    }

    pub fn get(&self, phase: Phase) -> usize {
        match phase {
            Phase::Pending => self.pending,
            Phase::Running => self.running,
            Phase::Restarting => self.restarting,
            Phase::Aborting => self.aborting,
            Phase::Aborted => self.aborted,
            Phase::Completing => self.completing,
            Phase::Completed => self.completed,
            Phase::Terminating => self.terminating,
            Phase::Terminated => self.terminated,
        }
    }

    pub fn total(&self) -> usize {
        Phase::ALL.into_iter().map(|p| self.get(p)).sum()
    }

    fn slot(&mut self, phase: Phase) -> &mut usize {
        match phase {
            Phase::Pending => &mut self.pending,
            Phase::Running => &mut self.running,
            Phase::Restarting => &mut self.restarting,
            Phase::Aborting => &mut self.aborting,
            Phase::Aborted => &mut self.aborted,
            Phase::Completing => &mut self.completing,
            Phase::Completed => &mut self.completed,
            Phase::Terminating => &mut self.terminating,
            Phase::Terminated => &mut self.terminated,
        }
    }
}

impl FromIterator<Phase> for PhaseCounts {
    fn from_iter<I: IntoIterator<Item = Phase>>(iter: I) -> Self {
        let mut counts = PhaseCounts::default();
        for phase in iter {
            counts.record(phase);
        }
        counts
    }
}
