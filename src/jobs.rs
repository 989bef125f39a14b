//! Long-running start/stop operations as touch chains.

use std::fmt;
use std::sync::Arc;

use crate::api::{ApplianceId, JobStatus};
use crate::commons::StratusResult;
use crate::constants::STATE_UNINITIALISED;
use crate::ledger::{TouchKind, TouchLedger, TouchPayload};
use crate::registry::StateRegistry;

//------------ Operation -----------------------------------------------------

/// The two symmetric operation chains.
///
/// Each is a three-phase progression through ordinary registered
/// states: pending, in progress, done. A deployment that wants to use
/// the tracker includes the phase names in its registered state list.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Operation {
    Start,
    Stop,
}

impl Operation {
    /// The phase names of this chain, in progression order.
    pub fn phases(self) -> &'static [&'static str; 3] {
        match self {
            Operation::Start => &["pre-start", "start", "started"],
            Operation::Stop => &["pre-stop", "stop", "stopped"],
        }
    }

    /// The phase a chain begins in.
    pub fn pending(self) -> &'static str {
        self.phases()[0]
    }

    /// The phase that completes the chain.
    pub fn terminal(self) -> &'static str {
        self.phases()[2]
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Start => f.write_str("start"),
            Operation::Stop => f.write_str("stop"),
        }
    }
}


//------------ JobTracker ----------------------------------------------------

/// Represents in-flight start/stop operations with a pollable status.
///
/// A job is not a separate record: it is a view over the state touch
/// chain of one appliance, and the job id is the appliance id. There is
/// one in-flight operation of each kind per appliance; a second `begin`
/// for the same chain simply appends another pending touch, and
/// progress is always read from the latest touch. The tracker does not
/// enforce phase ordering; sequencing the advancing calls correctly is
/// the caller's responsibility. A caller that never issues the next
/// call leaves the job at its last observed phase.
#[derive(Debug)]
pub struct JobTracker {
    ledger: Arc<TouchLedger>,
    registry: Arc<StateRegistry>,
}

impl JobTracker {
    pub fn new(
        ledger: Arc<TouchLedger>,
        registry: Arc<StateRegistry>,
    ) -> Self {
        JobTracker { ledger, registry }
    }

    /// Begins an operation by appending the pending phase.
    ///
    /// Returns the job id for progress calls, which is the appliance
    /// id.
    pub fn begin(
        &self,
        appliance: ApplianceId,
        operation: Operation,
    ) -> StratusResult<ApplianceId> {
        self.advance(appliance, operation.pending())?;
        Ok(appliance)
    }

    /// Appends the named phase to the chain.
    ///
    /// The phase participates as an ordinary state touch, so only
    /// unregistered names fail.
    pub fn advance(
        &self,
        appliance: ApplianceId,
        phase: &str,
    ) -> StratusResult<u64> {
        let state = self.registry.resolve(phase)?;
        let touch = self
            .ledger
            .append(appliance.into(), TouchPayload::StateChange { state })?;
        Ok(touch.sequence())
    }

    /// The progress of the job: its latest phase and whether that is a
    /// chain's terminal phase.
    pub fn status(&self, job: ApplianceId) -> StratusResult<JobStatus> {
        let phase = match self
            .ledger
            .latest(job.into(), TouchKind::State)?
            .and_then(|touch| touch.payload().state())
        {
            Some(state) => self.registry.name_of(state)?,
            None => STATE_UNINITIALISED.to_string(),
        };

        let complete = phase == Operation::Start.terminal()
            || phase == Operation::Stop.terminal();

        Ok(JobStatus {
            appliance_id: job,
            phase,
            complete,
        })
    }
}


//------------ Tests ---------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test;

    fn tracker() -> JobTracker {
        let storage_uri = test::mem_storage();
        let ledger = Arc::new(TouchLedger::create(&storage_uri).unwrap());
        let registry = Arc::new(StateRegistry::create(&storage_uri).unwrap());
        registry.register(&test::STATE_LIST_WITH_PHASES).unwrap();
        JobTracker::new(ledger, registry)
    }

    #[test]
    fn chain_progresses_to_completion() {
        let tracker = tracker();
        let vm = ApplianceId::new(1);

        let job = tracker.begin(vm, Operation::Start).unwrap();
        assert_eq!(job, vm);

        let status = tracker.status(job).unwrap();
        assert_eq!(status.phase, "pre-start");
        assert!(!status.complete);

        tracker.advance(vm, "start").unwrap();
        assert!(!tracker.status(job).unwrap().complete);

        tracker.advance(vm, "started").unwrap();
        let status = tracker.status(job).unwrap();
        assert_eq!(status.phase, "started");
        assert!(status.complete);
    }

    #[test]
    fn stop_chain_has_its_own_terminal() {
        let tracker = tracker();
        let vm = ApplianceId::new(1);

        tracker.begin(vm, Operation::Stop).unwrap();
        tracker.advance(vm, "stop").unwrap();
        tracker.advance(vm, "stopped").unwrap();
        assert!(tracker.status(vm).unwrap().complete);
    }

    #[test]
    fn unregistered_phase_fails() {
        let tracker = tracker();
        let vm = ApplianceId::new(1);
        assert!(tracker.advance(vm, "suspended").is_err());
    }

    #[test]
    fn status_without_history_is_uninitialised() {
        let tracker = tracker();
        let status = tracker.status(ApplianceId::new(9)).unwrap();
        assert_eq!(status.phase, STATE_UNINITIALISED);
        assert!(!status.complete);
    }

    #[test]
    fn repeated_begin_just_appends_pending() {
        let tracker = tracker();
        let vm = ApplianceId::new(1);

        tracker.begin(vm, Operation::Start).unwrap();
        tracker.advance(vm, "start").unwrap();
        tracker.begin(vm, Operation::Start).unwrap();

        // Progress is read from the latest touch.
        assert_eq!(tracker.status(vm).unwrap().phase, "pre-start");
    }
}
