// crates/core/src/machine.rs
//! Processing modal state machine.
//!
//! Holds at most one modal for at most one source. Poll responses drive it
//! through [`ProcessingMachine::apply_poll`]; user intents go through
//! [`ProcessingMachine::start_analysis`], [`ProcessingMachine::dismiss`] and
//! [`ProcessingMachine::retry_credit_check`].
//!
//! Transition table (per source, per poll):
//!
//! | mapped status | modal | result |
//! |---|---|---|
//! | terminal or reported progress ≥ 100 | any | modal for source cleared, source forgotten |
//! | analyzing | credit_check(source) | hidden |
//! | building_tree | associated with source | building_tree(source) |
//! | analyzing | building_tree(source) | hidden |
//! | ready_for_analysis | hidden, source not handled | fetch credit check |
//! | anything else | credit_check(source) | ignored |
//!
//! Starting analysis does not close the credit check; the next poll that
//! reports the source as analyzing does.

use std::collections::{HashMap, HashSet};

use context_pack_types::{CreditCheck, SourceDetail};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::MachineError;
use crate::status::{map_status, ProcessState};
use crate::view::{reported_complete, CreditInfo, ProcessStatus};

/// The single modal shown to the user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "codegen", ts(export, export_to = "bindings/"))]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ModalState {
    #[default]
    Hidden,
    CreditCheck { info: CreditInfo },
    BuildingTree { source_id: String },
}

impl ModalState {
    pub fn source_id(&self) -> Option<&str> {
        match self {
            Self::Hidden => None,
            Self::CreditCheck { info } => Some(&info.source_id),
            Self::BuildingTree { source_id } => Some(source_id),
        }
    }

    pub fn is_hidden(&self) -> bool {
        matches!(self, Self::Hidden)
    }

    fn is_credit_check_for(&self, id: &str) -> bool {
        matches!(self, Self::CreditCheck { info } if info.source_id == id)
    }

    fn is_building_tree_for(&self, id: &str) -> bool {
        matches!(self, Self::BuildingTree { source_id } if source_id == id)
    }
}

/// Side effect requested by the machine. The caller performs it and reports
/// back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MachineEffect {
    /// Fetch the credit check, then call `open_credit_check` or
    /// `credit_check_failed`.
    FetchCreditCheck { source_id: String },
}

/// What the user picked in the credit-check modal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalysisChoice {
    Full,
    Partial { max_chunks: u32 },
}

/// Backend call to issue after a successful `start_analysis`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartRequest {
    pub source_id: String,
    pub max_chunks: Option<u32>,
}

#[derive(Debug, Default)]
pub struct ProcessingMachine {
    modal: ModalState,
    /// Sources whose credit prompt already fired. Prevents re-prompting on
    /// every poll while the source sits in `ready_for_analysis`.
    handled: HashSet<String>,
    /// Partial-analysis limits chosen by the user, keyed by source.
    chunk_limits: HashMap<String, u32>,
    /// Credit snapshots, fetched once per source.
    credits: HashMap<String, CreditInfo>,
    /// Source the user is currently working with; building-tree progress is
    /// surfaced for it even after the credit check closed.
    active_source: Option<String>,
    /// Credit check requested but not yet opened.
    pending_credit_check: Option<String>,
}

impl ProcessingMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn modal(&self) -> &ModalState {
        &self.modal
    }

    pub fn active_source(&self) -> Option<&str> {
        self.active_source.as_deref()
    }

    pub fn is_handled(&self, source_id: &str) -> bool {
        self.handled.contains(source_id)
    }

    pub fn chunk_limit(&self, source_id: &str) -> Option<u32> {
        self.chunk_limits.get(source_id).copied()
    }

    pub fn credits(&self, source_id: &str) -> Option<&CreditInfo> {
        self.credits.get(source_id)
    }

    /// View models for a poll response, with credit snapshots attached.
    pub fn statuses(&self, sources: &[SourceDetail]) -> Vec<ProcessStatus> {
        sources
            .iter()
            .map(|s| ProcessStatus::from_source(s, self.credits.get(&s.source_id)))
            .collect()
    }

    /// Reconcile against a full poll response.
    pub fn apply_poll(&mut self, sources: &[SourceDetail]) -> Vec<MachineEffect> {
        let mut effects = Vec::new();

        for source in sources {
            let id = source.source_id.as_str();
            let state = map_status(&source.status);
            if state.is_terminal() || reported_complete(source.progress) {
                self.settle(id, state);
                continue;
            }

            if self.modal.is_credit_check_for(id) {
                match state {
                    ProcessState::Analyzing => {
                        tracing::debug!(source_id = %id, "analysis confirmed, closing credit check");
                        self.modal = ModalState::Hidden;
                    }
                    ProcessState::BuildingTree => self.show_building_tree(id),
                    // Keep the numbers the user is deciding on.
                    _ => {}
                }
                continue;
            }

            match state {
                ProcessState::BuildingTree if self.is_associated(id) => self.show_building_tree(id),
                ProcessState::Analyzing if self.modal.is_building_tree_for(id) => {
                    self.modal = ModalState::Hidden;
                }
                ProcessState::ReadyForAnalysis if self.can_prompt(id) => {
                    tracing::debug!(source_id = %id, "source ready, requesting credit check");
                    effects.push(self.request_credit_check(id));
                }
                _ => {}
            }
        }

        effects
    }

    /// Open the credit-check modal with a freshly fetched snapshot.
    ///
    /// Returns `false` when the snapshot is stale (not the pending source or a
    /// modal is already showing).
    pub fn open_credit_check(&mut self, check: &CreditCheck) -> bool {
        if self.pending_credit_check.as_deref() != Some(check.source_id.as_str())
            || !self.modal.is_hidden()
        {
            tracing::debug!(source_id = %check.source_id, "ignoring stale credit check");
            return false;
        }
        let info = CreditInfo::from_check(check);
        self.pending_credit_check = None;
        self.credits.insert(info.source_id.clone(), info.clone());
        self.modal = ModalState::CreditCheck { info };
        true
    }

    /// The credit fetch failed; make the source eligible again so the next
    /// poll retries.
    pub fn credit_check_failed(&mut self, source_id: &str) {
        if self.pending_credit_check.as_deref() == Some(source_id) {
            self.pending_credit_check = None;
        }
        self.handled.remove(source_id);
    }

    /// Manual re-trigger of the credit check. Only allowed while no modal is
    /// showing.
    pub fn retry_credit_check(&mut self, source_id: &str) -> Option<MachineEffect> {
        if !self.modal.is_hidden() || self.pending_credit_check.is_some() {
            return None;
        }
        self.credits.remove(source_id);
        Some(self.request_credit_check(source_id))
    }

    /// Validate the user's choice and produce the backend call.
    ///
    /// Nothing is recorded until [`commit_start`](Self::commit_start) is
    /// called with the acknowledged request.
    pub fn start_analysis(&self, choice: AnalysisChoice) -> Result<StartRequest, MachineError> {
        let ModalState::CreditCheck { info } = &self.modal else {
            return Err(MachineError::NoCreditCheck);
        };
        let max_chunks = validate_choice(info, choice)?;
        Ok(StartRequest {
            source_id: info.source_id.clone(),
            max_chunks,
        })
    }

    /// Record a start the backend accepted: the chunk limit and the active
    /// source. The modal stays open until a poll confirms the analysis.
    pub fn commit_start(&mut self, request: &StartRequest) {
        match request.max_chunks {
            Some(limit) => {
                self.chunk_limits.insert(request.source_id.clone(), limit);
            }
            None => {
                self.chunk_limits.remove(&request.source_id);
            }
        }
        self.active_source = Some(request.source_id.clone());
    }

    /// Close whatever modal is showing. The source stays handled, so only a
    /// manual retry reopens its credit check.
    pub fn dismiss(&mut self) -> bool {
        if self.modal.is_hidden() {
            return false;
        }
        self.modal = ModalState::Hidden;
        true
    }

    /// Source to cancel: the active one if it is cancelable, otherwise the
    /// first cancelable source in the response.
    pub fn cancel_target(&self, sources: &[SourceDetail]) -> Option<String> {
        let cancelable = |s: &&SourceDetail| map_status(&s.status).is_cancelable();
        self.active_source
            .as_deref()
            .and_then(|id| sources.iter().filter(cancelable).find(|s| s.source_id == id))
            .or_else(|| sources.iter().find(cancelable))
            .map(|s| s.source_id.clone())
    }

    fn can_prompt(&self, id: &str) -> bool {
        self.modal.is_hidden() && self.pending_credit_check.is_none() && !self.handled.contains(id)
    }

    fn is_associated(&self, id: &str) -> bool {
        self.modal.source_id() == Some(id) || self.active_source.as_deref() == Some(id)
    }

    fn request_credit_check(&mut self, id: &str) -> MachineEffect {
        self.handled.insert(id.to_string());
        self.pending_credit_check = Some(id.to_string());
        self.active_source = Some(id.to_string());
        MachineEffect::FetchCreditCheck {
            source_id: id.to_string(),
        }
    }

    fn show_building_tree(&mut self, id: &str) {
        if !self.modal.is_building_tree_for(id) {
            tracing::debug!(source_id = %id, "building tree");
            self.modal = ModalState::BuildingTree {
                source_id: id.to_string(),
            };
        }
    }

    fn settle(&mut self, id: &str, state: ProcessState) {
        if self.modal.source_id() == Some(id) {
            tracing::info!(source_id = %id, %state, "source finished, closing modal");
            self.modal = ModalState::Hidden;
        }
        self.handled.remove(id);
        self.chunk_limits.remove(id);
        self.credits.remove(id);
        if self.active_source.as_deref() == Some(id) {
            self.active_source = None;
        }
        if self.pending_credit_check.as_deref() == Some(id) {
            self.pending_credit_check = None;
        }
    }
}

/// Check a choice against a credit snapshot. Returns the chunk limit to send
/// (`None` for a full run).
pub fn validate_choice(info: &CreditInfo, choice: AnalysisChoice) -> Result<Option<u32>, MachineError> {
    match choice {
        AnalysisChoice::Full => {
            if !info.can_proceed {
                return Err(MachineError::InsufficientCredits {
                    required: info.credits_required,
                    available: info.user_credits,
                });
            }
            Ok(None)
        }
        AnalysisChoice::Partial { max_chunks } => {
            let max = affordable_chunks(info);
            if max_chunks == 0 || max_chunks > max {
                return Err(MachineError::InvalidChunkLimit {
                    requested: max_chunks,
                    max,
                });
            }
            Ok(Some(max_chunks))
        }
    }
}

/// Largest chunk count the balance pays for.
fn affordable_chunks(info: &CreditInfo) -> u32 {
    let budget = if info.has_unlimited {
        u32::MAX
    } else {
        info.user_credits
    };
    if info.total_chunks > 0 {
        budget.min(info.total_chunks)
    } else {
        budget
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn ready(id: &str) -> SourceDetail {
        SourceDetail::new(id, "ready_for_analysis").with_chunks(0, 10)
    }

    fn check(id: &str, required: u32, balance: u32) -> CreditCheck {
        CreditCheck {
            source_id: id.into(),
            total_chunks: 10,
            credits_required: required,
            user_credits: balance,
            has_unlimited: false,
            can_proceed: balance >= required,
            credits_needed: required.saturating_sub(balance),
        }
    }

    fn start(machine: &mut ProcessingMachine, choice: AnalysisChoice) -> StartRequest {
        let request = machine.start_analysis(choice).unwrap();
        machine.commit_start(&request);
        request
    }

    /// Drive a source from ready to an open credit check.
    fn open(machine: &mut ProcessingMachine, id: &str, required: u32, balance: u32) {
        let effects = machine.apply_poll(&[ready(id)]);
        assert_eq!(
            effects,
            vec![MachineEffect::FetchCreditCheck { source_id: id.into() }]
        );
        assert!(machine.open_credit_check(&check(id, required, balance)));
    }

    #[test]
    fn test_ready_source_prompts_once() {
        let mut machine = ProcessingMachine::new();
        open(&mut machine, "s1", 10, 20);
        assert!(matches!(machine.modal(), ModalState::CreditCheck { info } if info.source_id == "s1"));
        assert!(machine.is_handled("s1"));

        // Same response again: nothing new.
        assert!(machine.apply_poll(&[ready("s1")]).is_empty());
    }

    #[test]
    fn test_insufficient_credits_partial_scenario() {
        let mut machine = ProcessingMachine::new();
        open(&mut machine, "s1", 10, 3);
        let ModalState::CreditCheck { info } = machine.modal().clone() else {
            panic!("expected credit check");
        };
        assert!(!info.can_proceed);
        assert_eq!(info.actions()[0].label(), "Process 3 chunks");

        assert_eq!(
            machine.start_analysis(AnalysisChoice::Full),
            Err(MachineError::InsufficientCredits { required: 10, available: 3 })
        );
        assert_eq!(
            machine.start_analysis(AnalysisChoice::Partial { max_chunks: 4 }),
            Err(MachineError::InvalidChunkLimit { requested: 4, max: 3 })
        );
        let req = machine
            .start_analysis(AnalysisChoice::Partial { max_chunks: 3 })
            .unwrap();
        assert_eq!(req, StartRequest { source_id: "s1".into(), max_chunks: Some(3) });
        // Nothing recorded until the backend accepts.
        assert_eq!(machine.chunk_limit("s1"), None);
        assert_eq!(machine.active_source(), None);

        machine.commit_start(&req);
        assert_eq!(machine.chunk_limit("s1"), Some(3));
        assert_eq!(machine.active_source(), Some("s1"));
    }

    #[test]
    fn test_start_waits_for_poll_confirmation() {
        let mut machine = ProcessingMachine::new();
        open(&mut machine, "s1", 5, 10);
        start(&mut machine, AnalysisChoice::Full);
        // Backend hasn't caught up yet: modal stays.
        machine.apply_poll(&[ready("s1")]);
        assert!(matches!(machine.modal(), ModalState::CreditCheck { .. }));

        machine.apply_poll(&[SourceDetail::new("s1", "processing")]);
        assert_eq!(machine.modal(), &ModalState::Hidden);
        assert_eq!(machine.active_source(), Some("s1"));
    }

    #[test]
    fn test_credit_check_numbers_are_not_overwritten() {
        let mut machine = ProcessingMachine::new();
        open(&mut machine, "s1", 10, 3);
        let before = machine.modal().clone();
        machine.apply_poll(&[SourceDetail::new("s1", "ready_for_analysis").with_chunks(0, 99)]);
        assert_eq!(machine.modal(), &before);
    }

    #[test]
    fn test_building_tree_follows_active_source() {
        let mut machine = ProcessingMachine::new();
        open(&mut machine, "s1", 5, 10);
        start(&mut machine, AnalysisChoice::Full);
        machine.apply_poll(&[SourceDetail::new("s1", "analyzing")]);
        machine.apply_poll(&[SourceDetail::new("s1", "building_tree").with_progress(60.0)]);
        assert_eq!(
            machine.modal(),
            &ModalState::BuildingTree { source_id: "s1".into() }
        );
    }

    #[test]
    fn test_all_chunks_analyzed_still_shows_building_tree() {
        let mut machine = ProcessingMachine::new();
        open(&mut machine, "s1", 5, 10);
        start(&mut machine, AnalysisChoice::Full);
        machine.apply_poll(&[SourceDetail::new("s1", "analyzing_chunks").with_chunks(2, 5)]);

        let effects = machine.apply_poll(&[SourceDetail::new("s1", "building_tree").with_chunks(5, 5)]);
        assert!(effects.is_empty());
        assert_eq!(
            machine.modal(),
            &ModalState::BuildingTree { source_id: "s1".into() }
        );
        assert_eq!(machine.active_source(), Some("s1"));
    }

    #[test]
    fn test_building_tree_for_unrelated_source_is_ignored() {
        let mut machine = ProcessingMachine::new();
        machine.apply_poll(&[SourceDetail::new("other", "building_tree")]);
        assert_eq!(machine.modal(), &ModalState::Hidden);
    }

    #[test]
    fn test_full_progress_clears_modal_regardless_of_status() {
        let mut machine = ProcessingMachine::new();
        open(&mut machine, "s1", 5, 10);
        start(&mut machine, AnalysisChoice::Partial { max_chunks: 2 });
        machine.apply_poll(&[SourceDetail::new("s1", "building_tree").with_progress(100.0)]);
        assert_eq!(machine.modal(), &ModalState::Hidden);
        assert!(!machine.is_handled("s1"));
        assert_eq!(machine.chunk_limit("s1"), None);
        assert_eq!(machine.active_source(), None);
    }

    #[test]
    fn test_second_ready_source_waits_for_first_modal() {
        let mut machine = ProcessingMachine::new();
        open(&mut machine, "s1", 5, 10);

        let effects = machine.apply_poll(&[ready("s1"), ready("s2")]);
        assert!(effects.is_empty());
        assert!(!machine.is_handled("s2"));

        machine.dismiss();
        let effects = machine.apply_poll(&[ready("s1"), ready("s2")]);
        assert_eq!(
            effects,
            vec![MachineEffect::FetchCreditCheck { source_id: "s2".into() }]
        );
    }

    #[test]
    fn test_only_one_prompt_per_poll() {
        let mut machine = ProcessingMachine::new();
        let effects = machine.apply_poll(&[ready("s1"), ready("s2")]);
        assert_eq!(effects.len(), 1);
        // The s2 credit check can't open while s1's is pending.
        assert!(!machine.open_credit_check(&check("s2", 1, 1)));
    }

    #[test]
    fn test_cancel_then_cancelled_poll_resets() {
        let mut machine = ProcessingMachine::new();
        open(&mut machine, "s1", 5, 10);
        start(&mut machine, AnalysisChoice::Full);
        let analyzing = [SourceDetail::new("s1", "analyzing")];
        machine.apply_poll(&analyzing);
        assert_eq!(machine.cancel_target(&analyzing), Some("s1".to_string()));

        machine.apply_poll(&[SourceDetail::new("s1", "cancelled")]);
        assert_eq!(machine.modal(), &ModalState::Hidden);
        assert!(!machine.is_handled("s1"));
    }

    #[test]
    fn test_cancel_target_prefers_active_source() {
        let mut machine = ProcessingMachine::new();
        open(&mut machine, "s2", 5, 10);
        start(&mut machine, AnalysisChoice::Full);
        let sources = [
            SourceDetail::new("s1", "extracting"),
            SourceDetail::new("s2", "analyzing"),
        ];
        assert_eq!(machine.cancel_target(&sources), Some("s2".to_string()));
        assert_eq!(
            machine.cancel_target(&[SourceDetail::new("s3", "completed")]),
            None
        );
    }

    #[test]
    fn test_dismiss_requires_manual_retry() {
        let mut machine = ProcessingMachine::new();
        open(&mut machine, "s1", 10, 3);
        assert!(machine.dismiss());
        assert!(!machine.dismiss());
        assert!(machine.apply_poll(&[ready("s1")]).is_empty());

        let effect = machine.retry_credit_check("s1");
        assert_eq!(
            effect,
            Some(MachineEffect::FetchCreditCheck { source_id: "s1".into() })
        );
        assert!(machine.open_credit_check(&check("s1", 10, 12)));
        // Retry refused while a modal is showing.
        assert_eq!(machine.retry_credit_check("s1"), None);
    }

    #[test]
    fn test_failed_credit_fetch_retries_next_poll() {
        let mut machine = ProcessingMachine::new();
        assert_eq!(machine.apply_poll(&[ready("s1")]).len(), 1);
        machine.credit_check_failed("s1");
        assert_eq!(machine.apply_poll(&[ready("s1")]).len(), 1);
    }

    #[test]
    fn test_start_without_modal_is_rejected() {
        let mut machine = ProcessingMachine::new();
        assert_eq!(
            machine.start_analysis(AnalysisChoice::Full),
            Err(MachineError::NoCreditCheck)
        );
    }

    #[test]
    fn test_apply_poll_is_idempotent() {
        let polls: [&[SourceDetail]; 3] = [
            &[SourceDetail::new("s1", "analyzing").with_progress(10.0)],
            &[SourceDetail::new("s1", "building_tree")],
            &[SourceDetail::new("s1", "failed").with_error("boom")],
        ];
        let mut machine = ProcessingMachine::new();
        open(&mut machine, "s1", 1, 1);
        start(&mut machine, AnalysisChoice::Full);
        for poll in polls {
            machine.apply_poll(poll);
            let modal = machine.modal().clone();
            let active = machine.active_source().map(str::to_string);
            assert!(machine.apply_poll(poll).is_empty());
            assert_eq!(machine.modal(), &modal);
            assert_eq!(machine.active_source().map(str::to_string), active);
        }
    }

    #[test]
    fn test_statuses_attach_credit_snapshot() {
        let mut machine = ProcessingMachine::new();
        open(&mut machine, "s1", 10, 3);
        let statuses = machine.statuses(&[ready("s1"), SourceDetail::new("s2", "extracting")]);
        assert_eq!(statuses[0].credits.as_ref().map(|c| c.user_credits), Some(3));
        assert!(statuses[1].credits.is_none());
    }

    #[test]
    fn test_modal_serializes_tagged() {
        let modal = ModalState::BuildingTree { source_id: "s1".into() };
        let json = serde_json::to_string(&modal).unwrap();
        assert_eq!(json, r#"{"kind":"building_tree","source_id":"s1"}"#);
    }
}
