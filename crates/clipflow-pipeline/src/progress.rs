//! Pseudo-stage progress estimation.
//!
//! The analysis service does not report fine-grained progress, so elapsed
//! poll attempts are mapped onto the ordered `ProcessingStage` list purely
//! for user feedback. Early stages get a smaller share of the attempt budget
//! because most jobs finish well before the bound.

use clipflow_models::{ProcessingStage, WorkflowEvent};

/// Share of the attempt budget at which each stage begins, in percent.
const STAGE_STARTS: [u32; 6] = [0, 5, 15, 35, 60, 85];

/// Progress shown when processing begins.
const FIRST_PERCENT: u8 = 5;

/// Progress never reaches 100 before the terminal observation.
const LAST_PERCENT: u8 = 95;

/// Maps poll attempts onto stages and a percentage.
///
/// The displayed stage and percentage never move backward.
#[derive(Debug, Clone)]
pub struct StageEstimator {
    max_attempts: u32,
    stage: ProcessingStage,
    percent: u8,
}

impl StageEstimator {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            stage: ProcessingStage::Transcribing,
            percent: FIRST_PERCENT,
        }
    }

    /// Stage currently displayed.
    pub fn stage(&self) -> ProcessingStage {
        self.stage
    }

    pub fn percent(&self) -> u8 {
        self.percent
    }

    /// Event for the start of processing.
    pub fn initial_event(&self) -> WorkflowEvent {
        WorkflowEvent::processing(self.stage, self.percent)
    }

    /// Advance to `attempt` (1-based) and return the event to display.
    pub fn advance(&mut self, attempt: u32) -> WorkflowEvent {
        let share = (attempt.min(self.max_attempts) as u64 * 100 / self.max_attempts as u64) as u32;

        let index = STAGE_STARTS
            .iter()
            .rposition(|start| share >= *start)
            .unwrap_or(0);
        let estimated = ProcessingStage::ALL[index];

        let span = u32::from(LAST_PERCENT - FIRST_PERCENT);
        let percent = FIRST_PERCENT + (share * span / 100) as u8;

        self.stage = self.stage.max(estimated);
        self.percent = self.percent.max(percent).min(LAST_PERCENT);

        WorkflowEvent::processing(self.stage, self.percent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stages_advance_in_order() {
        let mut estimator = StageEstimator::new(60);
        assert_eq!(estimator.stage(), ProcessingStage::Transcribing);

        estimator.advance(3);
        assert_eq!(estimator.stage(), ProcessingStage::Analyzing);

        estimator.advance(30);
        assert_eq!(estimator.stage(), ProcessingStage::Scoring);

        estimator.advance(60);
        assert_eq!(estimator.stage(), ProcessingStage::Finalizing);
        assert_eq!(estimator.percent(), 95);
    }

    #[test]
    fn test_never_regresses() {
        let mut estimator = StageEstimator::new(60);
        let later = estimator.advance(40);
        let earlier = estimator.advance(2);

        assert_eq!(earlier.stage_label, later.stage_label);
        assert_eq!(earlier.progress_percent, later.progress_percent);
    }

    #[test]
    fn test_monotonic_over_full_run() {
        let mut estimator = StageEstimator::new(60);
        let mut last_stage = estimator.stage();
        let mut last_percent = estimator.percent();

        for attempt in 1..=70 {
            estimator.advance(attempt);
            assert!(estimator.stage() >= last_stage);
            assert!(estimator.percent() >= last_percent);
            last_stage = estimator.stage();
            last_percent = estimator.percent();
        }
    }

    #[test]
    fn test_small_budget() {
        let mut estimator = StageEstimator::new(1);
        let event = estimator.advance(1);
        assert_eq!(event.stage_label, ProcessingStage::Finalizing.label());
    }
}
