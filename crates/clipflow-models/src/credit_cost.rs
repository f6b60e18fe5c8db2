//! Credit cost estimation for analysis jobs.
//!
//! The estimate is used as a pre-flight gate before a job is submitted. The
//! actual charge happens after completion and is sized by the number of
//! clips the job produced.
//!
//! # Example
//!
//! ```ignore
//! use clipflow_models::AnalysisCostEstimator;
//!
//! let cost = AnalysisCostEstimator::new(Some(125.0))
//!     .with_credits_per_minute(2)
//!     .calculate();
//!
//! assert_eq!(cost.units, 6); // 3 started minutes * 2
//! ```

use std::collections::HashMap;

/// Default credits charged per started minute of source media.
pub const DEFAULT_CREDITS_PER_MINUTE: u32 = 1;

/// Default floor for any estimate.
pub const DEFAULT_MIN_JOB_CREDITS: u32 = 1;

/// Estimated credit cost of analysing an asset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CostEstimate {
    /// Started minutes of source media (0 if the duration is unknown)
    pub billable_minutes: u32,
    /// Credits per started minute
    pub credits_per_minute: u32,
    /// Estimated total
    pub units: u32,
}

impl CostEstimate {
    /// Generate a human-readable description.
    pub fn to_description(&self) -> String {
        if self.billable_minutes == 0 {
            return format!("Minimum charge ({} credits)", self.units);
        }
        let minute_text = if self.billable_minutes == 1 { "minute" } else { "minutes" };
        format!(
            "{} {} of media at {} credits/minute",
            self.billable_minutes, minute_text, self.credits_per_minute
        )
    }

    /// Convert to metadata for ledger recording.
    pub fn to_metadata(&self) -> HashMap<String, String> {
        let mut metadata = HashMap::new();
        metadata.insert("billable_minutes".to_string(), self.billable_minutes.to_string());
        metadata.insert("credits_per_minute".to_string(), self.credits_per_minute.to_string());
        metadata.insert("estimated_credits".to_string(), self.units.to_string());
        metadata
    }
}

/// Builder for estimating analysis cost from media duration.
#[derive(Debug, Clone)]
pub struct AnalysisCostEstimator {
    duration_secs: Option<f64>,
    credits_per_minute: u32,
    min_credits: u32,
}

impl AnalysisCostEstimator {
    /// Create an estimator for a recording of the given duration.
    pub fn new(duration_secs: Option<f64>) -> Self {
        Self {
            duration_secs,
            credits_per_minute: DEFAULT_CREDITS_PER_MINUTE,
            min_credits: DEFAULT_MIN_JOB_CREDITS,
        }
    }

    pub fn with_credits_per_minute(mut self, credits: u32) -> Self {
        self.credits_per_minute = credits;
        self
    }

    pub fn with_min_credits(mut self, credits: u32) -> Self {
        self.min_credits = credits;
        self
    }

    /// Calculate the estimate.
    pub fn calculate(&self) -> CostEstimate {
        let billable_minutes = match self.duration_secs {
            Some(secs) if secs.is_finite() && secs > 0.0 => (secs / 60.0).ceil() as u32,
            _ => 0,
        };

        let units = billable_minutes
            .saturating_mul(self.credits_per_minute)
            .max(self.min_credits);

        CostEstimate {
            billable_minutes,
            credits_per_minute: self.credits_per_minute,
            units,
        }
    }
}
