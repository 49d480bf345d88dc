use serde::Serialize;

/// Change in billable tokens against the previous report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComparisonResult {
    pub previous_report: String,
    pub previous_total: u64,
    pub current_total: u64,
    /// `None` when the previous total was zero.
    pub change_pct: Option<f64>,
    pub spike: bool,
    pub threshold_pct: f64,
}

impl ComparisonResult {
    pub fn compute(
        previous_report: impl Into<String>,
        previous_total: u64,
        current_total: u64,
        threshold_pct: f64,
    ) -> Self {
        let change_pct = if previous_total == 0 {
            None
        } else {
            Some((current_total as f64 - previous_total as f64) / previous_total as f64 * 100.0)
        };
        let spike = change_pct.map(|pct| pct > threshold_pct).unwrap_or(false);
        Self {
            previous_report: previous_report.into(),
            previous_total,
            current_total,
            change_pct,
            spike,
            threshold_pct,
        }
    }

    /// "+60.0%", "-12.5%", or "not applicable".
    pub fn change_label(&self) -> String {
        match self.change_pct {
            Some(pct) => crate::core::formatter::format_signed_percent(pct),
            None => "not applicable".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ComparisonOutcome {
    Compared(ComparisonResult),
    Unavailable { reason: String },
}

impl ComparisonOutcome {
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::Unavailable {
            reason: reason.into(),
        }
    }

    pub fn is_spike(&self) -> bool {
        matches!(self, Self::Compared(c) if c.spike)
    }
}
