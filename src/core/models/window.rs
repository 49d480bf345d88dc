use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::core::error::MonitorError;
use crate::core::models::session::TokenCounts;

/// Upper bound on the lookback window, in days.
pub const MAX_DAYS: i64 = 3650;

/// The calendar range covered by a report: `days` UTC dates ending today.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LookbackWindow {
    pub days: u32,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

impl LookbackWindow {
    pub fn new(days: i64, now: DateTime<Utc>) -> Result<Self, MonitorError> {
        if days <= 0 {
            return Err(MonitorError::InvalidArgument(format!(
                "days must be a positive integer, got {}",
                days
            )));
        }
        if days > MAX_DAYS {
            return Err(MonitorError::InvalidArgument(format!(
                "days must be at most {}, got {}",
                MAX_DAYS, days
            )));
        }
        let end_date = now.date_naive();
        let start_date = end_date - Duration::days(days - 1);
        Ok(Self {
            days: days as u32,
            start_date,
            end_date,
        })
    }

    /// Parse a raw CLI value. Non-numeric input is an invalid argument, not a usage error.
    pub fn parse_days(raw: &str) -> Result<i64, MonitorError> {
        raw.trim().parse::<i64>().map_err(|_| {
            MonitorError::InvalidArgument(format!("days must be a positive integer, got '{}'", raw))
        })
    }

    /// First instant inside the window (start date at midnight UTC).
    pub fn cutoff(&self) -> DateTime<Utc> {
        Utc.from_utc_datetime(&self.start_date.and_time(chrono::NaiveTime::MIN))
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start_date && date <= self.end_date
    }

    /// Every date in the window, oldest first.
    pub fn dates(&self) -> impl Iterator<Item = NaiveDate> {
        let start = self.start_date;
        (0..self.days as i64).map(move |offset| start + Duration::days(offset))
    }

    pub fn describe(&self) -> String {
        format!(
            "{} to {} ({} day{})",
            self.start_date,
            self.end_date,
            self.days,
            if self.days == 1 { "" } else { "s" }
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DailyTotals {
    pub date: NaiveDate,
    pub sessions: usize,
    pub billable_tokens: u64,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cache_creation_tokens: u64,
    pub cache_read_tokens: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolUsage {
    pub name: String,
    pub calls: u64,
    /// Usage of the messages that called this tool.
    pub tokens: TokenCounts,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AgentUsage {
    pub name: String,
    pub invocations: u64,
    pub sessions: usize,
    /// Usage of the messages that invoked this agent.
    pub tokens: TokenCounts,
}

impl AgentUsage {
    /// Average billable tokens per invocation, rounded down.
    pub fn avg_billable_per_invocation(&self) -> u64 {
        match self.invocations {
            0 => 0,
            n => self.tokens.billable() / n,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsumerKind {
    Agent,
    Tool,
}

impl std::fmt::Display for ConsumerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Agent => write!(f, "Agent"),
            Self::Tool => write!(f, "Tool"),
        }
    }
}

/// An agent or tool ranked by the billable tokens attributed to it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TokenConsumer {
    pub kind: ConsumerKind,
    pub name: String,
    pub billable_tokens: u64,
    pub cache_read_tokens: u64,
    pub cache_efficiency_pct: f64,
    pub calls: u64,
}

impl TokenConsumer {
    fn new(kind: ConsumerKind, name: &str, tokens: &TokenCounts, calls: u64) -> Self {
        Self {
            kind,
            name: name.to_string(),
            billable_tokens: tokens.billable(),
            cache_read_tokens: tokens.cache_read_tokens,
            cache_efficiency_pct: tokens.cache_efficiency_pct(),
            calls,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ModelUsage {
    pub model: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cache_creation_tokens: u64,
    pub cache_read_tokens: u64,
    pub estimated_cost: f64,
}

/// Aggregated usage over a lookback window.
///
/// `per_day` always has exactly `window.days` entries, oldest first, and
/// `total_billable_tokens` equals the sum of the per-day billable totals.
#[derive(Debug, Clone, Serialize)]
pub struct UsageWindow {
    #[serde(flatten)]
    pub window: LookbackWindow,
    pub total_billable_tokens: u64,
    pub total_input_tokens: u64,
    pub total_output_tokens: u64,
    pub total_cache_creation_tokens: u64,
    pub total_cache_read_tokens: u64,
    pub sessions: usize,
    pub per_day: Vec<DailyTotals>,
    pub tools: Vec<ToolUsage>,
    pub agents: Vec<AgentUsage>,
    pub models: Vec<ModelUsage>,
}

impl UsageWindow {
    pub fn days(&self) -> u32 {
        self.window.days
    }

    pub fn start_date(&self) -> NaiveDate {
        self.window.start_date
    }

    pub fn end_date(&self) -> NaiveDate {
        self.window.end_date
    }

    pub fn estimated_cost(&self) -> f64 {
        self.models.iter().map(|m| m.estimated_cost).sum()
    }

    /// Share of cache reads among all tokens seen, as a percentage.
    pub fn cache_efficiency_pct(&self) -> f64 {
        let denominator = self
            .total_billable_tokens
            .saturating_add(self.total_cache_read_tokens);
        if denominator == 0 {
            return 0.0;
        }
        self.total_cache_read_tokens as f64 / denominator as f64 * 100.0
    }

    pub fn total_tool_calls(&self) -> u64 {
        self.tools.iter().fold(0, |acc, t| acc.saturating_add(t.calls))
    }

    pub fn total_agent_invocations(&self) -> u64 {
        self.agents
            .iter()
            .fold(0, |acc, a| acc.saturating_add(a.invocations))
    }

    /// Agents and tools together, heaviest billable consumer first.
    pub fn token_consumers(&self) -> Vec<TokenConsumer> {
        let mut consumers: Vec<TokenConsumer> = self
            .agents
            .iter()
            .map(|a| TokenConsumer::new(ConsumerKind::Agent, &a.name, &a.tokens, a.invocations))
            .chain(
                self.tools
                    .iter()
                    .map(|t| TokenConsumer::new(ConsumerKind::Tool, &t.name, &t.tokens, t.calls)),
            )
            .collect();
        consumers.sort_by(|a, b| {
            b.billable_tokens
                .cmp(&a.billable_tokens)
                .then_with(|| a.kind.cmp(&b.kind))
                .then_with(|| a.name.cmp(&b.name))
        });
        consumers
    }
}
