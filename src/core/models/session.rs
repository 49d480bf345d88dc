use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::ops::AddAssign;

/// Raw token counters as reported by the assistant runtime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenCounts {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cache_creation_tokens: u64,
    pub cache_read_tokens: u64,
}

impl TokenCounts {
    /// Output tokens are weighted 3x; cache reads are not billable.
    pub const OUTPUT_WEIGHT: u64 = 3;

    /// Billable total, saturating at `u64::MAX`.
    pub fn billable(&self) -> u64 {
        self.checked_billable().unwrap_or(u64::MAX)
    }

    /// Billable total, or `None` if it does not fit in a `u64`.
    pub fn checked_billable(&self) -> Option<u64> {
        self.output_tokens
            .checked_mul(Self::OUTPUT_WEIGHT)?
            .checked_add(self.input_tokens)?
            .checked_add(self.cache_creation_tokens)
    }

    pub fn checked_add(self, rhs: Self) -> Option<Self> {
        Some(Self {
            input_tokens: self.input_tokens.checked_add(rhs.input_tokens)?,
            output_tokens: self.output_tokens.checked_add(rhs.output_tokens)?,
            cache_creation_tokens: self
                .cache_creation_tokens
                .checked_add(rhs.cache_creation_tokens)?,
            cache_read_tokens: self.cache_read_tokens.checked_add(rhs.cache_read_tokens)?,
        })
    }

    /// Share of cache reads among billable plus cache-read tokens, as a percentage.
    pub fn cache_efficiency_pct(&self) -> f64 {
        let denominator = self.billable().saturating_add(self.cache_read_tokens);
        if denominator == 0 {
            return 0.0;
        }
        self.cache_read_tokens as f64 / denominator as f64 * 100.0
    }
}

/// Saturating: window-level rollups never panic on pathological input.
impl AddAssign for TokenCounts {
    fn add_assign(&mut self, rhs: Self) {
        self.input_tokens = self.input_tokens.saturating_add(rhs.input_tokens);
        self.output_tokens = self.output_tokens.saturating_add(rhs.output_tokens);
        self.cache_creation_tokens = self
            .cache_creation_tokens
            .saturating_add(rhs.cache_creation_tokens);
        self.cache_read_tokens = self.cache_read_tokens.saturating_add(rhs.cache_read_tokens);
    }
}

/// Usage for one session file. Built once by the scanner, never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionRecord {
    pub session_id: String,
    pub timestamp: DateTime<Utc>,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub billable_tokens: u64,
    pub cache_creation_tokens: u64,
    pub cache_read_tokens: u64,
    /// Model name -> tokens attributed to it
    pub models: BTreeMap<String, TokenCounts>,
    /// Tool name -> call count
    pub tool_calls: BTreeMap<String, u64>,
    /// Subagent name -> invocation count
    pub agent_invocations: BTreeMap<String, u64>,
    /// Tool name -> usage of the messages that called it
    pub tool_tokens: BTreeMap<String, TokenCounts>,
    /// Subagent name -> usage of the messages that invoked it
    pub agent_tokens: BTreeMap<String, TokenCounts>,
}

impl SessionRecord {
    pub fn from_counts(
        session_id: impl Into<String>,
        timestamp: DateTime<Utc>,
        counts: TokenCounts,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            timestamp,
            input_tokens: counts.input_tokens,
            output_tokens: counts.output_tokens,
            billable_tokens: counts.billable(),
            cache_creation_tokens: counts.cache_creation_tokens,
            cache_read_tokens: counts.cache_read_tokens,
            models: BTreeMap::new(),
            tool_calls: BTreeMap::new(),
            agent_invocations: BTreeMap::new(),
            tool_tokens: BTreeMap::new(),
            agent_tokens: BTreeMap::new(),
        }
    }

    pub fn counts(&self) -> TokenCounts {
        TokenCounts {
            input_tokens: self.input_tokens,
            output_tokens: self.output_tokens,
            cache_creation_tokens: self.cache_creation_tokens,
            cache_read_tokens: self.cache_read_tokens,
        }
    }
}
