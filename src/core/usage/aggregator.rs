use chrono::{DateTime, NaiveDate, Utc};
use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::core::error::MonitorError;
use crate::core::models::session::{SessionRecord, TokenCounts};
use crate::core::models::window::{
    AgentUsage, DailyTotals, LookbackWindow, ModelUsage, ToolUsage, UsageWindow,
};
use crate::core::usage::pricing;

/// Aggregate records into a `UsageWindow` of `days` calendar days ending at `now`.
///
/// Fails with `InvalidArgument` when `days <= 0`. Records dated outside the
/// window are ignored.
pub fn aggregate(
    records: &[SessionRecord],
    days: i64,
    now: DateTime<Utc>,
) -> Result<UsageWindow, MonitorError> {
    let window = LookbackWindow::new(days, now)?;
    Ok(aggregate_window(records, window))
}

fn saturating_sum(days: &[DailyTotals], field: impl Fn(&DailyTotals) -> u64) -> u64 {
    days.iter().fold(0u64, |acc, d| acc.saturating_add(field(d)))
}

/// Aggregate records into an already-validated window.
pub fn aggregate_window(records: &[SessionRecord], window: LookbackWindow) -> UsageWindow {
    // Seed every day so zero-activity days still get a row.
    let mut per_day: BTreeMap<NaiveDate, DailyTotals> = window
        .dates()
        .map(|date| {
            (
                date,
                DailyTotals {
                    date,
                    ..Default::default()
                },
            )
        })
        .collect();

    let mut tools: HashMap<String, (u64, TokenCounts)> = HashMap::new();
    let mut agents: HashMap<String, (u64, BTreeSet<String>, TokenCounts)> = HashMap::new();
    let mut model_tokens: BTreeMap<String, TokenCounts> = BTreeMap::new();
    let mut sessions = 0usize;

    for record in records {
        let date = record.timestamp.date_naive();
        if !window.contains(date) {
            continue;
        }
        let day = match per_day.get_mut(&date) {
            Some(day) => day,
            None => continue,
        };

        let counts = record.counts();
        day.sessions += 1;
        day.billable_tokens = day.billable_tokens.saturating_add(record.billable_tokens);
        day.input_tokens = day.input_tokens.saturating_add(counts.input_tokens);
        day.output_tokens = day.output_tokens.saturating_add(counts.output_tokens);
        day.cache_creation_tokens = day
            .cache_creation_tokens
            .saturating_add(counts.cache_creation_tokens);
        day.cache_read_tokens = day.cache_read_tokens.saturating_add(counts.cache_read_tokens);
        sessions += 1;

        for (tool, calls) in &record.tool_calls {
            let entry = tools.entry(tool.clone()).or_default();
            entry.0 = entry.0.saturating_add(*calls);
        }
        for (tool, tokens) in &record.tool_tokens {
            tools.entry(tool.clone()).or_default().1 += *tokens;
        }
        for (agent, invocations) in &record.agent_invocations {
            let entry = agents.entry(agent.clone()).or_default();
            entry.0 = entry.0.saturating_add(*invocations);
            entry.1.insert(record.session_id.clone());
        }
        for (agent, tokens) in &record.agent_tokens {
            agents.entry(agent.clone()).or_default().2 += *tokens;
        }
        for (model, counts) in &record.models {
            *model_tokens.entry(model.clone()).or_default() += *counts;
        }
    }

    let per_day: Vec<DailyTotals> = per_day.into_values().collect();

    let mut tools: Vec<ToolUsage> = tools
        .into_iter()
        .map(|(name, (calls, tokens))| ToolUsage {
            name,
            calls,
            tokens,
        })
        .collect();
    tools.sort_by(|a, b| b.calls.cmp(&a.calls).then_with(|| a.name.cmp(&b.name)));

    let mut agents: Vec<AgentUsage> = agents
        .into_iter()
        .map(|(name, (invocations, session_ids, tokens))| AgentUsage {
            name,
            invocations,
            sessions: session_ids.len(),
            tokens,
        })
        .collect();
    agents.sort_by(|a, b| {
        b.invocations
            .cmp(&a.invocations)
            .then_with(|| a.name.cmp(&b.name))
    });

    let mut models: Vec<ModelUsage> = model_tokens
        .into_iter()
        .map(|(model, counts)| {
            let estimated_cost = pricing::estimate_cost(pricing::rates_for(&model), &counts);
            ModelUsage {
                model,
                input_tokens: counts.input_tokens,
                output_tokens: counts.output_tokens,
                cache_creation_tokens: counts.cache_creation_tokens,
                cache_read_tokens: counts.cache_read_tokens,
                estimated_cost,
            }
        })
        .collect();
    models.sort_by(|a, b| {
        b.estimated_cost
            .partial_cmp(&a.estimated_cost)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.model.cmp(&b.model))
    });

    UsageWindow {
        window,
        total_billable_tokens: saturating_sum(&per_day, |d| d.billable_tokens),
        total_input_tokens: saturating_sum(&per_day, |d| d.input_tokens),
        total_output_tokens: saturating_sum(&per_day, |d| d.output_tokens),
        total_cache_creation_tokens: saturating_sum(&per_day, |d| d.cache_creation_tokens),
        total_cache_read_tokens: saturating_sum(&per_day, |d| d.cache_read_tokens),
        sessions,
        per_day,
        tools,
        agents,
        models,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn at(ts: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(ts).unwrap().with_timezone(&Utc)
    }

    fn record(id: &str, ts: &str, billable: u64) -> SessionRecord {
        let mut r = SessionRecord::from_counts(id, at(ts), TokenCounts::default());
        r.billable_tokens = billable;
        r
    }

    const NOW: &str = "2026-05-20T18:00:00Z";

    #[test]
    fn empty_input_has_one_zero_row_per_day() {
        let window = aggregate(&[], 7, at(NOW)).unwrap();
        assert_eq!(window.per_day.len(), 7);
        assert!(window.per_day.iter().all(|d| d.billable_tokens == 0 && d.sessions == 0));
        assert_eq!(window.total_billable_tokens, 0);
        assert_eq!(window.per_day[0].date.to_string(), "2026-05-14");
        assert_eq!(window.per_day[6].date.to_string(), "2026-05-20");
    }

    #[test]
    fn ten_sessions_over_three_days() {
        let mut records = Vec::new();
        // day A: 4 sessions totalling 100
        for (i, b) in [25, 25, 25, 25].iter().enumerate() {
            records.push(record(&format!("a{i}"), "2026-05-15T09:00:00Z", *b));
        }
        // day B: 3 sessions totalling 200
        for (i, b) in [100, 50, 50].iter().enumerate() {
            records.push(record(&format!("b{i}"), "2026-05-17T23:59:59Z", *b));
        }
        // day C: 3 sessions totalling 50
        for (i, b) in [10, 20, 20].iter().enumerate() {
            records.push(record(&format!("c{i}"), "2026-05-20T00:00:00Z", *b));
        }

        let window = aggregate(&records, 7, at(NOW)).unwrap();
        assert_eq!(window.total_billable_tokens, 350);
        assert_eq!(window.sessions, 10);
        assert_eq!(window.per_day.len(), 7);
        let non_zero: Vec<u64> = window
            .per_day
            .iter()
            .filter(|d| d.billable_tokens > 0)
            .map(|d| d.billable_tokens)
            .collect();
        assert_eq!(non_zero, vec![100, 200, 50]);
        assert_eq!(window.per_day.iter().filter(|d| d.billable_tokens == 0).count(), 4);
    }

    #[test]
    fn per_day_is_chronological_and_sums_to_total() {
        let records = vec![
            record("x", "2026-05-19T10:00:00Z", 7),
            record("y", "2026-05-14T10:00:00Z", 11),
            record("z", "2026-05-19T11:00:00Z", 13),
        ];
        let window = aggregate(&records, 7, at(NOW)).unwrap();
        let dates: Vec<NaiveDate> = window.per_day.iter().map(|d| d.date).collect();
        let mut sorted = dates.clone();
        sorted.sort();
        assert_eq!(dates, sorted);
        let sum: u64 = window.per_day.iter().map(|d| d.billable_tokens).sum();
        assert_eq!(window.total_billable_tokens, sum);
        assert_eq!(sum, 31);
    }

    #[test]
    fn records_outside_window_are_ignored() {
        let records = vec![
            record("old", "2026-05-13T23:59:59Z", 1_000),
            record("future", "2026-05-21T00:00:00Z", 1_000),
            record("in", "2026-05-14T00:00:00Z", 5),
        ];
        let window = aggregate(&records, 7, at(NOW)).unwrap();
        assert_eq!(window.total_billable_tokens, 5);
        assert_eq!(window.sessions, 1);
    }

    #[test]
    fn billable_is_taken_from_record_not_recomputed() {
        let mut r = SessionRecord::from_counts(
            "s",
            at("2026-05-20T01:00:00Z"),
            TokenCounts {
                input_tokens: 10,
                output_tokens: 10,
                ..Default::default()
            },
        );
        r.billable_tokens = 3;
        let window = aggregate(&[r], 1, at(NOW)).unwrap();
        assert_eq!(window.total_billable_tokens, 3);
        assert_eq!(window.total_input_tokens, 10);
    }

    #[test]
    fn invalid_days_rejected() {
        assert!(matches!(
            aggregate(&[], 0, at(NOW)),
            Err(MonitorError::InvalidArgument(_))
        ));
        assert!(matches!(
            aggregate(&[], -1, at(NOW)),
            Err(MonitorError::InvalidArgument(_))
        ));
    }

    #[test]
    fn window_length_matches_days_for_many_sizes() {
        for days in [1, 2, 7, 30, 31, 365] {
            let window = aggregate(&[], days, at(NOW)).unwrap();
            assert_eq!(window.per_day.len(), days as usize);
            assert_eq!(window.days() as i64, days);
        }
    }

    #[test]
    fn tools_agents_and_models_are_rolled_up() {
        let mut a = record("s1", "2026-05-20T01:00:00Z", 0);
        a.tool_calls.insert("Read".into(), 3);
        a.tool_calls.insert("Task".into(), 1);
        a.agent_invocations.insert("reviewer".into(), 1);
        a.models.insert(
            "claude-sonnet-4-5".into(),
            TokenCounts {
                input_tokens: 1_000_000,
                ..Default::default()
            },
        );
        let mut b = record("s2", "2026-05-19T01:00:00Z", 0);
        b.tool_calls.insert("Read".into(), 2);
        b.tool_calls.insert("Bash".into(), 5);
        b.agent_invocations.insert("reviewer".into(), 2);

        let window = aggregate(&[a, b], 7, at(NOW)).unwrap();
        let tools: Vec<(&str, u64)> = window
            .tools
            .iter()
            .map(|t| (t.name.as_str(), t.calls))
            .collect();
        assert_eq!(tools, vec![("Bash", 5), ("Read", 5), ("Task", 1)]);
        assert_eq!(
            window.agents,
            vec![AgentUsage {
                name: "reviewer".into(),
                invocations: 3,
                sessions: 2,
                tokens: TokenCounts::default(),
            }]
        );
        assert_eq!(window.models.len(), 1);
        assert!((window.estimated_cost() - 3.0).abs() < 1e-9);
    }

    #[test]
    fn tool_and_agent_tokens_roll_up_across_sessions() {
        let tokens = TokenCounts {
            input_tokens: 100,
            output_tokens: 10,
            ..Default::default()
        };
        let mut a = record("s1", "2026-05-20T01:00:00Z", 130);
        a.tool_calls.insert("Task".into(), 1);
        a.tool_tokens.insert("Task".into(), tokens);
        a.agent_invocations.insert("reviewer".into(), 1);
        a.agent_tokens.insert("reviewer".into(), tokens);
        let mut b = a.clone();
        b.session_id = "s2".into();

        let window = aggregate(&[a, b], 7, at(NOW)).unwrap();
        assert_eq!(window.tools[0].tokens.input_tokens, 200);
        assert_eq!(window.agents[0].tokens.billable(), 260);
        assert_eq!(window.agents[0].avg_billable_per_invocation(), 130);
        assert_eq!(window.token_consumers()[0].billable_tokens, 260);
    }

    #[test]
    fn huge_totals_saturate_instead_of_panicking() {
        let records = vec![
            record("a", "2026-05-19T01:00:00Z", u64::MAX - 1),
            record("b", "2026-05-20T01:00:00Z", u64::MAX - 1),
        ];
        let window = aggregate(&records, 7, at(NOW)).unwrap();
        assert_eq!(window.total_billable_tokens, u64::MAX);
        assert!(window.cache_efficiency_pct() >= 0.0);
    }

    #[test]
    fn cache_efficiency_guards_zero() {
        let window = aggregate(&[], 3, at(NOW)).unwrap();
        assert_eq!(window.cache_efficiency_pct(), 0.0);
    }
}
