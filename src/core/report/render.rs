use chrono::{DateTime, Utc};
use std::fmt::Write;
use std::path::Path;

use crate::core::formatter::{format_cost, format_thousands};
use crate::core::models::session::TokenCounts;
use crate::core::models::window::UsageWindow;
use crate::core::report::compare::TOTAL_LINE_LABEL;

const RULE_WIDTH: usize = 80;
const TOP_TOOLS: usize = 10;
const TOP_SUMMARY_TOOLS: usize = 5;
const TOP_CONSUMERS: usize = 10;

/// Inputs to the persisted text report beyond the aggregate itself.
#[derive(Debug, Clone, Copy)]
pub struct RenderContext<'a> {
    pub generated_at: DateTime<Utc>,
    pub sessions_dir: &'a Path,
    pub files_seen: usize,
    pub skipped_files: usize,
}

fn per_invocation(total: u64, invocations: u64) -> u64 {
    match invocations {
        0 => 0,
        n => total / n,
    }
}

fn banner(out: &mut String, title: &str) {
    let rule = "=".repeat(RULE_WIDTH);
    let _ = writeln!(out, "{}", rule);
    let _ = writeln!(out, "{}", title);
    let _ = writeln!(out, "{}", rule);
}

fn section(out: &mut String, title: &str) {
    let _ = writeln!(out);
    let _ = writeln!(out, "{}:", title);
    let _ = writeln!(out, "{}", "-".repeat(RULE_WIDTH));
}

/// Render the human-readable report.
///
/// ```text
/// ================================================================================
/// Usage Report (Last 7 Days)
/// ================================================================================
/// Generated: 2026-10-19 09:00:00 UTC
/// Window:    2026-10-13 to 2026-10-19 (7 days)
/// ...
/// TOTALS:
///   Total billable tokens: 1,234,567
/// ```
///
/// The `Total billable tokens:` line is read back by later runs and must keep its shape.
pub fn render_report(usage: &UsageWindow, ctx: &RenderContext<'_>) -> String {
    let mut out = String::new();

    banner(
        &mut out,
        &format!(
            "Usage Report (Last {} Day{})",
            usage.days(),
            if usage.days() == 1 { "" } else { "s" }
        ),
    );
    let _ = writeln!(
        out,
        "Generated: {}",
        ctx.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
    );
    let _ = writeln!(out, "Window:    {}", usage.window.describe());
    let _ = writeln!(out, "Sessions directory: {}", ctx.sessions_dir.display());
    let _ = writeln!(
        out,
        "Sessions analyzed: {} (from {} file{})",
        usage.sessions,
        ctx.files_seen,
        if ctx.files_seen == 1 { "" } else { "s" }
    );
    if ctx.skipped_files > 0 {
        let _ = writeln!(
            out,
            "Note: {} file{} skipped due to parse errors",
            ctx.skipped_files,
            if ctx.skipped_files == 1 { "" } else { "s" }
        );
    }

    section(&mut out, "TOTALS");
    let _ = writeln!(
        out,
        "  {} {}",
        TOTAL_LINE_LABEL,
        format_thousands(usage.total_billable_tokens)
    );
    let _ = writeln!(
        out,
        "  Total input tokens: {}",
        format_thousands(usage.total_input_tokens)
    );
    let _ = writeln!(
        out,
        "  Total output tokens: {}",
        format_thousands(usage.total_output_tokens)
    );
    let _ = writeln!(
        out,
        "  Cache creation tokens: {}",
        format_thousands(usage.total_cache_creation_tokens)
    );
    let _ = writeln!(
        out,
        "  Cache read tokens: {}",
        format_thousands(usage.total_cache_read_tokens)
    );
    let _ = writeln!(
        out,
        "  Cache efficiency: {:.1}%",
        usage.cache_efficiency_pct()
    );
    let sessions = usage.sessions.max(1) as u64;
    let _ = writeln!(
        out,
        "  Average billable tokens per session: {}",
        format_thousands(usage.total_billable_tokens / sessions)
    );

    section(&mut out, "DAILY BREAKDOWN");
    let _ = writeln!(
        out,
        "  {:<12} {:>9} {:>16} {:>14} {:>14}",
        "Date", "Sessions", "Billable", "Input", "Output"
    );
    for day in &usage.per_day {
        let _ = writeln!(
            out,
            "  {:<12} {:>9} {:>16} {:>14} {:>14}",
            day.date.to_string(),
            day.sessions,
            format_thousands(day.billable_tokens),
            format_thousands(day.input_tokens),
            format_thousands(day.output_tokens)
        );
    }

    section(&mut out, &format!("TOOL USAGE (Top {})", TOP_TOOLS));
    if usage.tools.is_empty() {
        let _ = writeln!(out, "  No tool calls recorded");
    }
    for tool in usage.tools.iter().take(TOP_TOOLS) {
        let _ = writeln!(
            out,
            "  {:<30} {:>10} calls {:>16} billable",
            tool.name,
            format_thousands(tool.calls),
            format_thousands(tool.tokens.billable())
        );
    }

    section(&mut out, "AGENT USAGE");
    if usage.agents.is_empty() {
        let _ = writeln!(out, "  No agent invocations recorded");
    }
    for agent in &usage.agents {
        let _ = writeln!(out, "  {}:", agent.name);
        let _ = writeln!(out, "    Invocations: {}", agent.invocations);
        let _ = writeln!(out, "    Sessions: {}", agent.sessions);
        let _ = writeln!(
            out,
            "    Avg billable tokens per invocation: {}",
            format_thousands(agent.avg_billable_per_invocation())
        );
        let _ = writeln!(
            out,
            "    Avg input / output tokens: {} / {}",
            format_thousands(per_invocation(agent.tokens.input_tokens, agent.invocations)),
            format_thousands(per_invocation(agent.tokens.output_tokens, agent.invocations))
        );
    }

    section(&mut out, "SUMMARY");
    let total_calls = usage.total_tool_calls();
    let _ = writeln!(out, "  Total tool calls: {}", format_thousands(total_calls));
    let _ = writeln!(out, "  Unique tools used: {}", usage.tools.len());
    let _ = writeln!(
        out,
        "  Total agent invocations: {}",
        format_thousands(usage.total_agent_invocations())
    );
    let _ = writeln!(out, "  Unique agents used: {}", usage.agents.len());
    if !usage.tools.is_empty() {
        let _ = writeln!(out, "  Top {} tools by frequency:", TOP_SUMMARY_TOOLS);
    }
    for tool in usage.tools.iter().take(TOP_SUMMARY_TOOLS) {
        let share = if total_calls == 0 {
            0.0
        } else {
            tool.calls as f64 / total_calls as f64 * 100.0
        };
        let _ = writeln!(
            out,
            "    {}: {} calls ({:.1}%)",
            tool.name,
            format_thousands(tool.calls),
            share
        );
    }

    section(&mut out, "TOKEN CONSUMPTION ANALYSIS");
    let consumers = usage.token_consumers();
    if consumers.is_empty() {
        let _ = writeln!(out, "  No agent or tool token usage recorded");
    } else {
        let _ = writeln!(
            out,
            "  Top {} token consumers (by billable tokens):",
            TOP_CONSUMERS
        );
    }
    for (rank, consumer) in consumers.iter().take(TOP_CONSUMERS).enumerate() {
        let _ = writeln!(out, "  {}. {}: {}", rank + 1, consumer.kind, consumer.name);
        let _ = writeln!(
            out,
            "     Billable tokens: {}",
            format_thousands(consumer.billable_tokens)
        );
        let _ = writeln!(
            out,
            "     Cache read tokens: {}",
            format_thousands(consumer.cache_read_tokens)
        );
        let _ = writeln!(
            out,
            "     Cache efficiency: {:.1}%",
            consumer.cache_efficiency_pct
        );
        let _ = writeln!(out, "     Calls: {}", format_thousands(consumer.calls));
    }

    section(&mut out, "MODELS & ESTIMATED COST");
    if usage.models.is_empty() {
        let _ = writeln!(out, "  No model usage recorded");
    }
    for model in &usage.models {
        let counts = TokenCounts {
            input_tokens: model.input_tokens,
            output_tokens: model.output_tokens,
            cache_creation_tokens: model.cache_creation_tokens,
            cache_read_tokens: model.cache_read_tokens,
        };
        let _ = writeln!(
            out,
            "  {:<30} {:>16} billable  {:>12}",
            model.model,
            format_thousands(counts.billable()),
            format_cost(model.estimated_cost)
        );
    }
    if !usage.models.is_empty() {
        let _ = writeln!(
            out,
            "  {:<30} {:>16}           {:>12}",
            "Total",
            "",
            format_cost(usage.estimated_cost())
        );
    }

    let _ = writeln!(out);
    let _ = writeln!(out, "{}", "=".repeat(RULE_WIDTH));
    let _ = writeln!(
        out,
        "Billable tokens = input + {} x output + cache creation. Costs are estimates.",
        TokenCounts::OUTPUT_WEIGHT
    );
    out
}
