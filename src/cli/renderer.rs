use colored::{control, Colorize};

use crate::core::formatter::{format_cost, format_thousands, format_tokens};
use crate::core::models::comparison::ComparisonOutcome;
use crate::core::report::manager::ReportHandle;

/// Short run summary printed after the report on a terminal.
///
/// ```text
///  Report saved to /home/me/.local/share/usage-monitor/reports/usage-2026-10-19_09-00-00.txt
///   Billable   1.2M  (1,234,567)
///   Sessions   42 (1 skipped)
///   Cost       $12.3456
///   Change     +60.0% vs usage-2026-10-18_09-00-00.txt  SPIKE
/// ```
pub fn render_summary(handle: &ReportHandle, use_color: bool) -> String {
    control::set_override(use_color);

    let mut lines: Vec<String> = Vec::new();
    lines.push(format!(
        " {} {}",
        "Report saved to".bold(),
        handle.report_path.display()
    ));

    let usage = &handle.usage;
    lines.push(format!(
        "  {}  {}  ({})",
        "Billable".cyan(),
        format_tokens(usage.total_billable_tokens),
        format_thousands(usage.total_billable_tokens)
    ));

    let skipped = handle.skipped_files();
    let sessions = if skipped > 0 {
        format!("{} ({} skipped)", usage.sessions, skipped)
            .yellow()
            .to_string()
    } else {
        usage.sessions.to_string()
    };
    lines.push(format!("  {}  {}", "Sessions".cyan(), sessions));
    lines.push(format!(
        "  {}      {}",
        "Cost".cyan(),
        format_cost(usage.estimated_cost())
    ));

    let change = match &handle.comparison {
        ComparisonOutcome::Compared(c) if c.spike => format!(
            "{} vs {}  {}",
            c.change_label().red().bold(),
            c.previous_report,
            "SPIKE".red().bold()
        ),
        ComparisonOutcome::Compared(c) => {
            let label = c.change_label();
            let label = match c.change_pct {
                Some(pct) if pct < 0.0 => label.green(),
                Some(_) => label.normal(),
                None => label.dimmed(),
            };
            format!("{} vs {}", label, c.previous_report)
        }
        ComparisonOutcome::Unavailable { reason } => {
            format!("comparison unavailable ({})", reason).dimmed().to_string()
        }
    };
    lines.push(format!("  {}    {}", "Change".cyan(), change));

    if !handle.pruned.is_empty() {
        lines.push(format!(
            "  {}    {} old file{} removed",
            "Pruned".cyan(),
            handle.pruned.len(),
            if handle.pruned.len() == 1 { "" } else { "s" }
        ));
    }

    lines.join("\n")
}
