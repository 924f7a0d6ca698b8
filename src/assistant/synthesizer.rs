//! Response Synthesizer
//!
//! Turns a classified intent and its action result into the user-facing
//! message. Each intent owns one template family with three branches:
//! success, failure, and not-applicable (permission denied, clarification).
//!
//! This is the only place tone and formatting are decided. The raw store
//! error in `ActionResult::error` is never echoed; failures quote the
//! result's user-safe `message` instead.

use std::fmt::Write;

use super::store::Report;
use super::types::{
    Action, ActionData, ActionResult, AggregateBreakdown, CreatedEntity, Intent, ParsedIntent,
    ReportStats, SearchResults,
};

/// Reports listed inline before the rest are summarised
const LIST_PREVIEW: usize = 5;

const USAGE_EXAMPLES: [&str; 4] = [
    "create report \"Broken streetlight on Pine St\"",
    "urgent reports",
    "mark report 12 as resolved",
    "reports near Elm Street",
];

#[derive(Debug, Default, Clone, Copy)]
pub struct ResponseSynthesizer;

impl ResponseSynthesizer {
    pub fn new() -> Self {
        Self
    }

    pub fn synthesize(&self, parsed: &ParsedIntent, result: Option<&ActionResult>) -> String {
        match parsed.action {
            Action::PermissionDenied => return self.permission_denied(parsed, result),
            Action::Clarify => return self.clarify(&parsed.raw_match),
            _ => {}
        }

        match parsed.intent {
            Intent::Greeting => GREETING.to_string(),
            Intent::Help => help_text(),
            Intent::GeneralFallback | Intent::Unmatched => self.clarify(&parsed.raw_match),
            intent => match result {
                Some(r) if r.success() => self.success(intent, r),
                Some(r) => self.failure(intent, r),
                None => self.clarify(&parsed.raw_match),
            },
        }
    }

    fn success(&self, intent: Intent, result: &ActionResult) -> String {
        match (intent, result.data()) {
            (Intent::CreateReport, Some(ActionData::Created(CreatedEntity::Report(report)))) => {
                format!(
                    "✅ {}. It's filed under {} with {} priority and status {}.\n\nWould you like to assign it to someone?",
                    result.message(),
                    report.category,
                    report.priority.as_str(),
                    humanize(&report.state)
                )
            }
            (Intent::CreateCategory, Some(ActionData::Created(CreatedEntity::Category(category)))) => {
                format!(
                    "✅ Category \"{}\" is ready.\n\nDo you want to file a report under it?",
                    category.name
                )
            }
            (Intent::CriticalSearch, Some(ActionData::SearchResults(results))) => {
                if results.reports.is_empty() {
                    "Good news: there are no critical open reports right now.".to_string()
                } else {
                    format!(
                        "🚨 Found {} critical open report(s):\n{}\n\nWould you like to assign one of them?",
                        results.count(),
                        list_reports(results)
                    )
                }
            }
            (Intent::SearchReports, Some(ActionData::SearchResults(results))) => {
                if results.reports.is_empty() {
                    "I didn't find any matching reports. Try a different keyword?".to_string()
                } else {
                    format!(
                        "Found {} report(s):\n{}\n\nWant me to narrow this down?",
                        results.count(),
                        list_reports(results)
                    )
                }
            }
            (Intent::LocationSearch, Some(ActionData::SearchResults(results))) => {
                if results.reports.is_empty() {
                    format!("{}. Nothing reported there yet.", result.message())
                } else {
                    format!(
                        "📍 {}:\n{}\n\nShould I show only the urgent ones?",
                        result.message(),
                        list_reports(results)
                    )
                }
            }
            (Intent::UpdateStatus, Some(ActionData::UpdatedReport(report))) => {
                format!(
                    "✅ Report #{} \"{}\" is now {}.\n\nAnything else to update?",
                    report.id,
                    report.title,
                    humanize(&report.state)
                )
            }
            (Intent::AssignReport, Some(ActionData::UpdatedReport(_))) => {
                format!("✅ {}.\n\nShould I notify them about other open reports?", result.message())
            }
            (Intent::Stats, Some(ActionData::Stats(stats))) => stats_text(stats),
            (Intent::StatsBreakdown, Some(ActionData::AggregateBreakdown(breakdown))) => {
                breakdown_text(breakdown)
            }
            // Data shape the template does not know; fall back to the result message
            _ => format!("✅ {}.", result.message()),
        }
    }

    fn failure(&self, intent: Intent, result: &ActionResult) -> String {
        format!(
            "Sorry, I couldn't {}: {}. Please check the details and try again, or rephrase your request.",
            task_phrase(intent),
            result.message()
        )
    }

    fn permission_denied(&self, parsed: &ParsedIntent, result: Option<&ActionResult>) -> String {
        let detail = result
            .map(|r| format!(" {}", r.message()))
            .unwrap_or_default();
        format!(
            "Sorry, you don't have permission to {}.{} Please ask an administrator if you need access.",
            task_phrase(parsed.intent),
            detail
        )
    }

    fn clarify(&self, original: &str) -> String {
        let mut text = if original.trim().is_empty() {
            "I didn't catch that. Here are some things you can ask me:\n".to_string()
        } else {
            format!(
                "I'm not sure how to help with \"{}\". Here are some things you can ask me:\n",
                original.trim()
            )
        };
        for example in USAGE_EXAMPLES {
            let _ = writeln!(text, "• {}", example);
        }
        text.push_str("\nCould you rephrase your request?");
        text
    }
}

const GREETING: &str = "Hello! 👋 I'm the operations assistant. I can file and search reports, update their status, assign them to staff, and show statistics.\n\nWhat would you like to do?";

fn help_text() -> String {
    let mut text = String::from("Here's what I can do:\n");
    for example in USAGE_EXAMPLES {
        let _ = writeln!(text, "• {}", example);
    }
    text.push_str("• show stats\n• reports by category");
    text
}

fn task_phrase(intent: Intent) -> &'static str {
    match intent {
        Intent::CreateReport => "create that report",
        Intent::CreateCategory => "create that category",
        Intent::CriticalSearch => "look up critical reports",
        Intent::SearchReports => "search reports",
        Intent::LocationSearch => "search reports in that area",
        Intent::UpdateStatus => "update that report",
        Intent::AssignReport => "assign that report",
        Intent::Stats => "load the statistics",
        Intent::StatsBreakdown => "build that breakdown",
        Intent::Greeting | Intent::Help | Intent::GeneralFallback | Intent::Unmatched => {
            "do that"
        }
    }
}

fn list_reports(results: &SearchResults) -> String {
    let mut lines: Vec<String> = results
        .reports
        .iter()
        .take(LIST_PREVIEW)
        .map(report_line)
        .collect();
    let hidden = results.count().saturating_sub(LIST_PREVIEW);
    if hidden > 0 {
        lines.push(format!("…and {} more", hidden));
    }
    if results.truncated {
        lines.push(format!("(showing the newest {} only)", results.limit));
    }
    lines.join("\n")
}

fn report_line(report: &Report) -> String {
    let mut line = format!(
        "• #{} {} [{}, {}]",
        report.id,
        report.title,
        report.priority.as_str(),
        humanize(&report.state)
    );
    if let Some(address) = &report.address {
        let _ = write!(line, " at {}", address);
    }
    line
}

fn stats_text(stats: &ReportStats) -> String {
    let mut text = format!(
        "📊 There are currently {} reports: {} open and {} resolved.",
        stats.total, stats.open, stats.resolved
    );
    if stats.critical_open > 0 {
        let _ = write!(text, " {} of the open ones are critical.", stats.critical_open);
    }
    if !stats.by_state.is_empty() {
        text.push('\n');
        for row in &stats.by_state {
            let _ = write!(text, "\n• {}: {}", humanize(&row.label), row.count);
        }
    }
    text.push_str("\n\nWould you like a breakdown by category?");
    text
}

fn breakdown_text(breakdown: &AggregateBreakdown) -> String {
    if breakdown.rows.is_empty() {
        return format!("There are no reports to group by {} yet.", breakdown.dimension.as_str());
    }
    let mut text = format!("📊 Reports by {}:", breakdown.dimension.as_str());
    for row in &breakdown.rows {
        let _ = write!(text, "\n• {}: {}", humanize(&row.label), row.count);
    }
    text.push_str("\n\nWant me to list the reports in one of these?");
    text
}

fn humanize(label: &str) -> String {
    label.replace('_', " ")
}
