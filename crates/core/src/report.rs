use crate::checks::stockout;
use crate::domain::insight::{Insight, MetricValue, Severity};
use crate::explain;
use anyhow::ensure;
use chrono::{DateTime, Utc};

const RULE: &str = "============================================================";

/// Render a full report using the deterministic template explanations.
/// Insights are rendered in the order given; prioritize them first.
pub fn generate(insights: &[Insight], business_name: &str, generated_at: DateTime<Utc>) -> String {
    let explanations: Vec<String> = insights.iter().map(explain::template).collect();
    // Explanations are 1:1 by construction here.
    render(insights, &explanations, business_name, generated_at)
}

/// Render with caller-provided explanations (e.g. LLM-rewritten wording).
/// Explanations must match the insights 1:1.
pub fn generate_with_explanations(
    insights: &[Insight],
    explanations: &[String],
    business_name: &str,
    generated_at: DateTime<Utc>,
) -> anyhow::Result<String> {
    ensure!(
        insights.len() == explanations.len(),
        "explanation count {} does not match insight count {}",
        explanations.len(),
        insights.len()
    );
    Ok(render(insights, explanations, business_name, generated_at))
}

fn render(
    insights: &[Insight],
    explanations: &[String],
    business_name: &str,
    generated_at: DateTime<Utc>,
) -> String {
    let sections = [
        header(business_name, generated_at),
        summary(insights),
        detailed_insights(insights, explanations),
        footer(),
    ];
    sections.join("\n\n")
}

fn header(business_name: &str, generated_at: DateTime<Utc>) -> String {
    format!(
        "{RULE}\nWEEKLY BUSINESS ANALYST REPORT\n{business_name}\nGenerated: {}\n{RULE}",
        generated_at.format("%Y-%m-%d %H:%M:%S UTC")
    )
}

/// Executive summary framed around what needs attention, not severity
/// bookkeeping.
fn summary(insights: &[Insight]) -> String {
    let mut parts = vec!["## Executive Summary".to_string(), String::new()];

    if insights.is_empty() {
        parts.push(
            "No issues found. Your business operations look healthy this week.".to_string(),
        );
        return parts.join("\n");
    }

    let mut attention_items = Vec::new();
    for insight in insights {
        if insight.check_name == stockout::CHECK_NAME && insight.severity == Severity::Critical {
            if let Some(MetricValue::Int(count)) = insight.metric("affected_count") {
                attention_items.push(if *count == 1 {
                    "1 product needs immediate attention".to_string()
                } else {
                    format!("{count} products need immediate attention")
                });
            }
        }
    }

    let other_critical = insights
        .iter()
        .filter(|i| i.severity == Severity::Critical && i.check_name != stockout::CHECK_NAME)
        .count();
    if other_critical > 0 {
        attention_items.push(format!(
            "{other_critical} critical issue{} requiring immediate attention",
            plural_s(other_critical)
        ));
    }
    let high = insights
        .iter()
        .filter(|i| i.severity == Severity::High)
        .count();
    if high > 0 {
        attention_items.push(format!(
            "{high} high-priority item{} to address",
            plural_s(high)
        ));
    }

    if attention_items.is_empty() {
        parts.push("Nothing needs urgent attention this week.".to_string());
    } else {
        parts.push("**What needs attention this week:**".to_string());
        for item in attention_items {
            parts.push(format!("- {item}"));
        }
    }

    let non_critical = insights
        .iter()
        .filter(|i| i.severity != Severity::Critical)
        .count();
    if non_critical > 0 {
        parts.push(String::new());
        parts.push(format!("Additional items to review: {non_critical}"));
    }

    parts.join("\n")
}

fn detailed_insights(insights: &[Insight], explanations: &[String]) -> String {
    if insights.is_empty() {
        return "## Insights\n\nNo insights to report.".to_string();
    }

    let mut parts = vec!["## Detailed Insights".to_string(), String::new()];
    for (idx, (insight, explanation)) in insights.iter().zip(explanations).enumerate() {
        parts.push(format!("### {}. {}", idx + 1, insight.title));
        parts.push(format!(
            "**Priority:** {}",
            severity_label(insight.severity)
        ));
        parts.push(String::new());
        parts.push(explanation.clone());
        parts.push(String::new());
        parts.push("---".to_string());
        parts.push(String::new());
    }
    parts.join("\n")
}

fn footer() -> String {
    format!(
        "{RULE}\nReport generated by the Shelfwatch analyst\n{RULE}"
    )
}

/// SMB-friendly priority labels; internal severity names mean little to a
/// shop owner.
fn severity_label(severity: Severity) -> &'static str {
    match severity {
        Severity::Critical => "Immediate attention",
        Severity::High => "Action needed soon",
        Severity::Medium => "Monitor",
        Severity::Low | Severity::Info => "Informational",
    }
}

fn plural_s(count: usize) -> &'static str {
    if count == 1 {
        ""
    } else {
        "s"
    }
}
