//! Markdown and JSON report generation.
//!
//! Builds the admin statistics table, the recent-batch listing and the
//! respondent's review summary.

use crate::analysis::AggregateStat;
use crate::catalog::Catalog;
use crate::models::{Decision, LookBack, ResponseBatch};
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::path::Path;

/// Responses shown per batch in the recent-batch listing.
pub const PREVIEW_RESPONSES: usize = 6;

/// Statistics for one offense, in catalog order.
#[derive(Debug, Clone, Serialize)]
pub struct OffenseStats {
    pub offense: String,
    #[serde(flatten)]
    pub stat: AggregateStat,
}

/// Everything in a statistics report.
#[derive(Debug, Clone, Serialize)]
pub struct StatsReport {
    pub generated_at: DateTime<Utc>,
    pub batches_considered: usize,
    pub completed_batches: usize,
    pub offenses: Vec<OffenseStats>,
}

impl StatsReport {
    /// Order `stats` by the offense list; offenses without stats are skipped.
    pub fn new(
        batches: &[ResponseBatch],
        offenses: &[String],
        stats: &HashMap<String, AggregateStat>,
    ) -> Self {
        Self {
            generated_at: Utc::now(),
            batches_considered: batches.len(),
            completed_batches: batches.iter().filter(|b| b.completed).count(),
            offenses: offenses
                .iter()
                .filter_map(|o| {
                    stats.get(o).map(|stat| OffenseStats {
                        offense: o.clone(),
                        stat: stat.clone(),
                    })
                })
                .collect(),
        }
    }
}

/// Review wording for a look-back value.
pub fn format_look_back(look_back: Option<LookBack>) -> String {
    match look_back {
        None => "N/A (Always Eligible)".to_string(),
        Some(lb) => lb.to_string(),
    }
}

fn format_stat(value: Option<f64>) -> String {
    value.map_or_else(|| "-".to_string(), |v| format!("{:.2}", v))
}

/// Generate the Markdown statistics report.
pub fn generate_markdown_report(report: &StatsReport) -> String {
    let mut output = String::new();

    output.push_str("# Fair Chance Hiring Survey Results\n\n");
    output.push_str(&generate_metadata_section(report));
    output.push_str(&generate_stats_table(&report.offenses));

    output
}

fn generate_metadata_section(report: &StatsReport) -> String {
    let mut section = String::new();

    section.push_str("## Metadata\n\n");
    section.push_str(&format!(
        "- **Generated:** {}\n",
        report.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    section.push_str(&format!(
        "- **Batches Considered:** {}\n",
        report.batches_considered
    ));
    section.push_str(&format!(
        "- **Completed Batches:** {}\n\n",
        report.completed_batches
    ));

    section
}

fn generate_stats_table(rows: &[OffenseStats]) -> String {
    let mut section = String::new();

    section.push_str("## Decisions by Offense\n\n");
    if rows.is_empty() {
        section.push_str("No offenses to report.\n\n");
        return section;
    }

    section.push_str("| Offense |");
    for decision in Decision::ALL {
        section.push_str(&format!(" {} |", decision.label()));
    }
    section.push_str(" Mean Look-back | Median | Mode | Votes |\n");
    section.push_str("|:---|:---:|:---:|:---:|:---:|:---:|:---:|:---:|\n");

    for row in rows {
        section.push_str(&format!("| {} |", row.offense));
        for decision in Decision::ALL {
            section.push_str(&format!(" {:.1}% |", row.stat.percent(decision)));
        }
        section.push_str(&format!(
            " {} | {} | {} | {} |\n",
            format_stat(row.stat.mean_look_back),
            format_stat(row.stat.median_look_back),
            format_stat(row.stat.mode_look_back),
            row.stat.total
        ));
    }
    section.push('\n');

    section
}

/// Generate a JSON statistics report.
pub fn generate_json_report(report: &StatsReport) -> Result<String> {
    serde_json::to_string_pretty(report).map_err(Into::into)
}

/// Listing of recent batches with a short response preview.
pub fn generate_batch_list(batches: &[ResponseBatch]) -> String {
    let mut output = String::new();

    if batches.is_empty() {
        output.push_str("No submissions yet.\n");
        return output;
    }

    for batch in batches {
        let when = batch
            .submitted_at
            .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| "unknown time".to_string());
        let who = batch
            .submitted_by_name
            .as_deref()
            .or(batch.username.as_deref())
            .unwrap_or("anonymous");
        let state = if batch.completed { "completed" } else { "in progress" };

        output.push_str(&format!(
            "{} | {} | {} | {} responses | {}\n",
            batch.batch_id,
            when,
            who,
            batch.response_count(),
            state
        ));

        let assessments: Vec<_> = batch.assessments().collect();
        for (offense, decision, look_back) in assessments.iter().take(PREVIEW_RESPONSES) {
            output.push_str(&format!(
                "    - {}: {} ({})\n",
                offense,
                decision,
                format_look_back(*look_back)
            ));
        }
        if assessments.len() > PREVIEW_RESPONSES {
            output.push_str(&format!(
                "    ... and {} more\n",
                assessments.len() - PREVIEW_RESPONSES
            ));
        }
    }

    output
}

/// Review summary shown before final submission.
///
/// Hierarchical responses are grouped by category in catalog order; flat
/// responses are listed as they were answered.
pub fn generate_review_summary(batch: &ResponseBatch, catalog: &Catalog) -> String {
    let mut output = String::new();

    output.push_str("## Review Your Responses\n\n");

    if !batch.responses.is_empty() {
        for response in &batch.responses {
            output.push_str(&format!(
                "- **{}**: {} | Look-back: {}\n",
                response.offense,
                response.decision,
                format_look_back(response.look_back)
            ));
            if let Some(ref notes) = response.notes {
                output.push_str(&format!("  - Notes: {}\n", notes));
            }
        }
        output.push('\n');
    }

    for category in &catalog.categories {
        let responses: Vec<_> = batch
            .hierarchical_responses
            .iter()
            .filter(|r| r.category == category.name)
            .collect();
        if responses.is_empty() {
            continue;
        }

        output.push_str(&format!("### {}\n\n", category.name));
        for group in &category.groups {
            let in_group: Vec<_> = responses
                .iter()
                .filter(|r| r.second_order == group.name)
                .collect();
            let Some(first) = in_group.first() else {
                continue;
            };

            if first.is_aggregate {
                output.push_str(&format!(
                    "- **{}** (all offenses): {} | Look-back: {}\n",
                    group.name,
                    first.decision,
                    format_look_back(first.look_back)
                ));
                continue;
            }

            output.push_str(&format!("- **{}**\n", group.name));
            for response in in_group {
                output.push_str(&format!(
                    "  - {}: {} | Look-back: {}\n",
                    response.first_order,
                    response.decision,
                    format_look_back(response.look_back)
                ));
            }
        }
        output.push('\n');
    }

    if batch.response_count() == 0 {
        output.push_str("No responses recorded.\n");
    }

    output
}

/// Write report content to a file.
pub fn write_report(content: &str, path: &Path) -> Result<()> {
    std::fs::write(path, content)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::compute_stats;
    use crate::catalog::{Category, SecondOrderGroup};
    use crate::models::{HierarchicalResponse, OffenseResponse};

    fn sample_batches() -> Vec<ResponseBatch> {
        let mut a = ResponseBatch::new(None, Some("Ada".to_string()));
        a.responses = vec![
            OffenseResponse::new("Arson", Decision::AlwaysEligible, None, None).unwrap(),
            OffenseResponse::new(
                "Theft",
                Decision::JobDependent,
                Some(LookBack::Years(3)),
                Some("depends on role".to_string()),
            )
            .unwrap(),
        ];
        a.completed = true;

        let mut b = ResponseBatch::new(None, Some("Grace".to_string()));
        b.responses =
            vec![
                OffenseResponse::new("Arson", Decision::AlwaysReview, Some(LookBack::NoLimit), None)
                    .unwrap(),
            ];
        vec![a, b]
    }

    fn offenses() -> Vec<String> {
        vec!["Arson".to_string(), "Theft".to_string()]
    }

    #[test]
    fn test_format_look_back() {
        assert_eq!(format_look_back(None), "N/A (Always Eligible)");
        assert_eq!(format_look_back(Some(LookBack::NoLimit)), "No Time Limit");
        assert_eq!(format_look_back(Some(LookBack::Years(1))), "1 year");
        assert_eq!(format_look_back(Some(LookBack::Years(7))), "7 years");
    }

    #[test]
    fn test_generate_markdown_report() {
        let batches = sample_batches();
        let stats = compute_stats(&batches, &offenses());
        let report = StatsReport::new(&batches, &offenses(), &stats);
        let markdown = generate_markdown_report(&report);

        assert!(markdown.contains("## Metadata"));
        assert!(markdown.contains("**Completed Batches:** 1"));
        assert!(markdown.contains("| Arson | 50.0% | 0.0% | 50.0% | - | - | - | 2 |"));
        assert!(markdown.contains("| Theft | 0.0% | 100.0% | 0.0% | 3.00 | 3.00 | 3.00 | 1 |"));
    }

    #[test]
    fn test_report_follows_offense_order() {
        let batches = sample_batches();
        let order = vec!["Theft".to_string(), "Arson".to_string()];
        let stats = compute_stats(&batches, &order);
        let report = StatsReport::new(&batches, &order, &stats);
        assert_eq!(report.offenses[0].offense, "Theft");
        assert_eq!(report.offenses[1].offense, "Arson");
    }

    #[test]
    fn test_generate_json_report() {
        let batches = sample_batches();
        let stats = compute_stats(&batches, &offenses());
        let report = StatsReport::new(&batches, &offenses(), &stats);
        let json = generate_json_report(&report).unwrap();

        assert!(json.contains("\"batches_considered\": 2"));
        assert!(json.contains("\"offense\": \"Arson\""));
        assert!(json.contains("\"Always Eligible\""));
    }

    #[test]
    fn test_batch_list_preview() {
        let mut batch = ResponseBatch::new(None, Some("Ada".to_string()));
        batch.responses = (0..8)
            .map(|i| {
                OffenseResponse::new(format!("Offense {}", i), Decision::AlwaysEligible, None, None)
                    .unwrap()
            })
            .collect();

        let listing = generate_batch_list(&[batch]);
        assert!(listing.contains("Ada"));
        assert!(listing.contains("Offense 5"));
        assert!(!listing.contains("Offense 6"));
        assert!(listing.contains("... and 2 more"));
        assert_eq!(generate_batch_list(&[]), "No submissions yet.\n");
    }

    #[test]
    fn test_review_summary_groups_by_category() {
        let catalog = Catalog {
            categories: vec![Category {
                name: "Drug".to_string(),
                description: String::new(),
                groups: vec![
                    SecondOrderGroup {
                        name: "Distribution".to_string(),
                        offenses: vec!["Dist A".to_string(), "Dist B".to_string()],
                    },
                    SecondOrderGroup {
                        name: "Possession".to_string(),
                        offenses: vec!["Poss A".to_string()],
                    },
                ],
            }],
        };

        let mut batch = ResponseBatch::new(Some("ada".to_string()), None);
        for offense in ["Dist A", "Dist B"] {
            batch.upsert_hierarchical(
                HierarchicalResponse::new(
                    "Drug",
                    "Distribution",
                    offense,
                    true,
                    Decision::AlwaysReview,
                    Some(LookBack::Years(5)),
                    None,
                )
                .unwrap(),
            );
        }
        batch.upsert_hierarchical(
            HierarchicalResponse::new(
                "Drug",
                "Possession",
                "Poss A",
                false,
                Decision::AlwaysEligible,
                None,
                None,
            )
            .unwrap(),
        );

        let summary = generate_review_summary(&batch, &catalog);
        assert!(summary.contains("### Drug"));
        assert!(summary.contains("**Distribution** (all offenses): Always Review | Look-back: 5 years"));
        assert!(summary.contains("  - Poss A: Always Eligible | Look-back: N/A (Always Eligible)"));
    }
}
