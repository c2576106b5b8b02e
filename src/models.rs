//! Data models for the survey.
//!
//! This module contains the domain types for decisions, look-back periods,
//! responses and batches, plus the wire rows exchanged with the backend.
//! Rows are validated when converted into domain types so a malformed
//! record is rejected at the boundary.

use crate::error::{Result, SurveyError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Wire value meaning "no time limit". Anything at or above it is unbounded.
pub const NO_TIME_LIMIT: i64 = 99;

/// Largest bounded look-back period, in years.
pub const MAX_LOOKBACK_YEARS: u8 = 10;

/// Look-back assigned when a tier that needs one is first selected.
pub const DEFAULT_LOOKBACK_YEARS: u8 = 1;

/// Eligibility tier assigned to an offense.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Decision {
    /// Display on the application; never blocks eligibility.
    #[serde(rename = "Always Eligible", alias = "Green")]
    AlwaysEligible,
    /// Depends on the essential functions of the job.
    #[serde(rename = "Job Dependent", alias = "Yellow")]
    JobDependent,
    /// Always sent to individualized assessment.
    #[serde(rename = "Always Review", alias = "Red")]
    AlwaysReview,
}

impl Decision {
    /// All tiers in display order.
    pub const ALL: [Decision; 3] = [
        Decision::AlwaysEligible,
        Decision::JobDependent,
        Decision::AlwaysReview,
    ];

    /// Label stored in `decision_level`.
    pub fn label(&self) -> &'static str {
        match self {
            Decision::AlwaysEligible => "Always Eligible",
            Decision::JobDependent => "Job Dependent",
            Decision::AlwaysReview => "Always Review",
        }
    }

    /// Traffic-light name used by the load-test table.
    pub fn color(&self) -> &'static str {
        match self {
            Decision::AlwaysEligible => "Green",
            Decision::JobDependent => "Yellow",
            Decision::AlwaysReview => "Red",
        }
    }

    /// Whether this tier carries a look-back period.
    pub fn needs_look_back(&self) -> bool {
        !matches!(self, Decision::AlwaysEligible)
    }

    /// Parse a label, colour alias, or terminal shorthand (`1`/`2`/`3`).
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "always eligible" | "always_eligible" | "eligible" | "green" | "1" | "e" => {
                Some(Decision::AlwaysEligible)
            }
            "job dependent" | "job_dependent" | "dependent" | "yellow" | "2" | "j" => {
                Some(Decision::JobDependent)
            }
            "always review" | "always_review" | "review" | "red" | "3" | "r" => {
                Some(Decision::AlwaysReview)
            }
            _ => None,
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// How many years of conviction history are relevant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LookBack {
    /// Bounded period, `0..=10` years.
    Years(u8),
    /// Consider all convictions regardless of age.
    NoLimit,
}

impl LookBack {
    /// Integer stored in `look_back_period`.
    pub fn to_wire(self) -> i64 {
        match self {
            LookBack::Years(n) => i64::from(n),
            LookBack::NoLimit => NO_TIME_LIMIT,
        }
    }

    /// Parse a stored integer.
    pub fn from_wire(value: i64) -> Result<Self> {
        if value >= NO_TIME_LIMIT {
            return Ok(LookBack::NoLimit);
        }
        if (0..=i64::from(MAX_LOOKBACK_YEARS)).contains(&value) {
            return Ok(LookBack::Years(value as u8));
        }
        Err(SurveyError::MalformedRow(format!(
            "look_back_period out of range: {}",
            value
        )))
    }

    /// Numeric years for statistics; `None` for an unbounded period.
    pub fn as_years(self) -> Option<f64> {
        match self {
            LookBack::Years(n) => Some(f64::from(n)),
            LookBack::NoLimit => None,
        }
    }
}

impl fmt::Display for LookBack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LookBack::NoLimit => write!(f, "No Time Limit"),
            LookBack::Years(1) => write!(f, "1 year"),
            LookBack::Years(n) => write!(f, "{} years", n),
        }
    }
}

/// Check that a decision and look-back pair is complete for a wizard step.
pub fn validate_assessment(decision: Decision, look_back: Option<LookBack>) -> Result<()> {
    match (decision.needs_look_back(), look_back) {
        (true, None) => Err(SurveyError::validation(format!(
            "A look-back period is required for '{}'",
            decision
        ))),
        (true, Some(LookBack::Years(n))) if n > MAX_LOOKBACK_YEARS => {
            Err(SurveyError::validation(format!(
                "Look-back period must be between 0 and {} years",
                MAX_LOOKBACK_YEARS
            )))
        }
        _ => Ok(()),
    }
}

fn normalize_notes(notes: Option<String>) -> Option<String> {
    notes
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty())
}

/// A decision for one offense in the flat variant.
#[derive(Debug, Clone, PartialEq)]
pub struct OffenseResponse {
    /// Offense name from the catalog.
    pub offense: String,
    /// Assigned tier.
    pub decision: Decision,
    /// Look-back period; always `None` for `AlwaysEligible`.
    pub look_back: Option<LookBack>,
    /// Optional free-text rationale.
    pub notes: Option<String>,
}

impl OffenseResponse {
    /// Build a response, dropping any look-back on an `AlwaysEligible` decision.
    pub fn new(
        offense: impl Into<String>,
        decision: Decision,
        look_back: Option<LookBack>,
        notes: Option<String>,
    ) -> Result<Self> {
        let offense = offense.into();
        if offense.trim().is_empty() {
            return Err(SurveyError::validation("Offense name must not be empty"));
        }
        Ok(Self {
            offense,
            decision,
            look_back: look_back.filter(|_| decision.needs_look_back()),
            notes: normalize_notes(notes),
        })
    }
}

/// Mode chosen for a second-order group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupMode {
    /// One decision applied to every offense in the group.
    Aggregate,
    /// A separate decision per offense.
    Individual,
}

/// A decision for one first-order offense in the hierarchical variant.
#[derive(Debug, Clone, PartialEq)]
pub struct HierarchicalResponse {
    pub category: String,
    pub second_order: String,
    pub first_order: String,
    /// Set when the decision was applied to the whole group.
    pub is_aggregate: bool,
    pub decision: Decision,
    pub look_back: Option<LookBack>,
    pub notes: Option<String>,
}

impl HierarchicalResponse {
    pub fn new(
        category: impl Into<String>,
        second_order: impl Into<String>,
        first_order: impl Into<String>,
        is_aggregate: bool,
        decision: Decision,
        look_back: Option<LookBack>,
        notes: Option<String>,
    ) -> Result<Self> {
        let first_order = first_order.into();
        if first_order.trim().is_empty() {
            return Err(SurveyError::validation("Offense name must not be empty"));
        }
        Ok(Self {
            category: category.into(),
            second_order: second_order.into(),
            first_order,
            is_aggregate,
            decision,
            look_back: look_back.filter(|_| decision.needs_look_back()),
            notes: normalize_notes(notes),
        })
    }

    /// Upsert key: `(category, second_order, first_order)`.
    pub fn key(&self) -> (&str, &str, &str) {
        (&self.category, &self.second_order, &self.first_order)
    }

    /// Whether this response belongs to the given group.
    pub fn in_group(&self, category: &str, second_order: &str) -> bool {
        self.category == category && self.second_order == second_order
    }
}

/// One user's set of responses, persisted as a single record.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseBatch {
    pub batch_id: Uuid,
    /// Username chosen at session start (hierarchical variant).
    pub username: Option<String>,
    /// Display name of the respondent.
    pub submitted_by_name: Option<String>,
    /// Recipients of the submission summary (flat variant).
    pub recipient_emails: Vec<String>,
    /// Flat responses, kept in catalog order.
    pub responses: Vec<OffenseResponse>,
    /// Hierarchical responses keyed by classification.
    pub hierarchical_responses: Vec<HierarchicalResponse>,
    /// Set on final submission.
    pub completed: bool,
    /// Last modification time.
    pub submitted_at: Option<DateTime<Utc>>,
}

impl ResponseBatch {
    /// Start an empty batch with a fresh id.
    pub fn new(username: Option<String>, submitted_by_name: Option<String>) -> Self {
        Self {
            batch_id: Uuid::new_v4(),
            username,
            submitted_by_name,
            recipient_emails: Vec::new(),
            responses: Vec::new(),
            hierarchical_responses: Vec::new(),
            completed: false,
            submitted_at: Some(Utc::now()),
        }
    }

    /// Refresh the last-modified timestamp.
    pub fn touch(&mut self) {
        self.submitted_at = Some(Utc::now());
    }

    /// Insert or replace a hierarchical response by key.
    pub fn upsert_hierarchical(&mut self, response: HierarchicalResponse) {
        match self
            .hierarchical_responses
            .iter_mut()
            .find(|r| r.key() == response.key())
        {
            Some(existing) => *existing = response,
            None => self.hierarchical_responses.push(response),
        }
    }

    /// Drop every hierarchical response of a group.
    pub fn remove_group(&mut self, category: &str, second_order: &str) {
        self.hierarchical_responses
            .retain(|r| !r.in_group(category, second_order));
    }

    /// Total number of recorded responses across both variants.
    pub fn response_count(&self) -> usize {
        self.responses.len() + self.hierarchical_responses.len()
    }

    /// Every `(offense, decision, look_back)` triple in the batch.
    pub fn assessments(&self) -> impl Iterator<Item = (&str, Decision, Option<LookBack>)> {
        self.responses
            .iter()
            .map(|r| (r.offense.as_str(), r.decision, r.look_back))
            .chain(
                self.hierarchical_responses
                    .iter()
                    .map(|r| (r.first_order.as_str(), r.decision, r.look_back)),
            )
    }
}

/// Flat response as stored in `decisions_batch.responses`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionRow {
    pub offense_name: String,
    pub decision_level: String,
    #[serde(default)]
    pub look_back_period: Option<i64>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Hierarchical response as stored in `decisions_batch.hierarchical_responses`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HierarchicalRow {
    pub category: String,
    pub second_order: String,
    pub first_order: String,
    #[serde(default)]
    pub is_aggregate: bool,
    pub decision_level: String,
    #[serde(default)]
    pub look_back_period: Option<i64>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// A `decisions_batch` row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchRow {
    pub batch_id: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub submitted_by_name: Option<String>,
    #[serde(default)]
    pub recipient_emails: Option<Vec<String>>,
    #[serde(default)]
    pub responses: Option<Vec<DecisionRow>>,
    #[serde(default)]
    pub hierarchical_responses: Option<Vec<HierarchicalRow>>,
    #[serde(default)]
    pub completed: Option<bool>,
    #[serde(default)]
    pub submitted_at: Option<DateTime<Utc>>,
}

fn parse_decision(label: &str) -> Result<Decision> {
    Decision::parse(label)
        .ok_or_else(|| SurveyError::MalformedRow(format!("unknown decision_level: {}", label)))
}

fn parse_look_back(decision: Decision, value: Option<i64>) -> Result<Option<LookBack>> {
    if !decision.needs_look_back() {
        return Ok(None);
    }
    value.map(LookBack::from_wire).transpose()
}

impl TryFrom<DecisionRow> for OffenseResponse {
    type Error = SurveyError;

    fn try_from(row: DecisionRow) -> Result<Self> {
        let decision = parse_decision(&row.decision_level)?;
        let look_back = parse_look_back(decision, row.look_back_period)?;
        OffenseResponse::new(row.offense_name, decision, look_back, row.notes)
            .map_err(|e| SurveyError::MalformedRow(e.to_string()))
    }
}

impl From<&OffenseResponse> for DecisionRow {
    fn from(r: &OffenseResponse) -> Self {
        Self {
            offense_name: r.offense.clone(),
            decision_level: r.decision.label().to_string(),
            look_back_period: r.look_back.map(LookBack::to_wire),
            notes: r.notes.clone(),
        }
    }
}

impl TryFrom<HierarchicalRow> for HierarchicalResponse {
    type Error = SurveyError;

    fn try_from(row: HierarchicalRow) -> Result<Self> {
        let decision = parse_decision(&row.decision_level)?;
        let look_back = parse_look_back(decision, row.look_back_period)?;
        HierarchicalResponse::new(
            row.category,
            row.second_order,
            row.first_order,
            row.is_aggregate,
            decision,
            look_back,
            row.notes,
        )
        .map_err(|e| SurveyError::MalformedRow(e.to_string()))
    }
}

impl From<&HierarchicalResponse> for HierarchicalRow {
    fn from(r: &HierarchicalResponse) -> Self {
        Self {
            category: r.category.clone(),
            second_order: r.second_order.clone(),
            first_order: r.first_order.clone(),
            is_aggregate: r.is_aggregate,
            decision_level: r.decision.label().to_string(),
            look_back_period: r.look_back.map(LookBack::to_wire),
            notes: r.notes.clone(),
        }
    }
}

impl TryFrom<BatchRow> for ResponseBatch {
    type Error = SurveyError;

    fn try_from(row: BatchRow) -> Result<Self> {
        let batch_id = Uuid::parse_str(&row.batch_id).map_err(|e| {
            SurveyError::MalformedRow(format!("invalid batch_id '{}': {}", row.batch_id, e))
        })?;

        let responses = row
            .responses
            .unwrap_or_default()
            .into_iter()
            .map(OffenseResponse::try_from)
            .collect::<Result<Vec<_>>>()?;

        let hierarchical_responses = row
            .hierarchical_responses
            .unwrap_or_default()
            .into_iter()
            .map(HierarchicalResponse::try_from)
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            batch_id,
            username: row.username,
            submitted_by_name: row.submitted_by_name,
            recipient_emails: row.recipient_emails.unwrap_or_default(),
            responses,
            hierarchical_responses,
            completed: row.completed.unwrap_or(false),
            submitted_at: row.submitted_at,
        })
    }
}

impl From<&ResponseBatch> for BatchRow {
    fn from(b: &ResponseBatch) -> Self {
        Self {
            batch_id: b.batch_id.to_string(),
            username: b.username.clone(),
            submitted_by_name: b.submitted_by_name.clone(),
            recipient_emails: Some(b.recipient_emails.clone()),
            responses: Some(b.responses.iter().map(DecisionRow::from).collect()),
            hierarchical_responses: Some(
                b.hierarchical_responses
                    .iter()
                    .map(HierarchicalRow::from)
                    .collect(),
            ),
            completed: Some(b.completed),
            submitted_at: b.submitted_at,
        }
    }
}

/// A mailing-list signup stored in `interest_emails`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterestEmail {
    pub email: String,
    pub submitted_at: DateTime<Utc>,
}
