//! Per-step decision form state.
//!
//! Holds what the respondent is editing on a single step and applies the
//! look-back normalization rules when the decision changes.

use crate::error::Result;
use crate::models::{
    validate_assessment, Decision, HierarchicalResponse, LookBack, OffenseResponse,
    DEFAULT_LOOKBACK_YEARS, MAX_LOOKBACK_YEARS,
};

/// Editable state of one decision step.
#[derive(Debug, Clone, PartialEq)]
pub struct DecisionForm {
    decision: Decision,
    look_back: Option<LookBack>,
    notes: String,
}

impl Default for DecisionForm {
    fn default() -> Self {
        Self {
            decision: Decision::AlwaysEligible,
            look_back: None,
            notes: String::new(),
        }
    }
}

impl DecisionForm {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-fill from a previously saved decision.
    pub fn prefilled(decision: Decision, look_back: Option<LookBack>, notes: Option<&str>) -> Self {
        Self {
            decision,
            look_back: look_back.filter(|_| decision.needs_look_back()),
            notes: notes.unwrap_or_default().to_string(),
        }
    }

    pub fn from_hierarchical_response(response: &HierarchicalResponse) -> Self {
        Self::prefilled(response.decision, response.look_back, response.notes.as_deref())
    }

    pub fn decision(&self) -> Decision {
        self.decision
    }

    pub fn look_back(&self) -> Option<LookBack> {
        self.look_back
    }

    pub fn notes(&self) -> &str {
        &self.notes
    }

    /// Change the tier.
    ///
    /// `AlwaysEligible` clears the look-back. Any other tier starts from
    /// the default of one year when no look-back is set.
    pub fn set_decision(&mut self, decision: Decision) {
        self.decision = decision;
        if !decision.needs_look_back() {
            self.look_back = None;
        } else if self.look_back.is_none() {
            self.look_back = Some(LookBack::Years(DEFAULT_LOOKBACK_YEARS));
        }
    }

    /// Toggle the "no time limit" checkbox.
    pub fn set_no_time_limit(&mut self, enabled: bool) {
        if !self.decision.needs_look_back() {
            return;
        }
        self.look_back = Some(if enabled {
            LookBack::NoLimit
        } else {
            LookBack::Years(DEFAULT_LOOKBACK_YEARS)
        });
    }

    /// Move the slider; clamped to `1..=10`.
    pub fn set_years(&mut self, years: i64) {
        if !self.decision.needs_look_back() {
            return;
        }
        let clamped = years.clamp(1, i64::from(MAX_LOOKBACK_YEARS)) as u8;
        self.look_back = Some(LookBack::Years(clamped));
    }

    pub fn set_notes(&mut self, notes: impl Into<String>) {
        self.notes = notes.into();
    }

    fn notes_value(&self) -> Option<String> {
        Some(self.notes.trim().to_string()).filter(|n| !n.is_empty())
    }

    /// Validate and build a flat response.
    pub fn to_offense_response(&self, offense: &str) -> Result<OffenseResponse> {
        validate_assessment(self.decision, self.look_back)?;
        OffenseResponse::new(offense, self.decision, self.look_back, self.notes_value())
    }

    /// Validate and build a hierarchical response.
    pub fn to_hierarchical_response(
        &self,
        category: &str,
        second_order: &str,
        first_order: &str,
        is_aggregate: bool,
    ) -> Result<HierarchicalResponse> {
        validate_assessment(self.decision, self.look_back)?;
        HierarchicalResponse::new(
            category,
            second_order,
            first_order,
            is_aggregate,
            self.decision,
            self.look_back,
            self.notes_value(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_always_eligible_without_look_back() {
        let form = DecisionForm::new();
        assert_eq!(form.decision(), Decision::AlwaysEligible);
        assert_eq!(form.look_back(), None);
    }

    #[test]
    fn test_switching_away_from_eligible_sets_default() {
        let mut form = DecisionForm::new();
        form.set_decision(Decision::AlwaysReview);
        assert_eq!(form.look_back(), Some(LookBack::Years(1)));
    }

    #[test]
    fn test_round_trip_through_eligible_resets_to_default() {
        let mut form = DecisionForm::new();
        form.set_decision(Decision::JobDependent);
        form.set_years(5);
        assert_eq!(form.look_back(), Some(LookBack::Years(5)));

        form.set_decision(Decision::AlwaysEligible);
        assert_eq!(form.look_back(), None);

        form.set_decision(Decision::JobDependent);
        assert_eq!(form.look_back(), Some(LookBack::Years(1)));
    }

    #[test]
    fn test_switching_between_review_tiers_keeps_value() {
        let mut form = DecisionForm::new();
        form.set_decision(Decision::JobDependent);
        form.set_years(7);
        form.set_decision(Decision::AlwaysReview);
        assert_eq!(form.look_back(), Some(LookBack::Years(7)));
    }

    #[test]
    fn test_slider_clamps() {
        let mut form = DecisionForm::new();
        form.set_decision(Decision::AlwaysReview);
        form.set_years(0);
        assert_eq!(form.look_back(), Some(LookBack::Years(1)));
        form.set_years(42);
        assert_eq!(form.look_back(), Some(LookBack::Years(10)));
    }

    #[test]
    fn test_no_time_limit_toggle() {
        let mut form = DecisionForm::new();
        form.set_no_time_limit(true);
        assert_eq!(form.look_back(), None, "ignored while always eligible");

        form.set_decision(Decision::AlwaysReview);
        form.set_no_time_limit(true);
        assert_eq!(form.look_back(), Some(LookBack::NoLimit));
        form.set_no_time_limit(false);
        assert_eq!(form.look_back(), Some(LookBack::Years(1)));
    }

    #[test]
    fn test_to_response_trims_notes() {
        let mut form = DecisionForm::new();
        form.set_decision(Decision::JobDependent);
        form.set_notes("  depends on the role  ");
        let response = form.to_offense_response("Burglary").unwrap();
        assert_eq!(response.notes.as_deref(), Some("depends on the role"));
        assert_eq!(response.look_back, Some(LookBack::Years(1)));
    }

    #[test]
    fn test_prefill_from_response() {
        let response = HierarchicalResponse::new(
            "Violent",
            "Arson",
            "Arson",
            false,
            Decision::AlwaysReview,
            Some(LookBack::NoLimit),
            Some("serious".to_string()),
        )
        .unwrap();
        let form = DecisionForm::from_hierarchical_response(&response);
        assert_eq!(form.decision(), Decision::AlwaysReview);
        assert_eq!(form.look_back(), Some(LookBack::NoLimit));
        assert_eq!(form.notes(), "serious");
    }
}
