//! Flat wizard: one decision per offense, in catalog order.

use crate::error::{Result, SurveyError};
use crate::models::{validate_assessment, OffenseResponse};
use crate::wizard::form::DecisionForm;
use tracing::debug;

/// Where the flat wizard currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlatStep {
    NotStarted,
    Instructions,
    /// Deciding the offense at this catalog index.
    Offense(usize),
    FinalReview,
    Submitted,
}

/// State machine for the flat survey.
#[derive(Debug, Clone)]
pub struct FlatWizard {
    offenses: Vec<String>,
    step: FlatStep,
    respondent: Option<String>,
    responses: Vec<OffenseResponse>,
}

impl FlatWizard {
    pub fn new(offenses: Vec<String>) -> Self {
        Self {
            offenses,
            step: FlatStep::NotStarted,
            respondent: None,
            responses: Vec::new(),
        }
    }

    pub fn step(&self) -> FlatStep {
        self.step
    }

    pub fn offenses(&self) -> &[String] {
        &self.offenses
    }

    pub fn total(&self) -> usize {
        self.offenses.len()
    }

    pub fn respondent(&self) -> Option<&str> {
        self.respondent.as_deref()
    }

    /// Responses collected so far, in catalog order.
    pub fn responses(&self) -> &[OffenseResponse] {
        &self.responses
    }

    /// Offense of the current step, if on a decision step.
    pub fn current_offense(&self) -> Option<&str> {
        match self.step {
            FlatStep::Offense(i) => self.offenses.get(i).map(String::as_str),
            _ => None,
        }
    }

    /// Record who is answering and show the instructions.
    pub fn start(&mut self, respondent: &str) -> Result<FlatStep> {
        let respondent = respondent.trim();
        if respondent.is_empty() {
            return Err(SurveyError::validation("Please enter your name to begin"));
        }
        if self.step != FlatStep::NotStarted {
            return Err(SurveyError::InvalidTransition(
                "survey already started".to_string(),
            ));
        }
        self.respondent = Some(respondent.to_string());
        self.responses.clear();
        self.step = FlatStep::Instructions;
        Ok(self.step)
    }

    /// Leave the instructions for the first offense.
    pub fn begin(&mut self) -> Result<FlatStep> {
        if self.step != FlatStep::Instructions {
            return Err(SurveyError::InvalidTransition(format!(
                "cannot begin from {:?}",
                self.step
            )));
        }
        self.step = if self.offenses.is_empty() {
            FlatStep::FinalReview
        } else {
            FlatStep::Offense(0)
        };
        Ok(self.step)
    }

    /// Validate the current step's response, store it and advance.
    pub fn submit_step(&mut self, response: OffenseResponse) -> Result<FlatStep> {
        let index = match self.step {
            FlatStep::Offense(i) => i,
            other => {
                return Err(SurveyError::InvalidTransition(format!(
                    "no offense to answer in {:?}",
                    other
                )))
            }
        };

        let expected = &self.offenses[index];
        if &response.offense != expected {
            return Err(SurveyError::validation(format!(
                "Response is for '{}' but the current offense is '{}'",
                response.offense, expected
            )));
        }
        validate_assessment(response.decision, response.look_back)?;

        self.upsert(response);

        self.step = if index + 1 < self.offenses.len() {
            FlatStep::Offense(index + 1)
        } else {
            FlatStep::FinalReview
        };
        debug!("Flat wizard advanced to {:?}", self.step);
        Ok(self.step)
    }

    /// Build the current step's response from a form and submit it.
    pub fn submit_form(&mut self, form: &DecisionForm) -> Result<FlatStep> {
        let offense = self
            .current_offense()
            .ok_or_else(|| SurveyError::InvalidTransition("not on an offense step".to_string()))?
            .to_string();
        let response = form.to_offense_response(&offense)?;
        self.submit_step(response)
    }

    fn upsert(&mut self, response: OffenseResponse) {
        match self
            .responses
            .iter_mut()
            .find(|r| r.offense == response.offense)
        {
            Some(existing) => *existing = response,
            None => self.responses.push(response),
        }
        let offenses = &self.offenses;
        self.responses.sort_by_key(|r| {
            offenses
                .iter()
                .position(|o| *o == r.offense)
                .unwrap_or(usize::MAX)
        });
    }

    /// Step back one offense, discarding the answer that will be redone.
    ///
    /// Returns `false` when there is nothing to go back to.
    pub fn go_back(&mut self) -> bool {
        let target = match self.step {
            FlatStep::Offense(i) if i > 0 => i - 1,
            FlatStep::FinalReview if !self.offenses.is_empty() => self.offenses.len() - 1,
            _ => return false,
        };

        let offense = &self.offenses[target];
        self.responses.retain(|r| &r.offense != offense);
        self.step = FlatStep::Offense(target);
        debug!("Flat wizard went back to {:?}", self.step);
        true
    }

    /// Mark the survey as submitted.
    pub fn mark_submitted(&mut self) -> Result<()> {
        if self.step != FlatStep::FinalReview {
            return Err(SurveyError::InvalidTransition(
                "submission is only possible from the final review".to_string(),
            ));
        }
        self.step = FlatStep::Submitted;
        Ok(())
    }

    /// Drop everything and return to the start.
    pub fn restart(&mut self) {
        self.step = FlatStep::NotStarted;
        self.respondent = None;
        self.responses.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Catalog;
    use crate::models::{Decision, LookBack};

    fn offenses() -> Vec<String> {
        vec!["A".to_string(), "B".to_string(), "C".to_string()]
    }

    fn started(offenses: Vec<String>) -> FlatWizard {
        let mut wizard = FlatWizard::new(offenses);
        wizard.start("Ada Lovelace").unwrap();
        wizard.begin().unwrap();
        wizard
    }

    fn answer(offense: &str, decision: Decision) -> OffenseResponse {
        let look_back = decision.needs_look_back().then_some(LookBack::Years(3));
        OffenseResponse::new(offense, decision, look_back, None).unwrap()
    }

    #[test]
    fn test_full_run_produces_catalog_ordered_responses() {
        let catalog = Catalog::legacy_flat();
        let mut wizard = started(catalog.clone());

        for (i, offense) in catalog.iter().enumerate() {
            let decision = Decision::ALL[i % 3];
            wizard.submit_step(answer(offense, decision)).unwrap();
        }

        assert_eq!(wizard.step(), FlatStep::FinalReview);
        assert_eq!(wizard.responses().len(), catalog.len());
        for (response, offense) in wizard.responses().iter().zip(&catalog) {
            assert_eq!(&response.offense, offense);
            if response.decision == Decision::AlwaysEligible {
                assert_eq!(response.look_back, None);
            }
        }
    }

    #[test]
    fn test_start_requires_name() {
        let mut wizard = FlatWizard::new(offenses());
        assert!(wizard.start("   ").is_err());
        assert_eq!(wizard.step(), FlatStep::NotStarted);
    }

    #[test]
    fn test_submit_rejects_wrong_offense() {
        let mut wizard = started(offenses());
        let err = wizard.submit_step(answer("B", Decision::AlwaysEligible));
        assert!(err.is_err());
        assert_eq!(wizard.step(), FlatStep::Offense(0));
    }

    #[test]
    fn test_submit_requires_look_back_for_review_tiers() {
        let mut wizard = started(offenses());
        let response = OffenseResponse::new("A", Decision::JobDependent, None, None).unwrap();
        assert!(matches!(
            wizard.submit_step(response),
            Err(SurveyError::Validation(_))
        ));
        assert!(wizard.responses().is_empty());
    }

    #[test]
    fn test_go_back_at_first_step_is_noop() {
        let mut wizard = started(offenses());
        assert!(!wizard.go_back());
        assert_eq!(wizard.step(), FlatStep::Offense(0));
        assert!(wizard.responses().is_empty());
    }

    #[test]
    fn test_go_back_removes_exactly_one_response() {
        let mut wizard = started(offenses());
        wizard.submit_step(answer("A", Decision::AlwaysEligible)).unwrap();
        wizard.submit_step(answer("B", Decision::JobDependent)).unwrap();
        assert_eq!(wizard.step(), FlatStep::Offense(2));

        assert!(wizard.go_back());
        assert_eq!(wizard.step(), FlatStep::Offense(1));
        assert_eq!(wizard.responses().len(), 1);
        assert_eq!(wizard.responses()[0].offense, "A");
    }

    #[test]
    fn test_go_back_from_review() {
        let mut wizard = started(offenses());
        for o in ["A", "B", "C"] {
            wizard.submit_step(answer(o, Decision::AlwaysReview)).unwrap();
        }
        assert!(wizard.go_back());
        assert_eq!(wizard.step(), FlatStep::Offense(2));
        assert_eq!(wizard.responses().len(), 2);

        wizard.submit_step(answer("C", Decision::AlwaysEligible)).unwrap();
        assert_eq!(wizard.step(), FlatStep::FinalReview);
        assert_eq!(wizard.responses()[2].decision, Decision::AlwaysEligible);
    }

    #[test]
    fn test_submit_form_uses_current_offense() {
        let mut wizard = started(offenses());
        let mut form = DecisionForm::new();
        form.set_decision(Decision::AlwaysReview);
        wizard.submit_form(&form).unwrap();
        assert_eq!(wizard.responses()[0].offense, "A");
        assert_eq!(wizard.responses()[0].look_back, Some(LookBack::Years(1)));
    }

    #[test]
    fn test_empty_catalog_goes_straight_to_review() {
        let mut wizard = started(Vec::new());
        assert_eq!(wizard.step(), FlatStep::FinalReview);
        assert!(!wizard.go_back());
        wizard.mark_submitted().unwrap();
        assert_eq!(wizard.step(), FlatStep::Submitted);
    }

    #[test]
    fn test_restart_clears_state() {
        let mut wizard = started(offenses());
        wizard.submit_step(answer("A", Decision::AlwaysEligible)).unwrap();
        wizard.restart();
        assert_eq!(wizard.step(), FlatStep::NotStarted);
        assert!(wizard.responses().is_empty());
        assert!(wizard.respondent().is_none());
    }
}
