//! Hierarchical wizard: categories, second-order groups, first-order offenses.
//!
//! For every group the respondent either applies one decision to the whole
//! group (aggregate) or decides each offense separately (individual). A group
//! never mixes the two: saving one kind drops the other.

use crate::catalog::{Catalog, SecondOrderGroup};
use crate::error::{Result, SurveyError};
use crate::models::{GroupMode, HierarchicalResponse, ResponseBatch};
use crate::wizard::form::DecisionForm;
use tracing::debug;

/// Where the hierarchical wizard currently is. Indices point into the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HierStep {
    NotStarted,
    Instructions,
    CategorySelection,
    ModeSelection {
        category: usize,
        group: usize,
    },
    AggregateDecision {
        category: usize,
        group: usize,
    },
    IndividualDecision {
        category: usize,
        group: usize,
        offense: usize,
    },
    FinalReview,
    Submitted,
}

/// Whether a group's responses cover it completely.
///
/// Covered means aggregate responses only, or an individual response for
/// every member offense. Any mix of the two is incomplete. A group with no
/// offenses has nothing to decide and is always complete.
pub fn is_group_complete(
    category: &str,
    group: &SecondOrderGroup,
    responses: &[HierarchicalResponse],
) -> bool {
    if group.offenses.is_empty() {
        return true;
    }
    let in_group: Vec<&HierarchicalResponse> = responses
        .iter()
        .filter(|r| r.in_group(category, &group.name))
        .collect();

    let has_aggregate = in_group.iter().any(|r| r.is_aggregate);
    let has_individual = in_group.iter().any(|r| !r.is_aggregate);

    match (has_aggregate, has_individual) {
        (true, false) => true,
        (false, true) => group.offenses.iter().all(|offense| {
            in_group
                .iter()
                .any(|r| !r.is_aggregate && &r.first_order == offense)
        }),
        _ => false,
    }
}

/// Whether every group of every category is covered.
pub fn is_complete(catalog: &Catalog, responses: &[HierarchicalResponse]) -> bool {
    catalog.categories.iter().all(|c| {
        c.groups
            .iter()
            .all(|g| is_group_complete(&c.name, g, responses))
    })
}

/// State machine for the hierarchical survey.
#[derive(Debug, Clone)]
pub struct HierarchicalWizard {
    catalog: Catalog,
    step: HierStep,
    batch: ResponseBatch,
}

impl HierarchicalWizard {
    /// A fresh wizard writing into `batch`.
    pub fn new(catalog: Catalog, batch: ResponseBatch) -> Self {
        Self {
            catalog,
            step: HierStep::NotStarted,
            batch,
        }
    }

    /// Continue a saved batch at its first incomplete group.
    pub fn resume(catalog: Catalog, batch: ResponseBatch) -> Self {
        let mut wizard = Self::new(catalog, batch);
        wizard.step = wizard.resume_point();
        debug!("Resuming hierarchical wizard at {:?}", wizard.step);
        wizard
    }

    pub fn step(&self) -> HierStep {
        self.step
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn batch(&self) -> &ResponseBatch {
        &self.batch
    }

    pub fn into_batch(self) -> ResponseBatch {
        self.batch
    }

    pub fn responses(&self) -> &[HierarchicalResponse] {
        &self.batch.hierarchical_responses
    }

    pub fn start(&mut self) -> Result<HierStep> {
        self.expect_step(HierStep::NotStarted, "start")?;
        self.step = HierStep::Instructions;
        Ok(self.step)
    }

    pub fn begin(&mut self) -> Result<HierStep> {
        self.expect_step(HierStep::Instructions, "begin")?;
        self.step = HierStep::CategorySelection;
        Ok(self.step)
    }

    fn expect_step(&self, expected: HierStep, action: &str) -> Result<()> {
        if self.step != expected {
            return Err(SurveyError::InvalidTransition(format!(
                "cannot {} from {:?}",
                action, self.step
            )));
        }
        Ok(())
    }

    /// Pick a category to work on.
    pub fn select_category(&mut self, name: &str) -> Result<HierStep> {
        self.expect_step(HierStep::CategorySelection, "select a category")?;
        let category = self
            .catalog
            .categories
            .iter()
            .position(|c| c.name == name)
            .ok_or_else(|| SurveyError::validation(format!("Unknown category: {}", name)))?;
        let group = self.next_group(category, 0).ok_or_else(|| {
            SurveyError::validation(format!("Category '{}' has no offenses", name))
        })?;
        self.step = HierStep::ModeSelection { category, group };
        Ok(self.step)
    }

    /// Choose aggregate or individual decisions for the current group.
    pub fn choose_mode(&mut self, mode: GroupMode) -> Result<HierStep> {
        let (category, group) = match self.step {
            HierStep::ModeSelection { category, group } => (category, group),
            other => {
                return Err(SurveyError::InvalidTransition(format!(
                    "no group mode to choose in {:?}",
                    other
                )))
            }
        };
        let (_, group_def) = self.group_at(category, group);
        if group_def.offenses.is_empty() {
            return Err(SurveyError::validation(format!(
                "Group '{}' has no offenses",
                group_def.name
            )));
        }
        self.step = match mode {
            GroupMode::Aggregate => HierStep::AggregateDecision { category, group },
            GroupMode::Individual => HierStep::IndividualDecision {
                category,
                group,
                offense: 0,
            },
        };
        Ok(self.step)
    }

    /// Save the decision for the current step and advance.
    pub fn submit_decision(&mut self, form: &DecisionForm) -> Result<HierStep> {
        match self.step {
            HierStep::AggregateDecision { category, group } => {
                let (cat_name, group_def) = self.group_at(category, group);
                let cat_name = cat_name.to_string();
                let group_def = group_def.clone();

                let fanned_out = group_def
                    .offenses
                    .iter()
                    .map(|offense| {
                        form.to_hierarchical_response(&cat_name, &group_def.name, offense, true)
                    })
                    .collect::<Result<Vec<_>>>()?;

                self.batch.remove_group(&cat_name, &group_def.name);
                self.batch.hierarchical_responses.extend(fanned_out);
                self.batch.touch();
                self.step = self.after_group(category, group);
            }
            HierStep::IndividualDecision {
                category,
                group,
                offense,
            } => {
                let (cat_name, group_def) = self.group_at(category, group);
                let response = form.to_hierarchical_response(
                    cat_name,
                    &group_def.name,
                    &group_def.offenses[offense],
                    false,
                )?;
                let member_count = group_def.offenses.len();

                self.batch.hierarchical_responses.retain(|r| {
                    !(r.is_aggregate && r.in_group(&response.category, &response.second_order))
                });
                self.batch.upsert_hierarchical(response);
                self.batch.touch();

                self.step = if offense + 1 < member_count {
                    HierStep::IndividualDecision {
                        category,
                        group,
                        offense: offense + 1,
                    }
                } else {
                    self.after_group(category, group)
                };
            }
            other => {
                return Err(SurveyError::InvalidTransition(format!(
                    "no decision to submit in {:?}",
                    other
                )))
            }
        }
        debug!("Hierarchical wizard advanced to {:?}", self.step);
        Ok(self.step)
    }

    fn group_at(&self, category: usize, group: usize) -> (&str, &SecondOrderGroup) {
        let cat = &self.catalog.categories[category];
        (&cat.name, &cat.groups[group])
    }

    /// First group at or after `from` that has offenses.
    fn next_group(&self, category: usize, from: usize) -> Option<usize> {
        let groups = &self.catalog.categories[category].groups;
        (from..groups.len()).find(|&g| !groups[g].offenses.is_empty())
    }

    /// Last group before `before` that has offenses.
    fn previous_group(&self, category: usize, before: usize) -> Option<usize> {
        let groups = &self.catalog.categories[category].groups;
        (0..before).rev().find(|&g| !groups[g].offenses.is_empty())
    }

    fn after_group(&self, category: usize, group: usize) -> HierStep {
        if let Some(next) = self.next_group(category, group + 1) {
            HierStep::ModeSelection {
                category,
                group: next,
            }
        } else if self.is_complete() {
            HierStep::FinalReview
        } else {
            HierStep::CategorySelection
        }
    }

    /// Navigate to the previous screen. Saved responses are kept.
    ///
    /// Returns `false` when there is nothing to go back to.
    pub fn go_back(&mut self) -> bool {
        let previous = match self.step {
            HierStep::NotStarted | HierStep::Instructions | HierStep::Submitted => return false,
            HierStep::CategorySelection => HierStep::Instructions,
            HierStep::ModeSelection { category, group } => {
                match self.previous_group(category, group) {
                    Some(group) => HierStep::ModeSelection { category, group },
                    None => HierStep::CategorySelection,
                }
            }
            HierStep::AggregateDecision { category, group }
            | HierStep::IndividualDecision {
                category,
                group,
                offense: 0,
            } => HierStep::ModeSelection { category, group },
            HierStep::IndividualDecision {
                category,
                group,
                offense,
            } => HierStep::IndividualDecision {
                category,
                group,
                offense: offense - 1,
            },
            HierStep::FinalReview => HierStep::CategorySelection,
        };
        self.step = previous;
        debug!("Hierarchical wizard went back to {:?}", self.step);
        true
    }

    /// "Back to categories" from the final review.
    pub fn return_to_categories(&mut self) -> Result<HierStep> {
        self.expect_step(HierStep::FinalReview, "return to categories")?;
        self.step = HierStep::CategorySelection;
        Ok(self.step)
    }

    /// Jump to the final review once everything is covered.
    pub fn review(&mut self) -> Result<HierStep> {
        if !self.is_complete() {
            return Err(SurveyError::validation(
                "Every offense group needs a decision before review",
            ));
        }
        self.step = HierStep::FinalReview;
        Ok(self.step)
    }

    /// Mark the batch complete after a successful final submission.
    pub fn mark_submitted(&mut self) -> Result<()> {
        self.expect_step(HierStep::FinalReview, "submit")?;
        self.batch.completed = true;
        self.batch.touch();
        self.step = HierStep::Submitted;
        Ok(())
    }

    /// Mode previously saved for a group, if any.
    pub fn existing_mode(&self, category: usize, group: usize) -> Option<GroupMode> {
        let (cat_name, group_def) = self.group_at(category, group);
        let mut in_group = self
            .responses()
            .iter()
            .filter(|r| r.in_group(cat_name, &group_def.name));
        in_group.next().map(|r| {
            if r.is_aggregate {
                GroupMode::Aggregate
            } else {
                GroupMode::Individual
            }
        })
    }

    /// Saved decision for the current step, for pre-filling the form.
    pub fn existing_decision(&self) -> Option<DecisionForm> {
        match self.step {
            HierStep::AggregateDecision { category, group } => {
                let (cat_name, group_def) = self.group_at(category, group);
                self.responses()
                    .iter()
                    .find(|r| r.in_group(cat_name, &group_def.name) && r.is_aggregate)
                    .map(DecisionForm::from_hierarchical_response)
            }
            HierStep::IndividualDecision {
                category,
                group,
                offense,
            } => {
                let (cat_name, group_def) = self.group_at(category, group);
                let key = (
                    cat_name,
                    group_def.name.as_str(),
                    group_def.offenses[offense].as_str(),
                );
                self.responses()
                    .iter()
                    .find(|r| !r.is_aggregate && r.key() == key)
                    .map(DecisionForm::from_hierarchical_response)
            }
            _ => None,
        }
    }

    pub fn is_category_complete(&self, name: &str) -> bool {
        self.catalog.category(name).is_some_and(|c| {
            c.groups
                .iter()
                .all(|g| is_group_complete(&c.name, g, self.responses()))
        })
    }

    pub fn is_complete(&self) -> bool {
        is_complete(&self.catalog, self.responses())
    }

    /// Categories that still have uncovered groups.
    pub fn pending_categories(&self) -> Vec<&str> {
        self.catalog
            .categories
            .iter()
            .filter(|c| !self.is_category_complete(&c.name))
            .map(|c| c.name.as_str())
            .collect()
    }

    /// First uncovered group, or the final review when nothing is left.
    pub fn resume_point(&self) -> HierStep {
        for (ci, category) in self.catalog.categories.iter().enumerate() {
            for (gi, group) in category.groups.iter().enumerate() {
                if !is_group_complete(&category.name, group, self.responses()) {
                    return HierStep::ModeSelection {
                        category: ci,
                        group: gi,
                    };
                }
            }
        }
        HierStep::FinalReview
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Category;
    use crate::models::{Decision, LookBack};

    fn small_catalog() -> Catalog {
        Catalog {
            categories: vec![
                Category {
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
                },
                Category {
                    name: "Driving".to_string(),
                    description: String::new(),
                    groups: vec![SecondOrderGroup {
                        name: "DWI".to_string(),
                        offenses: vec!["DWI".to_string()],
                    }],
                },
            ],
        }
    }

    fn wizard() -> HierarchicalWizard {
        let mut w = HierarchicalWizard::new(
            small_catalog(),
            ResponseBatch::new(Some("ada".to_string()), Some("ada".to_string())),
        );
        w.start().unwrap();
        w.begin().unwrap();
        w
    }

    fn review_form(years: i64) -> DecisionForm {
        let mut form = DecisionForm::new();
        form.set_decision(Decision::AlwaysReview);
        form.set_years(years);
        form
    }

    fn response(group: &str, offense: &str, aggregate: bool) -> HierarchicalResponse {
        HierarchicalResponse::new(
            "Drug",
            group,
            offense,
            aggregate,
            Decision::JobDependent,
            Some(LookBack::Years(2)),
            None,
        )
        .unwrap()
    }

    #[test]
    fn test_aggregate_fans_out_to_members() {
        let mut w = wizard();
        w.select_category("Drug").unwrap();
        w.choose_mode(GroupMode::Aggregate).unwrap();
        let next = w.submit_decision(&review_form(4)).unwrap();

        assert_eq!(next, HierStep::ModeSelection { category: 0, group: 1 });
        assert_eq!(w.responses().len(), 2);
        assert!(w.responses().iter().all(|r| r.is_aggregate));
        assert!(w
            .responses()
            .iter()
            .all(|r| r.look_back == Some(LookBack::Years(4))));
        assert_eq!(w.existing_mode(0, 0), Some(GroupMode::Aggregate));
    }

    #[test]
    fn test_individual_walks_each_offense() {
        let mut w = wizard();
        w.select_category("Drug").unwrap();
        w.choose_mode(GroupMode::Individual).unwrap();
        assert_eq!(
            w.submit_decision(&DecisionForm::new()).unwrap(),
            HierStep::IndividualDecision {
                category: 0,
                group: 0,
                offense: 1
            }
        );
        w.submit_decision(&review_form(2)).unwrap();
        assert_eq!(w.step(), HierStep::ModeSelection { category: 0, group: 1 });
        assert_eq!(w.responses().len(), 2);
        assert_eq!(w.responses()[0].look_back, None);
    }

    #[test]
    fn test_switching_mode_never_mixes() {
        let mut w = wizard();
        w.select_category("Drug").unwrap();
        w.choose_mode(GroupMode::Aggregate).unwrap();
        w.submit_decision(&review_form(3)).unwrap();

        w.go_back();
        assert_eq!(w.step(), HierStep::ModeSelection { category: 0, group: 0 });
        w.choose_mode(GroupMode::Individual).unwrap();
        w.submit_decision(&DecisionForm::new()).unwrap();

        let group: Vec<_> = w
            .responses()
            .iter()
            .filter(|r| r.in_group("Drug", "Distribution"))
            .collect();
        assert_eq!(group.len(), 1);
        assert!(!group[0].is_aggregate);

        w.go_back();
        w.go_back();
        w.choose_mode(GroupMode::Aggregate).unwrap();
        w.submit_decision(&review_form(1)).unwrap();
        let group: Vec<_> = w
            .responses()
            .iter()
            .filter(|r| r.in_group("Drug", "Distribution"))
            .collect();
        assert_eq!(group.len(), 2);
        assert!(group.iter().all(|r| r.is_aggregate));
    }

    #[test]
    fn test_resubmitting_is_idempotent_by_key() {
        let mut w = wizard();
        w.select_category("Driving").unwrap();
        w.choose_mode(GroupMode::Individual).unwrap();
        w.submit_decision(&review_form(5)).unwrap();
        let mut w2 = HierarchicalWizard::resume(small_catalog(), w.batch().clone());
        assert_eq!(w2.step(), HierStep::ModeSelection { category: 0, group: 0 });

        w2.step = HierStep::IndividualDecision {
            category: 1,
            group: 0,
            offense: 0,
        };
        let prefill = w2.existing_decision().unwrap();
        assert_eq!(prefill.look_back(), Some(LookBack::Years(5)));
        w2.submit_decision(&review_form(6)).unwrap();
        assert_eq!(w2.responses().len(), 1);
        assert_eq!(w2.responses()[0].look_back, Some(LookBack::Years(6)));
    }

    #[test]
    fn test_category_end_returns_to_selection_then_review() {
        let mut w = wizard();
        w.select_category("Driving").unwrap();
        w.choose_mode(GroupMode::Aggregate).unwrap();
        assert_eq!(
            w.submit_decision(&DecisionForm::new()).unwrap(),
            HierStep::CategorySelection
        );
        assert!(w.is_category_complete("Driving"));
        assert_eq!(w.pending_categories(), vec!["Drug"]);

        w.select_category("Drug").unwrap();
        w.choose_mode(GroupMode::Aggregate).unwrap();
        w.submit_decision(&DecisionForm::new()).unwrap();
        w.choose_mode(GroupMode::Individual).unwrap();
        assert_eq!(
            w.submit_decision(&DecisionForm::new()).unwrap(),
            HierStep::FinalReview
        );
        assert!(w.is_complete());

        w.mark_submitted().unwrap();
        assert!(w.batch().completed);
        assert_eq!(w.step(), HierStep::Submitted);
    }

    #[test]
    fn test_go_back_navigation() {
        let mut w = wizard();
        w.select_category("Drug").unwrap();
        w.choose_mode(GroupMode::Individual).unwrap();
        w.submit_decision(&DecisionForm::new()).unwrap();

        assert!(w.go_back());
        assert_eq!(
            w.step(),
            HierStep::IndividualDecision {
                category: 0,
                group: 0,
                offense: 0
            }
        );
        assert_eq!(w.responses().len(), 1, "going back keeps saved responses");
        assert!(w.go_back());
        assert_eq!(w.step(), HierStep::ModeSelection { category: 0, group: 0 });
        assert!(w.go_back());
        assert_eq!(w.step(), HierStep::CategorySelection);
        assert!(w.go_back());
        assert_eq!(w.step(), HierStep::Instructions);
        assert!(!w.go_back());
    }

    #[test]
    fn test_completeness_predicate() {
        let catalog = small_catalog();
        let group = &catalog.categories[0].groups[0];

        assert!(!is_group_complete("Drug", group, &[]));
        assert!(is_group_complete(
            "Drug",
            group,
            &[response("Distribution", "Dist A", true)]
        ));
        assert!(is_group_complete(
            "Drug",
            group,
            &[
                response("Distribution", "Dist A", false),
                response("Distribution", "Dist B", false)
            ]
        ));
        assert!(!is_group_complete(
            "Drug",
            group,
            &[response("Distribution", "Dist A", false)]
        ));
        assert!(!is_group_complete(
            "Drug",
            group,
            &[
                response("Distribution", "Dist A", true),
                response("Distribution", "Dist B", false)
            ]
        ));
        assert!(!is_complete(
            &catalog,
            &[response("Distribution", "Dist A", true)]
        ));
    }

    fn catalog_with_empty_group() -> Catalog {
        Catalog {
            categories: vec![
                Category {
                    name: "Drug".to_string(),
                    description: String::new(),
                    groups: vec![
                        SecondOrderGroup {
                            name: "Empty".to_string(),
                            offenses: vec![],
                        },
                        SecondOrderGroup {
                            name: "Possession".to_string(),
                            offenses: vec!["Poss A".to_string()],
                        },
                        SecondOrderGroup {
                            name: "Also Empty".to_string(),
                            offenses: vec![],
                        },
                    ],
                },
                Category {
                    name: "Hollow".to_string(),
                    description: String::new(),
                    groups: vec![SecondOrderGroup {
                        name: "Nothing".to_string(),
                        offenses: vec![],
                    }],
                },
            ],
        }
    }

    #[test]
    fn test_empty_groups_are_skipped_and_complete() {
        let catalog = catalog_with_empty_group();
        assert!(is_group_complete("Drug", &catalog.categories[0].groups[0], &[]));

        let mut w = HierarchicalWizard::new(
            catalog,
            ResponseBatch::new(Some("ada".to_string()), None),
        );
        w.start().unwrap();
        w.begin().unwrap();
        assert!(w.select_category("Hollow").is_err());
        assert!(w.is_category_complete("Hollow"));

        assert_eq!(
            w.select_category("Drug").unwrap(),
            HierStep::ModeSelection { category: 0, group: 1 }
        );
        w.choose_mode(GroupMode::Individual).unwrap();
        assert!(w.existing_decision().is_none());
        assert_eq!(
            w.submit_decision(&DecisionForm::new()).unwrap(),
            HierStep::FinalReview
        );
        assert!(w.is_complete());
        assert_eq!(w.resume_point(), HierStep::FinalReview);

        w.return_to_categories().unwrap();
        w.select_category("Drug").unwrap();
        assert!(w.go_back());
        assert_eq!(w.step(), HierStep::CategorySelection);
    }

    #[test]
    fn test_choose_mode_rejects_empty_group() {
        let mut w = HierarchicalWizard::new(
            catalog_with_empty_group(),
            ResponseBatch::new(Some("ada".to_string()), None),
        );
        w.step = HierStep::ModeSelection {
            category: 0,
            group: 0,
        };
        assert!(w.choose_mode(GroupMode::Individual).is_err());
        assert!(w.choose_mode(GroupMode::Aggregate).is_err());
        assert_eq!(w.step(), HierStep::ModeSelection { category: 0, group: 0 });
    }

    #[test]
    fn test_unknown_category_rejected() {
        let mut w = wizard();
        assert!(w.select_category("Space Piracy").is_err());
        assert_eq!(w.step(), HierStep::CategorySelection);
    }

    #[test]
    fn test_review_requires_completion() {
        let mut w = wizard();
        assert!(w.review().is_err());
    }
}
