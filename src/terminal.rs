//! Terminal front end for the survey.
//!
//! Prompts come from an [`Input`]: stdin for interactive runs, or a JSON
//! array of strings for scripted runs (`collect --answers FILE`). Entering
//! `b` at a decision prompt goes back one screen.

use crate::catalog::Catalog;
use crate::error::{Result, SurveyError};
use crate::models::{Decision, GroupMode, ResponseBatch};
use crate::report::generate_review_summary;
use crate::store::{autosave, BatchStore};
use crate::wizard::identity;
use crate::wizard::submit::record_interest;
use crate::wizard::{
    ConflictChoice, DecisionForm, FinalSubmission, FlatStep, FlatWizard, HierStep,
    HierarchicalWizard, Resolution, SessionStart, SubmitStatus, UsernameConflict,
};
use std::collections::VecDeque;
use std::io::{BufRead, Write};
use std::path::Path;
use tracing::{debug, info};
use uuid::Uuid;

const BACK: &str = "b";

/// Source of answers to prompts.
pub trait Input {
    fn read_line(&mut self, prompt: &str) -> Result<String>;
}

/// Reads answers from stdin.
pub struct StdinInput;

impl Input for StdinInput {
    fn read_line(&mut self, prompt: &str) -> Result<String> {
        print!("{} ", prompt);
        std::io::stdout().flush()?;
        let mut line = String::new();
        if std::io::stdin().lock().read_line(&mut line)? == 0 {
            return Err(input_closed());
        }
        Ok(line.trim().to_string())
    }
}

/// Answers fixed in advance, consumed in order.
#[derive(Debug, Clone, Default)]
pub struct ScriptedInput {
    answers: VecDeque<String>,
}

impl ScriptedInput {
    pub fn new<S: Into<String>>(answers: impl IntoIterator<Item = S>) -> Self {
        Self {
            answers: answers.into_iter().map(Into::into).collect(),
        }
    }

    /// Load a JSON array of strings.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let answers: Vec<String> = serde_json::from_str(&content)?;
        Ok(Self::new(answers))
    }

    pub fn remaining(&self) -> usize {
        self.answers.len()
    }
}

impl Input for ScriptedInput {
    fn read_line(&mut self, prompt: &str) -> Result<String> {
        let answer = self.answers.pop_front().ok_or_else(input_closed)?;
        println!("{} {}", prompt, answer);
        Ok(answer.trim().to_string())
    }
}

fn input_closed() -> SurveyError {
    SurveyError::Io(std::io::Error::new(
        std::io::ErrorKind::UnexpectedEof,
        "input ended before the survey was finished",
    ))
}

fn print_instructions() {
    println!();
    println!("For each offense choose one of:");
    for (i, decision) in Decision::ALL.iter().enumerate() {
        println!("  [{}] {}", i + 1, decision);
    }
    println!("Job Dependent and Always Review also need a look-back period:");
    println!("how many years of conviction history matter (1-10, or no time limit).");
    println!("Enter '{}' at a decision prompt to go back.", BACK);
    println!();
}

/// Fill in a decision form. `Ok(None)` means the respondent asked to go back.
fn ask_form<I: Input>(input: &mut I, mut form: DecisionForm) -> Result<Option<DecisionForm>> {
    loop {
        let answer = input.read_line(&format!(
            "Decision [1-3, current: {}, '{}' = back]:",
            form.decision(),
            BACK
        ))?;
        if answer.eq_ignore_ascii_case(BACK) {
            return Ok(None);
        }
        if answer.is_empty() {
            // Re-applying fills in the default look-back when none is set yet.
            form.set_decision(form.decision());
            break;
        }
        match Decision::parse(&answer) {
            Some(decision) => {
                form.set_decision(decision);
                break;
            }
            None => println!("  Please enter 1, 2 or 3."),
        }
    }

    if form.decision().needs_look_back() {
        loop {
            let current = form
                .look_back()
                .map(|lb| lb.to_string())
                .unwrap_or_default();
            let answer = input.read_line(&format!(
                "Look-back years [1-10, 'n' = no time limit, current: {}]:",
                current
            ))?;
            match answer.to_lowercase().as_str() {
                "" => break,
                "n" | "none" | "no limit" | "no time limit" => {
                    form.set_no_time_limit(true);
                    break;
                }
                other => match other.parse::<i64>() {
                    Ok(years) => {
                        form.set_no_time_limit(false);
                        form.set_years(years);
                        break;
                    }
                    Err(_) => println!("  Please enter a number of years or 'n'."),
                },
            }
        }
    }

    let prompt = if form.notes().is_empty() {
        "Notes (optional):".to_string()
    } else {
        format!("Notes (current: {}, '-' to clear):", form.notes())
    };
    let notes = input.read_line(&prompt)?;
    if notes == "-" {
        form.set_notes("");
    } else if !notes.is_empty() {
        form.set_notes(notes);
    }

    Ok(Some(form))
}

async fn ask_interest<I: Input>(input: &mut I, store: &dyn BatchStore) -> Result<()> {
    let email = input.read_line("Email for updates on the results (optional):")?;
    if !email.is_empty() && record_interest(store, &email).await {
        println!("Thanks, we'll keep you posted.");
    }
    Ok(())
}

/// Run the flat survey. Returns the submitted batch id.
pub async fn run_flat<I: Input>(
    input: &mut I,
    store: &dyn BatchStore,
    offenses: Vec<String>,
) -> Result<Uuid> {
    let mut wizard = FlatWizard::new(offenses);
    let mut submission = FinalSubmission::new();

    loop {
        match wizard.step() {
            FlatStep::NotStarted => {
                let name = input.read_line("Your name:")?;
                if let Err(e) = wizard.start(&name) {
                    println!("  {}", e);
                }
            }
            FlatStep::Instructions => {
                print_instructions();
                wizard.begin()?;
            }
            FlatStep::Offense(i) => {
                let offense = wizard.offenses()[i].clone();
                println!("\n[{}/{}] {}", i + 1, wizard.total(), offense);
                match ask_form(input, DecisionForm::new())? {
                    None => {
                        if !wizard.go_back() {
                            println!("  Already at the first offense.");
                        }
                    }
                    Some(form) => {
                        if let Err(e) = wizard.submit_form(&form) {
                            println!("  {}", e);
                        }
                    }
                }
            }
            FlatStep::FinalReview => {
                let mut preview = ResponseBatch::new(None, wizard.respondent().map(String::from));
                preview.responses = wizard.responses().to_vec();
                println!("\n{}", generate_review_summary(&preview, &Catalog { categories: vec![] }));

                let emails = input.read_line(&format!(
                    "Send results to (comma-separated emails, '{}' = back, 'r' = start over):",
                    BACK
                ))?;
                if emails.eq_ignore_ascii_case(BACK) {
                    wizard.go_back();
                    continue;
                }
                if emails.eq_ignore_ascii_case("r") {
                    wizard.restart();
                    continue;
                }

                submission.submit_flat(store, &wizard, &emails).await;
                let status = submission.status().clone();
                if let Some(message) = status.message() {
                    println!("{}", message);
                }
                if let SubmitStatus::Success(id) = status {
                    wizard.mark_submitted()?;
                    ask_interest(input, store).await?;
                    return Ok(id);
                }
            }
            FlatStep::Submitted => {
                return Err(SurveyError::InvalidTransition(
                    "survey already submitted".to_string(),
                ))
            }
        }
    }
}

fn describe_conflict(conflict: &UsernameConflict) {
    if conflict.is_completed() {
        println!(
            "\nThe username '{}' has already completed the survey. Is this you?",
            conflict.username
        );
        println!("  [y] Yes, show my results");
        println!("  [n] No, let me choose a different username");
    } else {
        println!(
            "\nThe username '{}' has an unfinished survey ({} responses saved).",
            conflict.username,
            conflict.existing.response_count()
        );
        println!("  [c] Continue where I left off");
        println!("  [s] Start over (deletes saved responses)");
        println!("  [u] Use a different username");
    }
}

fn parse_choice(conflict: &UsernameConflict, answer: &str) -> Option<ConflictChoice> {
    let choice = match answer.to_lowercase().as_str() {
        "y" | "yes" => ConflictChoice::ConfirmIdentity,
        "n" | "no" => ConflictChoice::DenyIdentity,
        "c" | "continue" => ConflictChoice::Continue,
        "s" | "start over" => ConflictChoice::StartOver,
        "u" | "username" => ConflictChoice::ChangeUsername,
        _ => return None,
    };
    conflict.choices().contains(&choice).then_some(choice)
}

/// How a hierarchical session ended.
#[derive(Debug, Clone, PartialEq)]
pub enum HierarchicalOutcome {
    /// A new submission was made.
    Submitted(ResponseBatch),
    /// The username had already finished; its results were shown.
    AlreadyCompleted(ResponseBatch),
}

/// Claim a username and return a wizard ready to run.
async fn open_session<I: Input>(
    input: &mut I,
    store: &dyn BatchStore,
    catalog: &Catalog,
    mut username: Option<String>,
    min_len: usize,
) -> Result<std::result::Result<HierarchicalWizard, ResponseBatch>> {
    loop {
        let raw = match username.take() {
            Some(name) => name,
            None => input.read_line("Choose a username:")?,
        };

        let conflict = match identity::start_session(store, &raw, min_len).await {
            Ok(SessionStart::Fresh(batch)) => {
                let mut wizard = HierarchicalWizard::new(catalog.clone(), batch);
                wizard.start()?;
                return Ok(Ok(wizard));
            }
            Ok(SessionStart::Conflict(conflict)) => conflict,
            Err(SurveyError::Validation(msg)) => {
                println!("  {}", msg);
                continue;
            }
            Err(e) => return Err(e),
        };

        describe_conflict(&conflict);
        let choice = loop {
            let answer = input.read_line("Your choice:")?;
            match parse_choice(&conflict, &answer) {
                Some(choice) => break choice,
                None => println!("  Please pick one of the options above."),
            }
        };

        match identity::resolve(store, conflict, choice).await? {
            Resolution::ViewResults(batch) => return Ok(Err(batch)),
            Resolution::Resume(batch) => {
                info!("Resuming batch {}", batch.batch_id);
                return Ok(Ok(HierarchicalWizard::resume(catalog.clone(), batch)));
            }
            Resolution::Restarted(batch) => {
                let mut wizard = HierarchicalWizard::new(catalog.clone(), batch);
                wizard.start()?;
                return Ok(Ok(wizard));
            }
            Resolution::ChooseAnotherUsername => continue,
        }
    }
}

fn print_categories(wizard: &HierarchicalWizard) {
    println!("\nCategories:");
    for (i, category) in wizard.catalog().categories.iter().enumerate() {
        let mark = if wizard.is_category_complete(&category.name) {
            "x"
        } else {
            " "
        };
        println!("  [{}] {}. {}", mark, i + 1, category.name);
        if !category.description.is_empty() {
            println!("        {}", category.description);
        }
    }
}

/// Run the hierarchical survey.
pub async fn run_hierarchical<I: Input>(
    input: &mut I,
    store: &dyn BatchStore,
    catalog: Catalog,
    username: Option<String>,
    min_len: usize,
) -> Result<HierarchicalOutcome> {
    let mut wizard = match open_session(input, store, &catalog, username, min_len).await? {
        Ok(wizard) => wizard,
        Err(completed) => {
            println!("\n{}", generate_review_summary(&completed, &catalog));
            return Ok(HierarchicalOutcome::AlreadyCompleted(completed));
        }
    };
    let mut submission = FinalSubmission::new();

    loop {
        debug!("Hierarchical step {:?}", wizard.step());
        match wizard.step() {
            HierStep::NotStarted => {
                wizard.start()?;
            }
            HierStep::Instructions => {
                print_instructions();
                println!("Each group can get one decision for all of its offenses,");
                println!("or a separate decision per offense.");
                wizard.begin()?;
            }
            HierStep::CategorySelection => {
                print_categories(&wizard);
                let answer =
                    input.read_line("Category number ('r' = review and submit):")?;
                if answer.eq_ignore_ascii_case("r") {
                    if let Err(e) = wizard.review() {
                        println!("  {}", e);
                        println!("  Still open: {}", wizard.pending_categories().join(", "));
                    }
                    continue;
                }
                let name = answer
                    .parse::<usize>()
                    .ok()
                    .and_then(|n| n.checked_sub(1))
                    .and_then(|i| wizard.catalog().categories.get(i))
                    .map(|c| c.name.clone());
                match name {
                    Some(name) => {
                        wizard.select_category(&name)?;
                    }
                    None => println!("  Please enter a category number."),
                }
            }
            HierStep::ModeSelection { category, group } => {
                let cat = &wizard.catalog().categories[category];
                let grp = &cat.groups[group];
                println!("\n{} > {}", cat.name, grp.name);
                for offense in &grp.offenses {
                    println!("  - {}", offense);
                }
                let current = match wizard.existing_mode(category, group) {
                    Some(GroupMode::Aggregate) => " (saved: all)",
                    Some(GroupMode::Individual) => " (saved: each)",
                    None => "",
                };
                let answer = input.read_line(&format!(
                    "[a] one decision for all, [i] decide each{}, '{}' = back:",
                    current, BACK
                ))?;
                match answer.to_lowercase().as_str() {
                    "a" => {
                        wizard.choose_mode(GroupMode::Aggregate)?;
                    }
                    "i" => {
                        wizard.choose_mode(GroupMode::Individual)?;
                    }
                    BACK => {
                        wizard.go_back();
                    }
                    _ => println!("  Please enter 'a' or 'i'."),
                }
            }
            HierStep::AggregateDecision { category, group }
            | HierStep::IndividualDecision {
                category, group, ..
            } => {
                let cat = &wizard.catalog().categories[category];
                let grp = &cat.groups[group];
                match wizard.step() {
                    HierStep::IndividualDecision { offense, .. } => println!(
                        "\n{} > {} > {} [{}/{}]",
                        cat.name,
                        grp.name,
                        grp.offenses[offense],
                        offense + 1,
                        grp.offenses.len()
                    ),
                    _ => println!("\n{} > {} (all offenses)", cat.name, grp.name),
                }

                let form = wizard.existing_decision().unwrap_or_default();
                match ask_form(input, form)? {
                    None => {
                        wizard.go_back();
                    }
                    Some(form) => match wizard.submit_decision(&form) {
                        Ok(_) => {
                            autosave(store, wizard.batch()).await;
                        }
                        Err(e) => println!("  {}", e),
                    },
                }
            }
            HierStep::FinalReview => {
                println!("\n{}", generate_review_summary(wizard.batch(), &catalog));
                let answer = input.read_line(&format!(
                    "[s] submit, '{}' = back to categories:",
                    BACK
                ))?;
                if answer.eq_ignore_ascii_case(BACK) {
                    wizard.return_to_categories()?;
                    continue;
                }
                if !answer.eq_ignore_ascii_case("s") {
                    continue;
                }

                submission
                    .submit_hierarchical(store, wizard.batch())
                    .await;
                let status = submission.status().clone();
                if let Some(message) = status.message() {
                    println!("{}", message);
                }
                if let SubmitStatus::Success(id) = status {
                    wizard.mark_submitted()?;
                    ask_interest(input, store).await?;
                    let mut batch = wizard.into_batch();
                    batch.batch_id = id;
                    return Ok(HierarchicalOutcome::Submitted(batch));
                }
            }
            HierStep::Submitted => {
                return Ok(HierarchicalOutcome::Submitted(wizard.into_batch()));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Category, SecondOrderGroup};
    use crate::models::LookBack;
    use crate::store::MemoryStore;

    fn small_catalog() -> Catalog {
        Catalog {
            categories: vec![
                Category {
                    name: "Drug".to_string(),
                    description: String::new(),
                    groups: vec![SecondOrderGroup {
                        name: "Distribution".to_string(),
                        offenses: vec!["Dist A".to_string(), "Dist B".to_string()],
                    }],
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

    #[test]
    fn test_scripted_input_runs_out() {
        let mut input = ScriptedInput::new(["one"]);
        assert_eq!(input.read_line("?").unwrap(), "one");
        assert!(matches!(input.read_line("?"), Err(SurveyError::Io(_))));
    }

    #[test]
    fn test_scripted_input_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("answers.json");
        std::fs::write(&path, r#"["Ada", "1"]"#).unwrap();
        let input = ScriptedInput::from_file(&path).unwrap();
        assert_eq!(input.remaining(), 2);
    }

    #[test]
    fn test_ask_form_defaults_and_no_limit() {
        let mut input = ScriptedInput::new(["2", "", ""]);
        let form = ask_form(&mut input, DecisionForm::new()).unwrap().unwrap();
        assert_eq!(form.decision(), Decision::JobDependent);
        assert_eq!(form.look_back(), Some(LookBack::Years(1)));

        let mut input = ScriptedInput::new(["review", "n", "serious"]);
        let form = ask_form(&mut input, DecisionForm::new()).unwrap().unwrap();
        assert_eq!(form.decision(), Decision::AlwaysReview);
        assert_eq!(form.look_back(), Some(LookBack::NoLimit));
        assert_eq!(form.notes(), "serious");

        let mut input = ScriptedInput::new(["b"]);
        assert!(ask_form(&mut input, DecisionForm::new()).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_flat_run_with_back_and_retry() {
        let store = MemoryStore::new();
        let offenses = vec!["Arson".to_string(), "Theft".to_string()];
        let mut input = ScriptedInput::new([
            "Ada", // name
            "1", "", // Arson: eligible, notes
            "b", // back to Arson
            "2", "4", "", // Arson: job dependent, 4 years
            "3", "", "", // Theft: review, default 1 year
            "not-an-email", // rejected
            "ops@example.com",
            "", // no interest email
        ]);

        let id = run_flat(&mut input, &store, offenses).await.unwrap();
        assert_eq!(input.remaining(), 0);

        let stored = store.all().await;
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].batch_id, id);
        assert_eq!(stored[0].recipient_emails, vec!["ops@example.com"]);
        assert_eq!(stored[0].responses[0].look_back, Some(LookBack::Years(4)));
        assert_eq!(stored[0].responses[1].decision, Decision::AlwaysReview);
    }

    #[tokio::test]
    async fn test_hierarchical_run_autosaves_and_submits() {
        let store = MemoryStore::new();
        let mut input = ScriptedInput::new([
            "ada", // username
            "1", // Drug
            "a", // all offenses at once
            "2", "3", "", // job dependent, 3 years
            "2", // Driving
            "i", // decide each
            "1", "", // DWI eligible
            "s", // submit
            "fan@example.org",
        ]);

        let outcome = run_hierarchical(&mut input, &store, small_catalog(), None, 3)
            .await
            .unwrap();
        let batch = match outcome {
            HierarchicalOutcome::Submitted(b) => b,
            other => panic!("unexpected {:?}", other),
        };

        assert!(batch.completed);
        assert_eq!(batch.hierarchical_responses.len(), 3);
        let stored = store.find_by_username("ada").await.unwrap();
        assert!(stored.completed);
        assert_eq!(stored.hierarchical_responses.len(), 3);
        assert_eq!(store.interest_emails().await.len(), 1);
    }

    #[tokio::test]
    async fn test_hierarchical_completed_username_shows_results() {
        let store = MemoryStore::new();
        let mut done = ResponseBatch::new(Some("ada".to_string()), Some("ada".to_string()));
        done.completed = true;
        store.insert(&done).await.unwrap();

        let mut input = ScriptedInput::new(["ada", "y"]);
        let outcome = run_hierarchical(&mut input, &store, small_catalog(), None, 3)
            .await
            .unwrap();
        assert!(matches!(outcome, HierarchicalOutcome::AlreadyCompleted(b) if b.batch_id == done.batch_id));
    }

    #[tokio::test]
    async fn test_short_username_is_reprompted() {
        let store = MemoryStore::new();
        let mut input = ScriptedInput::new(["ab"]);
        let err = run_hierarchical(&mut input, &store, small_catalog(), None, 3)
            .await
            .unwrap_err();
        assert!(matches!(err, SurveyError::Io(_)));
        assert!(store.all().await.is_empty());
    }
}
