//! Final submission and interest-email capture.

use crate::error::{Result, SurveyError};
use crate::models::{InterestEmail, ResponseBatch};
use crate::store::BatchStore;
use crate::wizard::flat::{FlatStep, FlatWizard};
use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{error, info, warn};
use uuid::Uuid;

static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email pattern is valid"));

/// Whether a single address looks like an email.
pub fn is_valid_email(email: &str) -> bool {
    EMAIL_RE.is_match(email)
}

/// Split a comma-separated recipient list; at least one, all valid.
pub fn parse_recipient_emails(raw: &str) -> Result<Vec<String>> {
    let emails: Vec<String> = raw
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect();

    if emails.is_empty() || !emails.iter().all(|e| is_valid_email(e)) {
        return Err(SurveyError::validation(
            "Please provide at least one valid email (comma-separated if multiple).",
        ));
    }
    Ok(emails)
}

/// Progress of the final submission.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SubmitStatus {
    #[default]
    Idle,
    Loading,
    Error(String),
    Success(Uuid),
}

impl SubmitStatus {
    /// Submitting is allowed before the first attempt and after a failure.
    pub fn can_submit(&self) -> bool {
        matches!(self, SubmitStatus::Idle | SubmitStatus::Error(_))
    }

    pub fn message(&self) -> Option<String> {
        match self {
            SubmitStatus::Idle => None,
            SubmitStatus::Loading => Some("Submitting...".to_string()),
            SubmitStatus::Error(msg) => Some(msg.clone()),
            SubmitStatus::Success(id) => Some(format!("Submission successful! Reference ID: {}", id)),
        }
    }
}

/// Final submission of a finished survey.
#[derive(Debug, Default)]
pub struct FinalSubmission {
    status: SubmitStatus,
}

impl FinalSubmission {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(&self) -> &SubmitStatus {
        &self.status
    }

    /// Submit a finished flat survey as a new completed batch.
    pub async fn submit_flat(
        &mut self,
        store: &dyn BatchStore,
        wizard: &FlatWizard,
        raw_emails: &str,
    ) -> &SubmitStatus {
        if !self.status.can_submit() {
            return &self.status;
        }
        if wizard.step() != FlatStep::FinalReview {
            self.status = SubmitStatus::Error("Finish every offense before submitting.".to_string());
            return &self.status;
        }
        let recipients = match parse_recipient_emails(raw_emails) {
            Ok(r) => r,
            Err(e) => {
                self.status = SubmitStatus::Error(validation_message(e));
                return &self.status;
            }
        };

        self.status = SubmitStatus::Loading;

        let mut batch = ResponseBatch::new(None, wizard.respondent().map(String::from));
        batch.recipient_emails = recipients;
        batch.responses = wizard.responses().to_vec();
        batch.completed = true;

        self.status = match store.insert(&batch).await {
            Ok(()) => {
                info!("Submitted batch {}", batch.batch_id);
                SubmitStatus::Success(batch.batch_id)
            }
            Err(e) => {
                error!("Submission error: {}", e);
                SubmitStatus::Error(e.to_string())
            }
        };
        &self.status
    }

    /// Mark a hierarchical batch complete, inserting it if the store lost it.
    pub async fn submit_hierarchical(
        &mut self,
        store: &dyn BatchStore,
        batch: &ResponseBatch,
    ) -> &SubmitStatus {
        if !self.status.can_submit() {
            return &self.status;
        }
        self.status = SubmitStatus::Loading;

        let mut final_batch = batch.clone();
        final_batch.completed = true;
        final_batch.touch();

        let existing = match final_batch.username.as_deref() {
            Some(username) => match store.find_by_username(username).await {
                Ok(existing) => Some(existing),
                Err(e) if e.is_not_found() => None,
                Err(e) => {
                    warn!("Lookup of '{}' failed, inserting instead: {}", username, e);
                    None
                }
            },
            None => None,
        };

        let result = match existing {
            Some(existing) => {
                final_batch.batch_id = existing.batch_id;
                store.update(&final_batch).await
            }
            None => {
                final_batch.batch_id = Uuid::new_v4();
                store.insert(&final_batch).await
            }
        };

        self.status = match result {
            Ok(()) => {
                info!("Submitted batch {}", final_batch.batch_id);
                SubmitStatus::Success(final_batch.batch_id)
            }
            Err(e) => {
                error!("Submission error: {}", e);
                SubmitStatus::Error("Failed to submit. Please try again.".to_string())
            }
        };
        &self.status
    }
}

fn validation_message(e: SurveyError) -> String {
    match e {
        SurveyError::Validation(msg) => msg,
        other => other.to_string(),
    }
}

/// Save a mailing-list signup. Never affects the survey submission.
pub async fn record_interest(store: &dyn BatchStore, raw_email: &str) -> bool {
    let email = raw_email.trim();
    if !is_valid_email(email) {
        warn!("Ignoring invalid interest email '{}'", email);
        return false;
    }
    let entry = InterestEmail {
        email: email.to_string(),
        submitted_at: Utc::now(),
    };
    match store.save_interest_email(&entry).await {
        Ok(()) => true,
        Err(e) => {
            error!("Failed to save interest email: {}", e);
            false
        }
    }
}
