//! Username conflict resolution at session start.
//!
//! A username owns at most one batch. Starting a session either creates it,
//! or finds an existing one and offers the choices that fit its state.

use crate::error::{Result, SurveyError};
use crate::models::ResponseBatch;
use crate::store::{BatchStore, CreateOutcome};
use tracing::{info, warn};

/// Shortest accepted username.
pub const MIN_USERNAME_LEN: usize = 3;

/// Trim and check a username.
pub fn validate_username(raw: &str, min_len: usize) -> Result<String> {
    let username = raw.trim();
    if username.chars().count() < min_len {
        return Err(SurveyError::validation(format!(
            "Username must be at least {} characters",
            min_len
        )));
    }
    Ok(username.to_string())
}

/// What the respondent can do about an existing batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictChoice {
    /// "Yes, show my results" (completed batch).
    ConfirmIdentity,
    /// "No, let me choose a different username" (completed batch).
    DenyIdentity,
    /// Resume where the batch left off (incomplete batch).
    Continue,
    /// Delete the batch and begin again (incomplete batch).
    StartOver,
    /// Pick another username (incomplete batch).
    ChangeUsername,
}

/// An existing batch found for the requested username.
#[derive(Debug, Clone, PartialEq)]
pub struct UsernameConflict {
    pub username: String,
    pub existing: ResponseBatch,
}

impl UsernameConflict {
    pub fn is_completed(&self) -> bool {
        self.existing.completed
    }

    /// Choices offered for this conflict.
    pub fn choices(&self) -> &'static [ConflictChoice] {
        if self.is_completed() {
            &[ConflictChoice::ConfirmIdentity, ConflictChoice::DenyIdentity]
        } else {
            &[
                ConflictChoice::Continue,
                ConflictChoice::StartOver,
                ConflictChoice::ChangeUsername,
            ]
        }
    }
}

/// Outcome of starting a session.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionStart {
    /// A new batch is ready for this username.
    Fresh(ResponseBatch),
    /// The username is taken; ask the respondent.
    Conflict(UsernameConflict),
}

/// Outcome of a conflict choice.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// Show the completed batch.
    ViewResults(ResponseBatch),
    /// Continue the incomplete batch.
    Resume(ResponseBatch),
    /// The old batch was deleted; this is its replacement.
    Restarted(ResponseBatch),
    /// Go back to the username prompt.
    ChooseAnotherUsername,
}

async fn create_for(store: &dyn BatchStore, username: &str) -> Result<SessionStart> {
    let batch = ResponseBatch::new(Some(username.to_string()), Some(username.to_string()));
    match store.create_if_absent(&batch).await {
        Ok(CreateOutcome::Created) => {
            info!("Created batch {} for '{}'", batch.batch_id, username);
            Ok(SessionStart::Fresh(batch))
        }
        Ok(CreateOutcome::Existing(existing)) => Ok(SessionStart::Conflict(UsernameConflict {
            username: username.to_string(),
            existing,
        })),
        Err(e) if e.is_not_found() => Ok(SessionStart::Fresh(batch)),
        Err(e) => {
            warn!("Could not check username '{}': {}", username, e);
            Ok(SessionStart::Fresh(batch))
        }
    }
}

/// Claim a username, creating its batch when it is free.
pub async fn start_session(
    store: &dyn BatchStore,
    raw_username: &str,
    min_len: usize,
) -> Result<SessionStart> {
    let username = validate_username(raw_username, min_len)?;
    create_for(store, &username).await
}

/// Apply the respondent's choice to a conflict.
pub async fn resolve(
    store: &dyn BatchStore,
    conflict: UsernameConflict,
    choice: ConflictChoice,
) -> Result<Resolution> {
    if !conflict.choices().contains(&choice) {
        return Err(SurveyError::InvalidTransition(format!(
            "{:?} is not available for this username",
            choice
        )));
    }

    match choice {
        ConflictChoice::ConfirmIdentity => Ok(Resolution::ViewResults(conflict.existing)),
        ConflictChoice::Continue => Ok(Resolution::Resume(conflict.existing)),
        ConflictChoice::DenyIdentity | ConflictChoice::ChangeUsername => {
            Ok(Resolution::ChooseAnotherUsername)
        }
        ConflictChoice::StartOver => {
            store.delete(conflict.existing.batch_id).await?;
            info!(
                "Deleted batch {} for '{}'",
                conflict.existing.batch_id, conflict.username
            );
            match create_for(store, &conflict.username).await? {
                SessionStart::Fresh(batch) => Ok(Resolution::Restarted(batch)),
                SessionStart::Conflict(_) => Err(SurveyError::InvalidTransition(format!(
                    "username '{}' was claimed again before it could be recreated",
                    conflict.username
                ))),
            }
        }
    }
}
