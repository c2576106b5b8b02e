//! Response collection flows.
//!
//! Two variants share the decision form and the submission logic:
//! - [`flat`] walks a flat offense list one step at a time
//! - [`hierarchical`] walks categories and second-order groups, each answered
//!   in aggregate or per offense

pub mod flat;
pub mod form;
pub mod hierarchical;
pub mod identity;
pub mod submit;

pub use flat::{FlatStep, FlatWizard};
pub use form::DecisionForm;
pub use hierarchical::{HierStep, HierarchicalWizard};
pub use identity::{ConflictChoice, Resolution, SessionStart, UsernameConflict};
pub use submit::{FinalSubmission, SubmitStatus};
