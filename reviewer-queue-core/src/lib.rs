//! Round-robin pull request reviewer selection with fairness accounting.
//!
//! Everything in this crate is pure: the caller supplies the persisted
//! [`AssignmentState`] and the facts about one request, and gets back the next
//! state plus the reviewer to ask. Loading, storing and talking to the code
//! host are the caller's business.

pub mod eligibility;
pub mod error;
pub mod reconcile;
pub mod rotation;
pub mod shadows;
pub mod state;
pub mod stats;
pub mod transition;

pub use eligibility::filter_eligible;
pub use error::{AssignError, NoEligibleReviewer};
pub use reconcile::reconcile;
pub use rotation::select;
pub use shadows::{resolve_shadows, ShadowConfigWarning, ShadowMap};
pub use state::*;
pub use stats::{record_assignment, render_report, report, StatsLine};
pub use transition::{assign, reset, AssignmentOutcome};
