//! Session ownership and the operator-facing run loop.

pub mod agent_loop;
pub mod session;
pub mod submission;

pub use agent_loop::{Agent, Control};
pub use session::{Session, StatusLevel, StatusLine};
pub use submission::{Submission, SubmissionParser};
