//! Annotation jobs: submission, per-photo pending state and status polling.

mod pending;
mod poller;
mod submitter;

pub use pending::{ItemStatus, PendingItems};
pub use poller::{reconcile, PollPhase, Revalidate, StatusPoller, TickReport};
pub use submitter::JobSubmitter;
