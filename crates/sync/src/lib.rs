//! Reconciliation of a local replica against a remote one.
//!
//! A pass runs in four steps:
//! 1. [`discover()`] lists both sides below a root and returns unprobed
//!    candidates.
//! 2. [`probe()`] fills in each candidate's local and remote side.
//! 3. [`Reconciler::prompt`] enqueues the candidates that need action and
//!    [decides](decide) a direction for each according to the [`Mode`].
//! 4. [`Reconciler::execute`] confirms and runs the work list.
//!
//! [`reconcile()`] chains the first three.

mod decision;
mod discover;
pub mod error;
mod execute;
mod mode;
mod probe;
mod reconciler;
mod size;

pub use crate::decision::{Decision, Direction, Stage, Warning, decide};
pub use crate::discover::discover;
pub use crate::execute::{AcceptAll, Confirm, ExecuteEvent, Executor, Report, Transfer, Verdict};
pub use crate::mode::Mode;
pub use crate::probe::{DEFAULT_PROBE_CONCURRENCY, probe, probe_stream};
pub use crate::reconciler::{Item, Reconciler};
pub use crate::size::format_size;
pub use tokio_util::sync::CancellationToken;

use crate::error::Result;
use duet_storage::{Entry, Features};
use tracing::instrument;

/// Discover, probe and prompt everything below `root`.
///
/// Returns the number of entries that were enqueued.
#[instrument(skip_all, fields(root = %root.path().display()))]
pub async fn reconcile(
    reconciler: &Reconciler,
    local: &Features,
    remote: &Features,
    root: &Entry,
    concurrency: usize,
) -> Result<usize> {
    let candidates = discover(local, remote, root).await?;
    let total = candidates.len();
    let mut prompted = 0;
    for entry in probe(local, remote, candidates, concurrency).await {
        if reconciler.prompt(entry).await? {
            prompted += 1;
        }
    }
    tracing::info!(candidates = total, prompted, "Reconciliation prepared");
    Ok(prompted)
}
