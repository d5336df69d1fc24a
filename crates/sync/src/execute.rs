//! Collaborators of [`Reconciler::execute`](crate::Reconciler::execute).

use crate::decision::Direction;
use crate::reconciler::Item;
use async_trait::async_trait;
use duet_storage::error::{ErrorKind as StorageErrorKind, Result as StorageResult};
use duet_storage::{Entry, Features};
use std::path::PathBuf;
use std::sync::Arc;

/// Byte-level copy of a file between the two sides.
#[async_trait]
pub trait Transfer: Send + Sync {
    async fn transfer(&self, entry: &Entry, direction: Direction) -> StorageResult<()>;
}

/// Answer of the confirmation step for a whole work list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Accept,
    Reject,
    /// Accept, except for these paths (which become skipped).
    Skip(Vec<PathBuf>),
}

/// User confirmation of a work list before anything is executed.
#[async_trait]
pub trait Confirm: Send + Sync {
    async fn confirm(&self, work: &[Item]) -> Verdict;
}

#[async_trait]
impl<F> Confirm for F
where
    F: Fn(&[Item]) -> Verdict + Send + Sync,
{
    async fn confirm(&self, work: &[Item]) -> Verdict {
        self(work)
    }
}

/// Confirms every work list.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAll;

#[async_trait]
impl Confirm for AcceptAll {
    async fn confirm(&self, _work: &[Item]) -> Verdict {
        Verdict::Accept
    }
}

/// Progress events emitted by [`Reconciler::execute`](crate::Reconciler::execute).
///
/// [`Started`](Self::Started) is emitted once after confirmation, followed by
/// one [`Executed`](Self::Executed) or [`Failed`](Self::Failed) per entry, and
/// finally [`Cancelled`](Self::Cancelled) or [`Complete`](Self::Complete).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecuteEvent {
    Started { total: usize },
    Executed { path: PathBuf, direction: Direction },
    Failed { path: PathBuf, direction: Direction },
    Cancelled,
    Complete,
}

/// Outcome of an execution pass.
#[derive(Debug, Default)]
pub struct Report {
    pub executed: Vec<PathBuf>,
    pub skipped: Vec<PathBuf>,
    pub failed: Vec<(PathBuf, duet_storage::error::Error)>,
    /// Entries that never reached a decision.
    pub undetermined: Vec<PathBuf>,
    pub cancelled: bool,
}

/// Runs decided entries against both sides' feature sets.
#[derive(Clone)]
pub struct Executor {
    local: Features,
    remote: Features,
    transfer: Arc<dyn Transfer>,
    region: Option<String>,
}

impl Executor {
    pub fn new(local: Features, remote: Features, transfer: Arc<dyn Transfer>) -> Self {
        Self {
            local,
            remote,
            transfer,
            region: None,
        }
    }

    /// Region hint for volumes created on the remote side.
    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    fn target(&self, direction: Direction) -> &Features {
        match direction {
            Direction::Download => &self.local,
            Direction::Upload => &self.remote,
        }
    }

    /// Execute one entry; returns it with the target side updated.
    pub async fn run(&self, entry: &Entry, direction: Direction) -> StorageResult<Entry> {
        let mut updated = match entry.is_directory() {
            true => match self.target(direction).directories.mkdir(entry, self.region.as_deref()).await {
                Ok(created) => created,
                Err(err) if matches!(&*err, StorageErrorKind::AlreadyExists(_)) => entry.clone(),
                Err(err) => return Err(err),
            },
            false => {
                self.transfer.transfer(entry, direction).await?;
                entry.clone()
            },
        };
        match direction {
            Direction::Download => updated.record_local(*entry.remote()),
            Direction::Upload => updated.record_remote(*entry.local()),
        }
        Ok(updated)
    }
}
