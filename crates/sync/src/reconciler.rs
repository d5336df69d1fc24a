use crate::decision::{Decision, Direction, Stage, decide};
use crate::error::{ErrorKind, Result};
use crate::execute::{Confirm, ExecuteEvent, Executor, Report, Verdict};
use crate::mode::Mode;
use duet_storage::{Entry, Presence};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

/// One entry of the prompt list, with its current stage.
#[derive(Debug, Clone)]
pub struct Item {
    entry: Entry,
    stage: Stage,
    resolution: Option<Direction>,
}

impl Item {
    pub fn entry(&self) -> &Entry {
        &self.entry
    }

    pub fn path(&self) -> &Path {
        self.entry.path()
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Caller resolution for a deferred decision, if any.
    pub fn resolution(&self) -> Option<Direction> {
        self.resolution
    }

    /// Size of the side that would be read from.
    pub fn transfer_size(&self) -> Option<u64> {
        let direction = self.stage.direction()?;
        direction.source(&self.entry).attributes().map(|attributes| attributes.size)
    }
}

#[derive(Debug, Default)]
struct State {
    mode: Mode,
    items: Vec<Item>,
    index: HashMap<PathBuf, usize>,
}

impl State {
    fn position(&self, path: &Path) -> Result<usize> {
        match self.index.get(path) {
            Some(&position) => Ok(position),
            None => exn::bail!(ErrorKind::NotPrompted(path.to_path_buf())),
        }
    }

    fn item_mut(&mut self, path: &Path) -> Result<&mut Item> {
        let position = self.position(path)?;
        Ok(&mut self.items[position])
    }

    fn remove(&mut self, position: usize) {
        self.items.remove(position);
        self.index = self.items.iter().enumerate().map(|(position, item)| (item.path().to_path_buf(), position)).collect();
    }

    /// Re-run the decision for every entry that has not been executed yet.
    fn redecide(&mut self) {
        let mode = self.mode;
        for item in self.items.iter_mut().filter(|item| !matches!(item.stage, Stage::Executed(_))) {
            item.stage = decide(&item.entry, mode, item.resolution);
        }
    }

    fn work_positions(&self) -> Vec<usize> {
        (0..self.items.len()).filter(|&position| self.items[position].stage.direction().is_some()).collect()
    }

    fn paths_where(&self, predicate: impl Fn(&Stage) -> bool) -> Vec<PathBuf> {
        self.items.iter().filter(|item| predicate(&item.stage)).map(|item| item.path().to_path_buf()).collect()
    }
}

/// Owner of the prompt list and the work list derived from it.
///
/// All mutations, and every execution pass, go through a single lock; readers
/// only ever get snapshots.
#[derive(Debug, Default)]
pub struct Reconciler {
    state: Mutex<State>,
}

/// Whether an entry needs no action at all.
fn in_sync(entry: &Entry) -> bool {
    match (entry.local(), entry.remote()) {
        (Presence::Absent, Presence::Absent) => true,
        (Presence::Present(_), Presence::Present(_)) if entry.is_directory() => true,
        (Presence::Present(local), Presence::Present(remote)) => {
            local.size == remote.size && matches!(entry.compare(), Ok(Ordering::Equal))
        },
        _ => false,
    }
}

impl Reconciler {
    pub fn new(mode: Mode) -> Self {
        Self {
            state: Mutex::new(State {
                mode,
                ..State::default()
            }),
        }
    }

    pub async fn mode(&self) -> Mode {
        self.state.lock().await.mode
    }

    /// Enqueue a probed entry, replacing any earlier record of the same path.
    ///
    /// Returns `false` without enqueueing when no action could be needed:
    /// both sides absent, or both present and identical. An earlier record of
    /// such a path is dropped. Entries already executed in this pass are left
    /// alone. A replaced record keeps its skip flag and resolution.
    ///
    /// # Errors
    ///
    /// Fails with [`IndeterminateState`](ErrorKind::IndeterminateState) if
    /// either side has not been probed. A side whose probe failed is fine; the
    /// entry is enqueued and stays undetermined.
    pub async fn prompt(&self, mut entry: Entry) -> Result<bool> {
        if *entry.local() == Presence::Unprobed || *entry.remote() == Presence::Unprobed {
            exn::bail!(ErrorKind::IndeterminateState(entry.path().to_path_buf()));
        }
        let mut state = self.state.lock().await;
        let existing = state.index.get(entry.path()).copied();
        if let Some(position) = existing
            && matches!(state.items[position].stage, Stage::Executed(_))
        {
            return Ok(false);
        }
        if in_sync(&entry) {
            tracing::trace!(path = %entry.path().display(), "Already in sync");
            if let Some(position) = existing {
                state.remove(position);
            }
            return Ok(false);
        }
        let resolution = match existing {
            Some(position) => {
                let previous = &state.items[position];
                entry.set_skip(previous.entry.skip());
                previous.resolution
            },
            None => None,
        };
        let item = Item {
            stage: decide(&entry, state.mode, resolution),
            entry,
            resolution,
        };
        match existing {
            Some(position) => state.items[position] = item,
            None => {
                let position = state.items.len();
                state.index.insert(item.path().to_path_buf(), position);
                state.items.push(item);
            },
        }
        Ok(true)
    }

    /// Change the mode and re-decide every entry.
    pub async fn set_mode(&self, mode: Mode) {
        let mut state = self.state.lock().await;
        state.mode = mode;
        state.redecide();
    }

    pub async fn set_skip(&self, path: impl AsRef<Path>, skip: bool) -> Result<()> {
        let mut state = self.state.lock().await;
        state.item_mut(path.as_ref())?.entry.set_skip(skip);
        state.redecide();
        Ok(())
    }

    /// Settle (or with `None`, unsettle) a deferred decision.
    pub async fn resolve(&self, path: impl AsRef<Path>, direction: Option<Direction>) -> Result<()> {
        let mut state = self.state.lock().await;
        state.item_mut(path.as_ref())?.resolution = direction;
        state.redecide();
        Ok(())
    }

    /// Snapshot of the whole prompt list.
    pub async fn items(&self) -> Vec<Item> {
        self.state.lock().await.items.clone()
    }

    /// Snapshot of the entries that would be executed, in prompt order.
    pub async fn work_list(&self) -> Vec<Item> {
        let state = self.state.lock().await;
        state.work_positions().into_iter().map(|position| state.items[position].clone()).collect()
    }

    /// Entries that could not be decided.
    pub async fn undetermined(&self) -> Vec<PathBuf> {
        self.state.lock().await.paths_where(|stage| *stage == Stage::Probed)
    }

    /// Entries waiting on a caller resolution.
    pub async fn deferred(&self) -> Vec<PathBuf> {
        self.state.lock().await.paths_where(|stage| matches!(stage, Stage::Decided(Decision::Deferred(_))))
    }

    /// Confirm, then execute the work list.
    ///
    /// The lock is held for the whole pass. Cancellation is checked between
    /// entries: executed entries stay executed, the rest keep their stage. A
    /// failing entry is reported and the pass moves on.
    ///
    /// # Errors
    ///
    /// Fails with [`Rejected`](ErrorKind::Rejected) if the confirmation step
    /// rejects the work list; nothing is executed in that case.
    #[instrument(skip_all)]
    pub async fn execute(
        &self,
        executor: &Executor,
        confirm: &dyn Confirm,
        progress: &mut (dyn FnMut(ExecuteEvent) + Send),
        cancel: &CancellationToken,
    ) -> Result<Report> {
        let mut state = self.state.lock().await;
        let mut report = Report::default();
        let mut work = state.work_positions();
        if !work.is_empty() {
            let snapshot: Vec<Item> = work.iter().map(|&position| state.items[position].clone()).collect();
            match confirm.confirm(&snapshot).await {
                Verdict::Accept => {},
                Verdict::Reject => exn::bail!(ErrorKind::Rejected),
                Verdict::Skip(paths) => {
                    let positions = paths.iter().map(|path| state.position(path)).collect::<Result<Vec<_>>>()?;
                    for position in positions {
                        state.items[position].entry.set_skip(true);
                    }
                    state.redecide();
                    work = state.work_positions();
                },
            }
        }

        progress(ExecuteEvent::Started { total: work.len() });
        for position in work {
            if cancel.is_cancelled() {
                tracing::info!(executed = report.executed.len(), "Execution cancelled");
                report.cancelled = true;
                break;
            }
            let item = &mut state.items[position];
            let Some(direction) = item.stage.direction() else {
                continue;
            };
            let path = item.path().to_path_buf();
            match executor.run(&item.entry, direction).await {
                Ok(updated) => {
                    tracing::debug!(path = %path.display(), %direction, "Executed");
                    item.entry = updated;
                    item.stage = Stage::Executed(direction);
                    progress(ExecuteEvent::Executed { path: path.clone(), direction });
                    report.executed.push(path);
                },
                Err(err) => {
                    tracing::warn!(path = %path.display(), %direction, error = %err, "Execution failed");
                    progress(ExecuteEvent::Failed { path: path.clone(), direction });
                    report.failed.push((path, err));
                },
            }
        }

        report.skipped = state.paths_where(|stage| *stage == Stage::Skipped);
        report.undetermined = state.paths_where(|stage| *stage == Stage::Probed);
        progress(match report.cancelled {
            true => ExecuteEvent::Cancelled,
            false => ExecuteEvent::Complete,
        });
        Ok(report)
    }
}
