use super::Deletion;
use crate::entry::Entry;
use crate::error::{Error, ErrorKind, Result};
use async_trait::async_trait;
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use tracing::instrument;

/// Progress of a delete batch, reported once per entry.
#[derive(Debug)]
pub enum DeleteProgress<'a> {
    Deleted(&'a Entry),
    Failed(&'a Entry, &'a Error),
}

/// Removal of a single entry, implemented per backend family.
#[async_trait]
pub trait RemoveEntry: Send + Sync {
    async fn remove(&self, entry: &Entry) -> Result<()>;
}

/// Reject a batch in which a directory comes before one of its descendants.
///
/// Deleting a directory (or its placeholder) first would orphan whatever is
/// still below it.
pub fn check_order(entries: &[Entry]) -> Result<()> {
    let mut removed: HashSet<&Path> = HashSet::new();
    for entry in entries {
        if let Some(ancestor) = entry.path().ancestors().skip(1).find(|a| removed.contains(a)) {
            exn::bail!(ErrorKind::OutOfOrder(ancestor.to_path_buf()));
        }
        if entry.is_directory() {
            removed.insert(entry.path());
        }
    }
    Ok(())
}

/// Ordered batch deletion on top of a single-entry remover.
#[derive(Clone)]
pub struct BatchDelete {
    remover: Arc<dyn RemoveEntry>,
}

impl BatchDelete {
    pub fn new(remover: Arc<dyn RemoveEntry>) -> Self {
        Self { remover }
    }
}

#[async_trait]
impl Deletion for BatchDelete {
    #[instrument(skip_all, fields(count = entries.len()))]
    async fn delete(&self, entries: &[Entry], progress: &mut (dyn for<'p> FnMut(DeleteProgress<'p>) + Send)) -> Result<()> {
        check_order(entries)?;
        let mut failed = Vec::new();
        for entry in entries {
            match self.remover.remove(entry).await {
                Ok(()) => {
                    tracing::debug!(path = %entry.path().display(), "Deleted");
                    progress(DeleteProgress::Deleted(entry));
                },
                Err(err) => {
                    tracing::warn!(path = %entry.path().display(), error = %err, "Failed to delete");
                    progress(DeleteProgress::Failed(entry, &err));
                    failed.push(entry.path().to_path_buf());
                },
            }
        }
        if !failed.is_empty() {
            exn::bail!(ErrorKind::PartialDeleteFailure(failed));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{MockStore, ObjectStore};
    use crate::entry::EntryType;
    use crate::features::ObjectFeatures;
    use std::path::PathBuf;

    fn placeholder(path: &str) -> Entry {
        Entry::new(path, EntryType::DIRECTORY | EntryType::PLACEHOLDER).unwrap()
    }

    fn store() -> Arc<MockStore> {
        Arc::new(
            MockStore::default()
                .with_object("bucket", "dir/", 0, None)
                .with_object("bucket", "dir/a.txt", 1, None)
                .with_object("bucket", "dir/b.txt", 2, None),
        )
    }

    #[test]
    fn test_check_order() {
        let children_first = [Entry::file("b/dir/a").unwrap(), Entry::file("b/dir/sub/c").unwrap(), placeholder("b/dir")];
        assert!(check_order(&children_first).is_ok());
        let parent_first = [placeholder("b/dir"), Entry::file("b/dir/sub/c").unwrap()];
        let err = check_order(&parent_first).unwrap_err();
        assert!(matches!(&*err, ErrorKind::OutOfOrder(path) if path == Path::new("b/dir")));
        // A file sharing a prefix is not a descendant
        let siblings = [placeholder("b/dir"), Entry::file("b/directory.txt").unwrap()];
        assert!(check_order(&siblings).is_ok());
    }

    #[tokio::test]
    async fn test_out_of_order_issues_no_calls() {
        let store = store();
        let batch = BatchDelete::new(Arc::new(ObjectFeatures::new(store.clone())));
        let entries = [placeholder("bucket/dir"), Entry::file("bucket/dir/a.txt").unwrap()];
        let err = batch.delete(&entries, &mut |_| {}).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::OutOfOrder(_)));
        assert_eq!(store.call_count(), 0);
        assert_eq!(store.keys("bucket").await.len(), 3);
    }

    #[tokio::test]
    async fn test_ordered_batch() {
        let store = store();
        let batch = BatchDelete::new(Arc::new(ObjectFeatures::new(store.clone())));
        let entries = [
            Entry::file("bucket/dir/a.txt").unwrap(),
            Entry::file("bucket/dir/b.txt").unwrap(),
            placeholder("bucket/dir"),
        ];
        let mut deleted = Vec::new();
        batch
            .delete(&entries, &mut |progress| {
                if let DeleteProgress::Deleted(entry) = progress {
                    deleted.push(entry.path().to_path_buf());
                }
            })
            .await
            .unwrap();
        assert_eq!(deleted.len(), 3);
        assert!(store.keys("bucket").await.is_empty());
    }

    #[tokio::test]
    async fn test_partial_failure_continues() {
        let store = Arc::new(
            MockStore::default()
                .with_object("bucket", "dir/", 0, None)
                .with_object("bucket", "dir/a.txt", 1, None)
                .with_object("bucket", "dir/b.txt", 2, None)
                .with_failing_delete("bucket", "dir/a.txt"),
        );
        let batch = BatchDelete::new(Arc::new(ObjectFeatures::new(store.clone())));
        let entries = [
            Entry::file("bucket/dir/a.txt").unwrap(),
            Entry::file("bucket/dir/b.txt").unwrap(),
            placeholder("bucket/dir"),
        ];
        let mut failures = 0;
        let err = batch
            .delete(&entries, &mut |progress| {
                if matches!(progress, DeleteProgress::Failed(..)) {
                    failures += 1;
                }
            })
            .await
            .unwrap_err();
        assert_eq!(failures, 1);
        match &*err {
            ErrorKind::PartialDeleteFailure(paths) => assert_eq!(paths, &vec![PathBuf::from("bucket/dir/a.txt")]),
            other => panic!("unexpected error: {other}"),
        }
        // Everything else went through
        assert_eq!(store.keys("bucket").await, vec!["dir/a.txt".to_string()]);
        assert!(store.head_object("bucket", "dir/").await.unwrap().is_none());
    }
}
