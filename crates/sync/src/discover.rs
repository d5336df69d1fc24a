use crate::error::{ErrorKind, Result};
use duet_storage::{Entry, EntryType, Features};
use exn::ResultExt;
use std::collections::{BTreeMap, VecDeque};
use std::path::PathBuf;
use tracing::instrument;

/// Union of both sides' listings below `root`, recursively.
///
/// Every candidate is returned unprobed, parents before their children,
/// starting with `root` itself. When the two sides disagree about whether a
/// name is a file or a directory, the local view wins. Symbolic links to
/// directories are not descended into.
#[instrument(skip(local, remote), fields(root = %root.path().display()))]
pub async fn discover(local: &Features, remote: &Features, root: &Entry) -> Result<Vec<Entry>> {
    let mut found = vec![root.clone()];
    let mut queue = VecDeque::from([root.clone()]);
    while let Some(directory) = queue.pop_front() {
        let local_children = local.listing.list(&directory).await.or_raise(|| ErrorKind::Storage)?;
        let remote_children = remote.listing.list(&directory).await.or_raise(|| ErrorKind::Storage)?;
        let mut children: BTreeMap<PathBuf, Entry> = BTreeMap::new();
        for child in local_children.into_iter().chain(remote_children) {
            match children.get(child.path()) {
                Some(existing) if existing.is_directory() != child.is_directory() => {
                    tracing::warn!(path = %child.path().display(), "File on one side, directory on the other");
                },
                Some(_) => {},
                None => {
                    children.insert(child.path().to_path_buf(), child);
                },
            }
        }
        for child in children.into_values() {
            if child.is_directory() && !child.kind().contains(EntryType::SYMLINK) {
                queue.push_back(child.clone());
            }
            found.push(child);
        }
    }
    tracing::debug!(candidates = found.len(), "Discovery complete");
    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;
    use duet_storage::backend::{LocalBackend, MockStore};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_discover_union() {
        let temp_dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(temp_dir.path().join("shared/local-only")).unwrap();
        std::fs::write(temp_dir.path().join("shared/local-only/a.txt"), b"a").unwrap();
        std::fs::write(temp_dir.path().join("shared/both.txt"), b"b").unwrap();
        let local = Features::local(LocalBackend::new("local", temp_dir.path()).unwrap().with_anchor("bucket").unwrap());
        let remote = Features::object_store(Arc::new(
            MockStore::default()
                .with_object("bucket", "shared/both.txt", 1, None)
                .with_object("bucket", "shared/remote-only/", 0, None)
                .with_object("bucket", "top.txt", 3, None),
        ));

        let root = Entry::volume("bucket").unwrap();
        let found = discover(&local, &remote, &root).await.unwrap();
        let paths: Vec<_> = found.iter().map(|entry| entry.path().to_str().unwrap().to_string()).collect();
        assert_eq!(
            paths,
            vec![
                "bucket",
                "bucket/shared",
                "bucket/top.txt",
                "bucket/shared/both.txt",
                "bucket/shared/local-only",
                "bucket/shared/remote-only",
                "bucket/shared/local-only/a.txt",
            ]
        );
        assert!(found.iter().all(|entry| !entry.is_probed()));
        // Parents always come first
        for (position, entry) in found.iter().enumerate() {
            if let Some(parent) = entry.parent() {
                assert!(found[..position].contains(&parent), "{} before its parent", entry.path().display());
            }
        }
    }
}
