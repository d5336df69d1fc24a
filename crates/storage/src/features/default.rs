use super::{Existence, Listing};
use crate::entry::Entry;
use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// Existence check shared by all backend families.
///
/// Lists the parent directory (or the containers, for a top-level entry) and
/// looks for a child with the same name and the same file/directory kind.
/// Slower than a native lookup, but recognises prefix-implied directories on
/// object stores as well as placeholder-backed ones.
#[derive(Clone)]
pub struct DefaultFind {
    listing: Arc<dyn Listing>,
}

impl DefaultFind {
    pub fn new(listing: Arc<dyn Listing>) -> Self {
        Self { listing }
    }
}

#[async_trait]
impl Existence for DefaultFind {
    async fn exists(&self, entry: &Entry) -> Result<bool> {
        let siblings = match entry.parent() {
            Some(parent) => self.listing.list(&parent).await?,
            None => self.listing.containers().await?,
        };
        Ok(siblings
            .iter()
            .any(|sibling| sibling.path() == entry.path() && sibling.is_directory() == entry.is_directory()))
    }
}
