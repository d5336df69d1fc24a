pub mod backend;
pub mod entry;
pub mod error;
pub mod features;
mod models;
mod path;

pub use crate::backend::ObjectStore;
pub use crate::entry::{Entry, EntryType};
pub use crate::features::Features;
pub use crate::models::{Attributes, ListItem, ObjectInfo, Presence};
pub use crate::path::{SEPARATOR, validate as validate_path};
use std::sync::Arc;

pub type ObjectHandle = Arc<dyn ObjectStore>;
