//! Per-entry decisions.
//!
//! [`decide()`] is a pure function of an entry's probed state, the active
//! [`Mode`] and an optional caller resolution. It never picks a direction
//! for a conflict: equal timestamps and empty files are deferred to the
//! caller.

use crate::mode::Mode;
use derive_more::Display;
use duet_storage::{Entry, Presence};
use std::cmp::Ordering;

#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Direction {
    /// Remote to local.
    #[display("download")]
    Download,
    /// Local to remote.
    #[display("upload")]
    Upload,
}

impl Direction {
    /// Direction favouring the newer side of a comparison, `None` when equal.
    pub fn from_ordering(ordering: Ordering) -> Option<Self> {
        match ordering {
            Ordering::Greater => Some(Self::Download),
            Ordering::Less => Some(Self::Upload),
            Ordering::Equal => None,
        }
    }

    /// The side read from.
    pub fn source<'a>(&self, entry: &'a Entry) -> &'a Presence {
        match self {
            Self::Download => entry.remote(),
            Self::Upload => entry.local(),
        }
    }
}

/// Why a decision was deferred to the caller.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Warning {
    /// Both sides exist with the same (or an unknown) modification time.
    #[display("equal timestamps")]
    EqualTimestamps,
    /// A file is empty on at least one side.
    #[display("zero-size file")]
    ZeroSize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Decision {
    Download,
    Upload,
    /// Needs a resolution from the caller before it can be executed.
    Deferred(Warning),
    /// Outside the scope of the active mode. Not the same as skipped.
    Excluded,
}

impl Decision {
    pub fn direction(&self) -> Option<Direction> {
        match self {
            Self::Download => Some(Direction::Download),
            Self::Upload => Some(Direction::Upload),
            Self::Deferred(_) | Self::Excluded => None,
        }
    }
}

impl From<Direction> for Decision {
    fn from(direction: Direction) -> Self {
        match direction {
            Direction::Download => Self::Download,
            Direction::Upload => Self::Upload,
        }
    }
}

/// Where an entry is in a reconciliation pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Unprobed,
    /// Probed, but no decision could be made ("undetermined").
    Probed,
    Decided(Decision),
    Executed(Direction),
    Skipped,
}

impl Stage {
    /// Direction to execute in, for entries in the work list.
    pub fn direction(&self) -> Option<Direction> {
        match self {
            Self::Decided(decision) => decision.direction(),
            _ => None,
        }
    }
}

fn warning(entry: &Entry, ordering: Ordering) -> Option<Warning> {
    if !entry.is_file() {
        return None;
    }
    let (local, remote) = (entry.local().attributes(), entry.remote().attributes());
    if local.is_some() && remote.is_some() && ordering == Ordering::Equal {
        return Some(Warning::EqualTimestamps);
    }
    if local.into_iter().chain(remote).any(|attributes| attributes.size == 0) {
        return Some(Warning::ZeroSize);
    }
    None
}

/// Decide what to do with an entry.
///
/// `resolution` settles a deferred decision, as long as the side it reads
/// from exists.
pub fn decide(entry: &Entry, mode: Mode, resolution: Option<Direction>) -> Stage {
    if *entry.local() == Presence::Unprobed || *entry.remote() == Presence::Unprobed {
        return Stage::Unprobed;
    }
    if entry.skip() {
        return Stage::Skipped;
    }
    let Ok(ordering) = entry.compare() else {
        return Stage::Probed;
    };
    let in_scope = match mode {
        Mode::Download => entry.remote().exists(),
        Mode::Upload => entry.local().exists(),
        Mode::Mirror => true,
    };
    if !in_scope {
        return Stage::Decided(Decision::Excluded);
    }
    let direction = match warning(entry, ordering) {
        Some(warning) => match resolution.filter(|direction| direction.source(entry).exists()) {
            Some(direction) => direction,
            None => return Stage::Decided(Decision::Deferred(warning)),
        },
        None => match Direction::from_ordering(ordering) {
            Some(direction) => direction,
            // Directories present on both sides.
            None => return Stage::Decided(Decision::Excluded),
        },
    };
    match mode.allows(direction) {
        true => Stage::Decided(direction.into()),
        false => Stage::Decided(Decision::Excluded),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use duet_storage::Attributes;
    use rstest::rstest;
    use time::OffsetDateTime;
    use time::macros::datetime;

    const OLD: OffsetDateTime = datetime!(2024-01-01 00:00 UTC);
    const NEW: OffsetDateTime = datetime!(2024-06-01 00:00 UTC);

    fn present(size: u64, modified: OffsetDateTime) -> Presence {
        Presence::Present(Attributes::new(size, modified))
    }

    fn file(local: Presence, remote: Presence) -> Entry {
        let mut entry = Entry::file("bucket/a/b").unwrap();
        entry.record_local(local);
        entry.record_remote(remote);
        entry
    }

    #[rstest]
    #[case(present(10, OLD), present(10, NEW), Mode::Mirror, Stage::Decided(Decision::Download))]
    #[case(present(10, NEW), present(10, OLD), Mode::Mirror, Stage::Decided(Decision::Upload))]
    #[case(Presence::Absent, present(10, OLD), Mode::Mirror, Stage::Decided(Decision::Download))]
    #[case(present(10, OLD), Presence::Absent, Mode::Mirror, Stage::Decided(Decision::Upload))]
    #[case(present(10, OLD), present(10, NEW), Mode::Download, Stage::Decided(Decision::Download))]
    #[case(present(10, NEW), present(10, OLD), Mode::Download, Stage::Decided(Decision::Excluded))]
    #[case(present(10, OLD), Presence::Absent, Mode::Download, Stage::Decided(Decision::Excluded))]
    #[case(Presence::Absent, present(10, OLD), Mode::Download, Stage::Decided(Decision::Download))]
    #[case(Presence::Absent, present(10, OLD), Mode::Upload, Stage::Decided(Decision::Excluded))]
    #[case(present(10, NEW), present(10, OLD), Mode::Upload, Stage::Decided(Decision::Upload))]
    fn test_decide(#[case] local: Presence, #[case] remote: Presence, #[case] mode: Mode, #[case] expected: Stage) {
        assert_eq!(decide(&file(local, remote), mode, None), expected);
    }

    #[rstest]
    #[case(present(10, OLD), present(20, OLD), Warning::EqualTimestamps)]
    #[case(present(0, OLD), present(20, NEW), Warning::ZeroSize)]
    #[case(Presence::Absent, present(0, NEW), Warning::ZeroSize)]
    fn test_deferred(#[case] local: Presence, #[case] remote: Presence, #[case] warning: Warning) {
        let entry = file(local, remote);
        assert_eq!(decide(&entry, Mode::Mirror, None), Stage::Decided(Decision::Deferred(warning)));
    }

    #[test]
    fn test_resolution() {
        let entry = file(present(10, OLD), present(20, OLD));
        assert_eq!(decide(&entry, Mode::Mirror, Some(Direction::Upload)), Stage::Decided(Decision::Upload));
        // Still subject to the mode
        assert_eq!(decide(&entry, Mode::Download, Some(Direction::Upload)), Stage::Decided(Decision::Excluded));
        // Cannot read from a side that does not exist
        let entry = file(Presence::Absent, present(0, OLD));
        assert_eq!(
            decide(&entry, Mode::Mirror, Some(Direction::Upload)),
            Stage::Decided(Decision::Deferred(Warning::ZeroSize))
        );
    }

    #[test]
    fn test_skip_wins() {
        let mut entry = file(present(10, OLD), present(10, NEW));
        entry.set_skip(true);
        assert_eq!(decide(&entry, Mode::Mirror, None), Stage::Skipped);
    }

    #[test]
    fn test_undetermined() {
        assert_eq!(decide(&file(Presence::Unknown, present(1, OLD)), Mode::Mirror, None), Stage::Probed);
        assert_eq!(decide(&file(Presence::Unprobed, Presence::Unprobed), Mode::Mirror, None), Stage::Unprobed);
    }

    #[test]
    fn test_directories_are_never_deferred() {
        let mut entry = Entry::directory("bucket/dir").unwrap();
        entry.record_local(Presence::Absent);
        entry.record_remote(Presence::Present(Attributes::directory()));
        assert_eq!(decide(&entry, Mode::Mirror, None), Stage::Decided(Decision::Download));
        entry.record_local(Presence::Present(Attributes::directory()));
        assert_eq!(decide(&entry, Mode::Mirror, None), Stage::Decided(Decision::Excluded));
    }
}
