use crate::decision::Direction;
use derive_more::Display;
use std::str::FromStr;

/// Which directions a reconciliation pass may transfer in.
#[derive(Debug, Display, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Mode {
    /// Only bring remote changes down.
    #[display("download")]
    Download,
    /// Only push local changes up.
    #[display("upload")]
    Upload,
    /// Either direction, whichever side is newer.
    #[default]
    #[display("mirror")]
    Mirror,
}

impl Mode {
    pub fn allows(self, direction: Direction) -> bool {
        match self {
            Self::Download => direction == Direction::Download,
            Self::Upload => direction == Direction::Upload,
            Self::Mirror => true,
        }
    }
}

impl FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "download" => Ok(Self::Download),
            "upload" => Ok(Self::Upload),
            "mirror" => Ok(Self::Mirror),
            other => Err(format!("unknown mode: {other}")),
        }
    }
}
