//! The six synchronization directions and the two worker shapes they map to.

use serde::{Deserialize, Serialize};
use std::fmt;

/// An ordered (source, target) pair among {TG, YT, SP}.
///
/// `(direction, status)` is the only dimension the scheduler selects on;
/// direction is immutable once a track is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    #[default]
    TgToYt,
    YtToTg,
    TgToSp,
    SpToTg,
    YtToSp,
    SpToYt,
}

impl Direction {
    pub const ALL: [Direction; 6] = [
        Direction::TgToYt,
        Direction::YtToTg,
        Direction::TgToSp,
        Direction::SpToTg,
        Direction::YtToSp,
        Direction::SpToYt,
    ];

    /// Shape A ("target-push"): process_pending over a worklist that
    /// something else populates. Shape B ("source-pull-and-transfer"):
    /// process_new_tracks, diffing a source playlist snapshot.
    pub fn shape(self) -> WorkerShape {
        match self {
            Direction::TgToYt | Direction::TgToSp | Direction::YtToSp | Direction::SpToYt => {
                WorkerShape::TargetPush
            }
            Direction::YtToTg | Direction::SpToTg => WorkerShape::SourcePull,
        }
    }

    /// Whether the source side of this direction is the TG channel (the
    /// only source that needs the `identifying` step before `searching`).
    pub fn source_is_tg(self) -> bool {
        matches!(self, Direction::TgToYt | Direction::TgToSp)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Direction::TgToYt => "tg_to_yt",
            Direction::YtToTg => "yt_to_tg",
            Direction::TgToSp => "tg_to_sp",
            Direction::SpToTg => "sp_to_tg",
            Direction::YtToSp => "yt_to_sp",
            Direction::SpToYt => "sp_to_yt",
        }
    }

    pub fn from_str_opt(s: &str) -> Option<Direction> {
        match s {
            "tg_to_yt" => Some(Direction::TgToYt),
            "yt_to_tg" => Some(Direction::YtToTg),
            "tg_to_sp" => Some(Direction::TgToSp),
            "sp_to_tg" => Some(Direction::SpToTg),
            "yt_to_sp" => Some(Direction::YtToSp),
            "sp_to_yt" => Some(Direction::SpToYt),
            _ => None,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerShape {
    TargetPush,
    SourcePull,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_str() {
        for d in Direction::ALL {
            assert_eq!(Direction::from_str_opt(d.as_str()), Some(d));
        }
    }

    #[test]
    fn shape_assignment_matches_each_direction() {
        assert_eq!(Direction::TgToYt.shape(), WorkerShape::TargetPush);
        assert_eq!(Direction::TgToSp.shape(), WorkerShape::TargetPush);
        assert_eq!(Direction::YtToSp.shape(), WorkerShape::TargetPush);
        assert_eq!(Direction::SpToYt.shape(), WorkerShape::TargetPush);
        assert_eq!(Direction::YtToTg.shape(), WorkerShape::SourcePull);
        assert_eq!(Direction::SpToTg.shape(), WorkerShape::SourcePull);
    }
}
