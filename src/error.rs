use thiserror::Error;

use crate::world::{MapPos, PlayerId, UnitId};

/// Failures reported by the world's mutation API.
///
/// None of these abort a turn: callers recover locally (a settler whose
/// city could not be founded falls back to an idle role, an invalid
/// activity request is logged and dropped).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorldError {
    #[error("position {0} is outside the map")]
    OffMap(MapPos),
    #[error("unknown player {0}")]
    UnknownPlayer(PlayerId),
    #[error("unknown unit {0}")]
    UnknownUnit(UnitId),
    #[error("a city cannot be founded at {0}")]
    CityNotAllowed(MapPos),
    #[error("unit {unit} cannot {activity} at {pos}")]
    ActivityNotAllowed {
        unit: UnitId,
        activity: &'static str,
        pos: MapPos,
    },
    #[error("map rows have inconsistent widths (expected {expected}, row {row} has {found})")]
    RaggedMap {
        expected: usize,
        row: usize,
        found: usize,
    },
    #[error("unknown terrain symbol '{0}'")]
    UnknownTerrain(char),
    #[error("too many players (limit {0})")]
    TooManyPlayers(usize),
}
