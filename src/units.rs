//! Unit types and the activities units can be set to.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitKind {
    Settlers,
    Workers,
    Engineers,
    Warriors,
    Phalanx,
    Horsemen,
    AlpineTroops,
    Trireme,
    Explorer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Activity {
    #[default]
    Idle,
    Sentry,
    Fortified,
    Goto,
    Irrigate,
    Mine,
    Transform,
    Road,
    Railroad,
    Pollution,
    Fallout,
}

impl Activity {
    /// Activities that change the tile the unit stands on when finished.
    pub fn is_terrain_work(self) -> bool {
        matches!(
            self,
            Activity::Irrigate
                | Activity::Mine
                | Activity::Transform
                | Activity::Road
                | Activity::Railroad
                | Activity::Pollution
                | Activity::Fallout
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Activity::Idle => "idle",
            Activity::Sentry => "sentry",
            Activity::Fortified => "fortified",
            Activity::Goto => "goto",
            Activity::Irrigate => "irrigate",
            Activity::Mine => "mine",
            Activity::Transform => "transform",
            Activity::Road => "road",
            Activity::Railroad => "railroad",
            Activity::Pollution => "pollution",
            Activity::Fallout => "fallout",
        }
    }
}

impl fmt::Display for Activity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct UnitTypeDefinition {
    pub kind: UnitKind,
    pub name: &'static str,
    pub founds_cities: bool,
    pub improves_terrain: bool,
    pub transforms: bool,
    /// Move fragments per turn.
    pub move_rate: i32,
    pub work_rate: i32,
    pub attack: i32,
    pub sea: bool,
    pub all_terrain: bool,
    pub food_upkeep: i32,
    pub requires_tech: Option<&'static str>,
}

impl UnitTypeDefinition {
    /// Settler-type units: anything that works terrain or founds cities.
    pub fn is_settler(&self) -> bool {
        self.founds_cities || self.improves_terrain
    }

    pub fn is_available(&self, known: &BTreeSet<String>) -> bool {
        self.requires_tech.map_or(true, |tech| known.contains(tech))
    }
}

// Ordered weakest first within each role.
const UNIT_TYPES: &[UnitTypeDefinition] = &[
    UnitTypeDefinition {
        kind: UnitKind::Settlers,
        name: "Settlers",
        founds_cities: true,
        improves_terrain: true,
        transforms: false,
        move_rate: 3,
        work_rate: 1,
        attack: 0,
        sea: false,
        all_terrain: false,
        food_upkeep: 1,
        requires_tech: None,
    },
    UnitTypeDefinition {
        kind: UnitKind::Workers,
        name: "Workers",
        founds_cities: false,
        improves_terrain: true,
        transforms: false,
        move_rate: 3,
        work_rate: 1,
        attack: 0,
        sea: false,
        all_terrain: false,
        food_upkeep: 0,
        requires_tech: Some("pottery"),
    },
    UnitTypeDefinition {
        kind: UnitKind::Engineers,
        name: "Engineers",
        founds_cities: false,
        improves_terrain: true,
        transforms: true,
        move_rate: 6,
        work_rate: 2,
        attack: 0,
        sea: false,
        all_terrain: false,
        food_upkeep: 1,
        requires_tech: Some("explosives"),
    },
    UnitTypeDefinition {
        kind: UnitKind::Warriors,
        name: "Warriors",
        founds_cities: false,
        improves_terrain: false,
        transforms: false,
        move_rate: 3,
        work_rate: 0,
        attack: 1,
        sea: false,
        all_terrain: false,
        food_upkeep: 0,
        requires_tech: None,
    },
    UnitTypeDefinition {
        kind: UnitKind::Phalanx,
        name: "Phalanx",
        founds_cities: false,
        improves_terrain: false,
        transforms: false,
        move_rate: 3,
        work_rate: 0,
        attack: 1,
        sea: false,
        all_terrain: false,
        food_upkeep: 0,
        requires_tech: Some("bronze_working"),
    },
    UnitTypeDefinition {
        kind: UnitKind::Horsemen,
        name: "Horsemen",
        founds_cities: false,
        improves_terrain: false,
        transforms: false,
        move_rate: 6,
        work_rate: 0,
        attack: 2,
        sea: false,
        all_terrain: false,
        food_upkeep: 0,
        requires_tech: None,
    },
    UnitTypeDefinition {
        kind: UnitKind::AlpineTroops,
        name: "Alpine Troops",
        founds_cities: false,
        improves_terrain: false,
        transforms: false,
        move_rate: 3,
        work_rate: 0,
        attack: 5,
        sea: false,
        all_terrain: true,
        food_upkeep: 0,
        requires_tech: Some("tactics"),
    },
    UnitTypeDefinition {
        kind: UnitKind::Trireme,
        name: "Trireme",
        founds_cities: false,
        improves_terrain: false,
        transforms: false,
        move_rate: 9,
        work_rate: 0,
        attack: 1,
        sea: true,
        all_terrain: false,
        food_upkeep: 0,
        requires_tech: None,
    },
    UnitTypeDefinition {
        kind: UnitKind::Explorer,
        name: "Explorer",
        founds_cities: false,
        improves_terrain: false,
        transforms: false,
        move_rate: 3,
        work_rate: 0,
        attack: 0,
        sea: false,
        all_terrain: true,
        food_upkeep: 0,
        requires_tech: Some("pottery"),
    },
];

pub fn definition(kind: UnitKind) -> &'static UnitTypeDefinition {
    &UNIT_TYPES[kind as usize]
}

/// Strongest unit type the player can build that satisfies `role`.
pub fn best_role_unit(
    known: &BTreeSet<String>,
    role: impl Fn(&UnitTypeDefinition) -> bool,
) -> Option<UnitKind> {
    UNIT_TYPES
        .iter()
        .rev()
        .find(|def| role(def) && def.is_available(known))
        .map(|def| def.kind)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_is_in_enum_order() {
        for (index, def) in UNIT_TYPES.iter().enumerate() {
            assert_eq!(def.kind as usize, index, "{} out of order", def.name);
        }
    }

    #[test]
    fn best_improver_follows_technology() {
        let mut known = BTreeSet::new();
        let improver = |def: &UnitTypeDefinition| def.improves_terrain;
        assert_eq!(best_role_unit(&known, improver), Some(UnitKind::Settlers));
        known.insert("pottery".to_string());
        assert_eq!(best_role_unit(&known, improver), Some(UnitKind::Workers));
        known.insert("explosives".to_string());
        assert_eq!(best_role_unit(&known, improver), Some(UnitKind::Engineers));
    }

    #[test]
    fn only_settlers_found_cities() {
        let founders: Vec<_> = UNIT_TYPES
            .iter()
            .filter(|def| def.founds_cities)
            .map(|def| def.kind)
            .collect();
        assert_eq!(founders, vec![UnitKind::Settlers]);
    }
}
