use std::collections::BTreeSet;

/// Rule effects a technology can switch on for its owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TechFlag {
    /// Roads may be built across rivers.
    BridgeBuilding,
    /// Irrigated tiles may be upgraded to farmland.
    Farmland,
    /// Roads may be upgraded to railroads.
    Railroad,
}

#[derive(Debug, Clone, Copy)]
pub struct TechDefinition {
    pub id: &'static str,
    pub display: &'static str,
    pub flags: &'static [TechFlag],
    pub prerequisites: &'static [&'static str],
}

const TECH_TREE: &[TechDefinition] = &[
    TechDefinition {
        id: "bronze_working",
        display: "Bronze Working",
        flags: &[],
        prerequisites: &[],
    },
    TechDefinition {
        id: "pottery",
        display: "Pottery",
        flags: &[],
        prerequisites: &[],
    },
    TechDefinition {
        id: "construction",
        display: "Construction",
        flags: &[],
        prerequisites: &["pottery"],
    },
    TechDefinition {
        id: "bridge_building",
        display: "Bridge Building",
        flags: &[TechFlag::BridgeBuilding],
        prerequisites: &["construction"],
    },
    TechDefinition {
        id: "explosives",
        display: "Explosives",
        flags: &[],
        prerequisites: &["construction"],
    },
    TechDefinition {
        id: "railroad",
        display: "Railroad",
        flags: &[TechFlag::Railroad],
        prerequisites: &["bridge_building"],
    },
    TechDefinition {
        id: "refrigeration",
        display: "Refrigeration",
        flags: &[TechFlag::Farmland],
        prerequisites: &["railroad"],
    },
    TechDefinition {
        id: "tactics",
        display: "Tactics",
        flags: &[],
        prerequisites: &["bronze_working", "construction"],
    },
];

pub fn definition(id: &str) -> Option<&'static TechDefinition> {
    TECH_TREE.iter().find(|def| def.id == id)
}

/// True when any technology in `known` carries `flag`.
pub fn knows_flag(known: &BTreeSet<String>, flag: TechFlag) -> bool {
    known
        .iter()
        .filter_map(|id| definition(id))
        .any(|def| def.flags.contains(&flag))
}

/// Closes `granted` over the prerequisite graph.
///
/// Unknown ids are returned as the error so callers can report them.
pub fn with_prerequisites<'a>(
    granted: impl IntoIterator<Item = &'a str>,
) -> Result<BTreeSet<String>, String> {
    let mut known = BTreeSet::new();
    let mut pending: Vec<&str> = granted.into_iter().collect();
    while let Some(id) = pending.pop() {
        let def = definition(id).ok_or_else(|| id.to_string())?;
        if known.insert(def.id.to_string()) {
            pending.extend(def.prerequisites.iter().copied());
        }
    }
    Ok(known)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prerequisites_are_pulled_in() {
        let known = with_prerequisites(["refrigeration"]).unwrap();
        for id in ["pottery", "construction", "bridge_building", "railroad"] {
            assert!(known.contains(id), "missing {id}");
        }
        assert!(knows_flag(&known, TechFlag::Farmland));
        assert!(knows_flag(&known, TechFlag::BridgeBuilding));
    }

    #[test]
    fn unknown_tech_is_reported() {
        assert_eq!(with_prerequisites(["warp_drive"]), Err("warp_drive".to_string()));
    }

    #[test]
    fn every_prerequisite_exists() {
        for def in TECH_TREE {
            for dep in def.prerequisites {
                assert!(definition(dep).is_some(), "{} needs unknown {dep}", def.id);
            }
        }
    }
}
