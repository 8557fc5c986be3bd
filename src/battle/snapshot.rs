//! Observer snapshots
//!
//! Squad summaries are always included; per-soldier render data only for
//! squads whose centroid lies inside the requested view rectangle.

use serde::{Deserialize, Serialize};

use crate::battle::category::UnitCategory;
use crate::battle::formation::FormationType;
use crate::battle::soldier::{SoldierArena, SoldierState};
use crate::battle::squad::{Squad, SquadState};
use crate::core::types::{Rect, SoldierId, SquadId, TeamId, Tick, Vec2};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SquadSnapshot {
    pub id: SquadId,
    pub team: TeamId,
    pub category: UnitCategory,
    pub anchor: Vec2,
    pub centroid: Vec2,
    pub heading: f32,
    pub formation: FormationType,
    pub transitioning: bool,
    pub count: usize,
    pub average_morale: f32,
    pub state: SquadState,
    pub tactic: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SoldierSnapshot {
    pub id: SoldierId,
    pub squad: SquadId,
    pub position: Vec2,
    pub facing: f32,
    pub state: SoldierState,
    pub disordered: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub tick: Tick,
    pub squads: Vec<SquadSnapshot>,
    pub soldiers: Vec<SoldierSnapshot>,
}

impl Snapshot {
    /// Capture squads in id order; `view` limits which squads carry soldier data
    pub fn capture<'a>(
        tick: Tick,
        squads: impl IntoIterator<Item = &'a Squad>,
        soldiers: &SoldierArena,
        view: Option<Rect>,
    ) -> Self {
        let mut squad_rows = Vec::new();
        let mut soldier_rows = Vec::new();

        for squad in squads {
            let centroid = squad.centroid(soldiers);
            squad_rows.push(SquadSnapshot {
                id: squad.id,
                team: squad.team,
                category: squad.category,
                anchor: squad.anchor,
                centroid,
                heading: squad.heading,
                formation: squad.formation.kind,
                transitioning: squad.formation.is_transitioning(),
                count: squad.living_count(),
                average_morale: squad.average_morale(soldiers),
                state: squad.state,
                tactic: squad.tactic.name().to_string(),
            });

            if view.map_or(true, |rect| rect.contains(centroid)) {
                soldier_rows.extend(squad.living.iter().filter_map(|id| soldiers.get(*id)).map(|s| {
                    SoldierSnapshot {
                        id: s.id,
                        squad: s.squad,
                        position: s.position,
                        facing: s.facing,
                        state: s.state,
                        disordered: s.disordered,
                    }
                }));
            }
        }
        soldier_rows.sort_by_key(|s| s.id);

        Self {
            tick,
            squads: squad_rows,
            soldiers: soldier_rows,
        }
    }

    pub fn squad(&self, id: SquadId) -> Option<&SquadSnapshot> {
        self.squads.iter().find(|s| s.id == id)
    }
}
