//! Per-soldier steering and the soldier state machine
//!
//! Every soldier is steered from an immutable view of the previous positions
//! (arena + spatial index), so the per-soldier work is independent and runs on
//! the rayon pool for large battles. Outputs come back in soldier-id order and
//! are applied by the caller.
//!
//! Composition: arrive at the formation slot (or a melee opponent inside the
//! chase radius) plus separation from neighbours. Routing soldiers flee;
//! retreating soldiers follow their slot and never attack.

use rayon::prelude::*;

use crate::battle::soldier::{Soldier, SoldierArena, SoldierState};
use crate::battle::terrain::Terrain;
use crate::core::config::SteeringConfig;
use crate::core::types::{heading_delta, turn_towards, SoldierId, SquadId, Vec2};
use crate::spatial::SpatialIndex;

const GOLDEN_ANGLE: f32 = 2.399_963;
const MIN_SEPARATION: f32 = 1e-4;

/// How a squad's soldiers treat their slots this tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveMode {
    /// Keep the slot, chase nearby enemies
    Formation,
    /// Keep the slot, fight only what is in reach
    Hold,
    /// Follow the slot away from the enemy, no attacks
    Retreat,
}

/// Squad-level inputs shared by its soldiers
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SquadOrders {
    pub squad: SquadId,
    pub mode: MoveMode,
    pub heading: f32,
    pub retreat_direction: Vec2,
    /// Formation, terrain-independent multiplier on speed
    pub speed_multiplier: f32,
    pub charging: bool,
    /// Squad being attacked; ranged soldiers prefer it
    pub focus: Option<SquadId>,
}

#[derive(Debug, Clone, Copy)]
pub struct SteeringInput {
    pub soldier: SoldierId,
    /// World position of the soldier's formation slot
    pub slot: Vec2,
    pub orders: SquadOrders,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SteeringOutput {
    pub soldier: SoldierId,
    pub position: Vec2,
    pub velocity: Vec2,
    pub facing: f32,
    pub state: SoldierState,
    /// Attack declared this tick
    pub attack: Option<SoldierId>,
    pub attack_cooldown: f32,
    pub moved: f32,
}

/// Read-only world the steering pass looks at
#[derive(Clone, Copy)]
pub struct SteeringWorld<'a> {
    pub soldiers: &'a SoldierArena,
    pub index: &'a SpatialIndex,
    pub terrain: &'a dyn Terrain,
    pub config: &'a SteeringConfig,
    pub fatigue_penalty: f32,
    pub dt: f32,
}

/// Steer every input soldier. `inputs` must be in soldier-id order; the
/// output keeps that order whether or not the pool was used.
pub fn steer_all(world: &SteeringWorld<'_>, inputs: &[SteeringInput], parallel_threshold: usize) -> Vec<SteeringOutput> {
    if inputs.len() >= parallel_threshold {
        inputs
            .par_iter()
            .filter_map(|input| steer_soldier(world, input))
            .collect()
    } else {
        inputs.iter().filter_map(|input| steer_soldier(world, input)).collect()
    }
}

fn arrive(from: Vec2, to: Vec2, speed: f32, arrive_radius: f32, tolerance: f32) -> Vec2 {
    let offset = to - from;
    let distance = offset.length();
    if distance <= tolerance {
        return Vec2::ZERO;
    }
    let scale = if distance < arrive_radius {
        distance / arrive_radius
    } else {
        1.0
    };
    offset.normalize() * (speed * scale)
}

/// Push away from neighbours, weighted `(radius / d - 1)`
fn separation(soldier: &Soldier, world: &SteeringWorld<'_>) -> Vec2 {
    let radius = world.config.separation_radius;
    let mut push = Vec2::ZERO;
    for entry in world.index.query_radius_entries(soldier.position, radius) {
        if entry.id == soldier.id {
            continue;
        }
        let away = soldier.position - entry.position;
        let d = away.length();
        if d < MIN_SEPARATION {
            // Coincident bodies split along a per-id direction
            let angle = soldier.id.0 as f32 * GOLDEN_ANGLE;
            push += Vec2::from_heading(angle);
        } else {
            push += away * (1.0 / d) * (radius / d - 1.0);
        }
    }
    push
}

/// Nearest enemy soldier inside `radius`, preferring the focus squad
fn pick_enemy(soldier: &Soldier, orders: &SquadOrders, radius: f32, world: &SteeringWorld<'_>) -> Option<(SoldierId, Vec2)> {
    if radius <= 0.0 {
        return None;
    }
    let soldiers = world.soldiers;
    let focused = orders.focus.and_then(|focus| {
        world.index.nearest_where(soldier.position, radius, |e| {
            e.team != soldier.team && soldiers.get(e.id).map_or(false, |s| s.squad == focus)
        })
    });
    focused
        .or_else(|| world.index.nearest_where(soldier.position, radius, |e| e.team != soldier.team))
        .map(|e| (e.id, e.position))
}

/// Move by `velocity * dt`, sliding along an axis when the full step is blocked
fn constrained_step(from: Vec2, velocity: Vec2, dt: f32, terrain: &dyn Terrain) -> Vec2 {
    let step = velocity * dt;
    let full = from + step;
    if terrain.is_passable(full) {
        return full;
    }
    let along_x = Vec2::new(from.x + step.x, from.z);
    if step.x != 0.0 && terrain.is_passable(along_x) {
        return along_x;
    }
    let along_z = Vec2::new(from.x, from.z + step.z);
    if step.z != 0.0 && terrain.is_passable(along_z) {
        return along_z;
    }
    from
}

/// Steer one soldier; `None` for soldiers no longer on the field
pub fn steer_soldier(world: &SteeringWorld<'_>, input: &SteeringInput) -> Option<SteeringOutput> {
    let soldier = world.soldiers.get(input.soldier)?;
    if !soldier.is_present() {
        return None;
    }
    let cfg = world.config;
    let dt = world.dt;
    let orders = &input.orders;
    let terrain_speed = world.terrain.speed_modifier(soldier.position);
    let base = soldier.base_speed(world.fatigue_penalty) * terrain_speed;
    let cooldown = (soldier.attack_cooldown - dt).max(0.0);

    if soldier.is_routing() {
        let threat = world
            .index
            .nearest_where(soldier.position, cfg.flee_radius, |e| e.team != soldier.team);
        let direction = match threat {
            Some(enemy) if enemy.position.distance_squared(&soldier.position) > MIN_SEPARATION => {
                (soldier.position - enemy.position).normalize()
            }
            _ => orders.retreat_direction,
        };
        let speed = base * cfg.rout_speed_multiplier;
        let velocity = (direction * speed + separation(soldier, world) * (cfg.separation_weight * speed))
            .clamp_length(speed);
        let position = constrained_step(soldier.position, velocity, dt, world.terrain);
        let facing = if velocity.length_squared() > MIN_SEPARATION {
            turn_towards(soldier.facing, velocity.heading(), cfg.turn_rate * dt)
        } else {
            soldier.facing
        };
        return Some(SteeringOutput {
            soldier: soldier.id,
            position,
            velocity,
            facing,
            state: SoldierState::Routing,
            attack: None,
            attack_cooldown: cooldown,
            moved: position.distance(&soldier.position),
        });
    }

    let speed = base * orders.speed_multiplier;
    let reach = soldier.stats.weapon_range + 2.0 * cfg.body_radius;

    // Who this soldier is looking at
    let enemy = match orders.mode {
        MoveMode::Retreat => None,
        MoveMode::Hold => pick_enemy(soldier, orders, reach, world),
        MoveMode::Formation if soldier.stats.ranged => pick_enemy(soldier, orders, reach, world),
        MoveMode::Formation => pick_enemy(soldier, orders, cfg.chase_radius.max(reach), world),
    };

    let goal = match (orders.mode, enemy) {
        (MoveMode::Formation, Some((_, enemy_pos))) if !soldier.stats.ranged => {
            // Close to weapon reach, not onto the enemy
            let offset = soldier.position - enemy_pos;
            let d = offset.length();
            let stand = (reach * 0.8).max(cfg.body_radius * 2.0);
            if d > stand {
                enemy_pos + offset.normalize() * stand
            } else {
                soldier.position
            }
        }
        _ => input.slot,
    };

    let seek = arrive(soldier.position, goal, speed, cfg.arrive_radius, cfg.slot_tolerance);
    let push = separation(soldier, world) * (cfg.separation_weight * speed);
    let velocity = (seek + push).clamp_length(speed);
    let position = constrained_step(soldier.position, velocity, dt, world.terrain);

    let desired_facing = match enemy {
        Some((_, enemy_pos)) if enemy_pos.distance_squared(&position) > MIN_SEPARATION => {
            (enemy_pos - position).heading()
        }
        _ if orders.mode == MoveMode::Retreat && velocity.length_squared() > MIN_SEPARATION => velocity.heading(),
        _ if seek.length() > speed * 0.5 => velocity.heading(),
        _ => orders.heading,
    };
    let facing = turn_towards(soldier.facing, desired_facing, cfg.turn_rate * dt);

    let in_reach = enemy.filter(|(_, enemy_pos)| enemy_pos.distance(&position) <= reach);
    let attack = in_reach.and_then(|(id, enemy_pos)| {
        let bearing = (enemy_pos - position).heading();
        let within_arc = heading_delta(facing, bearing).abs() <= cfg.attack_arc;
        (cooldown <= 0.0 && within_arc).then_some(id)
    });

    let moving = input.slot.distance(&position) > cfg.slot_tolerance || seek != Vec2::ZERO;
    let state = match orders.mode {
        MoveMode::Retreat => SoldierState::Retreating,
        _ if in_reach.is_some() && orders.charging => SoldierState::Charging,
        _ if in_reach.is_some() => SoldierState::Engaging,
        _ if moving && orders.charging => SoldierState::Charging,
        _ if moving => SoldierState::Advancing,
        _ => SoldierState::Idle,
    };

    Some(SteeringOutput {
        soldier: soldier.id,
        position,
        velocity,
        facing,
        state,
        attack,
        attack_cooldown: if attack.is_some() {
            soldier.stats.attack_interval
        } else {
            cooldown
        },
        moved: position.distance(&soldier.position),
    })
}

/// Pairwise overlap corrections from the post-move positions, each body
/// taking half. Returned in id order; corrections into impassable ground are
/// dropped by the caller.
pub fn collision_corrections(
    soldiers: &SoldierArena,
    index: &SpatialIndex,
    body_radius: f32,
) -> Vec<(SoldierId, Vec2)> {
    let min_distance = body_radius * 2.0;
    let mut corrections = Vec::new();
    for soldier in soldiers.present() {
        let mut correction = Vec2::ZERO;
        for entry in index.query_radius_entries(soldier.position, min_distance) {
            if entry.id == soldier.id {
                continue;
            }
            let away = soldier.position - entry.position;
            let d = away.length();
            let overlap = min_distance - d;
            if overlap <= 0.0 {
                continue;
            }
            let direction = if d < MIN_SEPARATION {
                // Lower id goes one way, higher id the other
                let angle = soldier.id.0.min(entry.id.0) as f32 * GOLDEN_ANGLE;
                let dir = Vec2::from_heading(angle);
                if soldier.id < entry.id {
                    dir
                } else {
                    -dir
                }
            } else {
                away * (1.0 / d)
            };
            correction += direction * (overlap * 0.5);
        }
        if correction != Vec2::ZERO {
            corrections.push((soldier.id, correction));
        }
    }
    corrections
}
