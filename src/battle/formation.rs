//! Formation slot layouts and transitions
//!
//! Slots are squad-local offsets (x = right, z = forward) centred on the
//! anchor. One slot exists per living soldier; soldier `i` of the squad's
//! living list occupies slot `i`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::core::config::FormationConfig;
use crate::core::error::BattleError;
use crate::core::types::Vec2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormationType {
    #[default]
    Line,
    Column,
    Square,
    Wedge,
    Loose,
    Testudo,
    ShieldWall,
}

/// Combat and movement effects of a formation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FormationModifiers {
    /// Multiplier on defender armour
    pub armor_mult: f32,
    /// Subtracted from incoming ranged hit chance
    pub ranged_hit_penalty: f32,
    pub speed_mult: f32,
    /// Fraction of flank/rear bonuses cancelled
    pub flank_protection: f32,
}

impl FormationModifiers {
    /// Field-wise worst of two sets
    pub fn weakest(&self, other: &FormationModifiers) -> FormationModifiers {
        FormationModifiers {
            armor_mult: self.armor_mult.min(other.armor_mult),
            ranged_hit_penalty: self.ranged_hit_penalty.min(other.ranged_hit_penalty),
            speed_mult: self.speed_mult.min(other.speed_mult),
            flank_protection: self.flank_protection.min(other.flank_protection),
        }
    }
}

impl FormationType {
    pub const ALL: [FormationType; 7] = [
        FormationType::Line,
        FormationType::Column,
        FormationType::Square,
        FormationType::Wedge,
        FormationType::Loose,
        FormationType::Testudo,
        FormationType::ShieldWall,
    ];

    pub fn modifiers(&self) -> FormationModifiers {
        let (armor_mult, ranged_hit_penalty, speed_mult, flank_protection) = match self {
            FormationType::Line => (1.0, 0.0, 1.0, 0.0),
            FormationType::Column => (0.9, 0.0, 1.15, 0.0),
            FormationType::Square => (1.0, 0.1, 0.6, 0.6),
            FormationType::Wedge => (0.9, 0.0, 1.1, 0.1),
            FormationType::Loose => (0.8, 0.3, 1.1, 0.0),
            FormationType::Testudo => (1.5, 0.6, 0.5, 0.3),
            FormationType::ShieldWall => (1.3, 0.3, 0.7, 0.1),
        };
        FormationModifiers {
            armor_mult,
            ranged_hit_penalty,
            speed_mult,
            flank_protection,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            FormationType::Line => "line",
            FormationType::Column => "column",
            FormationType::Square => "square",
            FormationType::Wedge => "wedge",
            FormationType::Loose => "loose",
            FormationType::Testudo => "testudo",
            FormationType::ShieldWall => "shield_wall",
        }
    }
}

impl fmt::Display for FormationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for FormationType {
    type Err = BattleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace(['-', ' '], "_");
        FormationType::ALL
            .into_iter()
            .find(|f| f.name() == normalized)
            .ok_or_else(|| BattleError::UnknownFormation(s.to_string()))
    }
}

/// Lay `count` slots in ranks of `width`, centred on the origin with the
/// first rank in front; a short last rank is centred too
fn ranks(count: usize, width: usize, spacing: f32) -> Vec<Vec2> {
    let width = width.max(1);
    let rows = count.div_ceil(width);
    let mut slots = Vec::with_capacity(count);
    for i in 0..count {
        let row = i / width;
        let col = i % width;
        let in_row = (count - row * width).min(width);
        let x = (col as f32 - (in_row as f32 - 1.0) / 2.0) * spacing;
        let z = ((rows as f32 - 1.0) / 2.0 - row as f32) * spacing;
        slots.push(Vec2::new(x, z));
    }
    slots
}

fn wedge(count: usize, spacing: f32) -> Vec<Vec2> {
    let mut row_sizes = Vec::new();
    let mut placed = 0;
    let mut row = 0;
    while placed < count {
        let size = (2 * row + 1).min(count - placed);
        row_sizes.push(size);
        placed += size;
        row += 1;
    }

    let rows = row_sizes.len();
    let mut slots = Vec::with_capacity(count);
    for (row, size) in row_sizes.into_iter().enumerate() {
        let z = ((rows as f32 - 1.0) / 2.0 - row as f32) * spacing;
        for col in 0..size {
            let x = (col as f32 - (size as f32 - 1.0) / 2.0) * spacing;
            slots.push(Vec2::new(x, z));
        }
    }
    slots
}

/// Deterministic slot table for `count` soldiers
pub fn compute_slots(kind: FormationType, count: usize, config: &FormationConfig) -> Vec<Vec2> {
    if count == 0 {
        return Vec::new();
    }
    let spacing = config.spacing;
    let square_side = (count as f32).sqrt().ceil() as usize;
    match kind {
        FormationType::Line => ranks(count, config.line_width.min(count), spacing),
        FormationType::Column => ranks(count, config.column_width.min(count), spacing),
        FormationType::Square => ranks(count, square_side, spacing),
        FormationType::Wedge => wedge(count, spacing),
        FormationType::Loose => ranks(count, config.line_width.min(count), spacing * 2.0),
        FormationType::Testudo => ranks(count, square_side, spacing * 0.7),
        FormationType::ShieldWall => ranks(count, count.div_ceil(2), spacing),
    }
}

/// In-flight change between two layouts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transition {
    pub from_kind: FormationType,
    pub from: Vec<Vec2>,
    pub to: Vec<Vec2>,
    pub elapsed: f32,
    pub duration: f32,
}

impl Transition {
    pub fn progress(&self) -> f32 {
        if self.duration <= 0.0 {
            1.0
        } else {
            (self.elapsed / self.duration).clamp(0.0, 1.0)
        }
    }
}

/// A squad's formation: target type, effective slots, optional transition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormationState {
    pub kind: FormationType,
    pub slots: Vec<Vec2>,
    pub transition: Option<Transition>,
}

impl FormationState {
    pub fn new(kind: FormationType, count: usize, config: &FormationConfig) -> Self {
        Self {
            kind,
            slots: compute_slots(kind, count, config),
            transition: None,
        }
    }

    pub fn is_transitioning(&self) -> bool {
        self.transition.is_some()
    }

    /// Effective modifiers. Mid-change a squad gets no more than either layout
    /// offers; the new formation's benefits start once the change completes.
    pub fn modifiers(&self) -> FormationModifiers {
        let target = self.kind.modifiers();
        match &self.transition {
            Some(t) => target.weakest(&t.from_kind.modifiers()),
            None => target,
        }
    }

    pub fn slot(&self, index: usize) -> Vec2 {
        self.slots.get(index).copied().unwrap_or(Vec2::ZERO)
    }

    /// Start a change to `kind`; returns false when already in (or heading to) it
    pub fn set_formation(&mut self, kind: FormationType, count: usize, config: &FormationConfig) -> bool {
        if kind == self.kind {
            return false;
        }
        let from = if self.slots.len() == count {
            self.slots.clone()
        } else {
            compute_slots(self.kind, count, config)
        };
        let to = compute_slots(kind, count, config);
        let duration =
            config.transition_base_seconds + config.transition_per_soldier_seconds * count as f32;

        self.transition = Some(Transition {
            from_kind: self.kind,
            from,
            to,
            elapsed: 0.0,
            duration,
        });
        self.kind = kind;
        self.refresh_slots();
        true
    }

    /// Advance the transition timer; returns true once no transition is pending
    pub fn transition(&mut self, dt: f32) -> bool {
        let done = match &mut self.transition {
            None => return true,
            Some(t) => {
                t.elapsed += dt;
                t.elapsed >= t.duration
            }
        };
        if done {
            if let Some(t) = self.transition.take() {
                self.slots = t.to;
            }
        } else {
            self.refresh_slots();
        }
        done
    }

    /// Match the slot table to `living` soldiers; returns true when recomputed.
    /// A transition keeps its elapsed time with both endpoints regenerated.
    pub fn reconcile(&mut self, living: usize, config: &FormationConfig) -> bool {
        if self.slots.len() == living {
            return false;
        }
        match &mut self.transition {
            Some(t) => {
                t.from = compute_slots(t.from_kind, living, config);
                t.to = compute_slots(self.kind, living, config);
                self.refresh_slots();
            }
            None => self.slots = compute_slots(self.kind, living, config),
        }
        true
    }

    fn refresh_slots(&mut self) {
        if let Some(t) = &self.transition {
            let p = t.progress();
            self.slots = t
                .from
                .iter()
                .zip(t.to.iter())
                .map(|(a, b)| a.lerp(b, p))
                .collect();
        }
    }
}
