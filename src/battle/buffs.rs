//! Timed stat modifiers
//!
//! Buffs of the same kind stack additively and each decays on its own timer.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuffKind {
    Attack,
    Defense,
    Speed,
    Morale,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuffSource {
    Charge,
    Brace,
    General,
    Rally,
}

/// A single modifier; magnitude is a fraction (0.3 = +30%) except for
/// `Morale`, where it is morale points per second
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Buff {
    pub kind: BuffKind,
    pub magnitude: f32,
    pub source: BuffSource,
    pub remaining: f32,
}

impl Buff {
    pub fn new(kind: BuffKind, magnitude: f32, source: BuffSource, duration: f32) -> Self {
        Self {
            kind,
            magnitude,
            source,
            remaining: duration,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BuffSet {
    buffs: Vec<Buff>,
}

impl BuffSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, buff: Buff) {
        self.buffs.push(buff);
    }

    /// Sum of magnitudes for a kind
    pub fn total(&self, kind: BuffKind) -> f32 {
        self.buffs
            .iter()
            .filter(|b| b.kind == kind)
            .map(|b| b.magnitude)
            .sum()
    }

    /// `1 + total`, floored at zero
    pub fn multiplier(&self, kind: BuffKind) -> f32 {
        (1.0 + self.total(kind)).max(0.0)
    }

    pub fn has_source(&self, source: BuffSource) -> bool {
        self.buffs.iter().any(|b| b.source == source)
    }

    pub fn remove_source(&mut self, source: BuffSource) {
        self.buffs.retain(|b| b.source != source);
    }

    /// Advance timers and drop expired buffs
    pub fn decay(&mut self, dt: f32) {
        for buff in &mut self.buffs {
            buff.remaining -= dt;
        }
        self.buffs.retain(|b| b.remaining > 0.0);
    }

    pub fn clear(&mut self) {
        self.buffs.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.buffs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Buff> {
        self.buffs.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffs_stack_additively() {
        let mut set = BuffSet::new();
        set.push(Buff::new(BuffKind::Attack, 0.5, BuffSource::Charge, 4.0));
        set.push(Buff::new(BuffKind::Attack, 0.2, BuffSource::General, 10.0));
        set.push(Buff::new(BuffKind::Defense, 0.3, BuffSource::Brace, 10.0));
        assert!((set.multiplier(BuffKind::Attack) - 1.7).abs() < 1e-6);
        assert!((set.multiplier(BuffKind::Defense) - 1.3).abs() < 1e-6);
        assert_eq!(set.multiplier(BuffKind::Speed), 1.0);
    }

    #[test]
    fn test_buffs_decay_independently() {
        let mut set = BuffSet::new();
        set.push(Buff::new(BuffKind::Speed, 0.6, BuffSource::Charge, 1.0));
        set.push(Buff::new(BuffKind::Speed, 0.1, BuffSource::General, 3.0));
        set.decay(1.5);
        assert!(!set.has_source(BuffSource::Charge));
        assert!((set.total(BuffKind::Speed) - 0.1).abs() < 1e-6);
        set.decay(2.0);
        assert!(set.is_empty());
    }

    #[test]
    fn test_negative_multiplier_floors_at_zero() {
        let mut set = BuffSet::new();
        set.push(Buff::new(BuffKind::Speed, -1.5, BuffSource::Rally, 1.0));
        assert_eq!(set.multiplier(BuffKind::Speed), 0.0);
    }

    #[test]
    fn test_remove_source() {
        let mut set = BuffSet::new();
        set.push(Buff::new(BuffKind::Defense, 0.3, BuffSource::Brace, 10.0));
        set.push(Buff::new(BuffKind::Attack, 0.1, BuffSource::General, 10.0));
        set.remove_source(BuffSource::Brace);
        assert_eq!(set.total(BuffKind::Defense), 0.0);
        assert!(set.has_source(BuffSource::General));
    }
}
