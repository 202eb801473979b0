use bitflags::bitflags;

use super::NodeHandle;

/// Stable identifier for an edge, indexing directly into the graph store's
/// flat edge table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EdgeHandle(pub u32);

bitflags! {
    /// Packed per-edge flags (direction is implicit in source/target;
    /// the other bit tracks deferred deletion).
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct EdgeFlags: u8 {
        /// Set during wave propagation when usage falls below the
        /// adaptive floor; acted on only by the post-wave cleanup pass.
        const MARKED_FOR_DELETION = 0b0000_0001;
        /// Targets the singleton STOP node.
        const TO_STOP = 0b0000_0010;
    }
}

/// A directed, weighted, learned association between two nodes.
///
/// Weight is quantised to a `u8` in `[1, 255]` for persistence, but a
/// real-valued backing field carries all arithmetic so that
/// repeated small Hebbian deltas accumulate instead of being rounded away
/// on every call; the quantised byte is derived from it lazily and is only
/// the thing written to disk and compared against integral thresholds.
#[derive(Debug, Clone)]
pub struct Edge {
    pub source: NodeHandle,
    pub target: NodeHandle,
    weight_real: f64,
    pub usage_counter: u64,
    pub last_strengthened: u64,
    pub flags: EdgeFlags,

    // --- runtime-only ---
    /// Scratch accumulator used during a single wave propagation step;
    /// meaningless outside of `wave::refine`.
    pub(crate) scratch: f32,
}

impl Edge {
    pub fn new(source: NodeHandle, target: NodeHandle, initial_weight: f64, timestamp: u64) -> Self {
        Self {
            source,
            target,
            weight_real: clamp_real(initial_weight),
            usage_counter: 0,
            last_strengthened: timestamp,
            flags: EdgeFlags::empty(),
            scratch: 0.0,
        }
    }

    /// Reconstructs an edge from its persisted (quantised) weight, used
    /// only by [`crate::persistence::load`]. The real-valued backing field
    /// starts equal to the quantised byte; any precision finer than one
    /// unit that existed before a save is, by design, not round-tripped —
    /// only the persisted byte is a contractual guarantee.
    pub(crate) fn from_persisted(
        source: NodeHandle,
        target: NodeHandle,
        weight_byte: u8,
        usage_counter: u64,
        last_strengthened: u64,
        flags: EdgeFlags,
    ) -> Self {
        Self {
            source,
            target,
            weight_real: weight_byte as f64,
            usage_counter,
            last_strengthened,
            flags,
            scratch: 0.0,
        }
    }

    pub fn weight_byte(&self) -> u8 {
        quantise_weight(self.weight_real)
    }

    /// The weight as a real-valued scalar in `[1.0, 255.0]`.
    pub fn weight(&self) -> f64 {
        self.weight_real
    }

    /// Sets the weight, clamping to the representable range `[1, 255]` —
    /// a weight of 0 is not representable for a live edge.
    pub fn set_weight(&mut self, value: f64) {
        self.weight_real = clamp_real(value);
    }

    pub fn is_marked_for_deletion(&self) -> bool {
        self.flags.contains(EdgeFlags::MARKED_FOR_DELETION)
    }

    pub fn mark_for_deletion(&mut self) {
        self.flags.insert(EdgeFlags::MARKED_FOR_DELETION);
    }

    pub fn is_to_stop(&self) -> bool {
        self.flags.contains(EdgeFlags::TO_STOP)
    }
}

/// Clamps a real-valued weight into the representable range, resetting
/// non-finite inputs to the midpoint (numerical-error containment).
fn clamp_real(value: f64) -> f64 {
    if !value.is_finite() {
        return 128.0;
    }
    value.clamp(1.0, 255.0)
}

fn quantise_weight(value: f64) -> u8 {
    if !value.is_finite() {
        // Numerical error containment: reset toward the middle of the
        // representable range rather than propagate NaN/Inf.
        return 128;
    }
    value.round().clamp(1.0, 255.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn weight_clamps_into_representable_range() {
        let mut e = Edge::new(NodeHandle(0), NodeHandle(1), 0.0, 0);
        assert_eq!(e.weight_byte(), 1);
        e.set_weight(9999.0);
        assert_eq!(e.weight_byte(), 255);
        e.set_weight(f64::NAN);
        assert_eq!(e.weight_byte(), 128);
    }

    #[test]
    fn marked_for_deletion_is_observable_but_not_deleted() {
        let mut e = Edge::new(NodeHandle(0), NodeHandle(1), 10.0, 0);
        assert!(!e.is_marked_for_deletion());
        e.mark_for_deletion();
        assert!(e.is_marked_for_deletion());
        // Weight is still readable; marking doesn't remove state.
        assert_eq!(e.weight_byte(), 10);
    }
}
