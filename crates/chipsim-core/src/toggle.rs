//! Structural state locations and manual toggle overrides.
//!
//! A [`StateLoc`] names a single state slot by walking from the viewed chip down through nested
//! parts, so it stays valid across re-flattening. Overrides are stored on the viewed chip and are
//! forced into the current buffer after every tick.

use tracing::{debug, trace};

use crate::{
    chip::{ChipId, ChipRef, PartId},
    LogicSim,
};

/// A structural location of one state slot.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StateLoc {
    /// Parts from the viewed chip down to the target part. Every part but the last must place a
    /// library chip.
    pub path: Vec<PartId>,
    /// Output pin of the target part.
    pub pin: usize,
}

impl StateLoc {
    /// Creates a location from a path and an output pin.
    pub fn new(path: Vec<PartId>, pin: usize) -> Self {
        Self { path, pin }
    }

    /// Location of the first output of a part of the viewed chip.
    pub fn part(part: PartId) -> Self {
        Self::new(vec![part], 0)
    }

    /// Returns the location one level further down, inside the target part.
    pub fn child(&self, part: PartId, pin: usize) -> Self {
        let mut path = self.path.clone();
        path.push(part);
        Self::new(path, pin)
    }
}

impl LogicSim {
    /// Resolves a location to an index into the viewed chip's state buffers.
    ///
    /// Returns `None` if any part on the path no longer exists, if an intermediate part is a
    /// primitive, or if the pin is out of range.
    pub fn resolve_loc(&self, loc: &StateLoc) -> Option<usize> {
        let (last, parents) = loc.path.split_last()?;

        let mut chip = self.chips.get(self.viewed_chip)?;
        let mut base = 0;
        for id in parents {
            let part = chip.get_part(*id)?;
            base += part.sid;
            chip = self.chips.get(part.chip.custom()?)?;
        }

        let part = chip.get_part(*last)?;
        (loc.pin < self.output_count(part.chip)).then(|| base + part.sid + loc.pin)
    }

    /// Returns the value at a location in the current and the previous buffer.
    pub fn state_at(&self, loc: &StateLoc) -> Option<(bool, bool)> {
        let slot = self.resolve_loc(loc)?;
        Some((
            self.state[self.cur_state][slot],
            self.state[self.cur_state ^ 1][slot],
        ))
    }

    /// Returns the forced value at a location, if it is overridden.
    pub fn toggle_value(&self, loc: &StateLoc) -> Option<bool> {
        self.viewed().toggle_locs.get(loc).copied()
    }

    /// Forces the location to the negation of its displayed value.
    ///
    /// The new value is written into the current buffer straight away and re-applied after every
    /// tick until cleared. Returns the forced value, or `None` if the location does not resolve.
    pub fn toggle(&mut self, loc: StateLoc) -> Option<bool> {
        let slot = self.resolve_loc(&loc)?;
        let value = !self.state[self.cur_state][slot];
        self.force(loc, value)
    }

    /// Forces the location to `value`.
    pub fn force(&mut self, loc: StateLoc, value: bool) -> Option<bool> {
        let slot = self.resolve_loc(&loc)?;
        debug!(?loc, value, "forcing state slot {slot}");

        self.state[self.cur_state][slot] = value;
        let viewed = self.viewed_chip;
        self.chips[viewed].toggle_locs.insert(loc, value);

        Some(value)
    }

    /// Removes an override, returning its forced value.
    pub fn clear_toggle(&mut self, loc: &StateLoc) -> Option<bool> {
        let viewed = self.viewed_chip;
        self.chips[viewed].toggle_locs.remove(loc)
    }

    /// Returns what the target part of `loc` places, walking down from `owner`.
    pub(crate) fn loc_target(&self, owner: ChipId, loc: &StateLoc) -> Option<ChipRef> {
        let (last, parents) = loc.path.split_last()?;

        let mut chip = self.chips.get(owner)?;
        for id in parents {
            chip = self.chips.get(chip.get_part(*id)?.chip.custom()?)?;
        }

        Some(chip.get_part(*last)?.chip)
    }

    /// Drops every override in the library whose location no longer resolves.
    pub(crate) fn prune_toggles(&mut self) {
        let ids: Vec<ChipId> = self.chips.keys().collect();
        for owner in ids {
            let mut toggles = std::mem::take(&mut self.chips[owner].toggle_locs);
            let before = toggles.len();
            toggles.retain(|loc, _| {
                self.loc_target(owner, loc)
                    .map_or(false, |target| loc.pin < self.output_count(target))
            });
            if toggles.len() != before {
                trace!(pruned = before - toggles.len(), "pruned stale overrides");
            }
            self.chips[owner].toggle_locs = toggles;
        }
    }

    /// Writes every override of the viewed chip into the current buffer.
    pub(crate) fn apply_toggles(&mut self) {
        let forced: Vec<(usize, bool)> = self
            .viewed()
            .toggle_locs
            .iter()
            .filter_map(|(loc, value)| Some((self.resolve_loc(loc)?, *value)))
            .collect();

        let cur = &mut self.state[self.cur_state];
        for (slot, value) in forced {
            cur[slot] = value;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        chip::{PinRef, Placement},
        gate::Primitive,
    };

    #[test]
    fn test_toggle_inverts_and_persists() {
        let mut sim = LogicSim::new();
        let chip = sim.viewed_chip();
        let input = sim.add_part(chip, Primitive::InputPin.into(), Placement::default());
        let loc = StateLoc::part(input);

        assert_eq!(sim.toggle(loc.clone()), Some(true));
        assert_eq!(sim.state_at(&loc), Some((true, false)));

        sim.tick();
        assert_eq!(sim.state_at(&loc).map(|s| s.0), Some(true));
        assert_eq!(sim.toggle_value(&loc), Some(true));

        assert_eq!(sim.toggle(loc.clone()), Some(false));
        sim.tick();
        assert_eq!(sim.state_at(&loc).map(|s| s.0), Some(false));

        assert_eq!(sim.clear_toggle(&loc), Some(false));
        assert_eq!(sim.toggle_value(&loc), None);
    }

    #[test]
    fn test_stale_location_is_ignored() {
        let mut sim = LogicSim::new();
        let chip = sim.viewed_chip();
        let gate = sim.add_part(chip, Primitive::Not.into(), Placement::default());
        let loc = StateLoc::part(gate);

        sim.force(loc.clone(), true).unwrap();
        sim.remove_part(chip, gate);

        assert_eq!(sim.resolve_loc(&loc), None);
        assert_eq!(sim.toggle_value(&loc), None);
        // nothing left to apply
        sim.tick();
    }

    #[test]
    fn test_pin_out_of_range() {
        let mut sim = LogicSim::new();
        let chip = sim.viewed_chip();
        let gate = sim.add_part(chip, Primitive::Demux.into(), Placement::default());

        assert!(sim.resolve_loc(&StateLoc::new(vec![gate], 1)).is_some());
        assert_eq!(sim.resolve_loc(&StateLoc::new(vec![gate], 2)), None);
        assert_eq!(sim.resolve_loc(&StateLoc::new(vec![gate, gate], 0)), None);
    }

    #[test]
    fn test_override_follows_slot_shift() {
        let mut sim = LogicSim::new();
        let chip = sim.viewed_chip();
        let a = sim.add_part(chip, Primitive::InputPin.into(), Placement::default());
        let and = sim.add_part(chip, Primitive::And.into(), Placement::default());
        sim.add_wire(chip, PinRef::new(a, 0), PinRef::new(and, 0), Vec::new());
        sim.add_wire(chip, PinRef::new(a, 0), PinRef::new(and, 1), Vec::new());
        let loc = StateLoc::part(a);
        sim.force(loc.clone(), true).unwrap();

        // output pins come first, so every other slot moves up by one
        sim.add_part(chip, Primitive::OutputPin.into(), Placement::default());
        assert_eq!(sim.resolve_loc(&loc), Some(1));
        assert_eq!(sim.state_at(&loc).map(|s| s.0), Some(true));

        sim.tick();
        assert_eq!(sim.state_at(&loc).map(|s| s.0), Some(true));
        assert_eq!(sim.state_at(&StateLoc::part(and)).map(|s| s.0), Some(true));
    }
}
