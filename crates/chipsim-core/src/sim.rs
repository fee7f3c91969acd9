//! The library root.

use slotmap::SlotMap;
use tracing::{debug, trace};

use crate::{
    chip::{Chip, ChipId, ChipRef, Part, PartId, V2},
    simulate::simulate_chip,
    LibraryError,
};

/// The library of saved chips, the chip being viewed, and the viewed chip's simulation state.
#[derive(Debug, Clone)]
pub struct LogicSim {
    pub(crate) chips: SlotMap<ChipId, Chip>,
    pub(crate) saved_chips: Vec<ChipId>,
    pub(crate) viewed_chip: ChipId,
    /// Double-buffered state of the viewed chip.
    pub(crate) state: [Vec<bool>; 2],
    /// Index of the current buffer.
    pub(crate) cur_state: usize,
    pub(crate) dirty: bool,
}

impl Default for LogicSim {
    fn default() -> Self {
        Self::new()
    }
}

impl LogicSim {
    /// Creates an empty library viewing a new, unsaved chip.
    pub fn new() -> Self {
        let mut chips = SlotMap::with_key();
        let viewed_chip = chips.insert(Chip::default());

        let mut sim = Self {
            chips,
            saved_chips: Vec::new(),
            viewed_chip,
            state: [Vec::new(), Vec::new()],
            cur_state: 0,
            dirty: false,
        };
        sim.reflatten();
        sim
    }

    /// Returns the chip with the given id.
    ///
    /// # Panics
    ///
    /// If the chip is not in the library.
    pub fn chip(&self, id: ChipId) -> &Chip {
        &self.chips[id]
    }

    /// Returns the chip with the given id, or `None` if it was deleted.
    pub fn get_chip(&self, id: ChipId) -> Option<&Chip> {
        self.chips.get(id)
    }

    /// Returns the saved chips in library order.
    pub fn saved_chips(&self) -> &[ChipId] {
        &self.saved_chips
    }

    /// Returns `true` if the chip is in the saved library.
    pub fn is_saved(&self, id: ChipId) -> bool {
        self.saved_chips.contains(&id)
    }

    /// Finds a saved chip by name.
    pub fn find_chip(&self, name: &str) -> Option<ChipId> {
        self.saved_chips
            .iter()
            .copied()
            .find(|id| self.chips[*id].name == name)
    }

    /// Returns the id of the chip being viewed.
    pub fn viewed_chip(&self) -> ChipId {
        self.viewed_chip
    }

    /// Returns the chip being viewed.
    pub fn viewed(&self) -> &Chip {
        &self.chips[self.viewed_chip]
    }

    /// Returns a part of a chip.
    ///
    /// # Panics
    ///
    /// If the chip or the part does not exist.
    pub fn part(&self, chip: ChipId, part: PartId) -> &Part {
        self.chips[chip].part(part)
    }

    /// Returns the current state buffer of the viewed chip.
    pub fn state(&self) -> &[bool] {
        &self.state[self.cur_state]
    }

    /// Returns the state buffer from before the last tick.
    pub fn prev_state(&self) -> &[bool] {
        &self.state[self.cur_state ^ 1]
    }

    /// Returns `true` if the library changed since it was last saved.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Marks the library as saved.
    pub fn clear_dirty(&mut self) {
        self.dirty = false;
    }

    /// Returns the number of input pins of a chip definition.
    pub fn input_count(&self, chip: ChipRef) -> usize {
        match chip {
            ChipRef::Primitive(prim) => prim.input_count(),
            ChipRef::Custom(id) => self.chips[id].inputs.len(),
        }
    }

    /// Returns the number of output pins of a chip definition.
    pub fn output_count(&self, chip: ChipRef) -> usize {
        match chip {
            ChipRef::Primitive(prim) => prim.output_count(),
            ChipRef::Custom(id) => self.chips[id].outputs.len(),
        }
    }

    /// Returns the display name of a chip definition.
    pub fn chip_name(&self, chip: ChipRef) -> &str {
        match chip {
            ChipRef::Primitive(prim) => prim.name(),
            ChipRef::Custom(id) => &self.chips[id].name,
        }
    }

    /// Advances the viewed chip by one tick.
    ///
    /// The viewed chip's own inputs are only driven by toggles, so they carry over unchanged.
    /// Overrides are applied to the new current buffer afterwards.
    #[tracing::instrument(level = "trace", skip_all)]
    pub fn tick(&mut self) {
        let viewed = &self.chips[self.viewed_chip];
        debug_assert_eq!(viewed.state_count, Some(self.state[0].len()));

        let [a, b] = &mut self.state;
        let (cur, next) = if self.cur_state == 0 {
            (&*a, b)
        } else {
            (&*b, a)
        };

        for pin in &viewed.inputs {
            let slot = viewed.arena[*pin].sid;
            next[slot] = cur[slot];
        }

        simulate_chip(&self.chips, self.viewed_chip, 0, cur, next);

        self.cur_state ^= 1;
        self.apply_toggles();

        trace!("tick complete");
    }

    /// Clears both state buffers.
    pub fn reset_state(&mut self) {
        for buf in self.state.iter_mut() {
            buf.fill(false);
        }
        self.cur_state = 0;
        self.apply_toggles();
    }

    /// Starts a new, empty chip and views it.
    ///
    /// An unsaved chip that was being viewed is discarded.
    pub fn new_chip(&mut self) -> ChipId {
        let id = self.chips.insert(Chip::default());
        self.switch_view(id);
        id
    }

    /// Views a saved chip. Edits made while viewing it apply to every instance.
    ///
    /// # Panics
    ///
    /// If the chip is not saved.
    pub fn view_chip(&mut self, id: ChipId) {
        assert!(self.is_saved(id), "only saved chips can be viewed");
        if id != self.viewed_chip {
            self.switch_view(id);
        }
    }

    fn switch_view(&mut self, id: ChipId) {
        let old = self.viewed_chip;
        self.viewed_chip = id;
        if !self.is_saved(old) && old != id {
            debug!("discarding unsaved chip");
            self.chips.remove(old);
            self.recompute_chip_users();
        }

        self.reflatten();
        self.reset_state();
    }

    /// Names the viewed chip and adds it to the saved library if it is not there yet.
    pub fn save_viewed_chip(&mut self, name: &str) -> Result<ChipId, LibraryError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(LibraryError::EmptyName);
        }

        let id = self.viewed_chip;
        self.chips[id].name = name.to_string();
        if !self.is_saved(id) {
            self.saved_chips.push(id);
            self.recompute_chip_users();
        }
        self.dirty = true;

        debug!(name, "saved chip");
        Ok(id)
    }

    /// Sets a chip's footprint size and re-lays its pins.
    pub fn set_chip_size(&mut self, id: ChipId, size: V2) {
        let chip = &mut self.chips[id];
        chip.size = size;
        chip.update_pins();
        self.dirty = true;
    }

    /// Sets a chip's display color.
    pub fn set_chip_color(&mut self, id: ChipId, color: [f32; 3]) {
        self.chips[id].color = color;
        self.dirty = true;
    }

    /// Re-flattens after a structural edit and marks the library dirty.
    pub(crate) fn restructure(&mut self) {
        self.prune_toggles();
        self.reflatten();
        self.dirty = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{chip::Placement, gate::Primitive};

    #[test]
    fn test_new_library() {
        let sim = LogicSim::new();

        assert!(sim.saved_chips().is_empty());
        assert_eq!(sim.viewed().state_count(), Some(0));
        assert!(sim.state().is_empty());
        assert!(!sim.is_dirty());
    }

    #[test]
    fn test_save_rejects_empty_name() {
        let mut sim = LogicSim::new();

        assert_eq!(sim.save_viewed_chip("  "), Err(LibraryError::EmptyName));
        assert!(sim.saved_chips().is_empty());

        let id = sim.save_viewed_chip(" adder ").unwrap();
        assert_eq!(sim.chip(id).name, "adder");
        assert_eq!(sim.find_chip("adder"), Some(id));
        assert!(sim.is_dirty());
    }

    #[test]
    fn test_new_chip_discards_unsaved() {
        let mut sim = LogicSim::new();
        let scratch = sim.viewed_chip();
        sim.add_part(scratch, Primitive::And.into(), Placement::default());

        sim.new_chip();

        assert!(sim.get_chip(scratch).is_none());
        assert_ne!(sim.viewed_chip(), scratch);
    }

    #[test]
    fn test_view_keeps_saved() {
        let mut sim = LogicSim::new();
        let first = sim.save_viewed_chip("first").unwrap();
        sim.new_chip();
        let second = sim.save_viewed_chip("second").unwrap();

        sim.view_chip(first);
        assert_eq!(sim.viewed_chip(), first);
        assert!(sim.get_chip(second).is_some());
    }

    #[test]
    fn test_buffers_track_viewed_chip() {
        let mut sim = LogicSim::new();
        let chip = sim.viewed_chip();
        sim.add_part(chip, Primitive::InputPin.into(), Placement::default());
        sim.add_part(chip, Primitive::Demux.into(), Placement::default());

        assert_eq!(sim.state().len(), 3);
        assert_eq!(sim.prev_state().len(), 3);
    }
}
