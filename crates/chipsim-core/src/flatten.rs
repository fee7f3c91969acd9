//! State flattening.
//!
//! Every part of a chip gets a contiguous range of slots in the chip's flat state vector, in a
//! fixed order: output pins, then input pins, then internal parts. A part placing a library chip
//! takes as many slots as that chip needs, recursively.

use tracing::debug;

use crate::{
    chip::{ChipId, ChipRef},
    LogicSim,
};

impl LogicSim {
    /// Assigns state slots to every part of `id` and returns the chip's total slot count.
    ///
    /// Returns the cached count if it is current.
    pub fn flatten(&mut self, id: ChipId) -> usize {
        if let Some(count) = self.chips[id].state_count {
            return count;
        }

        let children: Vec<ChipRef> = {
            let chip = &self.chips[id];
            chip.parts.iter().map(|p| chip.arena[*p].chip).collect()
        };

        let mut sizes = Vec::with_capacity(children.len());
        for child in children {
            let size = match child {
                ChipRef::Primitive(prim) => prim.output_count(),
                ChipRef::Custom(child) => self.flatten(child),
            };
            sizes.push(size);
        }

        let chip = &mut self.chips[id];
        let mut next = 0;
        for pin in chip.outputs.iter().chain(chip.inputs.iter()) {
            chip.arena[*pin].sid = next;
            next += 1;
        }
        for (part, size) in chip.parts.iter().zip(sizes) {
            chip.arena[*part].sid = next;
            next += size;
        }
        chip.state_count = Some(next);

        next
    }

    /// Marks every chip's flattening as stale.
    pub(crate) fn invalidate_all(&mut self) {
        for (_, chip) in self.chips.iter_mut() {
            chip.state_count = None;
        }
    }

    /// Re-flattens every chip from scratch and resizes the state buffers to the viewed chip.
    ///
    /// Slots keep their values by index, so overrides are written again at their new slots.
    pub(crate) fn reflatten(&mut self) {
        self.invalidate_all();

        let ids: Vec<ChipId> = self.chips.keys().collect();
        for id in ids {
            self.flatten(id);
        }

        let count = self.chips[self.viewed_chip]
            .state_count
            .expect("viewed chip was flattened");
        for buf in self.state.iter_mut() {
            buf.resize(count, false);
        }
        self.apply_toggles();

        debug!(chips = self.chips.len(), "re-flattened, viewed chip has {count} slots");
    }
}
