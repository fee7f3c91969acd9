//! Deep copies and deletion of library chips.

use std::collections::HashMap;

use slotmap::SlotMap;
use tracing::debug;

use crate::{
    chip::{Chip, ChipId, Part, PartId},
    toggle::StateLoc,
    LibraryError, LogicSim,
};

impl LogicSim {
    /// Returns a structurally identical copy of a chip whose parts have fresh identities.
    ///
    /// The copy is not part of the library and has no users.
    pub fn deep_copy(&self, id: ChipId) -> Chip {
        let src = &self.chips[id];
        let mut copy = Chip::new(src.name.clone());
        copy.color = src.color;
        copy.size = src.size;

        let mut map: HashMap<PartId, PartId> = HashMap::with_capacity(src.part_count());
        let lists = [
            (&src.outputs, &mut copy.outputs),
            (&src.inputs, &mut copy.inputs),
            (&src.parts, &mut copy.parts),
        ];
        for (ids, list) in lists {
            for old in ids {
                let new = insert_unwired(&mut copy.arena, &src.arena[*old]);
                map.insert(*old, new);
                list.push(new);
            }
        }

        // every part exists now, so forward links resolve
        for old in src.all_parts() {
            let new = map[&old];
            for (dst, wire) in copy.arena[new].inputs.iter_mut().zip(&src.arena[old].inputs) {
                *dst = wire.as_ref().map(|wire| {
                    let mut wire = wire.clone();
                    wire.src = map[&wire.src];
                    wire
                });
            }
        }

        copy.toggle_locs = src
            .toggle_locs
            .iter()
            .filter_map(|(loc, value)| {
                let (first, rest) = loc.path.split_first()?;
                let mut path = vec![*map.get(first)?];
                path.extend_from_slice(rest);
                Some((StateLoc::new(path, loc.pin), *value))
            })
            .collect();

        copy.update_pins();
        copy
    }

    /// Adds a deep copy of a saved chip to the library, right after the original.
    pub fn duplicate_chip(&mut self, id: ChipId) -> Result<ChipId, LibraryError> {
        let Some(pos) = self.saved_chips.iter().position(|c| *c == id) else {
            return Err(LibraryError::NotSaved);
        };

        let mut copy = self.deep_copy(id);
        copy.name = format!("{} copy", copy.name);
        debug!(name = %copy.name, "duplicated chip");

        let new = self.chips.insert(copy);
        self.saved_chips.insert(pos + 1, new);
        self.recompute_chip_users();
        self.restructure();
        Ok(new)
    }

    /// Deletes a saved chip that no other chip uses.
    ///
    /// If it was being viewed, a new empty chip is viewed instead.
    pub fn delete_chip(&mut self, id: ChipId) -> Result<(), LibraryError> {
        if !self.is_saved(id) {
            return Err(LibraryError::NotSaved);
        }

        let chip = &self.chips[id];
        if !chip.users.is_empty() {
            let mut users: Vec<String> = chip
                .users
                .iter()
                .map(|user| self.chips[*user].name.clone())
                .collect();
            users.sort();
            return Err(LibraryError::ChipInUse {
                name: chip.name.clone(),
                users,
            });
        }

        debug!(name = %chip.name, "deleting chip");
        self.saved_chips.retain(|c| *c != id);
        if self.viewed_chip == id {
            // the chip is unsaved now, so switching away drops it
            self.new_chip();
        } else {
            self.chips.remove(id);
            self.recompute_chip_users();
            self.reflatten();
        }
        self.dirty = true;

        Ok(())
    }
}

/// Inserts a copy of `part` with all of its inputs disconnected.
fn insert_unwired(arena: &mut SlotMap<PartId, Part>, part: &Part) -> PartId {
    let mut part = part.clone();
    part.inputs.iter_mut().for_each(|input| *input = None);
    arena.insert(part)
}
