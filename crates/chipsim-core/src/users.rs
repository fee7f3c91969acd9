//! Transitive usage sets.

use std::collections::HashSet;

use tracing::trace;

use crate::{
    chip::{ChipId, ChipRef},
    LogicSim,
};

impl LogicSim {
    /// Rebuilds every chip's `users`: the chips that place it directly or through any depth of
    /// nesting.
    pub(crate) fn recompute_chip_users(&mut self) {
        for (_, chip) in self.chips.iter_mut() {
            chip.users.clear();
        }

        let ids: Vec<ChipId> = self.chips.keys().collect();
        for user in ids {
            let mut visited = HashSet::new();
            let mut stack = self.direct_children(user);
            while let Some(id) = stack.pop() {
                if !visited.insert(id) {
                    continue;
                }
                stack.extend(self.direct_children(id));
            }

            for id in visited {
                if let Some(chip) = self.chips.get_mut(id) {
                    chip.users.insert(user);
                }
            }
        }

        trace!("recomputed chip users");
    }

    /// Library chips placed directly inside `id`.
    fn direct_children(&self, id: ChipId) -> Vec<ChipId> {
        let Some(chip) = self.chips.get(id) else {
            return Vec::new();
        };
        chip.parts
            .iter()
            .filter_map(|p| match chip.arena[*p].chip {
                ChipRef::Custom(child) => Some(child),
                ChipRef::Primitive(_) => None,
            })
            .collect()
    }
}
