//! Structural mutations.
//!
//! Every operation here keeps wiring, pin arities, usage sets and the flattening consistent.
//! Arguments are expected to be validated by the caller; a dangling part, an out of range pin or
//! a recursive placement is a caller bug and panics.

use std::cmp::Ordering;

use tracing::debug;

use crate::{
    chip::{ChipId, ChipRef, Part, PartId, PinRef, PinSide, Placement, Wire, V2},
    gate::Primitive,
    LogicSim,
};

impl LogicSim {
    /// Returns `true` if `part_chip` can be placed inside `into` without the chip containing
    /// itself.
    ///
    /// Only saved chips can be placed.
    pub fn can_place(&self, part_chip: ChipRef, into: ChipId) -> bool {
        match part_chip {
            ChipRef::Primitive(_) => true,
            ChipRef::Custom(id) => {
                id != into && self.is_saved(id) && !self.chips[into].users.contains(&id)
            }
        }
    }

    /// Places a new part inside `chip`.
    ///
    /// Placing an [`Primitive::InputPin`] or [`Primitive::OutputPin`] appends a pin to the chip;
    /// a new input pin also grows the input wiring of every instance of the chip.
    ///
    /// # Panics
    ///
    /// If the placement would make a chip contain itself.
    pub fn add_part(&mut self, chip: ChipId, part_chip: ChipRef, placement: Placement) -> PartId {
        assert!(
            self.can_place(part_chip, chip),
            "cannot place \"{}\" inside \"{}\"",
            self.chip_name(part_chip),
            self.chips[chip].name
        );

        let input_count = self.input_count(part_chip);
        let target = &mut self.chips[chip];
        let id = target
            .arena
            .insert(Part::new(part_chip, placement, input_count));

        match part_chip {
            ChipRef::Primitive(Primitive::OutputPin) => {
                target.outputs.push(id);
                target.update_pins();
            }
            ChipRef::Primitive(Primitive::InputPin) => {
                target.inputs.push(id);
                target.update_pins();
                self.for_each_instance(chip, |part| part.inputs.push(None));
            }
            ChipRef::Primitive(_) => target.parts.push(id),
            ChipRef::Custom(_) => {
                target.parts.push(id);
                self.recompute_chip_users();
            }
        }

        debug!(part = self.chip_name(part_chip), "added part");
        self.restructure();
        id
    }

    /// Removes a part from `chip`, first clearing every wire that reads from it.
    ///
    /// Removing a pin also drops the matching wiring slot from every instance of the chip.
    pub fn remove_part(&mut self, chip: ChipId, part: PartId) {
        let target = &mut self.chips[chip];
        assert!(
            target.contains(part),
            "part {:?} is not in chip \"{}\"",
            part,
            target.name
        );

        let pin = target.pin_index(part);
        target.outputs.retain(|p| *p != part);
        target.inputs.retain(|p| *p != part);
        target.parts.retain(|p| *p != part);
        target.strip_wires_from(part);
        let Some(removed) = target.arena.remove(part) else {
            unreachable!("part was checked above");
        };
        if pin.is_some() {
            target.update_pins();
        }

        match pin {
            Some((PinSide::Input, idx)) => {
                self.for_each_instance(chip, |instance| {
                    instance.inputs.remove(idx);
                });
            }
            Some((PinSide::Output, idx)) => self.drop_instance_output(chip, idx),
            None => {}
        }

        if let ChipRef::Custom(_) = removed.chip {
            self.recompute_chip_users();
        }

        debug!(part = self.chip_name(removed.chip), "removed part");
        self.restructure();
    }

    /// Connects an output pin of `src` to an input pin of `dst`, replacing any wire already on
    /// that input.
    ///
    /// # Panics
    ///
    /// If either part is not in `chip` or a pin index is out of range.
    pub fn add_wire(&mut self, chip: ChipId, src: PinRef, dst: PinRef, points: Vec<V2>) {
        let target = &self.chips[chip];
        let src_part = target.part(src.part);
        let dst_part = target.part(dst.part);
        assert!(
            src.pin < self.output_count(src_part.chip),
            "\"{}\" has no output {}",
            self.chip_name(src_part.chip),
            src.pin
        );
        assert!(
            dst.pin < dst_part.inputs.len(),
            "\"{}\" has no input {}",
            self.chip_name(dst_part.chip),
            dst.pin
        );

        self.chips[chip].part_mut(dst.part).inputs[dst.pin] = Some(Wire {
            src: src.part,
            pin: src.pin,
            points,
        });
        self.dirty = true;
    }

    /// Disconnects an input pin, returning the wire that was connected.
    pub fn remove_wire(&mut self, chip: ChipId, dst: PinRef) -> Option<Wire> {
        let part = self.chips[chip].part_mut(dst.part);
        assert!(dst.pin < part.inputs.len(), "input {} out of range", dst.pin);

        let wire = part.inputs[dst.pin].take();
        self.dirty = true;
        wire
    }

    /// Replaces the routing waypoints of a connected input.
    pub fn set_wire_points(&mut self, chip: ChipId, dst: PinRef, points: Vec<V2>) {
        let part = self.chips[chip].part_mut(dst.part);
        let wire = part.inputs[dst.pin]
            .as_mut()
            .unwrap_or_else(|| panic!("input {} is not connected", dst.pin));
        wire.points = points;
        self.dirty = true;
    }

    /// Moves, rotates or mirrors a part.
    pub fn set_placement(&mut self, chip: ChipId, part: PartId, placement: Placement) {
        self.chips[chip].part_mut(part).placement = placement;
        self.dirty = true;
    }

    /// Sets or clears a part's instance name.
    pub fn set_part_name(&mut self, chip: ChipId, part: PartId, name: Option<String>) {
        self.chips[chip].part_mut(part).name = name;
        self.dirty = true;
    }

    /// Calls `f` on every part in the library that places `chip`.
    fn for_each_instance(&mut self, chip: ChipId, mut f: impl FnMut(&mut Part)) {
        for (_, parent) in self.chips.iter_mut() {
            for (_, part) in parent.arena.iter_mut() {
                if part.chip == ChipRef::Custom(chip) {
                    f(part);
                }
            }
        }
    }

    /// Fixes wires and overrides that read from instances of `chip` after its output `idx` was
    /// removed.
    fn drop_instance_output(&mut self, chip: ChipId, idx: usize) {
        let ids: Vec<ChipId> = self.chips.keys().collect();
        for owner in ids {
            let toggles = std::mem::take(&mut self.chips[owner].toggle_locs);
            let toggles = toggles
                .into_iter()
                .filter_map(|(mut loc, value)| {
                    if self.loc_target(owner, &loc) == Some(ChipRef::Custom(chip)) {
                        match loc.pin.cmp(&idx) {
                            Ordering::Equal => return None,
                            Ordering::Greater => loc.pin -= 1,
                            Ordering::Less => {}
                        }
                    }
                    Some((loc, value))
                })
                .collect();
            self.chips[owner].toggle_locs = toggles;
        }

        for (_, parent) in self.chips.iter_mut() {
            let instances: Vec<PartId> = parent
                .arena
                .iter()
                .filter(|(_, part)| part.chip == ChipRef::Custom(chip))
                .map(|(id, _)| id)
                .collect();
            if instances.is_empty() {
                continue;
            }

            for (_, part) in parent.arena.iter_mut() {
                for input in part.inputs.iter_mut() {
                    let Some(wire) = input.as_mut() else {
                        continue;
                    };
                    if !instances.contains(&wire.src) {
                        continue;
                    }

                    if wire.pin == idx {
                        *input = None;
                    } else if wire.pin > idx {
                        wire.pin -= 1;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::toggle::StateLoc;

    fn pin(sim: &mut LogicSim, chip: ChipId, prim: Primitive) -> PartId {
        sim.add_part(chip, prim.into(), Placement::default())
    }

    /// A saved chip with `inputs` inputs and `outputs` outputs, each output fed by an OR of the
    /// first two inputs.
    fn saved_chip(sim: &mut LogicSim, name: &str, inputs: usize, outputs: usize) -> ChipId {
        sim.new_chip();
        let chip = sim.viewed_chip();
        for _ in 0..inputs {
            pin(sim, chip, Primitive::InputPin);
        }
        for _ in 0..outputs {
            pin(sim, chip, Primitive::OutputPin);
        }
        sim.save_viewed_chip(name).unwrap()
    }

    #[test]
    fn test_remove_part_strips_wires() {
        let mut sim = LogicSim::new();
        let chip = sim.viewed_chip();
        let a = pin(&mut sim, chip, Primitive::InputPin);
        let not = pin(&mut sim, chip, Primitive::Not);
        let and = pin(&mut sim, chip, Primitive::And);
        let out = pin(&mut sim, chip, Primitive::OutputPin);
        sim.add_wire(chip, PinRef::new(a, 0), PinRef::new(not, 0), Vec::new());
        sim.add_wire(chip, PinRef::new(a, 0), PinRef::new(and, 1), Vec::new());
        sim.add_wire(chip, PinRef::new(not, 0), PinRef::new(and, 0), Vec::new());
        sim.add_wire(chip, PinRef::new(a, 0), PinRef::new(out, 0), Vec::new());

        sim.remove_part(chip, a);

        let chip = sim.chip(chip);
        assert!(!chip.contains(a));
        assert!(chip.inputs().is_empty());
        for id in chip.all_parts() {
            assert!(!chip.part(id).reads_from(a));
        }
        assert_eq!(chip.part(and).input(0).map(|w| w.src), Some(not));
        assert_eq!(sim.state().len(), 3);
    }

    #[test]
    fn test_input_pin_arity_follows_instances() {
        let mut sim = LogicSim::new();
        let child = saved_chip(&mut sim, "child", 1, 1);

        sim.new_chip();
        let parent = sim.viewed_chip();
        let a = pin(&mut sim, parent, Primitive::InputPin);
        let inst = sim.add_part(parent, child.into(), Placement::default());
        sim.add_wire(parent, PinRef::new(a, 0), PinRef::new(inst, 0), Vec::new());
        let parent = sim.save_viewed_chip("parent").unwrap();

        sim.view_chip(child);
        let extra = pin(&mut sim, child, Primitive::InputPin);
        assert_eq!(sim.chip(parent).part(inst).inputs().len(), 2);
        assert_eq!(sim.chip(parent).part(inst).input(0).map(|w| w.src), Some(a));

        let first = sim.chip(child).inputs()[0];
        sim.remove_part(child, first);
        let inputs = sim.chip(parent).part(inst).inputs();
        assert_eq!(inputs.len(), 1);
        assert_eq!(inputs[0], None);
        assert_eq!(sim.chip(child).inputs(), &[extra]);
    }

    #[test]
    fn test_output_pin_removal_shifts_wires() {
        let mut sim = LogicSim::new();
        let child = saved_chip(&mut sim, "child", 0, 3);

        sim.new_chip();
        let parent = sim.viewed_chip();
        let inst = sim.add_part(parent, child.into(), Placement::default());
        let outs: Vec<PartId> = (0..3)
            .map(|_| pin(&mut sim, parent, Primitive::OutputPin))
            .collect();
        for (i, out) in outs.iter().enumerate() {
            sim.add_wire(parent, PinRef::new(inst, i), PinRef::new(*out, 0), Vec::new());
        }
        let parent = sim.save_viewed_chip("parent").unwrap();

        sim.view_chip(child);
        let middle = sim.chip(child).outputs()[1];
        sim.remove_part(child, middle);

        let chip = sim.chip(parent);
        assert_eq!(chip.part(outs[0]).input(0).map(|w| w.pin), Some(0));
        assert_eq!(chip.part(outs[1]).input(0), None);
        assert_eq!(chip.part(outs[2]).input(0).map(|w| w.pin), Some(1));
    }

    #[test]
    fn test_add_wire_replaces_existing() {
        let mut sim = LogicSim::new();
        let chip = sim.viewed_chip();
        let a = pin(&mut sim, chip, Primitive::InputPin);
        let b = pin(&mut sim, chip, Primitive::InputPin);
        let buf = pin(&mut sim, chip, Primitive::Buf);

        sim.add_wire(chip, PinRef::new(a, 0), PinRef::new(buf, 0), Vec::new());
        sim.add_wire(
            chip,
            PinRef::new(b, 0),
            PinRef::new(buf, 0),
            vec![V2::new(1.0, 2.0)],
        );

        let wire = sim.chip(chip).part(buf).input(0).cloned().unwrap();
        assert_eq!(wire.src, b);
        assert_eq!(wire.points, vec![V2::new(1.0, 2.0)]);

        assert_eq!(sim.remove_wire(chip, PinRef::new(buf, 0)), Some(wire));
        assert_eq!(sim.chip(chip).part(buf).input(0), None);
    }

    #[test]
    #[should_panic]
    fn test_add_wire_rejects_bad_pin() {
        let mut sim = LogicSim::new();
        let chip = sim.viewed_chip();
        let a = pin(&mut sim, chip, Primitive::InputPin);
        let not = pin(&mut sim, chip, Primitive::Not);

        sim.add_wire(chip, PinRef::new(a, 0), PinRef::new(not, 1), Vec::new());
    }

    #[test]
    #[should_panic]
    fn test_add_wire_rejects_foreign_part() {
        let mut sim = LogicSim::new();
        let first = sim.viewed_chip();
        pin(&mut sim, first, Primitive::InputPin);
        let a = pin(&mut sim, first, Primitive::InputPin);
        sim.save_viewed_chip("first").unwrap();

        let second = sim.new_chip();
        let not = pin(&mut sim, second, Primitive::Not);

        sim.add_wire(second, PinRef::new(a, 0), PinRef::new(not, 0), Vec::new());
    }

    #[test]
    fn test_cycle_rejection() {
        let mut sim = LogicSim::new();
        let inner = saved_chip(&mut sim, "inner", 1, 1);

        sim.new_chip();
        let outer = sim.viewed_chip();
        sim.add_part(outer, inner.into(), Placement::default());
        let outer = sim.save_viewed_chip("outer").unwrap();

        sim.view_chip(inner);
        assert!(!sim.can_place(outer.into(), inner));
        assert!(!sim.can_place(inner.into(), inner));
        assert!(sim.can_place(inner.into(), outer));
        assert!(sim.can_place(Primitive::And.into(), inner));
    }

    #[test]
    #[should_panic(expected = "cannot place")]
    fn test_add_part_panics_on_cycle() {
        let mut sim = LogicSim::new();
        let inner = saved_chip(&mut sim, "inner", 1, 1);

        sim.new_chip();
        let outer = sim.viewed_chip();
        sim.add_part(outer, inner.into(), Placement::default());
        let outer = sim.save_viewed_chip("outer").unwrap();

        sim.view_chip(inner);
        sim.add_part(inner, outer.into(), Placement::default());
    }

    #[test]
    fn test_remove_part_prunes_toggles() {
        let mut sim = LogicSim::new();
        let chip = sim.viewed_chip();
        let a = pin(&mut sim, chip, Primitive::InputPin);
        let b = pin(&mut sim, chip, Primitive::InputPin);
        sim.force(StateLoc::part(a), true).unwrap();
        sim.force(StateLoc::part(b), true).unwrap();

        sim.remove_part(chip, a);

        assert_eq!(sim.viewed().toggle_locs().len(), 1);
        assert_eq!(sim.toggle_value(&StateLoc::part(b)), Some(true));
    }

    #[test]
    fn test_output_pin_removal_shifts_toggles() {
        let mut sim = LogicSim::new();
        let child = saved_chip(&mut sim, "child", 0, 3);

        sim.new_chip();
        let parent = sim.viewed_chip();
        let inst = sim.add_part(parent, child.into(), Placement::default());
        let parent = sim.save_viewed_chip("parent").unwrap();
        sim.force(StateLoc::new(vec![inst], 1), true).unwrap();
        sim.force(StateLoc::new(vec![inst], 2), false).unwrap();

        sim.view_chip(child);
        let middle = sim.chip(child).outputs()[1];
        sim.remove_part(child, middle);

        let toggles = sim.chip(parent).toggle_locs();
        assert_eq!(toggles.len(), 1);
        assert_eq!(toggles.get(&StateLoc::new(vec![inst], 1)), Some(&false));
    }

    #[test]
    fn test_nested_removal_prunes_toggles() {
        let mut sim = LogicSim::new();
        let child = saved_chip(&mut sim, "child", 2, 1);
        let first = sim.chip(child).inputs()[0];

        sim.new_chip();
        let parent = sim.viewed_chip();
        let inst = sim.add_part(parent, child.into(), Placement::default());
        let parent = sim.save_viewed_chip("parent").unwrap();
        let nested = StateLoc::part(inst).child(first, 0);
        sim.force(nested.clone(), true).unwrap();
        assert_eq!(sim.state_at(&nested).map(|s| s.0), Some(true));

        sim.view_chip(child);
        sim.remove_part(child, first);

        assert!(sim.chip(parent).toggle_locs().is_empty());
    }

    #[test]
    fn test_edits_mark_dirty() {
        let mut sim = LogicSim::new();
        let chip = sim.viewed_chip();
        let a = pin(&mut sim, chip, Primitive::InputPin);
        let not = pin(&mut sim, chip, Primitive::Not);
        assert!(sim.is_dirty());

        sim.clear_dirty();
        sim.add_wire(chip, PinRef::new(a, 0), PinRef::new(not, 0), Vec::new());
        assert!(sim.is_dirty());

        sim.clear_dirty();
        sim.remove_wire(chip, PinRef::new(not, 0));
        assert!(sim.is_dirty());

        sim.clear_dirty();
        sim.set_placement(chip, not, Placement::at(V2::new(1.0, 1.0)));
        assert!(sim.is_dirty());

        sim.clear_dirty();
        sim.set_part_name(chip, not, Some("inv".to_string()));
        assert!(sim.is_dirty());

        sim.clear_dirty();
        sim.remove_part(chip, not);
        assert!(sim.is_dirty());

        sim.clear_dirty();
        pin(&mut sim, chip, Primitive::Or);
        assert!(sim.is_dirty());
    }
}
