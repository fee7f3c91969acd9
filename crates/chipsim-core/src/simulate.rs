//! One synchronous simulation step.
//!
//! Reads always come from `cur` and writes always go to `next`, so a signal advances exactly one
//! part per tick.

use slotmap::SlotMap;

use crate::{
    chip::{Chip, ChipId, ChipRef, Wire},
    gate::MAX_GATE_INPUTS,
    LogicSim,
};

/// Reads the current value a wire carries.
#[inline]
fn read(chip: &Chip, base: usize, wire: &Wire, cur: &[bool]) -> bool {
    cur[base + chip.arena[wire.src].sid + wire.pin]
}

/// Advances the chip whose slots start at `base` by one tick.
///
/// Input pin slots of the chip itself are not written: they are driven by whoever owns the chip.
pub(crate) fn simulate_chip(
    chips: &SlotMap<ChipId, Chip>,
    id: ChipId,
    base: usize,
    cur: &[bool],
    next: &mut [bool],
) {
    let chip = &chips[id];

    for pin in &chip.outputs {
        let part = &chip.arena[*pin];
        let slot = base + part.sid;
        next[slot] = match &part.inputs[0] {
            Some(wire) => read(chip, base, wire, cur),
            // unconnected outputs latch, so they can be toggled by hand
            None => cur[slot],
        };
    }

    for part_id in &chip.parts {
        let part = &chip.arena[*part_id];
        let slot = base + part.sid;

        match part.chip {
            ChipRef::Custom(nested_id) => {
                let nested = &chips[nested_id];
                debug_assert_eq!(part.inputs.len(), nested.inputs.len());

                for (input, pin) in part.inputs.iter().zip(&nested.inputs) {
                    let dst = slot + nested.arena[*pin].sid;
                    next[dst] = match input {
                        Some(wire) => read(chip, base, wire, cur),
                        None => cur[dst],
                    };
                }

                simulate_chip(chips, nested_id, slot, cur, next);
            }
            ChipRef::Primitive(prim) => {
                debug_assert!(!prim.is_pin(), "pin {prim} placed as an internal part");
                let outputs = prim.output_count();

                if part.inputs.iter().all(Option::is_none) {
                    next[slot..slot + outputs].copy_from_slice(&cur[slot..slot + outputs]);
                    continue;
                }

                let mut x = [false; MAX_GATE_INPUTS];
                for (bit, input) in x.iter_mut().zip(&part.inputs) {
                    *bit = input
                        .as_ref()
                        .map_or(false, |wire| read(chip, base, wire, cur));
                }

                let out = prim.eval(&x);
                next[slot..slot + outputs].copy_from_slice(&out[..outputs]);
            }
        }
    }
}

impl LogicSim {
    /// Advances `chip`, whose slots start at `base` in `cur`/`next`, by one tick.
    ///
    /// This is the recursive step used by [`LogicSim::tick`]; it is exposed for callers driving
    /// their own buffers. The chip must be flattened.
    pub fn simulate_chip(&self, chip: ChipId, base: usize, cur: &[bool], next: &mut [bool]) {
        let count = self.chips[chip]
            .state_count
            .expect("chip must be flattened before it is simulated");
        assert!(base + count <= cur.len() && base + count <= next.len());

        simulate_chip(&self.chips, chip, base, cur, next);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        chip::{PartId, PinRef, Placement},
        gate::Primitive,
        toggle::StateLoc,
    };
    use rstest::*;

    fn place(sim: &mut LogicSim, prim: Primitive) -> PartId {
        let chip = sim.viewed_chip();
        sim.add_part(chip, prim.into(), Placement::default())
    }

    fn connect(sim: &mut LogicSim, src: PartId, dst: PartId, pin: usize) {
        let chip = sim.viewed_chip();
        sim.add_wire(chip, PinRef::new(src, 0), PinRef::new(dst, pin), Vec::new());
    }

    fn value(sim: &LogicSim, part: PartId) -> bool {
        sim.state_at(&StateLoc::part(part)).unwrap().0
    }

    #[test]
    fn test_not_gate_one_tick_per_hop() {
        let mut sim = LogicSim::new();
        let a = place(&mut sim, Primitive::InputPin);
        let not = place(&mut sim, Primitive::Not);
        let b = place(&mut sim, Primitive::OutputPin);
        connect(&mut sim, a, not, 0);
        connect(&mut sim, not, b, 0);

        sim.force(StateLoc::part(a), true).unwrap();

        sim.tick();
        // the NOT gate saw A, B still shows the gate's old low output
        assert!(!value(&sim, not));
        assert!(!value(&sim, b));

        sim.force(StateLoc::part(a), false).unwrap();
        sim.tick();
        assert!(value(&sim, not));
        assert!(!value(&sim, b));

        sim.tick();
        assert!(value(&sim, b));
    }

    #[rstest]
    #[case(1)]
    #[case(2)]
    #[case(5)]
    #[case(8)]
    fn test_chain_propagation_delay(#[case] depth: usize) {
        let mut sim = LogicSim::new();
        let a = place(&mut sim, Primitive::InputPin);
        let mut prev = a;
        for _ in 0..depth {
            let buf = place(&mut sim, Primitive::Buf);
            connect(&mut sim, prev, buf, 0);
            prev = buf;
        }

        sim.force(StateLoc::part(a), true).unwrap();
        for _ in 0..depth - 1 {
            sim.tick();
            assert!(!value(&sim, prev));
        }
        sim.tick();
        assert!(value(&sim, prev));
    }

    #[test]
    fn test_unconnected_gate_holds() {
        let mut sim = LogicSim::new();
        let nand = place(&mut sim, Primitive::Nand);

        sim.force(StateLoc::part(nand), true).unwrap();
        sim.clear_toggle(&StateLoc::part(nand));
        sim.tick();
        sim.tick();
        assert!(value(&sim, nand));
    }

    #[test]
    fn test_missing_input_reads_low() {
        let mut sim = LogicSim::new();
        let a = place(&mut sim, Primitive::InputPin);
        let nand = place(&mut sim, Primitive::Nand);
        connect(&mut sim, a, nand, 0);

        sim.force(StateLoc::part(a), true).unwrap();
        sim.tick();
        // NAND(1, 0)
        assert!(value(&sim, nand));
    }

    #[test]
    fn test_unconnected_output_latches() {
        let mut sim = LogicSim::new();
        let out = place(&mut sim, Primitive::OutputPin);

        sim.force(StateLoc::part(out), true).unwrap();
        sim.clear_toggle(&StateLoc::part(out));
        sim.tick();
        assert!(value(&sim, out));
    }
}
