//! Serialized library documents.
//!
//! A document stores the saved chips in library order. Parts refer to their definition by a
//! single integer: `0..GATE_COUNT` selects a primitive and `GATE_COUNT + i` selects the `i`th
//! saved chip. Wires refer to their source part by its index in the chip's outputs, then inputs,
//! then internal parts. Simulation state is not stored.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use slotmap::SlotMap;
use tracing::{debug, info};

use crate::{
    chip::{Chip, ChipId, ChipRef, Part, PartId, Placement, Rotation, Wire, V2},
    gate::{Primitive, GATE_COUNT},
    LogicSim,
};

/// Errors that can occur while loading a document.
#[derive(Debug, thiserror::Error)]
#[allow(missing_docs)]
pub enum DocumentError {
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error("viewed chip {0} is out of range")]
    ViewedChipOutOfRange(i64),
    #[error("chip \"{chip}\": part {part} refers to unknown chip {id}")]
    ChipOutOfRange { chip: String, part: usize, id: usize },
    #[error("chip \"{chip}\": part {part} is wired from unknown part {src}")]
    PartOutOfRange { chip: String, part: usize, src: i64 },
    #[error("chip \"{chip}\": part {part} is wired from missing pin {pin:?} of part {src}")]
    PinOutOfRange {
        chip: String,
        part: usize,
        src: usize,
        pin: Option<usize>,
    },
    #[error("chip \"{chip}\": part {part} has {actual} inputs, expected {expected}")]
    InputArity {
        chip: String,
        part: usize,
        expected: usize,
        actual: usize,
    },
    #[error("chip \"{chip}\": part {part} is not placed in the right pin list")]
    MisplacedPin { chip: String, part: usize },
    #[error("chip \"{chip}\": part {part} has invalid rotation {rot}")]
    InvalidRotation { chip: String, part: usize, rot: u8 },
    #[error("chip \"{0}\" contains itself")]
    RecursiveChip(String),
}

/// A serialized library.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LibraryDoc {
    /// Index of the viewed chip in `chips`, or -1 if an unsaved chip is viewed.
    pub viewed_chip: i64,
    /// Saved chips in library order.
    pub chips: Vec<ChipDoc>,
    /// The viewed chip, when it is not saved.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scratch_chip: Option<ChipDoc>,
}

/// A serialized chip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChipDoc {
    /// Chip name.
    pub name: String,
    /// Display color.
    pub col: [f32; 3],
    /// Footprint size.
    pub size: [f32; 2],
    /// Input pin parts.
    pub inputs: Vec<PartDoc>,
    /// Output pin parts.
    pub outputs: Vec<PartDoc>,
    /// Internal parts.
    pub parts: Vec<PartDoc>,
}

/// A serialized part.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartDoc {
    /// Primitive id, or `GATE_COUNT` plus a saved chip index.
    pub chip: usize,
    /// Instance name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Placement in the parent chip.
    pub pos: PlacementDoc,
    /// One entry per input pin of the part's chip.
    #[serde(default)]
    pub inputs: Vec<InputDoc>,
}

/// A serialized placement.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlacementDoc {
    /// Position in parent space.
    pub xy: [f32; 2],
    /// Quarter turns counter-clockwise, `0..4`.
    pub rot: u8,
    /// Mirrored before rotation.
    #[serde(default)]
    pub mirror: bool,
}

/// A serialized input connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputDoc {
    /// Source part index, or -1 if unconnected.
    pub part_idx: i64,
    /// Output pin of the source part.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pin_idx: Option<usize>,
    /// Routing waypoints.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wire_points: Option<Vec<[f32; 2]>>,
}

impl InputDoc {
    /// An unconnected input.
    pub const UNCONNECTED: InputDoc = InputDoc {
        part_idx: -1,
        pin_idx: None,
        wire_points: None,
    };
}

impl From<Placement> for PlacementDoc {
    fn from(placement: Placement) -> Self {
        Self {
            xy: [placement.pos.x, placement.pos.y],
            rot: placement.rot.quarters(),
            mirror: placement.mirror,
        }
    }
}

impl LogicSim {
    /// Serializes the library.
    pub fn to_document(&self) -> LibraryDoc {
        let ids: HashMap<ChipId, usize> = self
            .saved_chips
            .iter()
            .enumerate()
            .map(|(idx, id)| (*id, GATE_COUNT + idx))
            .collect();

        let chips = self
            .saved_chips
            .iter()
            .map(|id| encode_chip(&self.chips[*id], &ids))
            .collect();

        let (viewed_chip, scratch_chip) =
            match self.saved_chips.iter().position(|id| *id == self.viewed_chip) {
                Some(idx) => (idx as i64, None),
                None => (-1, Some(encode_chip(self.viewed(), &ids))),
            };

        LibraryDoc {
            viewed_chip,
            chips,
            scratch_chip,
        }
    }

    /// Builds a library from a document.
    ///
    /// Every reference in the document is checked, so a malformed document is reported rather
    /// than producing a corrupt graph.
    pub fn from_document(doc: &LibraryDoc) -> Result<Self, DocumentError> {
        let viewed_idx = match doc.viewed_chip {
            -1 => None,
            idx if idx >= 0 && (idx as usize) < doc.chips.len() => Some(idx as usize),
            idx => return Err(DocumentError::ViewedChipOutOfRange(idx)),
        };

        let mut chips: SlotMap<ChipId, Chip> = SlotMap::with_key();

        // shells and pins first, so every chip's arity is known before any part refers to it
        let saved_chips = doc
            .chips
            .iter()
            .map(|chip_doc| decode_shell(&mut chips, chip_doc))
            .collect::<Result<Vec<ChipId>, _>>()?;

        let scratch = match (viewed_idx, &doc.scratch_chip) {
            (None, Some(chip_doc)) => Some((decode_shell(&mut chips, chip_doc)?, chip_doc)),
            _ => None,
        };

        let bodies = saved_chips
            .iter()
            .copied()
            .zip(&doc.chips)
            .chain(scratch.iter().map(|(id, chip_doc)| (*id, *chip_doc)));
        for (id, chip_doc) in bodies {
            decode_body(&mut chips, &saved_chips, id, chip_doc)?;
        }

        let viewed_chip = match (viewed_idx, scratch) {
            (Some(idx), _) => saved_chips[idx],
            (None, Some((id, _))) => id,
            (None, None) => chips.insert(Chip::default()),
        };

        let mut sim = LogicSim {
            chips,
            saved_chips,
            viewed_chip,
            state: [Vec::new(), Vec::new()],
            cur_state: 0,
            dirty: false,
        };

        sim.recompute_chip_users();
        if let Some((_, chip)) = sim.chips.iter().find(|(id, chip)| chip.users.contains(id)) {
            return Err(DocumentError::RecursiveChip(chip.name.clone()));
        }

        for (_, chip) in sim.chips.iter_mut() {
            chip.update_pins();
        }
        sim.reflatten();
        sim.reset_state();

        debug!(chips = sim.saved_chips.len(), "decoded library");
        Ok(sim)
    }

    /// Serializes the library to pretty-printed JSON.
    pub fn to_json(&self) -> Result<String, DocumentError> {
        let json = serde_json::to_string_pretty(&self.to_document())?;
        info!(chips = self.saved_chips.len(), "serialized library");
        Ok(json)
    }

    /// Builds a library from JSON.
    pub fn from_json(json: &str) -> Result<Self, DocumentError> {
        let doc: LibraryDoc = serde_json::from_str(json)?;
        Self::from_document(&doc)
    }

    /// Replaces this library with one loaded from JSON.
    ///
    /// On error the library is left untouched.
    pub fn load_json(&mut self, json: &str) -> Result<(), DocumentError> {
        *self = Self::from_json(json)?;
        info!(chips = self.saved_chips.len(), "loaded library");
        Ok(())
    }
}

fn encode_chip(chip: &Chip, ids: &HashMap<ChipId, usize>) -> ChipDoc {
    let index: HashMap<PartId, i64> = chip
        .all_parts()
        .enumerate()
        .map(|(idx, id)| (id, idx as i64))
        .collect();

    let encode_part = |id: &PartId| {
        let part = &chip.arena[*id];
        let chip_id = match part.chip {
            ChipRef::Primitive(prim) => prim.id(),
            ChipRef::Custom(custom) => *ids
                .get(&custom)
                .unwrap_or_else(|| panic!("chip \"{}\" places an unsaved chip", chip.name)),
        };

        PartDoc {
            chip: chip_id,
            name: part.name.clone(),
            pos: part.placement.into(),
            inputs: part
                .inputs
                .iter()
                .map(|input| match input {
                    Some(wire) => InputDoc {
                        part_idx: index[&wire.src],
                        pin_idx: Some(wire.pin),
                        wire_points: (!wire.points.is_empty())
                            .then(|| wire.points.iter().map(|p| [p.x, p.y]).collect()),
                    },
                    None => InputDoc::UNCONNECTED,
                })
                .collect(),
        }
    };

    ChipDoc {
        name: chip.name.clone(),
        col: chip.color,
        size: [chip.size.x, chip.size.y],
        inputs: chip.inputs.iter().map(encode_part).collect(),
        outputs: chip.outputs.iter().map(encode_part).collect(),
        parts: chip.parts.iter().map(encode_part).collect(),
    }
}

/// Inserts a chip with its pins but no internal parts or wires.
fn decode_shell(
    chips: &mut SlotMap<ChipId, Chip>,
    doc: &ChipDoc,
) -> Result<ChipId, DocumentError> {
    let mut chip = Chip::new(doc.name.clone());
    chip.color = doc.col;
    chip.size = V2::from(doc.size);

    // part indices count outputs before inputs
    let pins = [
        (&doc.outputs, Primitive::OutputPin, 0),
        (&doc.inputs, Primitive::InputPin, doc.outputs.len()),
    ];
    for (parts, prim, offset) in pins {
        for (idx, part_doc) in parts.iter().enumerate() {
            if part_doc.chip != prim.id() {
                return Err(DocumentError::MisplacedPin {
                    chip: doc.name.clone(),
                    part: offset + idx,
                });
            }

            let part = decode_part(
                &doc.name,
                offset + idx,
                part_doc,
                prim.into(),
                prim.input_count(),
            )?;
            let id = chip.arena.insert(part);
            match prim {
                Primitive::OutputPin => chip.outputs.push(id),
                _ => chip.inputs.push(id),
            }
        }
    }

    Ok(chips.insert(chip))
}

/// Inserts the internal parts of a chip and wires every part.
fn decode_body(
    chips: &mut SlotMap<ChipId, Chip>,
    saved_chips: &[ChipId],
    id: ChipId,
    doc: &ChipDoc,
) -> Result<(), DocumentError> {
    let offset = doc.outputs.len() + doc.inputs.len();
    for (idx, part_doc) in doc.parts.iter().enumerate() {
        let part_idx = offset + idx;
        let chip_ref = match Primitive::from_id(part_doc.chip) {
            Some(prim) if prim.is_pin() => {
                return Err(DocumentError::MisplacedPin {
                    chip: doc.name.clone(),
                    part: part_idx,
                })
            }
            Some(prim) => ChipRef::Primitive(prim),
            None => saved_chips
                .get(part_doc.chip - GATE_COUNT)
                .copied()
                .map(ChipRef::Custom)
                .ok_or_else(|| DocumentError::ChipOutOfRange {
                    chip: doc.name.clone(),
                    part: part_idx,
                    id: part_doc.chip,
                })?,
        };

        let input_count = match chip_ref {
            ChipRef::Primitive(prim) => prim.input_count(),
            ChipRef::Custom(custom) => chips[custom].inputs.len(),
        };
        let part = decode_part(&doc.name, part_idx, part_doc, chip_ref, input_count)?;
        let chip = &mut chips[id];
        let part_id = chip.arena.insert(part);
        chip.parts.push(part_id);
    }

    let all: Vec<PartId> = chips[id].all_parts().collect();
    let part_docs = doc.outputs.iter().chain(&doc.inputs).chain(&doc.parts);
    for (part_idx, (part_id, part_doc)) in all.iter().zip(part_docs).enumerate() {
        for (pin, input) in part_doc.inputs.iter().enumerate() {
            let wire = decode_wire(chips, id, &all, &doc.name, part_idx, input)?;
            chips[id].arena[*part_id].inputs[pin] = wire;
        }
    }

    Ok(())
}

/// Creates an unwired part, checking its rotation and input arity.
fn decode_part(
    chip: &str,
    part: usize,
    doc: &PartDoc,
    chip_ref: ChipRef,
    input_count: usize,
) -> Result<Part, DocumentError> {
    let rot = Rotation::from_quarters(doc.pos.rot).ok_or_else(|| DocumentError::InvalidRotation {
        chip: chip.to_string(),
        part,
        rot: doc.pos.rot,
    })?;
    if doc.inputs.len() != input_count {
        return Err(DocumentError::InputArity {
            chip: chip.to_string(),
            part,
            expected: input_count,
            actual: doc.inputs.len(),
        });
    }

    let placement = Placement {
        pos: V2::from(doc.pos.xy),
        rot,
        mirror: doc.pos.mirror,
    };
    let mut decoded = Part::new(chip_ref, placement, input_count);
    decoded.name = doc.name.clone();
    Ok(decoded)
}

fn decode_wire(
    chips: &SlotMap<ChipId, Chip>,
    id: ChipId,
    all: &[PartId],
    chip: &str,
    part: usize,
    input: &InputDoc,
) -> Result<Option<Wire>, DocumentError> {
    if input.part_idx == -1 {
        return Ok(None);
    }

    let src = usize::try_from(input.part_idx)
        .ok()
        .filter(|idx| *idx < all.len())
        .ok_or_else(|| DocumentError::PartOutOfRange {
            chip: chip.to_string(),
            part,
            src: input.part_idx,
        })?;

    let output_count = match chips[id].arena[all[src]].chip {
        ChipRef::Primitive(prim) => prim.output_count(),
        ChipRef::Custom(custom) => chips[custom].outputs.len(),
    };
    let pin = input
        .pin_idx
        .filter(|pin| *pin < output_count)
        .ok_or_else(|| DocumentError::PinOutOfRange {
            chip: chip.to_string(),
            part,
            src,
            pin: input.pin_idx,
        })?;

    let points = input
        .wire_points
        .iter()
        .flatten()
        .map(|p| V2::from(*p))
        .collect();

    Ok(Some(Wire {
        src: all[src],
        pin,
        points,
    }))
}
