//! The chip/part graph.
//!
//! A [`Chip`] owns its parts in a generation-checked arena. Wires inside a chip refer to their
//! source part by [`PartId`], so a removed part can never be read through a stale wire.

use std::collections::{HashMap, HashSet};

use nalgebra::{Matrix2, Vector2};
use slotmap::SlotMap;

use crate::{gate::Primitive, toggle::StateLoc};

/// 2D vector used for positions, sizes and waypoints.
pub type V2 = Vector2<f32>;

slotmap::new_key_type! {
    /// Handle to a chip in the library.
    pub struct ChipId;
}

slotmap::new_key_type! {
    /// Handle to a part within its parent chip.
    pub struct PartId;
}

/// The definition a part instantiates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChipRef {
    /// A gate or pin from the primitive table.
    Primitive(Primitive),
    /// A chip from the library.
    Custom(ChipId),
}

impl ChipRef {
    /// Returns the primitive, if this is one.
    pub fn primitive(&self) -> Option<Primitive> {
        match self {
            ChipRef::Primitive(prim) => Some(*prim),
            ChipRef::Custom(_) => None,
        }
    }

    /// Returns the library chip, if this is one.
    pub fn custom(&self) -> Option<ChipId> {
        match self {
            ChipRef::Primitive(_) => None,
            ChipRef::Custom(id) => Some(*id),
        }
    }
}

impl From<Primitive> for ChipRef {
    fn from(prim: Primitive) -> Self {
        ChipRef::Primitive(prim)
    }
}

impl From<ChipId> for ChipRef {
    fn from(id: ChipId) -> Self {
        ChipRef::Custom(id)
    }
}

/// A quarter-turn rotation, counter-clockwise.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum Rotation {
    #[default]
    R0,
    R90,
    R180,
    R270,
}

impl Rotation {
    /// Returns the rotation for a quarter-turn count in `0..4`.
    pub fn from_quarters(q: u8) -> Option<Self> {
        match q {
            0 => Some(Rotation::R0),
            1 => Some(Rotation::R90),
            2 => Some(Rotation::R180),
            3 => Some(Rotation::R270),
            _ => None,
        }
    }

    /// Returns the number of quarter turns.
    pub fn quarters(self) -> u8 {
        self as u8
    }

    /// Rotates a further quarter turn counter-clockwise.
    pub fn turn_ccw(self) -> Self {
        Self::from_quarters((self.quarters() + 1) % 4).expect("value is in range")
    }

    /// Returns `(cos, sin)` of the rotation angle.
    fn cos_sin(self) -> (f32, f32) {
        match self {
            Rotation::R0 => (1.0, 0.0),
            Rotation::R90 => (0.0, 1.0),
            Rotation::R180 => (-1.0, 0.0),
            Rotation::R270 => (0.0, -1.0),
        }
    }
}

/// Where and how a part is placed inside its parent chip.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    /// Position of the part's origin in parent space.
    pub pos: V2,
    /// Rotation about the part's origin.
    pub rot: Rotation,
    /// Mirror across the part's local y axis, applied before rotation.
    pub mirror: bool,
}

impl Default for Placement {
    fn default() -> Self {
        Self::at(V2::zeros())
    }
}

impl Placement {
    /// Creates an unrotated, unmirrored placement at `pos`.
    pub fn at(pos: V2) -> Self {
        Self {
            pos,
            rot: Rotation::R0,
            mirror: false,
        }
    }

    /// Linear part of the transform.
    fn matrix(&self) -> Matrix2<f32> {
        let (c, s) = self.rot.cos_sin();
        let rot = Matrix2::new(c, -s, s, c);
        if self.mirror {
            rot * Matrix2::new(-1.0, 0.0, 0.0, 1.0)
        } else {
            rot
        }
    }

    /// Maps a point from part-local space into parent space.
    pub fn to_parent(&self, local: V2) -> V2 {
        self.pos + self.matrix() * local
    }

    /// Maps a point from parent space into part-local space.
    pub fn to_local(&self, parent: V2) -> V2 {
        // the linear part is orthonormal
        self.matrix().transpose() * (parent - self.pos)
    }
}

/// An input wire: the source a part's input pin reads from.
#[derive(Debug, Clone, PartialEq)]
pub struct Wire {
    /// Source part, in the same chip as the destination.
    pub src: PartId,
    /// Output pin of the source part.
    pub pin: usize,
    /// Routing waypoints in parent space, from source to destination.
    pub points: Vec<V2>,
}

/// One end of a connection: a part and one of its pins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PinRef {
    /// The part.
    pub part: PartId,
    /// Pin index, into the part's outputs or inputs depending on context.
    pub pin: usize,
}

impl PinRef {
    /// Creates a new pin reference.
    pub fn new(part: PartId, pin: usize) -> Self {
        Self { part, pin }
    }
}

/// A placed instance of a chip inside a parent chip.
#[derive(Debug, Clone)]
pub struct Part {
    pub(crate) chip: ChipRef,
    /// Optional instance name.
    pub name: Option<String>,
    /// Placement in the parent chip.
    pub placement: Placement,
    pub(crate) sid: usize,
    pub(crate) inputs: Vec<Option<Wire>>,
}

impl Part {
    pub(crate) fn new(chip: ChipRef, placement: Placement, input_count: usize) -> Self {
        Self {
            chip,
            name: None,
            placement,
            sid: 0,
            inputs: vec![None; input_count],
        }
    }

    /// Returns the definition this part instantiates.
    pub fn chip(&self) -> ChipRef {
        self.chip
    }

    /// Returns the offset of this part's state slots in the parent's flat state vector.
    ///
    /// Only meaningful while the parent's flattening is current.
    pub fn sid(&self) -> usize {
        self.sid
    }

    /// Returns the input wires, one per declared input pin of the part's chip.
    pub fn inputs(&self) -> &[Option<Wire>] {
        &self.inputs
    }

    /// Returns the wire connected to the given input pin.
    pub fn input(&self, pin: usize) -> Option<&Wire> {
        self.inputs.get(pin).and_then(Option::as_ref)
    }

    /// Returns `true` if any input pin reads from `src`.
    pub(crate) fn reads_from(&self, src: PartId) -> bool {
        self.inputs.iter().flatten().any(|wire| wire.src == src)
    }
}

/// Which pin list of a chip a pin part belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinSide {
    /// The chip's input pins.
    Input,
    /// The chip's output pins.
    Output,
}

/// A reusable circuit definition.
#[derive(Debug, Clone)]
pub struct Chip {
    /// Name, empty while unsaved.
    pub name: String,
    /// Display color, RGB in `0..=1`.
    pub color: [f32; 3],
    /// Footprint size when placed as a part.
    pub size: V2,

    pub(crate) arena: SlotMap<PartId, Part>,
    pub(crate) outputs: Vec<PartId>,
    pub(crate) inputs: Vec<PartId>,
    pub(crate) parts: Vec<PartId>,

    pub(crate) input_anchors: Vec<V2>,
    pub(crate) output_anchors: Vec<V2>,

    /// Cached slot count, `None` when stale.
    pub(crate) state_count: Option<usize>,
    pub(crate) users: HashSet<ChipId>,
    pub(crate) toggle_locs: HashMap<StateLoc, bool>,
}

impl Default for Chip {
    fn default() -> Self {
        Self::new(String::new())
    }
}

impl Chip {
    /// Default footprint of a new chip.
    pub const DEFAULT_SIZE: [f32; 2] = [4.0, 2.0];
    /// Spacing between adjacent pins on a footprint edge.
    pub const PIN_SPACING: f32 = 1.0;

    /// Creates an empty chip.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            color: [0.5, 0.5, 0.5],
            size: V2::from(Self::DEFAULT_SIZE),
            arena: SlotMap::with_key(),
            outputs: Vec::new(),
            inputs: Vec::new(),
            parts: Vec::new(),
            input_anchors: Vec::new(),
            output_anchors: Vec::new(),
            state_count: None,
            users: HashSet::new(),
            toggle_locs: HashMap::new(),
        }
    }

    /// Returns the output pin parts, in pin order.
    pub fn outputs(&self) -> &[PartId] {
        &self.outputs
    }

    /// Returns the input pin parts, in pin order.
    pub fn inputs(&self) -> &[PartId] {
        &self.inputs
    }

    /// Returns the internal parts, in placement order.
    pub fn parts(&self) -> &[PartId] {
        &self.parts
    }

    /// Iterates over every part: outputs, then inputs, then internal parts.
    ///
    /// This is the order used for state flattening and for serialized part indices.
    pub fn all_parts(&self) -> impl Iterator<Item = PartId> + '_ {
        self.outputs
            .iter()
            .chain(self.inputs.iter())
            .chain(self.parts.iter())
            .copied()
    }

    /// Returns the part with the given id.
    ///
    /// # Panics
    ///
    /// If the part is not in this chip.
    pub fn part(&self, id: PartId) -> &Part {
        self.arena
            .get(id)
            .unwrap_or_else(|| panic!("part {:?} is not in chip \"{}\"", id, self.name))
    }

    pub(crate) fn part_mut(&mut self, id: PartId) -> &mut Part {
        let name = &self.name;
        self.arena
            .get_mut(id)
            .unwrap_or_else(|| panic!("part {:?} is not in chip \"{}\"", id, name))
    }

    /// Returns the part with the given id, or `None` if it is not in this chip.
    pub fn get_part(&self, id: PartId) -> Option<&Part> {
        self.arena.get(id)
    }

    /// Returns `true` if the part belongs to this chip.
    pub fn contains(&self, id: PartId) -> bool {
        self.arena.contains_key(id)
    }

    /// Returns the number of parts of every kind.
    pub fn part_count(&self) -> usize {
        self.arena.len()
    }

    /// Returns the cached state slot count, `None` if stale.
    pub fn state_count(&self) -> Option<usize> {
        self.state_count
    }

    /// Returns the chips that place this chip anywhere in their structure.
    pub fn users(&self) -> &HashSet<ChipId> {
        &self.users
    }

    /// Returns the manual toggle overrides.
    pub fn toggle_locs(&self) -> &HashMap<StateLoc, bool> {
        &self.toggle_locs
    }

    /// Returns the chip-local anchor of an input pin on the footprint.
    ///
    /// # Panics
    ///
    /// If `pin` is not an input of this chip.
    pub fn input_anchor(&self, pin: usize) -> V2 {
        self.input_anchors[pin]
    }

    /// Returns the chip-local anchor of an output pin on the footprint.
    ///
    /// # Panics
    ///
    /// If `pin` is not an output of this chip.
    pub fn output_anchor(&self, pin: usize) -> V2 {
        self.output_anchors[pin]
    }

    /// Returns the pin index of a pin part, and which side it is on.
    pub fn pin_index(&self, id: PartId) -> Option<(PinSide, usize)> {
        if let Some(idx) = self.inputs.iter().position(|p| *p == id) {
            Some((PinSide::Input, idx))
        } else {
            self.outputs
                .iter()
                .position(|p| *p == id)
                .map(|idx| (PinSide::Output, idx))
        }
    }

    /// Recomputes the footprint anchors of every pin.
    ///
    /// Inputs sit on the left edge and outputs on the right edge, centered vertically and spaced
    /// [`Chip::PIN_SPACING`] apart. The footprint grows to fit the taller side.
    pub fn update_pins(&mut self) {
        let rows = self.inputs.len().max(self.outputs.len()) as f32;
        self.size.y = self.size.y.max(rows * Self::PIN_SPACING);

        let half = self.size / 2.0;
        let column = |count: usize, x: f32| -> Vec<V2> {
            let top = (count as f32 - 1.0) * Self::PIN_SPACING / 2.0;
            (0..count)
                .map(|i| V2::new(x, top - i as f32 * Self::PIN_SPACING))
                .collect()
        };

        self.input_anchors = column(self.inputs.len(), -half.x);
        self.output_anchors = column(self.outputs.len(), half.x);
    }

    /// Clears every wire that reads from `src`.
    pub(crate) fn strip_wires_from(&mut self, src: PartId) {
        for (_, part) in self.arena.iter_mut() {
            for input in part.inputs.iter_mut() {
                if matches!(input, Some(wire) if wire.src == src) {
                    *input = None;
                }
            }
        }
    }
}
