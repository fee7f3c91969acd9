//! The primitive gate library.
//!
//! Primitives are immutable and shared by every chip: a part that places a gate refers to it by
//! [`Primitive`] and looks its shape up in the static [`GATES`] table.

use core::fmt;

/// Number of primitive chips, including the two pin primitives.
///
/// Serialized chip ids below this value select a primitive.
pub const GATE_COUNT: usize = 19;

/// Maximum number of outputs a primitive can have.
pub const MAX_GATE_OUTPUTS: usize = 2;

/// Maximum number of inputs a primitive can have.
pub const MAX_GATE_INPUTS: usize = 4;

/// A primitive chip.
///
/// The discriminant is the serialized chip id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
#[allow(missing_docs)]
pub enum Primitive {
    /// Output pin of the enclosing chip.
    OutputPin,
    /// Input pin of the enclosing chip.
    InputPin,
    Buf,
    Not,
    And,
    Nand,
    Or,
    Nor,
    Xor,
    And3,
    Nand3,
    Or3,
    Nor3,
    And4,
    Nand4,
    Or4,
    Nor4,
    /// 2:1 multiplexer, inputs `(a, b, sel)`.
    Mux,
    /// 1:2 demultiplexer, inputs `(d, sel)`.
    Demux,
}

/// Static shape of a primitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GateDef {
    /// Display name.
    pub name: &'static str,
    /// Number of input pins.
    pub inputs: usize,
    /// Number of output pins, which is also the number of state slots.
    pub outputs: usize,
}

const fn def(name: &'static str, inputs: usize, outputs: usize) -> GateDef {
    GateDef {
        name,
        inputs,
        outputs,
    }
}

/// The primitive table, indexed by [`Primitive`] discriminant.
pub static GATES: [GateDef; GATE_COUNT] = [
    def("OUT", 1, 1),
    def("IN", 0, 1),
    def("BUF", 1, 1),
    def("NOT", 1, 1),
    def("AND", 2, 1),
    def("NAND", 2, 1),
    def("OR", 2, 1),
    def("NOR", 2, 1),
    def("XOR", 2, 1),
    def("AND3", 3, 1),
    def("NAND3", 3, 1),
    def("OR3", 3, 1),
    def("NOR3", 3, 1),
    def("AND4", 4, 1),
    def("NAND4", 4, 1),
    def("OR4", 4, 1),
    def("NOR4", 4, 1),
    def("MUX", 3, 1),
    def("DEMUX", 2, 2),
];

impl Primitive {
    /// Every primitive in serialized id order.
    pub const ALL: [Primitive; GATE_COUNT] = [
        Primitive::OutputPin,
        Primitive::InputPin,
        Primitive::Buf,
        Primitive::Not,
        Primitive::And,
        Primitive::Nand,
        Primitive::Or,
        Primitive::Nor,
        Primitive::Xor,
        Primitive::And3,
        Primitive::Nand3,
        Primitive::Or3,
        Primitive::Nor3,
        Primitive::And4,
        Primitive::Nand4,
        Primitive::Or4,
        Primitive::Nor4,
        Primitive::Mux,
        Primitive::Demux,
    ];

    /// Returns the primitive with the given serialized id.
    pub fn from_id(id: usize) -> Option<Self> {
        Self::ALL.get(id).copied()
    }

    /// Returns the serialized id of the primitive.
    #[inline]
    pub fn id(self) -> usize {
        self as usize
    }

    /// Returns the static shape of the primitive.
    #[inline]
    pub fn def(self) -> &'static GateDef {
        &GATES[self as usize]
    }

    /// Returns the display name.
    pub fn name(self) -> &'static str {
        self.def().name
    }

    /// Returns the number of input pins.
    #[inline]
    pub fn input_count(self) -> usize {
        self.def().inputs
    }

    /// Returns the number of output pins.
    #[inline]
    pub fn output_count(self) -> usize {
        self.def().outputs
    }

    /// Returns `true` for the input and output pin primitives.
    pub fn is_pin(self) -> bool {
        matches!(self, Primitive::InputPin | Primitive::OutputPin)
    }

    /// Evaluates the gate function.
    ///
    /// Unused trailing outputs are `false`.
    ///
    /// # Panics
    ///
    /// If called on [`Primitive::InputPin`], which is driven by the enclosing chip, or if `x` is
    /// shorter than the gate's input count.
    pub fn eval(self, x: &[bool]) -> [bool; MAX_GATE_OUTPUTS] {
        assert!(
            x.len() >= self.input_count(),
            "{} expects {} inputs, got {}",
            self,
            self.input_count(),
            x.len()
        );

        let out = match self {
            Primitive::InputPin => panic!("input pins are driven by the enclosing chip"),
            Primitive::OutputPin | Primitive::Buf => x[0],
            Primitive::Not => !x[0],
            Primitive::And | Primitive::And3 | Primitive::And4 => {
                x[..self.input_count()].iter().all(|b| *b)
            }
            Primitive::Nand | Primitive::Nand3 | Primitive::Nand4 => {
                !x[..self.input_count()].iter().all(|b| *b)
            }
            Primitive::Or | Primitive::Or3 | Primitive::Or4 => {
                x[..self.input_count()].iter().any(|b| *b)
            }
            Primitive::Nor | Primitive::Nor3 | Primitive::Nor4 => {
                !x[..self.input_count()].iter().any(|b| *b)
            }
            Primitive::Xor => x[0] ^ x[1],
            Primitive::Mux => {
                if x[2] {
                    x[1]
                } else {
                    x[0]
                }
            }
            Primitive::Demux => return [x[0] && !x[1], x[0] && x[1]],
        };

        [out, false]
    }
}

impl fmt::Display for Primitive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}
