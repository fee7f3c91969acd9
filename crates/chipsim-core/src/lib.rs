//! A hierarchical digital logic simulator.
//!
//! Circuits are built from primitive gates and previously saved chips. A [`LogicSim`] owns the
//! chip library, the chip being edited and its double-buffered simulation state. Every part of
//! the viewed chip, down through any depth of nesting, owns a fixed range of slots in a flat
//! boolean vector, and [`LogicSim::tick`] advances every slot by one synchronous step.
//!
//! ```
//! use chipsim_core::{chip::{PinRef, Placement}, gate::Primitive, toggle::StateLoc, LogicSim};
//!
//! let mut sim = LogicSim::new();
//! let chip = sim.viewed_chip();
//! let a = sim.add_part(chip, Primitive::InputPin.into(), Placement::default());
//! let not = sim.add_part(chip, Primitive::Not.into(), Placement::default());
//! sim.add_wire(chip, PinRef::new(a, 0), PinRef::new(not, 0), Vec::new());
//!
//! sim.tick();
//! assert_eq!(sim.state_at(&StateLoc::part(not)), Some((true, false)));
//! ```

#![deny(missing_docs, unreachable_pub, unused_must_use)]

pub mod chip;
pub mod clock;
mod copy;
#[cfg(feature = "serde")]
pub mod document;
mod edit;
mod error;
mod flatten;
pub mod gate;
mod sim;
mod simulate;
pub mod toggle;
mod users;

pub use chip::{Chip, ChipId, ChipRef, Part, PartId};
pub use clock::{Clock, ClockConfig};
#[cfg(feature = "serde")]
pub use document::{DocumentError, LibraryDoc};
pub use error::LibraryError;
pub use gate::Primitive;
pub use sim::LogicSim;
pub use toggle::StateLoc;
