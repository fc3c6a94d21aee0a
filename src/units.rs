//! Physical quantities used by the accessor methods of PDOs, RDOs and contracts.
//!
//! Register fields are kept as integer millivolts and milliamperes. These helpers provide
//! typed views on them.
use uom::si::electric_current::milliampere;
use uom::si::electric_potential::millivolt;
pub use uom::si::f32::{ElectricCurrent, ElectricPotential, Power};

/// Convert a raw millivolt value into a potential.
pub fn potential_from_millivolts(millivolts: u16) -> ElectricPotential {
    ElectricPotential::new::<millivolt>(millivolts.into())
}

/// Convert a raw milliampere value into a current.
pub fn current_from_milliamperes(milliamperes: u16) -> ElectricCurrent {
    ElectricCurrent::new::<milliampere>(milliamperes.into())
}
