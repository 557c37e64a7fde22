//! Force-field parameter tables used when assembling systems.

pub mod atomtypes;
