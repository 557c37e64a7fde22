//! Graph surgery on molecule topologies.

pub mod cyclic;
