//! Foundational value types: resource kinds and sources, granule arithmetic,
//! capability profiles and the engine error taxonomy.

pub mod capability;
pub mod error;
pub mod quantity;
pub mod resource;
