//! The static trade set: sparse exchange vectors, worker placements, and the
//! enumeration of launch and barter trades over a roster.

pub mod builder;
pub mod vector;
