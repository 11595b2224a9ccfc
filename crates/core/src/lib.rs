//! Domain model and lifecycle rules for the Aqua Talent job board.
//!
//! Nothing in this crate performs I/O; storage and the HTTP layer call into
//! these rules and persist whatever they return.

pub mod lifecycle;
pub mod notify;
pub mod portal;
pub mod quota;
pub mod types;
