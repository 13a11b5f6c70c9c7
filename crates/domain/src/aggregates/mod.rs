//! Aggregate roots - domain objects that own their related data
//!
//! Each aggregate has a unique identity, owns its constituent parts and
//! exposes behaviour through methods rather than public fields.

pub mod session;

pub use session::Session;
