//! Sky-quality meter + GPS field logger.
//!
//! A background worker takes SQM readings stamped with GPS time and position
//! whenever it is triggered, and commits each one to disk before the next.

pub mod acquisition;
pub mod config;
pub mod devices;
pub mod error;
pub mod shell;
