//! Domain layer - Port definitions for the resize decision engine
//!
//! The engine never talks to the API server or reads annotations directly;
//! it goes through the traits (ports) defined here so it can run without a
//! live cluster.

pub mod ports;

pub use ports::*;
