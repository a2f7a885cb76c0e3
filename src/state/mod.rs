//! Sans-I/O protocol state machines.

pub mod startup;

pub use startup::{StartupFlow, Step};
