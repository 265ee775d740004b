//! Sample acquisition loop and debug capture

pub mod dump;
pub mod processor;

pub use dump::DebugDump;
pub use processor::{AcquisitionError, AcquisitionLoop, CycleOutcome};
