//! Process-wide coordination of the single recording session
//!
//! - `RecordingManager`: gated start/stop, status snapshot, occupancy query
//! - `OccupancyWatchdog`: stops the session once the channel stays empty

mod manager;
mod watchdog;

pub use manager::{ActiveSession, ManagerSettings, RecordingManager, StartRequest, StopOutcome};
pub use watchdog::OccupancyWatchdog;
