pub mod state;

pub use state::{CaptureLoop, LoopPhase, LoopState, TickOutcome};
