//! The live detection session.
//!
//! `DetectionSession` ties the model loader, the camera controller, the frame
//! scheduler and a render surface together and keeps `SessionState` up to date.
//! Everything runs on the caller's thread; the caller drives the loop with
//! `poll(now)`, sleeping until `next_due()` in between.

mod pipeline;
mod state;

pub use pipeline::{DetectionSession, IterationOutcome, LoopStats, PollOutcome};
pub use state::SessionState;
