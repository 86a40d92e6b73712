//! Recording session management
//!
//! This module implements the session control surface:
//! - SessionController owning the state machine and stream lifecycle
//! - Status reporter reconciling state against live processes
//! - Session state and configuration types

pub mod controller;
pub mod state;
pub mod status;

pub use controller::SessionController;
pub use state::{RecorderConfig, SessionState, StartOptions, StopReport};
pub use status::{StatusReport, StreamStatus};
