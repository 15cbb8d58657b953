//! Review session orchestration
//!
//! The session is a state machine over the card under review. Transitions
//! are pure ([`transition::transition`]) and emit [`Command`]s; the driver
//! applies them one at a time, runs their audio and remote side effects, and
//! publishes a [`Snapshot`] after each one.

mod driver;
pub mod prompts;
mod state;
pub mod transition;

pub use driver::{SessionHandle, SessionServices, spawn_session};
pub use state::{
    CardSummary, Command, Event, EventTag, PendingCall, RemoteEvent, RemoteRequest, SessionState,
    Snapshot, StateTag, Transition, Utterance,
};
pub use transition::Context;
