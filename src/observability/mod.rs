//! Observability for protocol runs
//!
//! - Structured logging (JSON lines on stderr)
//! - Typed lifecycle events
//!
//! Observability is read-only: a failed log write never changes the
//! outcome of a run.
//!
//! ```ignore
//! use haswitch::observability::{log_event, Event};
//!
//! log_event(Event::StepBegin, &[("step", "promote"), ("node", "idp2")]);
//! ```

mod events;
mod logger;

pub use events::Event;
pub use logger::{Logger, Severity};

/// Log a typed event at its own severity.
pub fn log_event(event: Event, fields: &[(&str, &str)]) {
    Logger::log(event.severity(), event.as_str(), fields);
}
