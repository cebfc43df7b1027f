//! Hold state module
//!
//! Decides from trigger keys and scope state whether the output key should
//! be held, and drives it there:
//! - ScopeTracker: right-click tap/hold scope with inactivity reset
//! - policy: either trigger held and scope closed
//! - KeyActuator: the single press/release point
//! - Engine: the locked reconciliation step, watchdog check and shutdown
//! - runner: poll loop, watchdog and input dispatch tasks

mod actuator;
mod machine;
mod policy;
mod runner;
mod scope;

pub use machine::Engine;
pub use runner::{run_input_dispatch, run_poll_loop, run_watchdog, Timing};
