//! Decision engine for a multi-finger random picker.
//!
//! [`tracker::TouchTracker`] keeps the set of pressed contacts and reports
//! membership changes to [`selection::SelectionStateMachine`], which waits for
//! the set to settle, draws a winner, holds it and starts over.
//! [`picker::Picker`] wires the two together behind a single event entry point.

pub mod clock;
pub mod config;
pub mod event;
pub mod input;
pub mod logging;
pub mod picker;
pub mod replay;
pub mod selection;
pub mod tracker;
