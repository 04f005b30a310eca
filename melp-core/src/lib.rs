//! Core of melp: turning calendar event snapshots into a live countdown.
//!
//! - `parse` turns raw event source output into an [`EventBatch`]
//! - `select` picks the next strictly-future event
//! - `countdown` owns the single live ticking countdown
//! - `app` wires the above into one event loop fed by a [`source::EventSource`]
//!   and rendering through a [`presenter::TrayPresenter`]

pub mod app;
pub mod countdown;
pub mod error;
pub mod event;
pub mod parse;
pub mod presenter;
pub mod select;
pub mod source;

pub use event::{Event, EventBatch};
