//! Global loading indicator.
//!
//! `LoadingCoordinator` turns many overlapping fetches into one debounced
//! signal and drives a `ProgressIndicator` plus a backdrop flag. Both are
//! plain state machines polled from the UI tick; rendering lives in
//! `ui::overlay`.

mod coordinator;
mod progress;

pub use coordinator::{LoaderSettings, LoadingCoordinator};
pub use progress::{ProgressIndicator, ProgressSettings, ProgressState};
