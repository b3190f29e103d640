// src/watch/mod.rs

//! Filesystem change notification.
//!
//! [`FsNotifier`] wraps a `notify` watcher on a single path, filters raw
//! events through an [`EventMask`], optionally collapses bursts with a
//! [`Debouncer`](crate::debounce::Debouncer), and can be suspended while the
//! application writes the watched file itself.

pub mod mask;
pub mod notifier;

pub use mask::EventMask;
pub use notifier::{FsNotifier, FsNotifierBuilder};
