//! Domain types shared by the Palco realtime crates.
//!
//! This crate has no internal dependencies so it can be used by the event
//! bus, the worker daemon, and any future API layer alike.

pub mod error;
pub mod event_names;
pub mod notification_policy;
pub mod payloads;
pub mod types;
