//! Consent widget engine.
//!
//! The engine keeps a consent banner in step with the server: it decides whether
//! a banner is needed, fetches and sanitizes it, wires its controls, records the
//! visitor's decision and shows the resulting notifications. The core
//! ([`ConsentWidget`]) performs no I/O; [`WidgetWorker`] drives it over a
//! [`Transport`].

pub mod engine;

pub use engine::*;
