//! # scripter-rs
//!
//! Client for the idea-generation backend.
//!
//! Opens a generation session, follows its event stream, pulls the
//! structured idea out of the producer node's state and post-processes it
//! into a display card. Also carries the upload-authorization client used
//! during onboarding, plus logging and OpenTelemetry setup.

pub mod card;
pub mod config;
pub mod error;
pub mod event;
pub mod extract;
pub mod generate;
pub mod model;
pub mod session;
pub mod stream;
pub mod telemetry;
pub mod upload;
