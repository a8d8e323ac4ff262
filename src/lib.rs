//! Flowsmith - prompt to diagram service
//!
//! Turns a natural-language prompt into a draw.io diagram produced by a
//! language model, plus a PNG preview rendered by a local converter CLI.
//! Most of the crate is the resilience layer around those two unreliable
//! collaborators:
//!
//! - [`classify`] - one error taxonomy shared by client and server
//! - [`client`] - connection-aware deadlines and retrying dispatch
//! - [`cache`] - bounded, TTL-expiring generation cache
//! - [`probe`] - cached converter availability
//! - [`throttle`] - fixed-window per-client rate limiting
//! - [`deadline`] - hard ceiling on request handling
//! - [`orchestrator`] - the generate workflow tying it together

pub mod api;
pub mod cache;
pub mod classify;
pub mod cli;
pub mod client;
pub mod clock;
pub mod config;
pub mod deadline;
pub mod logging;
pub mod metrics;
pub mod orchestrator;
pub mod probe;
pub mod storage;
pub mod throttle;
