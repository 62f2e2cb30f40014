//! Sea route calculator CLI library.
//!
//! Building blocks for the `searoute` binary: configuration, logging, request
//! intake, concurrent dispatch, and route rendering.

pub mod config;
pub mod dispatcher;
pub mod intake;
pub mod logging;
pub mod output;
