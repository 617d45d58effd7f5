//! Configuration module
//!
//! Contains the viewer configuration and source selection.

mod viewer_config;

pub use viewer_config::*;
