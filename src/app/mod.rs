//! Application module
//!
//! Contains the egui viewer application.

mod viewer_app;

pub use viewer_app::ViewerApp;
