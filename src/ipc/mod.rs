//! IPC communication module
//!
//! Remote control of the viewer over stdin/stdout.

mod protocol;
mod server;

pub use protocol::*;
pub use server::{start_ipc_server, IpcReceiver, IpcSender, IpcServer};
