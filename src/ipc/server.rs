//! IPC Server module
//!
//! Serves the line protocol over any reader/writer pair; the viewer uses
//! stdin/stdout. A reader thread parses incoming lines and forwards them to
//! the app, a writer thread serializes outgoing messages. Parse errors are
//! answered with an `error` message.

use std::io::{BufRead, BufReader, Write};
use std::thread::JoinHandle;

use anyhow::{Context, Result};
use crossbeam_channel::{unbounded, Receiver, Sender};
use tracing::{debug, error, info, warn};

use super::protocol::{error_codes, IpcMessage};
use crate::scheduler::Waker;

/// Reader and writer threads of one IPC connection
pub struct IpcServer {
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

impl IpcServer {
    /// Start serving `input`/`output`
    ///
    /// `waker` runs after every message forwarded to the app, so an idle UI
    /// gets to process it.
    pub fn spawn<R, W>(
        input: R,
        output: W,
        waker: Option<Waker>,
    ) -> Result<(Self, IpcReceiver, IpcSender)>
    where
        R: BufRead + Send + 'static,
        W: Write + Send + 'static,
    {
        let (to_app_tx, to_app_rx) = unbounded();
        let (from_app_tx, from_app_rx) = unbounded();

        let writer = std::thread::Builder::new()
            .name("ipc-writer".to_string())
            .spawn(move || write_loop(output, from_app_rx))
            .context("Failed to spawn IPC writer thread")?;

        let replies = from_app_tx.clone();
        let reader = std::thread::Builder::new()
            .name("ipc-reader".to_string())
            .spawn(move || read_loop(input, to_app_tx, replies, waker))
            .context("Failed to spawn IPC reader thread")?;

        Ok((
            Self { reader, writer },
            IpcReceiver::new(to_app_rx),
            IpcSender::new(from_app_tx),
        ))
    }

    /// Wait for both threads; the writer exits once every sender is dropped
    pub fn join(self) {
        if self.reader.join().is_err() {
            error!("IPC reader thread panicked");
        }
        if self.writer.join().is_err() {
            error!("IPC writer thread panicked");
        }
    }
}

fn read_loop<R: BufRead>(
    input: R,
    to_app: Sender<IpcMessage>,
    replies: Sender<IpcMessage>,
    waker: Option<Waker>,
) {
    let forward = |msg: IpcMessage| -> bool {
        let sent = to_app.send(msg).is_ok();
        if let Some(waker) = &waker {
            waker();
        }
        sent
    };

    for line in input.lines() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                error!("Failed to read IPC input: {}", e);
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        debug!("Received: {}", line);

        match IpcMessage::from_json(&line) {
            Ok(msg) => {
                let shutdown = matches!(msg, IpcMessage::Shutdown);
                if !forward(msg) {
                    error!("Failed to send message to app");
                    return;
                }
                if shutdown {
                    info!("Received shutdown command");
                    return;
                }
            }
            Err(e) => {
                warn!("Failed to parse message: {}", e);
                let _ = replies.send(IpcMessage::error(
                    error_codes::INVALID_MESSAGE,
                    format!("Parse error: {}", e),
                ));
            }
        }
    }

    // Controller went away
    info!("IPC input closed");
    forward(IpcMessage::Shutdown);
}

fn write_loop<W: Write>(mut output: W, from_app: Receiver<IpcMessage>) {
    if !write_message(&mut output, &IpcMessage::ready()) {
        return;
    }
    for msg in from_app {
        if !write_message(&mut output, &msg) {
            break;
        }
    }
    debug!("IPC writer stopped");
}

fn write_message<W: Write>(output: &mut W, msg: &IpcMessage) -> bool {
    let json = match msg.to_json() {
        Ok(json) => json,
        Err(e) => {
            error!("Failed to serialize {:?}: {}", msg, e);
            return true;
        }
    };
    if let Err(e) = writeln!(output, "{}", json).and_then(|_| output.flush()) {
        error!("Failed to write IPC output: {}", e);
        return false;
    }
    true
}

/// IPC message receiver for the main application
pub struct IpcReceiver {
    rx: Receiver<IpcMessage>,
}

impl IpcReceiver {
    pub fn new(rx: Receiver<IpcMessage>) -> Self {
        Self { rx }
    }

    /// Try to receive a message without blocking
    pub fn try_recv(&self) -> Option<IpcMessage> {
        self.rx.try_recv().ok()
    }
}

/// IPC message sender for the main application
#[derive(Clone)]
pub struct IpcSender {
    tx: Sender<IpcMessage>,
}

impl IpcSender {
    pub fn new(tx: Sender<IpcMessage>) -> Self {
        Self { tx }
    }

    /// Queue a message for the controller
    pub fn send(&self, msg: IpcMessage) -> bool {
        self.tx.send(msg).is_ok()
    }
}

/// Start the stdin/stdout server in the background
pub fn start_ipc_server(use_stdio: bool, waker: Option<Waker>) -> Option<(IpcReceiver, IpcSender)> {
    if !use_stdio {
        return None;
    }

    info!("Starting stdio IPC server");
    match IpcServer::spawn(BufReader::new(std::io::stdin()), std::io::stdout(), waker) {
        // Threads are detached; stdin blocks until the process exits
        Ok((_server, receiver, sender)) => Some((receiver, sender)),
        Err(e) => {
            error!("Stdio server error: {:#}", e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ipc::ControlCommand;
    use parking_lot::Mutex;
    use std::io::Cursor;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Clone, Default)]
    struct SharedOutput(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedOutput {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl SharedOutput {
        fn messages(&self) -> Vec<IpcMessage> {
            String::from_utf8(self.0.lock().clone())
                .unwrap()
                .lines()
                .map(|line| IpcMessage::from_json(line).unwrap())
                .collect()
        }
    }

    #[test]
    fn test_forwards_messages_and_replies_to_garbage() {
        let input = Cursor::new(
            "{\"type\":\"control\",\"payload\":\"pause\"}\n\ngarbage\n{\"type\":\"shutdown\"}\n{\"type\":\"control\",\"payload\":\"play\"}\n",
        );
        let output = SharedOutput::default();
        let wakes = Arc::new(AtomicUsize::new(0));
        let counter = wakes.clone();
        let waker: Waker = Arc::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let (server, receiver, sender) = IpcServer::spawn(input, output.clone(), Some(waker)).unwrap();
        sender.send(IpcMessage::SnapshotSaved { path: "a.png".into() });
        drop(sender);
        server.join();

        assert_eq!(receiver.try_recv(), Some(IpcMessage::Control(ControlCommand::Pause)));
        assert_eq!(receiver.try_recv(), Some(IpcMessage::Shutdown));
        // Nothing is read after shutdown
        assert_eq!(receiver.try_recv(), None);
        assert_eq!(wakes.load(Ordering::SeqCst), 2);

        let written = output.messages();
        assert_eq!(written[0], IpcMessage::Ready);
        assert!(written.iter().any(|m| matches!(
            m,
            IpcMessage::Error { code, .. } if *code == error_codes::INVALID_MESSAGE
        )));
        assert!(written.contains(&IpcMessage::SnapshotSaved { path: "a.png".into() }));
    }

    #[test]
    fn test_closed_input_requests_shutdown() {
        let output = SharedOutput::default();
        let (server, receiver, sender) = IpcServer::spawn(Cursor::new(""), output.clone(), None).unwrap();
        drop(sender);
        server.join();

        assert_eq!(receiver.try_recv(), Some(IpcMessage::Shutdown));
        assert_eq!(output.messages(), vec![IpcMessage::Ready]);
    }

    #[test]
    fn test_stdio_disabled() {
        assert!(start_ipc_server(false, None).is_none());
    }
}
