//! Per-WebSocket PTY attach bridge.
//!
//! One [`Attach`] is owned by exactly one WebSocket handler for its
//! lifetime. It opens a pseudo-terminal pair, spawns the multiplexer's
//! `attach-session` bound to the slave, and exposes a master-side
//! read/write/resize surface. The multiplexer session itself is never
//! signaled here — detach-preserving is a hard contract; only the attach
//! child is terminated, and only after a grace period.

use std::io::{Read, Write};
use std::sync::Arc;
use std::time::{Duration, Instant};

use portable_pty::{native_pty_system, Child, CommandBuilder, MasterPty, PtySize};
use tokio::sync::mpsc;
use tracing::{trace, warn};

use crate::error::{TerminalError, TerminalResult};
use crate::multiplexer::Multiplexer;

const READ_CHUNK: usize = 4096;
const POLL_INTERVAL: Duration = Duration::from_millis(10);
const ATTACH_CHANNEL_CAPACITY: usize = 64;
const KILL_GRACE: Duration = Duration::from_secs(2);

/// A live PTY bridge to one multiplexer session. Output is delivered
/// through [`Attach::recv`]; input is written through [`Attach::write`].
pub struct Attach {
    master: Box<dyn MasterPty + Send>,
    writer: Arc<std::sync::Mutex<Box<dyn Write + Send>>>,
    child: Box<dyn Child + Send + Sync>,
    output_rx: mpsc::Receiver<Vec<u8>>,
    reader_task: tokio::task::JoinHandle<()>,
}

impl Attach {
    /// Open a PTY pair and spawn the multiplexer's attach command bound to
    /// the slave. `spectator` passes the multiplexer's read-only attach
    /// flag so input frames are accepted by the transport but never echoed
    /// into the session (enforced by the caller: spectator mode
    /// silently discards non-resize client frames).
    pub fn spawn(
        mux: &Multiplexer,
        session_name: &str,
        spectator: bool,
        rows: u16,
        cols: u16,
    ) -> TerminalResult<Self> {
        let pty_system = native_pty_system();
        let pair = pty_system
            .openpty(PtySize {
                rows,
                cols,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|e| TerminalError::Pty(e.to_string()))?;

        let mut cmd = CommandBuilder::new(mux.binary_name());
        cmd.arg("attach-session");
        cmd.arg("-t");
        cmd.arg(session_name);
        if spectator {
            cmd.arg("-r");
        }

        let child = pair
            .slave
            .spawn_command(cmd)
            .map_err(|e| TerminalError::Pty(e.to_string()))?;
        drop(pair.slave);

        let mut reader = pair
            .master
            .try_clone_reader()
            .map_err(|e| TerminalError::Pty(e.to_string()))?;
        let writer = pair
            .master
            .take_writer()
            .map_err(|e| TerminalError::Pty(e.to_string()))?;
        let writer = Arc::new(std::sync::Mutex::new(writer));

        let (tx, rx) = mpsc::channel(ATTACH_CHANNEL_CAPACITY);
        let reader_task = tokio::task::spawn_blocking(move || {
            let mut buf = [0u8; READ_CHUNK];
            loop {
                match reader.read(&mut buf) {
                    Ok(0) => break,
                    Ok(n) => {
                        if tx.blocking_send(buf[..n].to_vec()).is_err() {
                            break;
                        }
                    }
                    Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                        std::thread::sleep(POLL_INTERVAL);
                    }
                    Err(e) => {
                        trace!(error = %e, "pty master read terminated");
                        break;
                    }
                }
            }
        });

        Ok(Attach {
            master: pair.master,
            writer,
            child,
            output_rx: rx,
            reader_task,
        })
    }

    /// Receive the next chunk of terminal output, `None` once the attach
    /// process has exited and its output has drained.
    pub async fn recv(&mut self) -> Option<Vec<u8>> {
        self.output_rx.recv().await
    }

    /// Write keystrokes to the PTY master, verbatim.
    pub fn write(&self, bytes: &[u8]) -> TerminalResult<()> {
        let mut writer = self
            .writer
            .lock()
            .map_err(|_| TerminalError::Pty("writer lock poisoned".to_string()))?;
        writer.write_all(bytes)?;
        writer.flush()?;
        Ok(())
    }

    /// Resize both the PTY ioctl and (by the caller, via the multiplexer)
    /// the session's window. Ignored by the caller in spectator mode.
    pub fn resize(&self, rows: u16, cols: u16) -> TerminalResult<()> {
        self.master
            .resize(PtySize {
                rows,
                cols,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|e| TerminalError::Pty(e.to_string()))
    }

    /// Tear down the bridge: stop the reader task, then give the attach
    /// child [`KILL_GRACE`] to exit on its own (closing the PTY typically
    /// delivers it a hangup) before forcing termination. Never touches the
    /// multiplexer session itself.
    pub async fn close(mut self) {
        self.reader_task.abort();
        let mut child = self.child;
        let outcome = tokio::task::spawn_blocking(move || {
            let deadline = Instant::now() + KILL_GRACE;
            loop {
                match child.try_wait() {
                    Ok(Some(_)) => return,
                    Ok(None) => {}
                    Err(_) => return,
                }
                if Instant::now() >= deadline {
                    let _ = child.kill();
                    let _ = child.wait();
                    return;
                }
                std::thread::sleep(Duration::from_millis(50));
            }
        })
        .await;
        if outcome.is_err() {
            warn!("attach child teardown task panicked");
        }
    }
}
