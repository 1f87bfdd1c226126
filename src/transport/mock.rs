//! Scriptable in-memory transport for exercising the connection manager
//! without hardware.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::error::{Error, Result};
use crate::transport::Transport;

/// Shared observable state of a [`MockTransport`].
#[derive(Debug, Default)]
pub struct MockState {
    /// Path set by the manager.
    pub path: Option<String>,
    /// Whether the handle is currently open.
    pub open: bool,
    /// Total successful opens.
    pub opens: u32,
    /// Total closes of an open handle.
    pub closes: u32,
    /// Total input-buffer clears.
    pub clears: u32,
    /// Every byte written, in order.
    pub written: Vec<u8>,
    /// Number of upcoming open calls that fail with `DeviceBusy`.
    pub fail_opens: u32,
    /// When set, every write fails with a broken-pipe error.
    pub fail_write: bool,
    /// When set, every clear fails (simulates a dropped handle).
    pub fail_clear: bool,
    /// Response lines handed out per `read_lines` call, front first.
    pub lines: VecDeque<Vec<String>>,
}

/// Mock transport backed by [`MockState`].
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
}

impl MockTransport {
    /// Creates a mock and a handle to its state for assertions.
    pub fn new() -> (Self, Arc<Mutex<MockState>>) {
        let state = Arc::new(Mutex::new(MockState::default()));
        (
            Self {
                state: Arc::clone(&state),
            },
            state,
        )
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().expect("mock state poisoned")
    }
}

impl Transport for MockTransport {
    fn set_path(&mut self, path: &str) {
        self.lock().path = Some(path.to_owned());
    }

    fn path(&self) -> Option<&str> {
        // The manager never calls this on the mock; state carries the path.
        None
    }

    fn open(&mut self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            let mut state = self.lock();
            if state.open {
                return Ok(());
            }
            if state.fail_opens > 0 {
                state.fail_opens -= 1;
                let port = state.path.clone().unwrap_or_default();
                return Err(Error::DeviceBusy { port });
            }
            state.open = true;
            state.opens += 1;
            Ok(())
        })
    }

    fn close(&mut self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            let mut state = self.lock();
            if state.open {
                state.open = false;
                state.closes += 1;
            }
            Ok(())
        })
    }

    fn write_byte(&mut self, byte: u8) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            let mut state = self.lock();
            if !state.open {
                return Err(Error::NotConnected);
            }
            if state.fail_write {
                return Err(Error::Write(std::io::Error::new(
                    std::io::ErrorKind::BrokenPipe,
                    "mock write failure",
                )));
            }
            state.written.push(byte);
            Ok(())
        })
    }

    fn clear_input(&mut self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            let mut state = self.lock();
            if !state.open {
                return Err(Error::NotConnected);
            }
            if state.fail_clear {
                return Err(Error::Io(std::io::Error::new(
                    std::io::ErrorKind::BrokenPipe,
                    "mock clear failure",
                )));
            }
            state.clears += 1;
            Ok(())
        })
    }

    fn read_lines(
        &mut self,
        _window: Duration,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<String>>> + Send + '_>> {
        Box::pin(async move {
            let mut state = self.lock();
            if !state.open {
                return Err(Error::NotConnected);
            }
            Ok(state.lines.pop_front().unwrap_or_default())
        })
    }

    fn is_open(&self) -> bool {
        self.lock().open
    }
}
