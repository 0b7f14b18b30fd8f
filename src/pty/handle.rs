use parking_lot::Mutex;
use portable_pty::{MasterPty, PtySize};
use std::io::{self, Write};
use std::sync::Arc;

/// Cloneable write/resize side of a session's PTY.
///
/// The read side lives on the session's reader thread; this handle is what
/// every other component uses to talk to the subprocess.
#[derive(Clone)]
pub struct PtyHandle {
    writer: Arc<Mutex<Option<Box<dyn Write + Send>>>>,
    master: Arc<Mutex<Box<dyn MasterPty + Send>>>,
}

impl PtyHandle {
    pub fn new(writer: Box<dyn Write + Send>, master: Box<dyn MasterPty + Send>) -> Self {
        Self {
            writer: Arc::new(Mutex::new(Some(writer))),
            master: Arc::new(Mutex::new(master)),
        }
    }

    /// Write bytes to the subprocess. Silently ignored once the writer is closed.
    pub fn send_input(&self, bytes: &[u8]) -> io::Result<()> {
        if bytes.is_empty() {
            return Ok(());
        }
        let mut writer = self.writer.lock();
        let Some(writer) = writer.as_mut() else {
            return Ok(());
        };
        writer.write_all(bytes)?;
        writer.flush()?;
        Ok(())
    }

    pub fn resize(&self, cols: u16, rows: u16) -> io::Result<()> {
        let size = PtySize {
            rows,
            cols,
            pixel_width: 0,
            pixel_height: 0,
        };
        self.master
            .lock()
            .resize(size)
            .map_err(|err| io::Error::other(err.to_string()))
    }

    pub fn size(&self) -> Option<(u16, u16)> {
        self.master
            .lock()
            .get_size()
            .ok()
            .map(|size| (size.cols, size.rows))
    }

    pub fn close_writer(&self) {
        *self.writer.lock() = None;
    }
}
