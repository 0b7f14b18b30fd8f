use std::io;
use std::os::unix::io::RawFd;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tokio::sync::mpsc;

/// How long one `select()` waits before re-checking the stop flag.
const POLL_INTERVAL_MS: i32 = 50;

/// Reads raw chunks from a file descriptor on a dedicated thread.
///
/// A blocking `read()` on stdin cannot be interrupted, and a reader left
/// behind after detach would swallow the next line typed at the prompt.
/// The pump waits with `select()` and a short timeout instead, so `stop`
/// returns promptly and nothing is read after it.
pub struct StdinPump {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl StdinPump {
    /// Pump the process's stdin.
    pub fn start(chunks: mpsc::UnboundedSender<Vec<u8>>) -> io::Result<Self> {
        Self::start_fd(libc::STDIN_FILENO, chunks)
    }

    /// Pump an arbitrary descriptor. The descriptor is borrowed, not closed.
    pub fn start_fd(fd: RawFd, chunks: mpsc::UnboundedSender<Vec<u8>>) -> io::Result<Self> {
        let stop = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&stop);
        let handle = thread::Builder::new()
            .name("attach-stdin".to_string())
            .spawn(move || pump(fd, &flag, &chunks))?;
        Ok(Self {
            stop,
            handle: Some(handle),
        })
    }

    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for StdinPump {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn pump(fd: RawFd, stop: &AtomicBool, chunks: &mpsc::UnboundedSender<Vec<u8>>) {
    let mut buf = [0u8; 4096];
    while !stop.load(Ordering::SeqCst) {
        match wait_readable(fd, POLL_INTERVAL_MS) {
            Ok(false) => continue,
            Ok(true) => {}
            Err(err) => {
                tracing::debug!(error = %err, "stdin select failed");
                break;
            }
        }
        if stop.load(Ordering::SeqCst) {
            break;
        }

        let n = unsafe { libc::read(fd, buf.as_mut_ptr().cast(), buf.len()) };
        if n < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                continue;
            }
            tracing::debug!(error = %err, "stdin read failed");
            break;
        }
        if n == 0 {
            // EOF: dropping the sender tells the attach loop input is gone.
            break;
        }
        if chunks.send(buf[..n as usize].to_vec()).is_err() {
            break;
        }
    }
}

/// `select()` on one descriptor for reading.
fn wait_readable(fd: RawFd, timeout_ms: i32) -> io::Result<bool> {
    unsafe {
        let mut read_fds: libc::fd_set = std::mem::zeroed();
        let mut tv = libc::timeval {
            tv_sec: (timeout_ms / 1000) as libc::time_t,
            tv_usec: ((timeout_ms % 1000) * 1000) as libc::suseconds_t,
        };

        loop {
            libc::FD_ZERO(&mut read_fds);
            libc::FD_SET(fd, &mut read_fds);
            let ret = libc::select(
                fd + 1,
                &mut read_fds,
                std::ptr::null_mut(),
                std::ptr::null_mut(),
                &mut tv,
            );
            if ret < 0 {
                let err = io::Error::last_os_error();
                if err.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                return Err(err);
            }
            return Ok(ret > 0);
        }
    }
}
