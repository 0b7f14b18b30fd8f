use std::io;
#[cfg(unix)]
use std::thread;
use tokio::sync::mpsc::UnboundedSender;

#[cfg(unix)]
use crate::pty::spawn::terminal_size;
#[cfg(unix)]
use signal_hook::consts::signal::SIGWINCH;
#[cfg(unix)]
use signal_hook::iterator::Signals;

/// Watches SIGWINCH and reports the new `(cols, rows)` of the controlling terminal.
///
/// Only alive while a session is attached; the attach loop applies the size
/// to the attached PTY. Dropping the watcher unregisters the signal and ends
/// its thread.
pub struct ResizeWatcher {
    #[cfg(unix)]
    handle: signal_hook::iterator::Handle,
    #[cfg(unix)]
    thread: Option<thread::JoinHandle<()>>,
}

impl ResizeWatcher {
    pub fn start(sizes: UnboundedSender<(u16, u16)>) -> io::Result<Option<Self>> {
        #[cfg(unix)]
        {
            let mut signals = Signals::new([SIGWINCH])?;
            let handle = signals.handle();
            let thread = thread::Builder::new()
                .name("resize-watcher".to_string())
                .spawn(move || {
                    for _ in signals.forever() {
                        if sizes.send(terminal_size()).is_err() {
                            break;
                        }
                    }
                })?;
            Ok(Some(Self {
                handle,
                thread: Some(thread),
            }))
        }

        #[cfg(not(unix))]
        {
            let _ = sizes;
            Ok(None)
        }
    }

    pub fn stop(self) {
        drop(self);
    }
}

impl Drop for ResizeWatcher {
    fn drop(&mut self) {
        #[cfg(unix)]
        {
            self.handle.close();
            if let Some(thread) = self.thread.take() {
                let _ = thread.join();
            }
        }
    }
}
