mod handle;
mod resize;
mod spawn;

pub use handle::PtyHandle;
pub use resize::ResizeWatcher;
pub use spawn::{terminal_size, SpawnSpec, DEFAULT_SIZE};
