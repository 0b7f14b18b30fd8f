mod loader;
mod types;

pub use loader::ConfigError;
pub use types::{builtin_tools, Config, Defaults, ToolConfig};
