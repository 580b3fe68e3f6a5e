//! Configuration: engine settings and path helpers.
//!
//! Settings come from an optional YAML or TOML file; command-line flags
//! override them in `main`.

mod path;
mod settings;

pub use path::{default_settings_path, expand_home, home_dir, resolve_path, PathResolver};
pub use settings::{load_settings, settings_from_str, ConfigFormat, Settings};
