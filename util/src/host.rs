//! Host platform utility functions

use std::path::PathBuf;

/// Environment variable naming the software root directory.
pub const SW_ROOT_ENV_VAR: &str = "ARES_TELEOP_ROOT";

/// Get the software root directory.
///
/// The root is taken from the `ARES_TELEOP_ROOT` environment variable if it is set, otherwise
/// the current working directory is used. Parameter files and session directories are resolved
/// relative to this root.
pub fn get_sw_root() -> std::io::Result<PathBuf> {
    match std::env::var(SW_ROOT_ENV_VAR) {
        Ok(root) => Ok(PathBuf::from(root)),
        Err(_) => std::env::current_dir()
    }
}
