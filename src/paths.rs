use std::path::PathBuf;
use std::sync::OnceLock;

static EXE_DIR: OnceLock<PathBuf> = OnceLock::new();

/// Returns the directory containing the executable.
pub fn exe_dir() -> &'static PathBuf {
    EXE_DIR.get_or_init(|| {
        std::env::current_exe()
            .ok()
            .and_then(|p| p.parent().map(|p| p.to_path_buf()))
            .unwrap_or_else(|| PathBuf::from("."))
    })
}

/// Returns the config file path: `<exe_dir>/config.json`
pub fn config_path() -> PathBuf {
    exe_dir().join("config.json")
}

/// Returns the script store path: `<exe_dir>/scripts.json`
pub fn scripts_path() -> PathBuf {
    exe_dir().join("scripts.json")
}

/// Returns the logs directory: `<exe_dir>/logs/`
pub fn logs_dir() -> PathBuf {
    exe_dir().join("logs")
}

/// Ensures the log directory exists. Call at startup.
pub fn ensure_directories() -> std::io::Result<()> {
    std::fs::create_dir_all(logs_dir())
}
