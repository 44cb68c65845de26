use std::path::PathBuf;

/// Best-effort home directory resolution.
///
/// `dirs::home_dir()` can return `None` in some service/test environments;
/// fall back to the usual environment variables then.
pub fn user_home_dir() -> Option<PathBuf> {
    dirs::home_dir()
        .or_else(|| std::env::var_os("HOME").map(PathBuf::from))
        .or_else(|| std::env::var_os("USERPROFILE").map(PathBuf::from))
}

/// Return the base `.demoflow` directory, or a temp directory when no home
/// can be resolved.
pub fn demoflow_root_dir() -> PathBuf {
    if let Some(home) = user_home_dir() {
        home.join(".demoflow")
    } else {
        std::env::temp_dir().join("demoflow-no-home")
    }
}

/// Where the persisted session storage lives by default.
pub fn default_session_path() -> PathBuf {
    demoflow_root_dir().join("session.json")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_file_lives_under_root() {
        let path = default_session_path();
        assert!(path.starts_with(demoflow_root_dir()));
        assert_eq!(path.file_name().and_then(|n| n.to_str()), Some("session.json"));
    }
}
