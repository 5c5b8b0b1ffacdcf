//! Lookup of the configured CLI executable before the service starts taking traffic.

use std::path::{Path, PathBuf};

#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;

fn is_runnable_file(path: &Path) -> bool {
    let Ok(metadata) = std::fs::metadata(path) else {
        return false;
    };
    if !metadata.is_file() {
        return false;
    }
    #[cfg(unix)]
    {
        metadata.permissions().mode() & 0o111 != 0
    }
    #[cfg(not(unix))]
    {
        true
    }
}

/// Resolves `executable` the way the process spawner will: paths are checked
/// directly, bare names are searched on `PATH`.
pub fn resolve_executable(executable: &str) -> Option<PathBuf> {
    let name = executable.trim();
    if name.is_empty() {
        return None;
    }

    let direct = Path::new(name);
    if direct.is_absolute() || name.contains(std::path::MAIN_SEPARATOR) {
        return is_runnable_file(direct).then(|| direct.to_path_buf());
    }

    let search_path = std::env::var_os("PATH")?;
    std::env::split_paths(&search_path)
        .map(|dir| dir.join(name))
        .find(|candidate| is_runnable_file(candidate))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    static PATH_ENV_LOCK: Mutex<()> = Mutex::new(());

    #[cfg(unix)]
    fn write_with_mode(path: &Path, mode: u32) {
        std::fs::write(path, "#!/bin/sh\n").expect("write script");
        let mut perms = std::fs::metadata(path).expect("metadata").permissions();
        perms.set_mode(mode);
        std::fs::set_permissions(path, perms).expect("set perms");
    }

    #[test]
    fn unit_resolve_executable_rejects_blank_names() {
        assert_eq!(resolve_executable(""), None);
        assert_eq!(resolve_executable("  "), None);
    }

    #[cfg(unix)]
    #[test]
    fn integration_resolve_executable_requires_execute_bit_for_paths() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("claude");
        write_with_mode(&path, 0o755);
        let raw = path.to_str().unwrap_or_default();
        assert_eq!(resolve_executable(raw), Some(path.clone()));

        write_with_mode(&path, 0o644);
        assert_eq!(resolve_executable(raw), None);
    }

    #[cfg(unix)]
    #[test]
    fn functional_resolve_executable_searches_path_entries() {
        let _guard = PATH_ENV_LOCK.lock().expect("path env lock");
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("mock-claude");
        write_with_mode(&path, 0o755);

        let original = std::env::var_os("PATH");
        std::env::set_var("PATH", temp.path());
        let resolved = resolve_executable("mock-claude");
        let missing = resolve_executable("not-installed-claude");
        if let Some(value) = original {
            std::env::set_var("PATH", value);
        } else {
            std::env::remove_var("PATH");
        }

        assert_eq!(resolved, Some(path));
        assert_eq!(missing, None);
    }
}
