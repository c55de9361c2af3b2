use std::path::PathBuf;

/// Resolves an executable's absolute path by walking `PATH`, the way the
/// teacher's `utils::shell::resolve_executable_path_blocking` does, without
/// depending on that crate directly.
pub fn resolve_executable_path_blocking(name: &str) -> Option<PathBuf> {
    let path_var = std::env::var_os("PATH")?;
    std::env::split_paths(&path_var).find_map(|dir| {
        let candidate = dir.join(name);
        candidate.is_file().then_some(candidate)
    })
}
