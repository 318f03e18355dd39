use std::collections::BTreeMap;
use std::env;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

/// Finds `program` the way a shell would: paths are checked directly, bare
/// names are searched on `PATH`.
pub fn resolve_executable(program: &str) -> Option<PathBuf> {
    resolve_executable_in(program, env::var_os("PATH"))
}

pub fn resolve_executable_in(program: &str, path_var: Option<OsString>) -> Option<PathBuf> {
    let program = program.trim();
    if program.is_empty() {
        return None;
    }

    let candidate = Path::new(program);
    if candidate.is_absolute() || candidate.components().count() > 1 {
        return candidate_names(candidate)
            .into_iter()
            .find(|path| is_executable(path));
    }

    let path_var = path_var?;
    env::split_paths(&path_var)
        .flat_map(|dir| candidate_names(&dir.join(program)))
        .find(|path| is_executable(path))
}

/// Executables on `PATH` whose file name starts with `prefix`, keyed by the
/// part after the prefix. Earlier `PATH` entries shadow later ones.
pub fn executables_with_prefix(prefix: &str, path_var: Option<OsString>) -> BTreeMap<String, PathBuf> {
    let mut found = BTreeMap::new();
    let Some(path_var) = path_var else {
        return found;
    };

    for dir in env::split_paths(&path_var) {
        let Ok(entries) = fs::read_dir(&dir) else {
            continue;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if !is_executable(&path) {
                continue;
            }
            let Some(stem) = path
                .file_stem()
                .and_then(|stem| stem.to_str())
                .map(str::to_owned)
            else {
                continue;
            };
            let Some(name) = stem.strip_prefix(prefix).filter(|name| !name.is_empty()) else {
                continue;
            };
            found.entry(name.to_owned()).or_insert(path);
        }
    }
    found
}

/// A regular file with at least one execute bit set.
#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;

    fs::metadata(path)
        .map(|metadata| metadata.is_file() && metadata.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

fn candidate_names(base: &Path) -> Vec<PathBuf> {
    let mut names = vec![base.to_path_buf()];
    let suffix = env::consts::EXE_SUFFIX;
    if !suffix.is_empty() {
        let mut with_suffix = base.as_os_str().to_owned();
        with_suffix.push(suffix);
        names.push(PathBuf::from(with_suffix));
    }
    names
}
