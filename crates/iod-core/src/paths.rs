//! Well-known locations: key files, archives, the installer cache.

use dirs::home_dir;
use std::path::{Component, Path, PathBuf};

use iod_schema::ARCHIVE_EXTENSION;

/// Default private key location, relative to the user's home directory.
pub const DEFAULT_KEY_FILE: &str = ".gpii/iod-package-key";

/// Returns the default private key path (`~/.gpii/iod-package-key`).
///
/// Falls back to a path relative to the working directory when the home
/// directory cannot be resolved.
pub fn default_key_path() -> PathBuf {
    home_dir().map_or_else(|| PathBuf::from(DEFAULT_KEY_FILE), |h| h.join(DEFAULT_KEY_FILE))
}

/// Public key path paired with a private key: the same path plus `.pub`.
pub fn public_key_path_for(key: &Path) -> PathBuf {
    let mut path = key.as_os_str().to_owned();
    path.push(".pub");
    PathBuf::from(path)
}

/// Make a path absolute against the current working directory.
///
/// Paths that are already absolute are returned as-is. If the working
/// directory cannot be read the path is returned unchanged.
pub fn absolute(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}

/// Swap a `.json` / `.json5` extension if the requested file is missing.
///
/// Returns `path` when it exists. Otherwise, if the sibling with the other
/// extension exists, returns that. If neither exists the original path is
/// returned unchanged so the caller can report it.
///
/// # Example
///
/// ```no_run
/// use iod_core::correct_json_file;
/// use std::path::Path;
///
/// // with only `build.json5` on disk:
/// let found = correct_json_file(Path::new("pkg/build.json"));
/// assert_eq!(found, Path::new("pkg/build.json5"));
/// ```
pub fn correct_json_file(path: &Path) -> PathBuf {
    if path.exists() {
        return path.to_path_buf();
    }

    let raw = path.to_string_lossy();
    let swapped = if let Some(stem) = raw.strip_suffix(".json5") {
        Some(format!("{stem}.json"))
    } else if raw.ends_with(".json") {
        Some(format!("{raw}5"))
    } else {
        None
    };

    match swapped.map(PathBuf::from) {
        Some(candidate) if candidate.exists() => candidate,
        _ => path.to_path_buf(),
    }
}

/// Returns the first of `candidates` that exists.
pub fn find_file<I, P>(candidates: I) -> Option<PathBuf>
where
    I: IntoIterator<Item = P>,
    P: AsRef<Path>,
{
    candidates
        .into_iter()
        .map(|p| p.as_ref().to_path_buf())
        .find(|p| p.exists())
}

/// Archive file name for a package: `<name>.morphic-package`.
pub fn archive_file_name(name: &str) -> String {
    format!("{name}.{ARCHIVE_EXTENSION}")
}

/// Destination of a package archive: `output / category? / <name>.morphic-package`.
pub fn archive_output_path(output_dir: &Path, category: Option<&str>, name: &str) -> PathBuf {
    let dir = match category {
        Some(category) => output_dir.join(category),
        None => output_dir.to_path_buf(),
    };
    dir.join(archive_file_name(name))
}

/// Download cache location for a package's installer: `downloads / <name>-installer`.
pub fn installer_cache_path(downloads_dir: &Path, name: &str) -> PathBuf {
    downloads_dir.join(format!("{name}-installer"))
}

/// Express `path` relative to `base` with `/` separators, for portable
/// paths stored in the index.
///
/// Returns `None` if `path` is not below `base`.
pub fn relative_slash_path(path: &Path, base: &Path) -> Option<String> {
    let relative = path.strip_prefix(base).ok()?;
    let parts: Vec<String> = relative
        .components()
        .map(|c| match c {
            Component::Normal(part) => part.to_string_lossy().into_owned(),
            Component::ParentDir => "..".to_string(),
            other => other.as_os_str().to_string_lossy().into_owned(),
        })
        .collect();
    Some(parts.join("/"))
}

/// Whether a path string should be taken literally rather than as a
/// package name under the source directory.
pub fn looks_like_path(entry: &str) -> bool {
    entry.contains('/') || entry.contains(std::path::MAIN_SEPARATOR)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn json5_sibling_is_used_when_json_missing() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("foo.json5"), "{}").unwrap();

        let found = correct_json_file(&dir.path().join("foo.json"));
        assert_eq!(found, dir.path().join("foo.json5"));
    }

    #[test]
    fn json_sibling_is_used_when_json5_missing() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("foo.json"), "{}").unwrap();

        let found = correct_json_file(&dir.path().join("foo.json5"));
        assert_eq!(found, dir.path().join("foo.json"));
    }

    #[test]
    fn requested_file_wins_when_both_exist() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("foo.json"), "{}").unwrap();
        fs::write(dir.path().join("foo.json5"), "{}").unwrap();

        assert_eq!(
            correct_json_file(&dir.path().join("foo.json")),
            dir.path().join("foo.json")
        );
        assert_eq!(
            correct_json_file(&dir.path().join("foo.json5")),
            dir.path().join("foo.json5")
        );
    }

    #[test]
    fn missing_file_is_returned_unchanged() {
        let dir = TempDir::new().unwrap();
        let wanted = dir.path().join("foo.json");
        assert_eq!(correct_json_file(&wanted), wanted);

        let other = dir.path().join("foo.txt");
        assert_eq!(correct_json_file(&other), other);
    }

    #[test]
    fn find_file_returns_first_existing() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("b"), "").unwrap();
        fs::write(dir.path().join("c"), "").unwrap();

        let found = find_file([dir.path().join("a"), dir.path().join("b"), dir.path().join("c")]);
        assert_eq!(found, Some(dir.path().join("b")));
        assert_eq!(find_file([dir.path().join("z")]), None);
    }

    #[test]
    fn output_path_is_deterministic() {
        let out = Path::new("/out");
        assert_eq!(
            archive_output_path(out, Some("readers"), "nvda"),
            PathBuf::from("/out/readers/nvda.morphic-package")
        );
        assert_eq!(
            archive_output_path(out, None, "nvda"),
            PathBuf::from("/out/nvda.morphic-package")
        );
    }

    #[test]
    fn pubkey_and_cache_paths() {
        assert_eq!(
            public_key_path_for(Path::new("/k/iod-package-key")),
            PathBuf::from("/k/iod-package-key.pub")
        );
        assert_eq!(
            installer_cache_path(Path::new("/cache"), "nvda.2019"),
            PathBuf::from("/cache/nvda.2019-installer")
        );
    }

    #[test]
    fn relative_paths_use_forward_slashes() {
        let out = Path::new("/out");
        assert_eq!(
            relative_slash_path(&out.join("readers").join("nvda.morphic-package"), out),
            Some("readers/nvda.morphic-package".to_string())
        );
        assert_eq!(relative_slash_path(Path::new("/elsewhere/x"), out), None);
    }
}
