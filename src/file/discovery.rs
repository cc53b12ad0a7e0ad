use std::path::{Path, PathBuf};

use fast_glob::glob_match;
use walkdir::{DirEntry, WalkDir};

use crate::config::STDIN_PATH;

/// Expands the inputs named on the command line into a flat list of files.
///
/// Directories are walked recursively in name order, skipping dotfiles and
/// dot-directories below them. Anything else is passed through untouched,
/// including `-` and paths that do not exist: those are reported by the
/// worker that fails to open them.
pub fn expand_inputs(inputs: &[PathBuf], exclude: &[String]) -> Vec<PathBuf> {
    let mut files = Vec::new();

    for input in inputs {
        if input.as_os_str() != STDIN_PATH && input.is_dir() {
            let walker = WalkDir::new(input).sort_by_file_name().into_iter().filter_entry(|entry| entry.depth() == 0 || !is_hidden(entry));

            files.extend(walker.filter_map(Result::ok).filter(|entry| entry.file_type().is_file()).map(DirEntry::into_path));
        } else {
            files.push(input.clone());
        }
    }

    files.retain(|path| !is_excluded(path, exclude));
    files
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry.file_name().to_string_lossy().starts_with('.')
}

/// Matches `path` against the exclusion globs, whole path or any component.
pub fn is_excluded(path: &Path, patterns: &[String]) -> bool {
    if patterns.is_empty() || path.as_os_str() == STDIN_PATH {
        return false;
    }

    let path_str = path.to_string_lossy().replace('\\', "/");
    let path_str = path_str.strip_prefix("./").unwrap_or(&path_str);

    patterns.iter().any(|pattern| glob_match(pattern, path_str) || path.components().any(|comp| glob_match(pattern, comp.as_os_str().to_str().unwrap_or(""))))
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::tempdir;

    use super::*;

    #[test]
    fn test_directories_are_walked_without_dotfiles() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("nested")).unwrap();
        fs::create_dir_all(dir.path().join(".git")).unwrap();
        fs::write(dir.path().join("b.bin"), b"b").unwrap();
        fs::write(dir.path().join("a.bin"), b"a").unwrap();
        fs::write(dir.path().join(".hidden"), b"h").unwrap();
        fs::write(dir.path().join("nested/c.bin"), b"c").unwrap();
        fs::write(dir.path().join(".git/config"), b"g").unwrap();

        let files = expand_inputs(&[dir.path().to_path_buf()], &[]);
        let names: Vec<String> = files.iter().map(|p| p.strip_prefix(dir.path()).unwrap().to_string_lossy().replace('\\', "/")).collect();

        assert_eq!(names, vec!["a.bin", "b.bin", "nested/c.bin"]);
    }

    #[test]
    fn test_plain_inputs_pass_through() {
        let inputs = vec![PathBuf::from(STDIN_PATH), PathBuf::from("/nonexistent/file.bin")];
        assert_eq!(expand_inputs(&inputs, &[]), inputs);
    }

    #[test]
    fn test_exclusion_patterns() {
        let patterns = vec!["*.log".to_owned(), "target".to_owned()];

        assert!(is_excluded(Path::new("run.log"), &patterns));
        assert!(is_excluded(Path::new("./target/debug/app"), &patterns));
        assert!(!is_excluded(Path::new("data/blocks.bin"), &patterns));
        assert!(!is_excluded(Path::new(STDIN_PATH), &patterns));
    }

    #[test]
    fn test_excluded_files_are_dropped() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("keep.bin"), b"k").unwrap();
        fs::write(dir.path().join("drop.log"), b"d").unwrap();

        let files = expand_inputs(&[dir.path().to_path_buf()], &["*.log".to_owned()]);

        assert_eq!(files.len(), 1);
        assert!(files[0].ends_with("keep.bin"));
    }
}
