// Filesystem lookup for the CLI engine binary and model weight files
// Pure: reads metadata, never creates or modifies anything.

use std::path::{Path, PathBuf};

/// Suffixes treated as executable regardless of permission bits
const EXECUTABLE_SUFFIXES: &[&str] = &["exe", "bat", "cmd", "com"];

pub struct ExecutableLocator;

impl ExecutableLocator {
    /// First candidate that exists and is executable (permission bit or platform suffix)
    pub fn find_executable<P: AsRef<Path>>(candidates: &[P]) -> Option<PathBuf> {
        log::debug!("Searching for inference engine in {} paths", candidates.len());

        for candidate in candidates {
            let path = candidate.as_ref();
            if !path.is_file() {
                log::debug!("Engine not found: {}", path.display());
                continue;
            }
            if is_executable(path) || has_executable_suffix(path) {
                log::info!("Found inference engine at: {}", path.display());
                return Some(absolute(path));
            }
            log::debug!("File exists but is not executable: {}", path.display());
        }

        log::warn!("Inference engine executable not found in any of the configured paths");
        None
    }

    /// First candidate file with the expected extension.
    ///
    /// A candidate directory is searched (non-recursively) and its first matching
    /// file in name order is taken.
    pub fn find_model_file<P: AsRef<Path>>(candidates: &[P], extension: &str) -> Option<PathBuf> {
        for candidate in candidates {
            let path = candidate.as_ref();

            if path.is_file() {
                if matches_extension(path, extension) {
                    log::info!("Found model at: {}", path.display());
                    return Some(absolute(path));
                }
                log::debug!("Skipping {} (expected .{})", path.display(), extension);
                continue;
            }

            if path.is_dir() {
                if let Some(found) = first_in_dir(path, extension) {
                    log::info!("Found model in {}: {}", path.display(), found.display());
                    return Some(absolute(&found));
                }
            }
        }

        log::warn!("No .{} model found. Checked locations:", extension);
        for candidate in candidates {
            log::warn!("  - {}", candidate.as_ref().display());
        }
        None
    }
}

fn first_in_dir(dir: &Path, extension: &str) -> Option<PathBuf> {
    let entries = std::fs::read_dir(dir).ok()?;
    let mut matches: Vec<PathBuf> = entries
        .flatten()
        .map(|entry| entry.path())
        .filter(|p| p.is_file() && matches_extension(p, extension))
        .collect();
    matches.sort();
    matches.into_iter().next()
}

fn matches_extension(path: &Path, extension: &str) -> bool {
    if extension.is_empty() {
        return true;
    }
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case(extension.trim_start_matches('.')))
        .unwrap_or(false)
}

fn has_executable_suffix(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| EXECUTABLE_SUFFIXES.iter().any(|s| e.eq_ignore_ascii_case(s)))
        .unwrap_or(false)
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path)
        .map(|m| m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(_path: &Path) -> bool {
    false
}

fn absolute(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_missing_candidates_return_none() {
        let dir = tempfile::tempdir().unwrap();
        let candidates = vec![dir.path().join("nope"), dir.path().join("still-nope")];
        assert!(ExecutableLocator::find_executable(&candidates).is_none());
        assert!(ExecutableLocator::find_model_file(&candidates, "gguf").is_none());
    }

    #[test]
    fn test_exe_suffix_counts_as_executable() {
        let dir = tempfile::tempdir().unwrap();
        let exe = dir.path().join("llama-cli.exe");
        fs::write(&exe, b"MZ").unwrap();

        let found = ExecutableLocator::find_executable(&[exe.clone()]).unwrap();
        assert_eq!(found, fs::canonicalize(&exe).unwrap());
    }

    #[cfg(unix)]
    #[test]
    fn test_first_executable_wins_and_plain_files_are_skipped() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let plain = dir.path().join("llama-cli-plain");
        let first = dir.path().join("llama-cli-a");
        let second = dir.path().join("llama-cli-b");
        for p in [&plain, &first, &second] {
            fs::write(p, b"#!/bin/sh\n").unwrap();
        }
        for p in [&first, &second] {
            fs::set_permissions(p, fs::Permissions::from_mode(0o755)).unwrap();
        }

        let found = ExecutableLocator::find_executable(&[plain, first.clone(), second]).unwrap();
        assert_eq!(found, fs::canonicalize(&first).unwrap());
    }

    #[test]
    fn test_model_extension_is_enforced() {
        let dir = tempfile::tempdir().unwrap();
        let wrong = dir.path().join("model.bin");
        let right = dir.path().join("phi-3-mini-4k-instruct-q4.GGUF");
        fs::write(&wrong, b"x").unwrap();
        fs::write(&right, b"x").unwrap();

        let found = ExecutableLocator::find_model_file(&[wrong, right.clone()], "gguf").unwrap();
        assert_eq!(found, fs::canonicalize(&right).unwrap());
    }

    #[test]
    fn test_directory_candidate_takes_first_match_by_name() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("b-model.gguf"), b"x").unwrap();
        fs::write(dir.path().join("a-model.gguf"), b"x").unwrap();
        fs::write(dir.path().join("notes.txt"), b"x").unwrap();

        let found = ExecutableLocator::find_model_file(&[dir.path()], "gguf").unwrap();
        assert_eq!(found.file_name().unwrap(), "a-model.gguf");
    }
}
