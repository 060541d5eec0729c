//! Seed list parsing.
//!
//! One artifact name per line. Surrounding whitespace is trimmed, blank lines
//! and `#` comments are skipped. Order is preserved; duplicates are kept and
//! left to the walker's visited set.

use std::path::Path;

use thiserror::Error;

/// The seed file could not be read.
#[derive(Debug, Error)]
#[error("cannot read seed list {path}: {source}")]
pub struct SeedError {
    pub path: std::path::PathBuf,
    #[source]
    pub source: std::io::Error,
}

/// Parses seed names from text.
#[must_use]
pub fn parse_seeds(input: &str) -> Vec<String> {
    input
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}

/// Reads and parses a seed file.
///
/// # Errors
///
/// Returns [`SeedError`] if the file cannot be read.
pub async fn load_seeds(path: &Path) -> Result<Vec<String>, SeedError> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| SeedError {
            path: path.to_path_buf(),
            source,
        })?;
    Ok(parse_seeds(&raw))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_seeds_trims_and_skips_blank_lines() {
        let seeds = parse_seeds("  left-pad  \n\n\t\nreact\r\n");
        assert_eq!(seeds, ["left-pad", "react"]);
    }

    #[test]
    fn test_parse_seeds_skips_comments() {
        let seeds = parse_seeds("# core\nleft-pad\n  # later\n@types/node\n");
        assert_eq!(seeds, ["left-pad", "@types/node"]);
    }

    #[test]
    fn test_parse_seeds_keeps_order_and_duplicates() {
        assert_eq!(parse_seeds("b\na\nb"), ["b", "a", "b"]);
        assert!(parse_seeds("").is_empty());
    }

    #[tokio::test]
    async fn test_load_seeds_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("npm.txt");
        tokio::fs::write(&path, "left-pad\n").await.unwrap();

        assert_eq!(load_seeds(&path).await.unwrap(), ["left-pad"]);
    }

    #[test]
    fn test_load_seeds_missing_file_names_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.txt");

        let err = tokio_test::block_on(load_seeds(&path)).unwrap_err();

        assert_eq!(err.path, path);
        assert!(err.to_string().contains("missing.txt"));
    }
}
