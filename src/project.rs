use std::path::{Path, PathBuf};

use serde::Deserialize;

/// The subset of composer.json we care about: where binaries get installed.
#[derive(Debug, Default, Deserialize)]
struct ComposerManifest {
    #[serde(default)]
    config: ComposerConfig,
}

#[derive(Debug, Default, Deserialize)]
struct ComposerConfig {
    #[serde(rename = "vendor-dir")]
    vendor_dir: Option<String>,
    #[serde(rename = "bin-dir")]
    bin_dir: Option<String>,
}

/// Walk upward from `start` until a directory containing `vendor/` is found.
/// Falls back to `start` itself when no marker exists anywhere above it;
/// callers default `start` to the current working directory, so the
/// no-marker fallback is the cwd.
pub fn find_project_root(start: &Path) -> PathBuf {
    let mut current = start;
    loop {
        if current.join("vendor").is_dir() {
            return current.to_path_buf();
        }
        match current.parent() {
            Some(parent) => current = parent,
            None => return start.to_path_buf(),
        }
    }
}

/// Locate the phpunit executable for the project at `root`.
///
/// Reads the bin directory from composer.json (`config.bin-dir`, or
/// `config.vendor-dir` + `bin`); an absent, unreadable, or malformed
/// manifest falls back to the conventional `vendor/bin/phpunit`.
pub fn runner_binary(root: &Path) -> PathBuf {
    let manifest = std::fs::read_to_string(root.join("composer.json"))
        .ok()
        .and_then(|content| serde_json::from_str::<ComposerManifest>(&content).ok())
        .unwrap_or_default();

    let bin_dir = match (manifest.config.bin_dir, manifest.config.vendor_dir) {
        (Some(bin), _) => PathBuf::from(bin),
        (None, Some(vendor)) => PathBuf::from(vendor).join("bin"),
        (None, None) => PathBuf::from("vendor").join("bin"),
    };

    let bin_dir = if bin_dir.is_absolute() {
        bin_dir
    } else {
        root.join(bin_dir)
    };
    bin_dir.join("phpunit")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn root_walks_up_to_vendor_marker() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("project");
        std::fs::create_dir_all(root.join("vendor")).unwrap();
        let nested = root.join("src").join("Service");
        std::fs::create_dir_all(&nested).unwrap();

        assert_eq!(find_project_root(&nested), root);
    }

    #[test]
    fn root_falls_back_to_start_without_marker() {
        let dir = tempfile::tempdir().unwrap();
        let start = dir.path().join("lonely");
        std::fs::create_dir_all(&start).unwrap();

        assert_eq!(find_project_root(&start), start);
    }

    #[test]
    fn binary_from_bin_dir_override() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("composer.json"),
            r#"{"config": {"bin-dir": "tools"}}"#,
        )
        .unwrap();

        assert_eq!(
            runner_binary(dir.path()),
            dir.path().join("tools").join("phpunit")
        );
    }

    #[test]
    fn binary_from_vendor_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("composer.json"),
            r#"{"config": {"vendor-dir": "deps"}}"#,
        )
        .unwrap();

        assert_eq!(
            runner_binary(dir.path()),
            dir.path().join("deps").join("bin").join("phpunit")
        );
    }

    #[test]
    fn binary_falls_back_on_malformed_manifest() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("composer.json"), "{not json").unwrap();

        assert_eq!(
            runner_binary(dir.path()),
            dir.path().join("vendor").join("bin").join("phpunit")
        );
    }

    #[test]
    fn binary_falls_back_on_missing_manifest() {
        let dir = tempfile::tempdir().unwrap();

        assert_eq!(
            runner_binary(dir.path()),
            dir.path().join("vendor").join("bin").join("phpunit")
        );
    }
}
