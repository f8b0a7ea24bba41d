//! Data directory layout.
//!
//! Everything tutorlab writes (the database, `config.toml`) lives under one
//! data directory.

use std::path::{Path, PathBuf};

use tutorlab_types::config::StoreConfig;

/// Resolve the data directory from environment or platform defaults.
///
/// Priority:
/// 1. `TUTORLAB_DATA_DIR` environment variable
/// 2. `~/.tutorlab`
pub fn resolve_data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("TUTORLAB_DATA_DIR") {
        return PathBuf::from(dir);
    }

    if let Some(home) = dirs::home_dir() {
        return home.join(".tutorlab");
    }

    // Last resort: current directory
    PathBuf::from(".tutorlab")
}

/// Database file for `config`. An absolute `database_file` is used as is.
pub fn database_path(data_dir: &Path, config: &StoreConfig) -> PathBuf {
    let file = Path::new(&config.database_file);
    if file.is_absolute() {
        file.to_path_buf()
    } else {
        data_dir.join(file)
    }
}

/// Create the data directory if it does not exist.
pub async fn ensure_data_dir(data_dir: &Path) -> Result<(), std::io::Error> {
    tokio::fs::create_dir_all(data_dir).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_database_path_relative_and_absolute() {
        let data_dir = PathBuf::from("/home/user/.tutorlab");
        let config = StoreConfig::default();
        assert_eq!(
            database_path(&data_dir, &config),
            PathBuf::from("/home/user/.tutorlab/tutorlab.db")
        );

        let config = StoreConfig {
            database_file: "/var/lib/tutorlab/study.db".to_string(),
            ..StoreConfig::default()
        };
        assert_eq!(
            database_path(&data_dir, &config),
            PathBuf::from("/var/lib/tutorlab/study.db")
        );
    }

    #[tokio::test]
    async fn test_ensure_data_dir_creates_nested() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a").join("b");
        ensure_data_dir(&nested).await.unwrap();
        assert!(nested.is_dir());
    }

    #[test]
    fn test_resolve_data_dir_from_env() {
        // SAFETY: This test is single-threaded and restores the env var immediately.
        unsafe {
            std::env::set_var("TUTORLAB_DATA_DIR", "/tmp/test-tutorlab");
        }
        let dir = resolve_data_dir();
        assert_eq!(dir, PathBuf::from("/tmp/test-tutorlab"));
        unsafe {
            std::env::remove_var("TUTORLAB_DATA_DIR");
        }
    }
}
