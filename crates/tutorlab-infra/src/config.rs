//! Configuration loader for tutorlab.
//!
//! Reads `config.toml` from the data directory (`~/.tutorlab/` in production)
//! and deserializes it into [`AppConfig`]. Falls back to defaults when the
//! file is missing or malformed. Secrets never live in the file: the config
//! names the environment variables that hold them.

use std::path::{Path, PathBuf};

use secrecy::SecretString;
use tutorlab_types::config::AppConfig;

/// Default config file location inside a data directory.
pub fn config_path(data_dir: &Path) -> PathBuf {
    data_dir.join("config.toml")
}

/// Load configuration from `{data_dir}/config.toml`.
pub async fn load_app_config(data_dir: &Path) -> AppConfig {
    load_app_config_from(&config_path(data_dir)).await
}

/// Load configuration from an explicit path.
///
/// - If the file does not exist, returns [`AppConfig::default()`].
/// - If the file exists but fails to parse, logs a warning and returns the default.
pub async fn load_app_config_from(path: &Path) -> AppConfig {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No config found at {}, using defaults", path.display());
            return AppConfig::default();
        }
        Err(err) => {
            tracing::warn!("Failed to read {}: {err}, using defaults", path.display());
            return AppConfig::default();
        }
    };

    match toml::from_str::<AppConfig>(&content) {
        Ok(config) => config,
        Err(err) => {
            tracing::warn!("Failed to parse {}: {err}, using defaults", path.display());
            AppConfig::default()
        }
    }
}

/// Read a secret from the named environment variable.
///
/// Unset and blank values both count as absent.
pub fn secret_from_env(var: &str) -> Option<SecretString> {
    match std::env::var(var) {
        Ok(value) if !value.trim().is_empty() => Some(SecretString::from(value.trim().to_string())),
        _ => None,
    }
}

/// Upstream API key named by `upstream.api_key_env`.
pub fn upstream_api_key(config: &AppConfig) -> Option<SecretString> {
    let key = secret_from_env(&config.upstream.api_key_env);
    if key.is_none() {
        tracing::warn!(
            var = %config.upstream.api_key_env,
            "upstream API key is not set; chat requests will fail"
        );
    }
    key
}

/// Admin password named by `auth.admin_password_env`.
pub fn admin_password(config: &AppConfig) -> Option<SecretString> {
    secret_from_env(&config.auth.admin_password_env)
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;
    use tempfile::TempDir;

    #[tokio::test]
    async fn load_app_config_missing_file_returns_default() {
        let tmp = TempDir::new().unwrap();
        let config = load_app_config(tmp.path()).await;
        assert_eq!(config.server.port, 3000);
        assert!(config.users.is_empty());
    }

    #[tokio::test]
    async fn load_app_config_valid_toml_returns_parsed() {
        let tmp = TempDir::new().unwrap();
        tokio::fs::write(
            config_path(tmp.path()),
            r#"
[server]
port = 8088

[upstream]
model = "deepseek-reasoner"

[[users]]
student_id = "group3_user7"
group = "3"
"#,
        )
        .await
        .unwrap();

        let config = load_app_config(tmp.path()).await;
        assert_eq!(config.server.port, 8088);
        assert_eq!(config.upstream.model, "deepseek-reasoner");
        assert_eq!(config.users.len(), 1);
        assert_eq!(config.users[0].student_id, "group3_user7");
    }

    #[tokio::test]
    async fn load_app_config_invalid_toml_returns_default() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("custom.toml");
        tokio::fs::write(&path, "this is not [valid toml {{{").await.unwrap();

        let config = load_app_config_from(&path).await;
        assert_eq!(config.server.port, 3000);
    }

    #[test]
    fn secret_from_env_trims_and_ignores_blank() {
        // SAFETY: These variables are unique to this test.
        unsafe {
            std::env::set_var("TUTORLAB_TEST_SECRET_SET", "  sk-abc \n");
            std::env::set_var("TUTORLAB_TEST_SECRET_BLANK", "   ");
        }
        let secret = secret_from_env("TUTORLAB_TEST_SECRET_SET").unwrap();
        assert_eq!(secret.expose_secret(), "sk-abc");
        assert!(secret_from_env("TUTORLAB_TEST_SECRET_BLANK").is_none());
        assert!(secret_from_env("TUTORLAB_TEST_SECRET_UNSET").is_none());
        unsafe {
            std::env::remove_var("TUTORLAB_TEST_SECRET_SET");
            std::env::remove_var("TUTORLAB_TEST_SECRET_BLANK");
        }
    }
}
