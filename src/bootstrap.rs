//! Bootstrap helpers for embedgate.
//!
//! Env vars can be persisted to `~/.embedgate/.env` so that library URLs and
//! dashboard ids survive across runs without a config file.

use std::path::PathBuf;

/// Path to the embedgate-specific `.env` file: `~/.embedgate/.env`.
pub fn embedgate_env_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".embedgate")
        .join(".env")
}

/// Load env vars from `./.env` and then `~/.embedgate/.env`.
///
/// dotenvy never overwrites existing vars, so the effective priority is:
///
///   explicit env vars > `./.env` > `~/.embedgate/.env`
pub fn load_embedgate_env() {
    let _ = dotenvy::dotenv();

    let path = embedgate_env_path();
    if path.exists()
        && let Err(e) = dotenvy::from_path(&path)
    {
        tracing::warn!("Failed to load {}: {}", path.display(), e);
    }
}

/// Write bootstrap vars to `~/.embedgate/.env`.
///
/// Values are double-quoted so that `#` and other shell-special characters
/// are preserved by dotenvy.
pub fn save_bootstrap_env(vars: &[(&str, &str)]) -> std::io::Result<()> {
    save_bootstrap_env_to(&embedgate_env_path(), vars)
}

fn save_bootstrap_env_to(path: &std::path::Path, vars: &[(&str, &str)]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut content = String::new();
    for (key, value) in vars {
        // Escape backslashes and double quotes to prevent env var injection
        let escaped = value.replace('\\', "\\\\").replace('"', "\\\"");
        content.push_str(&format!("{}=\"{}\"\n", key, escaped));
    }
    std::fs::write(path, content)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_path_under_embedgate_dir() {
        let path = embedgate_env_path();
        assert!(path.ends_with(".embedgate/.env"));
    }

    #[test]
    fn saved_values_are_quoted_and_escaped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sub").join(".env");

        save_bootstrap_env_to(
            &path,
            &[
                ("EMBEDGATE_LIBRARY_URL", "https://lib.example.com/Library"),
                ("EMBEDGATE_OBJECT_ID", "pa#ss\"word"),
            ],
        )
        .unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("EMBEDGATE_LIBRARY_URL=\"https://lib.example.com/Library\"\n"));
        assert!(content.contains("EMBEDGATE_OBJECT_ID=\"pa#ss\\\"word\"\n"));

        let parsed: Vec<(String, String)> = dotenvy::from_path_iter(&path)
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[1].1, "pa#ss\"word");
    }
}
