use anyhow::{Context, Result};
use directories::ProjectDirs;
use std::path::{Path, PathBuf};

pub const DEFAULT_REMOTE_URL: &str = "http://127.0.0.1:8080";

pub struct Config {
    pub data_dir: PathBuf,
    /// Local records for every identity on this device.
    pub db_path: PathBuf,
    /// Documents held by `tdee serve`.
    pub server_db_path: PathBuf,
    pub session_path: PathBuf,
    pub remote_url: String,
    /// Key sent to the remote server, if any.
    pub remote_api_key: Option<String>,
}

impl Config {
    /// Resolve paths and remote settings. `TDEE_DATA_DIR`, `TDEE_REMOTE_URL`
    /// and `TDEE_API_KEY` override the defaults.
    pub fn load() -> Result<Self> {
        let data_dir = match std::env::var_os("TDEE_DATA_DIR") {
            Some(dir) => PathBuf::from(dir),
            None => ProjectDirs::from("", "", "tdee")
                .context("Could not determine home directory")?
                .data_dir()
                .to_path_buf(),
        };
        let remote_url = std::env::var("TDEE_REMOTE_URL")
            .ok()
            .filter(|u| !u.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_REMOTE_URL.to_string());
        let api_key = std::env::var("TDEE_API_KEY").ok();
        Self::in_dir(&data_dir, remote_url, api_key)
    }

    pub fn in_dir(data_dir: &Path, remote_url: String, api_key: Option<String>) -> Result<Self> {
        std::fs::create_dir_all(data_dir)
            .with_context(|| format!("Failed to create data directory: {}", data_dir.display()))?;

        // Fall back to the key `tdee serve` generated on this machine
        let remote_api_key = api_key
            .filter(|k| !k.trim().is_empty())
            .or_else(|| read_key(&data_dir.join("api_key")));

        Ok(Config {
            db_path: data_dir.join("tdee.db"),
            server_db_path: data_dir.join("server.db"),
            session_path: data_dir.join("session.json"),
            data_dir: data_dir.to_path_buf(),
            remote_url: remote_url.trim_end_matches('/').to_string(),
            remote_api_key,
        })
    }

    /// Load the API key from disk, or generate a new one.
    ///
    /// Returns `(key, newly_created)` where `newly_created` is true when a
    /// fresh key was just generated (first run). Telling the user is left to
    /// the caller.
    pub fn load_or_create_api_key(&self) -> Result<(String, bool)> {
        use rand::Rng;
        use std::fmt::Write;

        let path = self.data_dir.join("api_key");
        if let Some(key) = read_key(&path) {
            return Ok((key, false));
        }

        let bytes: [u8; 32] = rand::rng().random();
        let key = bytes
            .iter()
            .fold(String::with_capacity(64), |mut acc: String, b| {
                let _ = write!(acc, "{b:02x}");
                acc
            });
        std::fs::write(&path, &key).context("Failed to write API key file")?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600))
                .context("Failed to set API key file permissions")?;
        }
        tracing::info!(path = %path.display(), "generated new API key");
        Ok((key, true))
    }
}

fn read_key(path: &Path) -> Option<String> {
    let key = std::fs::read_to_string(path).ok()?;
    let key = key.trim();
    (!key.is_empty()).then(|| key.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_dir_layout() {
        let dir = tempfile::tempdir().unwrap();
        let config =
            Config::in_dir(dir.path(), "http://host:9000/".to_string(), None).unwrap();
        assert_eq!(config.db_path, dir.path().join("tdee.db"));
        assert_eq!(config.server_db_path, dir.path().join("server.db"));
        assert_eq!(config.session_path, dir.path().join("session.json"));
        assert_eq!(config.remote_url, "http://host:9000");
        assert!(config.remote_api_key.is_none());
    }

    #[test]
    fn test_api_key_generated_once() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::in_dir(dir.path(), DEFAULT_REMOTE_URL.to_string(), None).unwrap();

        let (first, created) = config.load_or_create_api_key().unwrap();
        assert!(created);
        assert_eq!(first.len(), 64);
        assert!(first.chars().all(|c| c.is_ascii_hexdigit()));

        let (second, created) = config.load_or_create_api_key().unwrap();
        assert!(!created);
        assert_eq!(first, second);

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(dir.path().join("api_key"))
                .unwrap()
                .permissions()
                .mode();
            assert_eq!(mode & 0o777, 0o600);
        }
    }

    #[test]
    fn test_remote_key_prefers_explicit_then_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("api_key"), "from-file\n").unwrap();

        let config = Config::in_dir(dir.path(), DEFAULT_REMOTE_URL.to_string(), None).unwrap();
        assert_eq!(config.remote_api_key.as_deref(), Some("from-file"));

        let config = Config::in_dir(
            dir.path(),
            DEFAULT_REMOTE_URL.to_string(),
            Some("explicit".to_string()),
        )
        .unwrap();
        assert_eq!(config.remote_api_key.as_deref(), Some("explicit"));
    }
}
