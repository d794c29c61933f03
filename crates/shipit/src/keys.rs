//! Key provisioning at startup.
//!
//! # Sources, in order
//!
//! 1. `CIPHER_KEY` + `HMAC_KEY` from the environment.
//! 2. The JSON key file named by `KEY_FILE`.
//! 3. A freshly generated pair, written to `KEY_FILE` before it is used.
//!
//! Invalid key material aborts startup; the server never binds with keys it
//! could not validate. Key bytes are never logged.

use std::{fs, io::Write, path::Path};

use anyhow::{Context, Result};
use common::KeyMaterial;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::Config;

/// On-disk form of the key pair.
#[derive(Serialize, Deserialize)]
struct KeyFile {
    cipher_key: String,
    hmac_key: String,
}

/// Resolve the process-wide [`KeyMaterial`] from configuration.
///
/// # Errors
///
/// Returns an error if configured keys are invalid, if the key file cannot be
/// parsed, or if a generated pair cannot be persisted.
pub fn provision(cfg: &Config) -> Result<KeyMaterial> {
    if let (Some(cipher_key), Some(hmac_key)) = (&cfg.cipher_key, &cfg.hmac_key) {
        let keys = KeyMaterial::load(cipher_key, hmac_key)
            .context("CIPHER_KEY / HMAC_KEY are invalid")?;
        info!(source = "environment", "key material loaded");
        return Ok(keys);
    }

    let path = Path::new(&cfg.key_file);
    if path.exists() {
        let keys = load_file(path)?;
        info!(source = "key_file", path = %path.display(), "key material loaded");
        return Ok(keys);
    }

    let keys = KeyMaterial::generate();
    persist(path, &keys)?;
    warn!(path = %path.display(), "no key material configured; generated and saved a new pair");
    Ok(keys)
}

fn load_file(path: &Path) -> Result<KeyMaterial> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read key file {}", path.display()))?;
    let file: KeyFile = serde_json::from_str(&raw)
        .with_context(|| format!("key file {} is not valid JSON", path.display()))?;
    KeyMaterial::load(&file.cipher_key, &file.hmac_key)
        .with_context(|| format!("key file {} holds invalid keys", path.display()))
}

fn persist(path: &Path, keys: &KeyMaterial) -> Result<()> {
    let file = KeyFile {
        cipher_key: keys.cipher_key_b64(),
        hmac_key: keys.mac_key_b64(),
    };
    let json = serde_json::to_string_pretty(&file).context("failed to encode key file")?;

    let mut options = fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut out = options
        .open(path)
        .with_context(|| format!("failed to create key file {}", path.display()))?;
    out.write_all(json.as_bytes())
        .and_then(|()| out.sync_all())
        .with_context(|| format!("failed to write key file {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::tests::test_config;
    use common::envelope::{open_str, seal};

    fn config_in(dir: &tempfile::TempDir) -> Config {
        let mut cfg = test_config();
        cfg.key_file = dir.path().join("keys.json").to_string_lossy().into_owned();
        cfg
    }

    #[test]
    fn environment_keys_take_precedence() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = config_in(&dir);
        cfg.cipher_key = Some("AAECAwQFBgcICQoLDA0ODw==".into());
        cfg.hmac_key = Some("EBESExQVFhcYGRobHB0eHw==".into());

        let keys = provision(&cfg).unwrap();
        assert_eq!(keys.cipher_key_b64(), "AAECAwQFBgcICQoLDA0ODw==");
        assert!(!Path::new(&cfg.key_file).exists());
    }

    #[test]
    fn invalid_environment_keys_are_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = config_in(&dir);
        cfg.cipher_key = Some("AAEC".into());
        cfg.hmac_key = Some("EBESExQVFhcYGRobHB0eHw==".into());
        assert!(provision(&cfg).is_err());
    }

    #[test]
    fn generated_keys_are_persisted_and_reloaded() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config_in(&dir);

        let first = provision(&cfg).unwrap();
        assert!(Path::new(&cfg.key_file).exists());

        let second = provision(&cfg).unwrap();
        assert_eq!(first.cipher_key_b64(), second.cipher_key_b64());
        assert_eq!(first.mac_key_b64(), second.mac_key_b64());

        let wire = seal(b"hello", &first).unwrap();
        assert_eq!(open_str(&wire, &second).unwrap(), "hello");
    }

    #[cfg(unix)]
    #[test]
    fn generated_key_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let cfg = config_in(&dir);
        provision(&cfg).unwrap();
        let mode = fs::metadata(&cfg.key_file).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn corrupt_key_file_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config_in(&dir);
        fs::write(&cfg.key_file, "{not json").unwrap();
        assert!(provision(&cfg).is_err());
    }

    #[test]
    fn key_file_with_short_key_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config_in(&dir);
        fs::write(
            &cfg.key_file,
            r#"{"cipher_key":"AAECAwQFBgc=","hmac_key":"EBESExQVFhcYGRobHB0eHw=="}"#,
        )
        .unwrap();
        assert!(provision(&cfg).is_err());
    }
}
