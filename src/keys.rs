//! Key material providers.
//!
//! Services receive an `Arc<dyn KeyProvider>` at construction and ask it for
//! keys per operation. [`FileKeyProvider`] re-reads its PEM files every time;
//! wrap it in a [`CachedKeyProvider`] to read each file once.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use tracing::{debug, error};

use crate::config::KeysConfig;
use crate::errors::{LicenseError, LicenseResult};
use crate::signature::{PrivateKey, PublicKey};

/// Source of the signing keypair.
pub trait KeyProvider: Send + Sync {
    /// Key used by issuance to sign records.
    fn private_key(&self) -> LicenseResult<PrivateKey>;

    /// Key used by verification to check envelopes.
    fn public_key(&self) -> LicenseResult<PublicKey>;
}

/// Read a PKCS#8 PEM private key from `path`.
pub fn load_private_key(path: impl AsRef<Path>) -> LicenseResult<PrivateKey> {
    let path = path.as_ref();
    let pem = read_pem(path)?;
    PrivateKey::from_pem(&pem).map_err(|e| {
        error!("Failed to parse private key at {}: {e}", path.display());
        e
    })
}

/// Read a PKIX PEM public key from `path`.
pub fn load_public_key(path: impl AsRef<Path>) -> LicenseResult<PublicKey> {
    let path = path.as_ref();
    let pem = read_pem(path)?;
    PublicKey::from_pem(&pem).map_err(|e| {
        error!("Failed to parse public key at {}: {e}", path.display());
        e
    })
}

fn read_pem(path: &Path) -> LicenseResult<String> {
    debug!("Reading key material from {}", path.display());
    fs::read_to_string(path).map_err(|e| {
        error!("Failed to read key file {}: {e}", path.display());
        LicenseError::Key(format!("cannot read {}: {e}", path.display()))
    })
}

/// Loads keys from PEM files on every call.
#[derive(Debug, Clone)]
pub struct FileKeyProvider {
    private_key_path: Option<PathBuf>,
    public_key_path: PathBuf,
}

impl FileKeyProvider {
    pub fn new(private_key_path: impl Into<PathBuf>, public_key_path: impl Into<PathBuf>) -> Self {
        Self {
            private_key_path: Some(private_key_path.into()),
            public_key_path: public_key_path.into(),
        }
    }

    /// A provider that can only verify; `private_key()` always fails.
    pub fn verify_only(public_key_path: impl Into<PathBuf>) -> Self {
        Self {
            private_key_path: None,
            public_key_path: public_key_path.into(),
        }
    }

    pub fn from_config(config: &KeysConfig) -> Self {
        let private_key_path = Some(config.private_key_path.trim())
            .filter(|p| !p.is_empty())
            .map(PathBuf::from);

        Self {
            private_key_path,
            public_key_path: PathBuf::from(&config.public_key_path),
        }
    }
}

impl KeyProvider for FileKeyProvider {
    fn private_key(&self) -> LicenseResult<PrivateKey> {
        let path = self
            .private_key_path
            .as_ref()
            .ok_or_else(|| LicenseError::Key("no private key configured".to_string()))?;
        load_private_key(path)
    }

    fn public_key(&self) -> LicenseResult<PublicKey> {
        load_public_key(&self.public_key_path)
    }
}

/// Keys parsed once from in-memory PEM text.
#[derive(Debug, Clone)]
pub struct StaticKeyProvider {
    private_key: Option<PrivateKey>,
    public_key: PublicKey,
}

impl StaticKeyProvider {
    pub fn new(private_key: PrivateKey) -> Self {
        Self {
            public_key: private_key.public_key().clone(),
            private_key: Some(private_key),
        }
    }

    pub fn verify_only(public_key: PublicKey) -> Self {
        Self {
            private_key: None,
            public_key,
        }
    }

    /// Parse a PKCS#8 private key PEM; the public key is derived from it.
    pub fn from_private_pem(pem: &str) -> LicenseResult<Self> {
        Ok(Self::new(PrivateKey::from_pem(pem)?))
    }
}

impl KeyProvider for StaticKeyProvider {
    fn private_key(&self) -> LicenseResult<PrivateKey> {
        self.private_key
            .clone()
            .ok_or_else(|| LicenseError::Key("no private key configured".to_string()))
    }

    fn public_key(&self) -> LicenseResult<PublicKey> {
        Ok(self.public_key.clone())
    }
}

/// Memoizes the keys of an inner provider after the first successful load.
///
/// Failures are not cached, so a key file fixed on disk is picked up on the
/// next call.
pub struct CachedKeyProvider<P> {
    inner: P,
    private_key: OnceLock<PrivateKey>,
    public_key: OnceLock<PublicKey>,
}

impl<P: KeyProvider> CachedKeyProvider<P> {
    pub fn new(inner: P) -> Self {
        Self {
            inner,
            private_key: OnceLock::new(),
            public_key: OnceLock::new(),
        }
    }
}

impl<P: KeyProvider> KeyProvider for CachedKeyProvider<P> {
    fn private_key(&self) -> LicenseResult<PrivateKey> {
        if let Some(key) = self.private_key.get() {
            return Ok(key.clone());
        }
        let key = self.inner.private_key()?;
        Ok(self.private_key.get_or_init(|| key).clone())
    }

    fn public_key(&self) -> LicenseResult<PublicKey> {
        if let Some(key) = self.public_key.get() {
            return Ok(key.clone());
        }
        let key = self.inner.public_key()?;
        Ok(self.public_key.get_or_init(|| key).clone())
    }
}
