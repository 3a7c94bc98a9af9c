use aes_gcm::aead::{Aead, OsRng};
use aes_gcm::{AeadCore, Aes256Gcm, Key, KeyInit, Nonce};
use sha2::{Digest, Sha256};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum KeyVaultError {
    #[error("credential encryption failed")]
    Encrypt,
    #[error("credential decryption failed")]
    Decrypt,
    #[error("decrypted credential is not valid UTF-8")]
    Encoding,
}

/// Process-wide symmetric key for provider credentials at rest.
///
/// Derived once at startup from the operator-supplied passphrase and held
/// as an AEAD cipher; the passphrase itself is not retained.
pub struct MasterKey {
    cipher: Aes256Gcm,
}

impl MasterKey {
    pub fn from_passphrase(passphrase: &str) -> Self {
        let digest = Sha256::digest(passphrase.as_bytes());
        let key = Key::<Aes256Gcm>::from_slice(&digest);
        Self {
            cipher: Aes256Gcm::new(key),
        }
    }

    fn seal(&self, plaintext: &[u8]) -> Result<SealedSecret, KeyVaultError> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext)
            .map_err(|_| KeyVaultError::Encrypt)?;
        Ok(SealedSecret {
            nonce: nonce.to_vec(),
            ciphertext,
        })
    }

    fn open(&self, sealed: &SealedSecret) -> Result<Vec<u8>, KeyVaultError> {
        let nonce = Nonce::from_slice(&sealed.nonce);
        self.cipher
            .decrypt(nonce, sealed.ciphertext.as_slice())
            .map_err(|_| KeyVaultError::Decrypt)
    }
}

/// AES-256-GCM sealed bytes with their nonce.
#[derive(Debug, Clone)]
struct SealedSecret {
    nonce: Vec<u8>,
    ciphertext: Vec<u8>,
}

#[derive(Debug, Clone, Copy)]
struct KeyState {
    last_used: Option<Instant>,
    error_count: u32,
    rate_limited_until: Option<Instant>,
}

/// One credential for one advisory provider.
///
/// The secret is sealed at construction and only decrypted at the call
/// site; callers must drop the plaintext at the end of the request span.
/// Usage bookkeeping is guarded by the key's own lock.
pub struct ProviderKey {
    sealed: SealedSecret,
    state: Mutex<KeyState>,
}

impl ProviderKey {
    pub fn seal_new(master: &MasterKey, plaintext: &str) -> Result<Self, KeyVaultError> {
        Ok(Self {
            sealed: master.seal(plaintext.as_bytes())?,
            state: Mutex::new(KeyState {
                last_used: None,
                error_count: 0,
                rate_limited_until: None,
            }),
        })
    }

    pub fn decrypt(&self, master: &MasterKey) -> Result<String, KeyVaultError> {
        let bytes = master.open(&self.sealed)?;
        String::from_utf8(bytes).map_err(|_| KeyVaultError::Encoding)
    }

    pub fn is_available(&self) -> bool {
        let state = self.state.lock().expect("key state lock poisoned");
        match state.rate_limited_until {
            Some(until) => Instant::now() >= until,
            None => true,
        }
    }

    pub fn mark_used(&self) {
        let mut state = self.state.lock().expect("key state lock poisoned");
        state.last_used = Some(Instant::now());
    }

    pub fn mark_rate_limited(&self, cooldown: Duration) {
        let mut state = self.state.lock().expect("key state lock poisoned");
        state.error_count += 1;
        state.rate_limited_until = Some(Instant::now() + cooldown);
    }

    pub fn error_count(&self) -> u32 {
        self.state.lock().expect("key state lock poisoned").error_count
    }

    pub fn last_used(&self) -> Option<Instant> {
        self.state.lock().expect("key state lock poisoned").last_used
    }
}
