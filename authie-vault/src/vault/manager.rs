//! VaultStore - the single owner of the token collection.
//!
//! This module provides the VaultStore struct that handles:
//! - Loading the collection at startup (plain or encrypted)
//! - Persisting the whole collection after every mutation
//! - Checking a candidate passcode without touching any state
//! - Re-keying under a new passcode, or dropping encryption entirely
//!
//! Mutating methods take `&mut self`, so a store shared between tasks has
//! to sit behind a lock and persistence cycles never overlap.

use std::sync::Arc;

use tracing::{debug, error, info, warn};
use zeroize::Zeroizing;

use crate::storage::{KeyValueStore, VaultSettings, SALT_KEY, TOKENS_KEY};
use crate::token::Token;
use crate::vault::auth::VaultStatus;
use crate::vault::entropy::{EntropySource, OsEntropy};
use crate::vault::error::{VaultError, VaultResult};
use crate::vault::kdf::{derive_key_async, KdfSettings};
use crate::vault::salt::{self, Salt};
use crate::vault::storage::{decode_plain, encode_plain, Envelope, VaultKey};

/// Holds the token collection in memory and mirrors it to storage.
///
/// Call [`VaultStore::init`] once before reading [`VaultStore::tokens`].
pub struct VaultStore {
    storage: Arc<dyn KeyValueStore>,
    entropy: Arc<dyn EntropySource>,
    kdf: KdfSettings,
    /// Source of truth for the collection, regardless of write outcomes
    tokens: Vec<Token>,
    /// The derived encryption key (only present when unlocked)
    key: Option<VaultKey>,
    /// The passcode entered this session
    passcode: Option<Zeroizing<String>>,
}

impl VaultStore {
    /// Create a store over `storage` using the configured KDF.
    pub fn new(storage: Arc<dyn KeyValueStore>, settings: &VaultSettings) -> Self {
        Self {
            storage,
            entropy: Arc::new(OsEntropy),
            kdf: settings.kdf,
            tokens: Vec::new(),
            key: None,
            passcode: None,
        }
    }

    /// Replace the randomness used for salts and IVs.
    pub fn with_entropy(mut self, entropy: Arc<dyn EntropySource>) -> Self {
        self.entropy = entropy;
        self
    }

    /// The in-memory collection, in display order.
    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    /// Whether this session holds a derived key.
    pub fn is_unlocked(&self) -> bool {
        self.key.is_some()
    }

    /// Whether a passcode was entered or set during this session.
    pub fn has_session_passcode(&self) -> bool {
        self.passcode.is_some()
    }

    /// Whether a passcode is configured (a salt is stored).
    pub async fn is_passcode_configured(&self) -> VaultResult<bool> {
        salt::has_salt(self.storage.as_ref()).await
    }

    /// Whether anything was ever persisted under the tokens key.
    pub async fn has_stored_tokens(&self) -> VaultResult<bool> {
        Ok(self.storage.get(TOKENS_KEY).await?.is_some())
    }

    pub async fn status(&self) -> VaultResult<VaultStatus> {
        let configured = self.is_passcode_configured().await?;
        Ok(VaultStatus::from_flags(configured, self.is_unlocked()))
    }

    // =========================================================================
    // Loading
    // =========================================================================

    /// Load the stored collection into memory.
    ///
    /// Never leaves a partial collection behind: on any parse or decrypt
    /// failure the collection is empty and the failure is logged. A key
    /// that fails to decrypt is dropped, leaving the vault locked. Only a
    /// failed storage read is returned as an error.
    pub async fn init(&mut self) -> VaultResult<()> {
        self.tokens.clear();

        let (raw, configured) = match self.read_stored().await {
            Ok(stored) => stored,
            Err(e) => {
                error!("Failed to read vault storage: {}", e);
                return Err(e);
            }
        };

        let Some(raw) = raw else {
            debug!("No stored tokens");
            return Ok(());
        };

        let mut decrypt_failed = false;
        self.tokens = match (configured, &self.key) {
            (true, Some(key)) => match Envelope::from_json(&raw).and_then(|env| env.open(key)) {
                Ok(tokens) => tokens,
                Err(e) => {
                    error!("Decryption failed: {}", e);
                    decrypt_failed = true;
                    Vec::new()
                }
            },
            (true, None) => {
                debug!("Vault is locked, skipping decryption");
                Vec::new()
            }
            (false, key) => {
                if key.is_some() {
                    warn!("Holding a key but no salt is stored, reading tokens as plaintext");
                }
                match decode_plain(&raw) {
                    Ok(tokens) => tokens,
                    Err(e) => {
                        error!("Failed to parse tokens: {}", e);
                        Vec::new()
                    }
                }
            }
        };

        if decrypt_failed {
            // The key does not open the stored data; stay locked so
            // nothing overwrites it
            self.key = None;
            self.passcode = None;
            return Ok(());
        }

        info!("Loaded {} tokens", self.tokens.len());
        Ok(())
    }

    async fn read_stored(&self) -> VaultResult<(Option<Zeroizing<String>>, bool)> {
        let raw = self.storage.get(TOKENS_KEY).await?.map(Zeroizing::new);
        let configured = self.is_passcode_configured().await?;
        Ok((raw, configured))
    }

    // =========================================================================
    // Passcode Operations
    // =========================================================================

    /// Establish the session key for a newly entered passcode.
    ///
    /// Derives against the stored salt, or creates and stores a new salt
    /// when none exists (in which case the collection is immediately
    /// re-persisted in encrypted form). Does not check the passcode; use
    /// [`VaultStore::verify_passcode`] or [`VaultStore::unlock`] for that.
    ///
    /// An empty passcode clears protection when unlocked and is refused
    /// while locked.
    pub async fn set_passcode(&mut self, passcode: &str) -> VaultResult<()> {
        if passcode.is_empty() {
            return match self.status().await? {
                VaultStatus::Unlocked => self.re_key("").await,
                VaultStatus::Locked => Err(VaultError::Locked),
                VaultStatus::Unconfigured => {
                    self.key = None;
                    self.passcode = None;
                    Ok(())
                }
            };
        }

        let (salt, created) = match salt::load_salt(self.storage.as_ref()).await? {
            Some(salt) => (salt, false),
            None => (Salt::generate(self.entropy.as_ref()), true),
        };

        let key = derive_key_async(passcode, &salt, &self.kdf).await?;

        if created {
            info!("Configuring passcode for the first time");
            salt::store_salt(self.storage.as_ref(), &salt).await?;
        }

        self.key = Some(key);
        self.passcode = Some(Zeroizing::new(passcode.to_string()));

        if created {
            self.commit().await?;
        }
        Ok(())
    }

    /// Check `candidate` against the stored ciphertext.
    ///
    /// Touches no state. Returns `true` when no passcode is configured and
    /// also when a salt exists but nothing has been stored yet, since there
    /// is nothing to check against in that case.
    ///
    /// # Errors
    /// Storage read failures and invalid KDF settings. Every decode, parse
    /// or authentication failure is reported as `Ok(false)`.
    pub async fn verify_passcode(&self, candidate: &str) -> VaultResult<bool> {
        let Some(encoded_salt) = self.storage.get(SALT_KEY).await? else {
            return Ok(true);
        };
        let Some(raw) = self.storage.get(TOKENS_KEY).await? else {
            debug!("No stored tokens to verify against");
            return Ok(true);
        };

        let salt = match Salt::from_base64(&encoded_salt) {
            Ok(salt) => salt,
            Err(e) => {
                warn!("Stored salt is unusable: {}", e);
                return Ok(false);
            }
        };
        let envelope = match Envelope::from_json(&raw) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!("Stored tokens are not an envelope: {}", e);
                return Ok(false);
            }
        };

        let key = derive_key_async(candidate, &salt, &self.kdf).await?;
        Ok(envelope.decrypt(&key).is_ok())
    }

    /// Verify, then set the passcode and load the collection.
    ///
    /// # Errors
    /// Returns `InvalidPasscode` and leaves the store untouched when the
    /// passcode does not open the stored data.
    pub async fn unlock(&mut self, passcode: &str) -> VaultResult<()> {
        if !self.verify_passcode(passcode).await? {
            warn!("Unlock attempt with wrong passcode");
            return Err(VaultError::InvalidPasscode);
        }

        self.set_passcode(passcode).await?;
        self.init().await?;
        if !self.is_unlocked() && self.is_passcode_configured().await? {
            return Err(VaultError::Decryption("Stored tokens could not be loaded".into()));
        }
        info!("Vault unlocked");
        Ok(())
    }

    /// Re-encrypt everything under `new_passcode`, or store it unencrypted
    /// when `new_passcode` is empty.
    ///
    /// A non-empty passcode always gets a fresh salt. The current in-memory
    /// collection is written directly; this is not a collection mutation.
    ///
    /// The new salt and the new envelope are two separate writes. If the
    /// process dies between them the stored data cannot be decrypted. Once
    /// the new salt is stored the session switches to the new key even if
    /// the envelope write fails, so the next commit is readable with the
    /// new passcode.
    pub async fn re_key(&mut self, new_passcode: &str) -> VaultResult<()> {
        if self.status().await? == VaultStatus::Locked {
            return Err(VaultError::Locked);
        }

        if new_passcode.is_empty() {
            return self.clear_passcode().await;
        }

        let salt = Salt::generate(self.entropy.as_ref());
        let key = derive_key_async(new_passcode, &salt, &self.kdf).await?;
        let envelope = Envelope::seal(&self.tokens, &key, self.entropy.as_ref())?;

        salt::store_salt(self.storage.as_ref(), &salt).await?;
        self.key = Some(key);
        self.passcode = Some(Zeroizing::new(new_passcode.to_string()));

        if let Err(e) = self.storage.set(TOKENS_KEY, &envelope.to_json()?).await {
            error!("Stored new salt but failed to write re-encrypted tokens: {}", e);
            return Err(e.into());
        }

        info!("Re-encrypted {} tokens under new passcode", self.tokens.len());
        Ok(())
    }

    /// Store the collection as plain JSON, then drop the salt and key.
    ///
    /// The key is only released once the salt is gone. If removing the
    /// salt fails the envelope is written back so storage stays readable
    /// with the current passcode.
    async fn clear_passcode(&mut self) -> VaultResult<()> {
        let plain = encode_plain(&self.tokens)?;
        self.storage.set(TOKENS_KEY, plain.as_str()).await?;

        if let Err(e) = salt::delete_salt(self.storage.as_ref()).await {
            error!("Failed to remove passcode salt: {}", e);
            if self.key.is_some() {
                // Best effort; commit logs its own failure
                let _ = self.commit().await;
            }
            return Err(e);
        }

        self.key = None;
        self.passcode = None;
        info!("Passcode cleared, tokens stored unencrypted");
        Ok(())
    }

    /// Drop the session key, passcode and collection from memory.
    ///
    /// Stored data is left as is.
    pub fn lock(&mut self) {
        if self.is_unlocked() {
            info!("Locking vault");
        }
        // VaultKey implements ZeroizeOnDrop, so memory is securely erased
        self.key = None;
        self.passcode = None;
        self.tokens.clear();
    }

    /// Delete all stored vault data and clear memory.
    ///
    /// # Warning
    /// All tokens are permanently lost!
    pub async fn destroy(&mut self) -> VaultResult<()> {
        warn!("Destroying vault - all tokens will be lost!");

        self.lock();
        self.storage.remove(TOKENS_KEY).await?;
        salt::delete_salt(self.storage.as_ref()).await?;

        info!("Vault destroyed");
        Ok(())
    }

    // =========================================================================
    // Collection Mutations
    // =========================================================================

    /// Append a token and persist.
    pub async fn add_token(&mut self, token: Token) -> VaultResult<()> {
        self.mutate(|tokens| tokens.push(token)).await
    }

    /// Remove the token at `index` and persist.
    pub async fn remove_token(&mut self, index: usize) -> VaultResult<Token> {
        self.ensure_accessible().await?;
        if index >= self.tokens.len() {
            return Err(VaultError::TokenNotFound(index));
        }
        self.mutate(|tokens| tokens.remove(index)).await
    }

    /// Replace the whole collection and persist.
    pub async fn replace_tokens(&mut self, tokens: Vec<Token>) -> VaultResult<()> {
        self.mutate(|current| *current = tokens).await
    }

    /// Apply `update` to the collection, then run one persistence cycle.
    ///
    /// Refused while locked, since the collection in memory is not the
    /// stored one. If persisting fails the change stays applied in memory
    /// and the error is returned after being logged.
    pub async fn mutate<F, R>(&mut self, update: F) -> VaultResult<R>
    where
        F: FnOnce(&mut Vec<Token>) -> R,
    {
        self.ensure_accessible().await?;

        let result = update(&mut self.tokens);
        self.commit().await?;
        Ok(result)
    }

    async fn ensure_accessible(&self) -> VaultResult<()> {
        if self.status().await?.is_accessible() {
            Ok(())
        } else {
            Err(VaultError::Locked)
        }
    }

    /// Write the full collection to storage, replacing what was there.
    ///
    /// Encrypted with a fresh IV when a key is held, plain JSON otherwise.
    pub async fn commit(&self) -> VaultResult<()> {
        let result = self.persist_tokens().await;
        match &result {
            Ok(()) => debug!("Persisted {} tokens", self.tokens.len()),
            Err(e) => error!("Failed to persist tokens: {}", e),
        }
        result
    }

    async fn persist_tokens(&self) -> VaultResult<()> {
        match &self.key {
            Some(key) => {
                let envelope = Envelope::seal(&self.tokens, key, self.entropy.as_ref())?;
                self.storage.set(TOKENS_KEY, &envelope.to_json()?).await?;
            }
            None => {
                // Plaintext over an envelope would silently drop protection
                if self.is_passcode_configured().await? {
                    return Err(VaultError::Locked);
                }
                let plain = encode_plain(&self.tokens)?;
                self.storage.set(TOKENS_KEY, plain.as_str()).await?;
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for VaultStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VaultStore")
            .field("kdf", &self.kdf)
            .field("tokens", &self.tokens.len())
            .field("unlocked", &self.is_unlocked())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::{engine::general_purpose::STANDARD, Engine as _};

    use crate::storage::{FailingStore, MemoryStore};
    use crate::vault::entropy::CountingEntropy;
    use crate::vault::kdf::fast_settings;

    fn settings() -> VaultSettings {
        VaultSettings {
            kdf: fast_settings(),
        }
    }

    fn github() -> Token {
        Token::new("GitHub", "alice", "#fff", "JBSWY3DPEHPK3PXP")
    }

    fn mail() -> Token {
        Token::new("Mail", "alice@example.com", "#0af", "GEZDGNBVGY3TQOJQ")
    }

    async fn fresh_store(storage: &Arc<MemoryStore>) -> VaultStore {
        let mut store = VaultStore::new(storage.clone(), &settings());
        store.init().await.unwrap();
        store
    }

    async fn stored(storage: &MemoryStore, key: &str) -> Option<String> {
        storage.get(key).await.unwrap()
    }

    #[tokio::test]
    async fn test_add_token_without_passcode_stores_plain_array() {
        let storage = Arc::new(MemoryStore::new());
        let mut store = fresh_store(&storage).await;

        store.add_token(github()).await.unwrap();

        let raw = stored(&storage, TOKENS_KEY).await.unwrap();
        let on_disk: Vec<Token> = serde_json::from_str(&raw).unwrap();
        assert_eq!(on_disk, vec![github()]);
        assert!(stored(&storage, SALT_KEY).await.is_none());
        assert_eq!(store.status().await.unwrap(), VaultStatus::Unconfigured);
    }

    #[tokio::test]
    async fn test_re_key_then_fresh_instance_decrypts() {
        let storage = Arc::new(MemoryStore::new());
        let mut store = fresh_store(&storage).await;
        store.add_token(github()).await.unwrap();
        store.add_token(mail()).await.unwrap();

        store.re_key("1234").await.unwrap();

        let salt = stored(&storage, SALT_KEY).await.unwrap();
        assert_eq!(STANDARD.decode(salt).unwrap().len(), 16);
        let raw = stored(&storage, TOKENS_KEY).await.unwrap();
        let envelope = Envelope::from_json(&raw).unwrap();
        assert!(!envelope.iv.is_empty() && !envelope.data.is_empty());
        assert!(store.is_unlocked());

        let mut reopened = VaultStore::new(storage.clone(), &settings());
        reopened.set_passcode("1234").await.unwrap();
        reopened.init().await.unwrap();
        assert_eq!(reopened.tokens(), &[github(), mail()]);
        assert_eq!(reopened.status().await.unwrap(), VaultStatus::Unlocked);
    }

    #[tokio::test]
    async fn test_mutations_after_re_key_stay_encrypted() {
        let storage = Arc::new(MemoryStore::new());
        let mut store = fresh_store(&storage).await;
        store.re_key("1234").await.unwrap();
        store.add_token(github()).await.unwrap();

        let raw = stored(&storage, TOKENS_KEY).await.unwrap();
        assert!(Envelope::from_json(&raw).is_ok());
        assert!(!raw.contains("JBSWY3DPEHPK3PXP"));
    }

    #[tokio::test]
    async fn test_verify_passcode() {
        let storage = Arc::new(MemoryStore::new());
        let mut store = fresh_store(&storage).await;
        store.add_token(github()).await.unwrap();
        store.re_key("correct").await.unwrap();

        let checker = VaultStore::new(storage.clone(), &settings());
        assert!(!checker.verify_passcode("wrong").await.unwrap());
        assert!(checker.verify_passcode("correct").await.unwrap());
    }

    #[tokio::test]
    async fn test_verify_without_passcode_or_data() {
        let storage = Arc::new(MemoryStore::new());
        let store = fresh_store(&storage).await;
        assert!(store.verify_passcode("anything").await.unwrap());

        // Salt but no ciphertext yet: nothing to contradict the candidate
        salt::store_salt(storage.as_ref(), &Salt::from_bytes([1u8; 16]))
            .await
            .unwrap();
        assert!(store.verify_passcode("anything").await.unwrap());
    }

    #[tokio::test]
    async fn test_verify_has_no_side_effects() {
        let storage = Arc::new(MemoryStore::new());
        let mut store = fresh_store(&storage).await;
        store.add_token(github()).await.unwrap();
        store.re_key("correct").await.unwrap();

        let salt_before = stored(&storage, SALT_KEY).await;
        let tokens_before = stored(&storage, TOKENS_KEY).await;
        let key_before = store.key.as_ref().map(|k| *k.as_bytes());

        assert!(!store.verify_passcode("wrong").await.unwrap());
        assert!(store.verify_passcode("correct").await.unwrap());

        assert_eq!(stored(&storage, SALT_KEY).await, salt_before);
        assert_eq!(stored(&storage, TOKENS_KEY).await, tokens_before);
        assert_eq!(store.key.as_ref().map(|k| *k.as_bytes()), key_before);
        assert_eq!(store.passcode.as_deref().map(String::as_str), Some("correct"));
        assert_eq!(store.tokens(), &[github()]);
    }

    #[tokio::test]
    async fn test_consecutive_commits_use_fresh_ivs() {
        let storage = Arc::new(MemoryStore::new());
        let mut store = VaultStore::new(storage.clone(), &settings())
            .with_entropy(Arc::new(CountingEntropy::default()));
        store.init().await.unwrap();
        store.add_token(github()).await.unwrap();
        store.re_key("1234").await.unwrap();

        store.commit().await.unwrap();
        let first = Envelope::from_json(&stored(&storage, TOKENS_KEY).await.unwrap()).unwrap();
        store.commit().await.unwrap();
        let second = Envelope::from_json(&stored(&storage, TOKENS_KEY).await.unwrap()).unwrap();

        assert_ne!(first.iv, second.iv);
        assert_ne!(first.data, second.data);
    }

    #[tokio::test]
    async fn test_downgrade_to_plaintext() {
        let storage = Arc::new(MemoryStore::new());
        let mut store = fresh_store(&storage).await;
        store.add_token(github()).await.unwrap();
        store.add_token(mail()).await.unwrap();
        store.re_key("1234").await.unwrap();

        store.re_key("").await.unwrap();

        assert!(stored(&storage, SALT_KEY).await.is_none());
        assert!(!store.is_unlocked());
        assert!(!store.has_session_passcode());

        let mut reopened = VaultStore::new(storage.clone(), &settings());
        reopened.init().await.unwrap();
        assert_eq!(reopened.tokens(), &[github(), mail()]);
        assert_eq!(reopened.status().await.unwrap(), VaultStatus::Unconfigured);
    }

    #[tokio::test]
    async fn test_tampered_ciphertext_yields_empty_locked_vault() {
        let storage = Arc::new(MemoryStore::new());
        let mut store = fresh_store(&storage).await;
        store.add_token(github()).await.unwrap();
        store.re_key("correct").await.unwrap();

        let raw = stored(&storage, TOKENS_KEY).await.unwrap();
        let mut envelope = Envelope::from_json(&raw).unwrap();
        let mut data = STANDARD.decode(&envelope.data).unwrap();
        data[0] ^= 0x01;
        envelope.data = STANDARD.encode(&data);
        storage
            .set(TOKENS_KEY, &envelope.to_json().unwrap())
            .await
            .unwrap();

        let mut reopened = VaultStore::new(storage.clone(), &settings());
        reopened.set_passcode("correct").await.unwrap();
        reopened.init().await.unwrap();
        assert!(reopened.tokens().is_empty());
        assert_eq!(reopened.status().await.unwrap(), VaultStatus::Locked);
        assert!(matches!(
            reopened.add_token(mail()).await,
            Err(VaultError::Locked)
        ));

        assert!(!reopened.verify_passcode("correct").await.unwrap());
        assert!(matches!(
            reopened.unlock("correct").await,
            Err(VaultError::InvalidPasscode)
        ));
    }

    #[tokio::test]
    async fn test_init_with_wrong_passcode_refuses_writes() {
        let storage = Arc::new(MemoryStore::new());
        let mut store = fresh_store(&storage).await;
        store.add_token(github()).await.unwrap();
        store.re_key("1234").await.unwrap();
        let before = stored(&storage, TOKENS_KEY).await;

        let mut wrong = VaultStore::new(storage.clone(), &settings());
        wrong.set_passcode("9999").await.unwrap();
        wrong.init().await.unwrap();

        assert!(wrong.tokens().is_empty());
        assert_eq!(wrong.status().await.unwrap(), VaultStatus::Locked);
        assert!(!wrong.has_session_passcode());
        assert!(matches!(
            wrong.add_token(mail()).await,
            Err(VaultError::Locked)
        ));
        assert!(matches!(
            wrong.replace_tokens(vec![mail()]).await,
            Err(VaultError::Locked)
        ));
        assert!(matches!(wrong.commit().await, Err(VaultError::Locked)));
        assert_eq!(stored(&storage, TOKENS_KEY).await, before);

        assert!(wrong.verify_passcode("1234").await.unwrap());
        wrong.unlock("1234").await.unwrap();
        assert_eq!(wrong.tokens(), &[github()]);
    }

    #[tokio::test]
    async fn test_remove_while_locked_is_refused() {
        let storage = Arc::new(MemoryStore::new());
        let mut store = fresh_store(&storage).await;
        store.add_token(github()).await.unwrap();
        store.re_key("1234").await.unwrap();

        let mut locked = fresh_store(&storage).await;
        assert!(matches!(
            locked.remove_token(0).await,
            Err(VaultError::Locked)
        ));
    }

    #[tokio::test]
    async fn test_failed_commit_keeps_tokens_in_memory() {
        let storage = Arc::new(FailingStore::new());
        let mut store = VaultStore::new(storage.clone(), &settings());
        store.init().await.unwrap();
        store.add_token(github()).await.unwrap();
        store.re_key("1234").await.unwrap();

        storage.fail_next_writes(TOKENS_KEY, 1);
        assert!(matches!(
            store.add_token(mail()).await,
            Err(VaultError::Storage(_))
        ));
        assert_eq!(store.tokens(), &[github(), mail()]);

        let mut reopened = VaultStore::new(storage.clone(), &settings());
        reopened.unlock("1234").await.unwrap();
        assert_eq!(reopened.tokens(), &[github()]);

        // The next successful write carries the whole collection
        store.add_token(github()).await.unwrap();
        let mut reopened = VaultStore::new(storage.clone(), &settings());
        reopened.unlock("1234").await.unwrap();
        assert_eq!(reopened.tokens(), &[github(), mail(), github()]);
    }

    #[tokio::test]
    async fn test_re_key_with_failed_token_write_keeps_new_key() {
        let storage = Arc::new(FailingStore::new());
        let mut store = VaultStore::new(storage.clone(), &settings());
        store.init().await.unwrap();
        store.add_token(github()).await.unwrap();
        store.re_key("old").await.unwrap();

        storage.fail_next_writes(TOKENS_KEY, 1);
        assert!(store.re_key("new").await.is_err());
        assert_eq!(store.status().await.unwrap(), VaultStatus::Unlocked);

        store.add_token(mail()).await.unwrap();

        let mut reopened = VaultStore::new(storage.clone(), &settings());
        assert!(!reopened.verify_passcode("old").await.unwrap());
        assert!(reopened.verify_passcode("new").await.unwrap());
        reopened.unlock("new").await.unwrap();
        assert_eq!(reopened.tokens(), &[github(), mail()]);
    }

    #[tokio::test]
    async fn test_downgrade_with_failed_token_write_stays_encrypted() {
        let storage = Arc::new(FailingStore::new());
        let mut store = VaultStore::new(storage.clone(), &settings());
        store.init().await.unwrap();
        store.add_token(github()).await.unwrap();
        store.re_key("1234").await.unwrap();

        storage.fail_next_writes(TOKENS_KEY, 1);
        assert!(store.re_key("").await.is_err());

        assert!(storage.get(SALT_KEY).await.unwrap().is_some());
        assert!(store.is_unlocked());
        assert!(store.verify_passcode("1234").await.unwrap());

        store.add_token(mail()).await.unwrap();
        let mut reopened = VaultStore::new(storage.clone(), &settings());
        reopened.unlock("1234").await.unwrap();
        assert_eq!(reopened.tokens(), &[github(), mail()]);
    }

    #[tokio::test]
    async fn test_downgrade_with_failed_salt_removal_restores_envelope() {
        let storage = Arc::new(FailingStore::new());
        let mut store = VaultStore::new(storage.clone(), &settings());
        store.init().await.unwrap();
        store.add_token(github()).await.unwrap();
        store.re_key("1234").await.unwrap();

        storage.fail_next_writes(SALT_KEY, 1);
        assert!(store.re_key("").await.is_err());

        assert!(storage.get(SALT_KEY).await.unwrap().is_some());
        let raw = storage.get(TOKENS_KEY).await.unwrap().unwrap();
        assert!(Envelope::from_json(&raw).is_ok());
        assert!(store.is_unlocked());

        let mut reopened = VaultStore::new(storage.clone(), &settings());
        reopened.unlock("1234").await.unwrap();
        assert_eq!(reopened.tokens(), &[github()]);

        // Retrying once storage recovers completes the downgrade
        store.re_key("").await.unwrap();
        assert!(storage.get(SALT_KEY).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_locked_init_skips_decryption() {
        let storage = Arc::new(MemoryStore::new());
        let mut store = fresh_store(&storage).await;
        store.add_token(github()).await.unwrap();
        store.re_key("1234").await.unwrap();
        let before = stored(&storage, TOKENS_KEY).await;

        let mut locked = fresh_store(&storage).await;
        assert!(locked.tokens().is_empty());
        assert_eq!(locked.status().await.unwrap(), VaultStatus::Locked);

        // Writes are refused so the ciphertext is never overwritten
        assert!(matches!(
            locked.add_token(mail()).await,
            Err(VaultError::Locked)
        ));
        assert!(matches!(locked.re_key("other").await, Err(VaultError::Locked)));
        assert!(matches!(locked.set_passcode("").await, Err(VaultError::Locked)));
        assert_eq!(stored(&storage, TOKENS_KEY).await, before);
    }

    #[tokio::test]
    async fn test_corrupt_plaintext_resets_to_empty() {
        let storage = Arc::new(MemoryStore::new());
        storage.set(TOKENS_KEY, "{ not json").await.unwrap();

        let store = fresh_store(&storage).await;
        assert!(store.tokens().is_empty());
    }

    #[tokio::test]
    async fn test_unlock_with_wrong_passcode_leaves_store_locked() {
        let storage = Arc::new(MemoryStore::new());
        let mut store = fresh_store(&storage).await;
        store.add_token(github()).await.unwrap();
        store.re_key("1234").await.unwrap();

        let mut other = fresh_store(&storage).await;
        assert!(matches!(
            other.unlock("0000").await,
            Err(VaultError::InvalidPasscode)
        ));
        assert!(!other.is_unlocked());
        assert!(other.tokens().is_empty());

        other.unlock("1234").await.unwrap();
        assert_eq!(other.tokens(), &[github()]);
    }

    #[tokio::test]
    async fn test_set_passcode_on_new_vault_encrypts_existing_tokens() {
        let storage = Arc::new(MemoryStore::new());
        let mut store = fresh_store(&storage).await;
        store.add_token(github()).await.unwrap();

        store.set_passcode("1234").await.unwrap();

        assert!(stored(&storage, SALT_KEY).await.is_some());
        let raw = stored(&storage, TOKENS_KEY).await.unwrap();
        assert!(Envelope::from_json(&raw).is_ok());
        assert!(store.verify_passcode("1234").await.unwrap());
    }

    #[tokio::test]
    async fn test_re_key_always_replaces_salt() {
        let storage = Arc::new(MemoryStore::new());
        let mut store = fresh_store(&storage).await;
        store.add_token(github()).await.unwrap();
        store.re_key("1234").await.unwrap();
        let first_salt = stored(&storage, SALT_KEY).await;

        store.re_key("5678").await.unwrap();
        assert_ne!(stored(&storage, SALT_KEY).await, first_salt);

        let checker = VaultStore::new(storage.clone(), &settings());
        assert!(!checker.verify_passcode("1234").await.unwrap());
        assert!(checker.verify_passcode("5678").await.unwrap());
    }

    #[tokio::test]
    async fn test_remove_and_replace_tokens() {
        let storage = Arc::new(MemoryStore::new());
        let mut store = fresh_store(&storage).await;
        store.replace_tokens(vec![github(), mail()]).await.unwrap();

        let removed = store.remove_token(0).await.unwrap();
        assert_eq!(removed, github());
        assert!(matches!(
            store.remove_token(5).await,
            Err(VaultError::TokenNotFound(5))
        ));

        let mut reopened = fresh_store(&storage).await;
        assert_eq!(reopened.tokens(), &[mail()]);
        reopened.replace_tokens(Vec::new()).await.unwrap();
        assert_eq!(stored(&storage, TOKENS_KEY).await.as_deref(), Some("[]"));
    }

    #[tokio::test]
    async fn test_lock_and_destroy() {
        let storage = Arc::new(MemoryStore::new());
        let mut store = fresh_store(&storage).await;
        store.add_token(github()).await.unwrap();
        store.re_key("1234").await.unwrap();

        store.lock();
        assert!(store.tokens().is_empty());
        assert_eq!(store.status().await.unwrap(), VaultStatus::Locked);
        assert!(store.has_stored_tokens().await.unwrap());

        store.destroy().await.unwrap();
        assert!(storage.is_empty().await);
        assert_eq!(store.status().await.unwrap(), VaultStatus::Unconfigured);
    }
}
