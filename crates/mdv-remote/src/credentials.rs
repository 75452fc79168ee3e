//! Credential resolution for remote connections.
//!
//! The registry asks a [`CredentialProvider`] when neither the caller nor
//! the target supplied credentials. [`CredentialManager`] is the standard
//! provider. It looks in three places, in order:
//!
//! 1. the in-memory session cache
//! 2. the persistent [`CredentialStore`]
//! 3. the interactive [`CredentialPrompter`], bounded by a timeout
//!
//! A prompt that is cancelled, dropped, or left unanswered resolves to
//! `None`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use mdv_core::{Credentials, Protocol, RemoteTarget};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::error::RemoteError;

/// Supplies credentials for a target on demand.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// Returns credentials for `target`, or `None` if the user declined.
    async fn get_credentials(&self, target: &RemoteTarget) -> Option<Credentials>;
}

/// Persistent credential storage keyed by `protocol://host`.
pub trait CredentialStore: Send + Sync {
    /// Loads saved credentials.
    fn load(&self, key: &str) -> Option<Credentials>;

    /// Saves credentials, replacing any previous entry.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing store rejects the write.
    fn save(&self, key: &str, credentials: &Credentials) -> Result<(), RemoteError>;

    /// Removes one entry.
    fn remove(&self, key: &str);

    /// Removes every entry.
    fn clear(&self);

    /// Keys with saved credentials.
    fn keys(&self) -> Vec<String>;
}

/// A [`CredentialStore`] that lives for the process only.
#[derive(Default)]
pub struct MemoryCredentialStore {
    entries: Mutex<FxHashMap<String, Credentials>>,
}

impl MemoryCredentialStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn load(&self, key: &str) -> Option<Credentials> {
        self.entries.lock().get(key).cloned()
    }

    fn save(&self, key: &str, credentials: &Credentials) -> Result<(), RemoteError> {
        self.entries
            .lock()
            .insert(key.to_owned(), credentials.clone());
        Ok(())
    }

    fn remove(&self, key: &str) {
        self.entries.lock().remove(key);
    }

    fn clear(&self) {
        self.entries.lock().clear();
    }

    fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.entries.lock().keys().cloned().collect();
        keys.sort_unstable();
        keys
    }
}

/// What the user is asked for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptRequest {
    /// Protocol of the target.
    pub protocol: Protocol,
    /// Host of the target.
    pub host: String,
    /// Suggested login name.
    pub default_username: String,
}

/// The user's answer to a [`PromptRequest`].
#[derive(Debug, Clone)]
pub struct PromptResponse {
    /// Entered credentials.
    pub credentials: Credentials,
    /// Persist to the store instead of the session cache.
    pub remember: bool,
}

/// Interactive credential entry.
///
/// The prompter answers through `reply`. Sending `None`, or dropping
/// `reply`, cancels.
pub trait CredentialPrompter: Send + Sync {
    /// Shows a prompt for `request`.
    fn request(&self, request: PromptRequest, reply: oneshot::Sender<Option<PromptResponse>>);
}

/// The standard [`CredentialProvider`].
pub struct CredentialManager {
    session: Mutex<FxHashMap<String, Credentials>>,
    store: Arc<dyn CredentialStore>,
    prompter: Option<Arc<dyn CredentialPrompter>>,
    prompt_timeout: Duration,
}

impl CredentialManager {
    /// Creates a manager without an interactive prompter.
    #[must_use]
    pub fn new(store: Arc<dyn CredentialStore>, prompt_timeout: Duration) -> Self {
        Self {
            session: Mutex::new(FxHashMap::default()),
            store,
            prompter: None,
            prompt_timeout,
        }
    }

    /// Attaches an interactive prompter.
    #[must_use]
    pub fn with_prompter(mut self, prompter: Arc<dyn CredentialPrompter>) -> Self {
        self.prompter = Some(prompter);
        self
    }

    /// The lookup key for a target: `protocol://host`.
    #[must_use]
    pub fn credential_key(target: &RemoteTarget) -> String {
        format!(
            "{}://{}",
            target.protocol,
            target.host.as_deref().unwrap_or_default()
        )
    }

    /// Caches credentials, persisting them when `persist` is set. A failed
    /// persist falls back to the session cache.
    pub fn remember(&self, key: &str, credentials: &Credentials, persist: bool) {
        if persist {
            match self.store.save(key, credentials) {
                Ok(()) => {
                    debug!(key, "Saved credentials");
                    return;
                }
                Err(e) => warn!(key, error = %e, "Cannot persist credentials, keeping for session"),
            }
        }
        self.session
            .lock()
            .insert(key.to_owned(), credentials.clone());
    }

    /// Looks up cached or saved credentials without prompting.
    #[must_use]
    pub fn stored(&self, key: &str) -> Option<Credentials> {
        if let Some(credentials) = self.session.lock().get(key) {
            return Some(credentials.clone());
        }
        self.store.load(key)
    }

    /// Forgets credentials for one key, from both the cache and the store.
    pub fn clear(&self, key: &str) {
        self.session.lock().remove(key);
        self.store.remove(key);
    }

    /// Forgets every credential.
    pub fn clear_all(&self) {
        self.session.lock().clear();
        self.store.clear();
    }

    /// Keys that have persisted credentials.
    #[must_use]
    pub fn saved_keys(&self) -> Vec<String> {
        self.store.keys()
    }

    /// Asks the prompter, waiting at most the prompt timeout.
    pub async fn prompt(&self, target: &RemoteTarget) -> Option<Credentials> {
        let prompter = self.prompter.as_ref()?;
        let key = Self::credential_key(target);

        let (reply, answer) = oneshot::channel();
        prompter.request(
            PromptRequest {
                protocol: target.protocol.clone(),
                host: target.host.clone().unwrap_or_default(),
                default_username: default_username(target),
            },
            reply,
        );

        match tokio::time::timeout(self.prompt_timeout, answer).await {
            Ok(Ok(Some(response))) => {
                self.remember(&key, &response.credentials, response.remember);
                info!(key = %key, remember = response.remember, "Credentials entered");
                Some(response.credentials)
            }
            Ok(Ok(None) | Err(_)) => {
                info!(key = %key, "Credential prompt cancelled");
                None
            }
            Err(_) => {
                warn!(
                    key = %key,
                    timeout_secs = self.prompt_timeout.as_secs(),
                    "Credential prompt timed out"
                );
                None
            }
        }
    }
}

#[async_trait]
impl CredentialProvider for CredentialManager {
    async fn get_credentials(&self, target: &RemoteTarget) -> Option<Credentials> {
        let key = Self::credential_key(target);
        if let Some(credentials) = self.stored(&key) {
            debug!(key = %key, "Using known credentials");
            return Some(credentials);
        }
        self.prompt(target).await
    }
}

fn default_username(target: &RemoteTarget) -> String {
    target
        .username
        .clone()
        .or_else(|| std::env::var("USER").ok())
        .or_else(|| std::env::var("USERNAME").ok())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use mdv_core::parse;

    /// Answers every prompt with a fixed response, recording requests.
    struct ScriptedPrompter {
        answer: Option<PromptResponse>,
        requests: Mutex<Vec<PromptRequest>>,
    }

    impl ScriptedPrompter {
        fn new(answer: Option<PromptResponse>) -> Arc<Self> {
            Arc::new(Self {
                answer,
                requests: Mutex::new(Vec::new()),
            })
        }
    }

    impl CredentialPrompter for ScriptedPrompter {
        fn request(&self, request: PromptRequest, reply: oneshot::Sender<Option<PromptResponse>>) {
            self.requests.lock().push(request);
            let _ = reply.send(self.answer.clone());
        }
    }

    /// Never answers; keeps the sender alive so the wait can only time out.
    #[derive(Default)]
    struct SilentPrompter {
        pending: Mutex<Vec<oneshot::Sender<Option<PromptResponse>>>>,
    }

    impl CredentialPrompter for SilentPrompter {
        fn request(&self, _request: PromptRequest, reply: oneshot::Sender<Option<PromptResponse>>) {
            self.pending.lock().push(reply);
        }
    }

    fn manager(store: Arc<MemoryCredentialStore>) -> CredentialManager {
        CredentialManager::new(store, Duration::from_secs(300))
    }

    #[test]
    fn test_credential_key() {
        let target = parse("sftp://alice@docs.example.com:2222/a.md");
        assert_eq!(CredentialManager::credential_key(&target), "sftp://docs.example.com");
    }

    #[tokio::test]
    async fn test_session_cache_before_store() {
        let store = Arc::new(MemoryCredentialStore::new());
        store.save("ssh://h", &Credentials::password("stored", "x")).unwrap();
        let mgr = manager(Arc::clone(&store));
        mgr.remember("ssh://h", &Credentials::password("session", "y"), false);

        let creds = mgr.get_credentials(&parse("ssh://h/a.md")).await.unwrap();
        assert_eq!(creds.username, "session");
    }

    #[tokio::test]
    async fn test_store_used_when_no_session_entry() {
        let store = Arc::new(MemoryCredentialStore::new());
        store.save("smb://nas", &Credentials::password("bob", "pw")).unwrap();
        let prompter = ScriptedPrompter::new(None);
        let mgr = manager(store).with_prompter(Arc::<ScriptedPrompter>::clone(&prompter));

        let creds = mgr.get_credentials(&parse("smb://nas/docs/a.md")).await.unwrap();
        assert_eq!(creds.username, "bob");
        assert!(prompter.requests.lock().is_empty());
    }

    #[tokio::test]
    async fn test_prompt_remember_persists() {
        let store = Arc::new(MemoryCredentialStore::new());
        let prompter = ScriptedPrompter::new(Some(PromptResponse {
            credentials: Credentials::password("carol", "pw"),
            remember: true,
        }));
        let mgr = manager(Arc::clone(&store))
            .with_prompter(Arc::<ScriptedPrompter>::clone(&prompter));

        let target = parse("sftp://carol@files/a.md");
        let creds = mgr.get_credentials(&target).await.unwrap();
        assert_eq!(creds.username, "carol");
        assert_eq!(mgr.saved_keys(), vec!["sftp://files".to_owned()]);

        let requests = prompter.requests.lock();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].default_username, "carol");
        assert_eq!(requests[0].host, "files");
    }

    #[tokio::test]
    async fn test_prompt_without_remember_stays_in_session() {
        let store = Arc::new(MemoryCredentialStore::new());
        let prompter = ScriptedPrompter::new(Some(PromptResponse {
            credentials: Credentials::password("dave", "pw"),
            remember: false,
        }));
        let mgr = manager(Arc::clone(&store))
            .with_prompter(Arc::<ScriptedPrompter>::clone(&prompter));
        let target = parse("ssh://box/a.md");

        mgr.get_credentials(&target).await.unwrap();
        mgr.get_credentials(&target).await.unwrap();
        assert!(mgr.saved_keys().is_empty());
        assert_eq!(prompter.requests.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_cancelled_prompt_yields_none() {
        let mgr = manager(Arc::new(MemoryCredentialStore::new()))
            .with_prompter(ScriptedPrompter::new(None));
        assert!(mgr.get_credentials(&parse("ssh://box/a.md")).await.is_none());
    }

    #[tokio::test]
    async fn test_no_prompter_yields_none() {
        let mgr = manager(Arc::new(MemoryCredentialStore::new()));
        assert!(mgr.get_credentials(&parse("ssh://box/a.md")).await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unanswered_prompt_times_out() {
        let mgr = CredentialManager::new(
            Arc::new(MemoryCredentialStore::new()),
            Duration::from_secs(5),
        )
        .with_prompter(Arc::new(SilentPrompter::default()));
        assert!(mgr.get_credentials(&parse("ssh://box/a.md")).await.is_none());
    }

    #[test]
    fn test_clear() {
        let store = Arc::new(MemoryCredentialStore::new());
        let mgr = manager(Arc::clone(&store));
        mgr.remember("ssh://a", &Credentials::username_only("a"), true);
        mgr.remember("ssh://b", &Credentials::username_only("b"), false);
        mgr.clear("ssh://a");
        assert!(mgr.stored("ssh://a").is_none());
        assert!(mgr.stored("ssh://b").is_some());
        mgr.clear_all();
        assert!(mgr.stored("ssh://b").is_none());
    }
}
