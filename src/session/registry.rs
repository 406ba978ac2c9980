//! Session registry
//!
//! Tracks every open inspection session, the single "active" one that
//! reference-free operations target, and the grouping of browser-tab
//! sessions that share one target process. Sessions are held in an arena
//! keyed by id; a [`BrowserInstance`] holds member ids and each session
//! holds its instance key, so there are no reference cycles.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use futures_util::future::join_all;
use tokio::sync::Mutex;

use crate::common::{Error, Result};

use super::debug_session::{DebugSession, RuntimeKind, SessionState};

/// Opaque, process-unique session id
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize,
)]
pub struct SessionId(u64);

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "s{}", self.0)
    }
}

impl SessionId {
    /// Parse the `s<n>` form produced by `Display`
    pub fn parse(text: &str) -> Option<Self> {
        text.strip_prefix('s')?.parse().ok().map(Self)
    }
}

/// Normalized references that can never name a session; they are
/// placeholders meaning "no reference"
const RESERVED_REFERENCES: &[&str] = &["none", "null", "active", "all", "current"];

/// Normalize a human reference: lower-case, trim, collapse internal
/// whitespace runs to a single hyphen.
///
/// This is the single source of truth for reference identity; uniqueness
/// and reserved-word checks run on the normalized form only, so case or
/// whitespace variants cannot bypass them.
pub fn normalize_reference(raw: &str) -> String {
    raw.trim()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("-")
}

/// One registered session
pub struct SessionEntry {
    pub id: SessionId,
    /// Normalized reference, if one was given
    pub reference: Option<String>,
    pub host: String,
    pub port: u16,
    pub kind: RuntimeKind,
    /// Tab index within the target process (browser targets)
    pub tab_index: usize,
    /// Key of the owning BrowserInstance (browser targets)
    pub browser_key: Option<String>,
    pub created_at: SystemTime,
    last_activity: Instant,
    pub session: Arc<Mutex<DebugSession>>,
}

impl SessionEntry {
    /// Time since the last tool access
    pub fn idle_for(&self) -> Duration {
        self.last_activity.elapsed()
    }
}

/// Sessions sharing one `host:port` target process
pub struct BrowserInstance {
    pub key: String,
    pub members: HashSet<SessionId>,
}

/// Everything needed to register a freshly connected session
pub struct SessionInit {
    pub reference: Option<String>,
    pub host: String,
    pub port: u16,
    pub kind: RuntimeKind,
    pub tab_index: usize,
    pub session: DebugSession,
}

/// Registry of open sessions and the active-session pointer
#[derive(Default)]
pub struct SessionRegistry {
    sessions: HashMap<SessionId, SessionEntry>,
    /// Normalized reference -> session id
    references: HashMap<String, SessionId>,
    /// Target-process grouping, keyed by `host:port`
    browsers: HashMap<String, BrowserInstance>,
    active: Option<SessionId>,
    next_id: u64,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a session. The first live session becomes active; browser
    /// sessions sharing a `host:port` join the existing BrowserInstance.
    pub fn create(&mut self, init: SessionInit) -> Result<SessionId> {
        let reference = match &init.reference {
            Some(raw) => Some(self.validate_reference(raw)?),
            None => None,
        };

        self.next_id += 1;
        let id = SessionId(self.next_id);

        let browser_key = matches!(init.kind, RuntimeKind::Browser)
            .then(|| format!("{}:{}", init.host, init.port));
        if let Some(key) = &browser_key {
            self.browsers
                .entry(key.clone())
                .or_insert_with(|| BrowserInstance {
                    key: key.clone(),
                    members: HashSet::new(),
                })
                .members
                .insert(id);
        }

        if let Some(normalized) = &reference {
            self.references.insert(normalized.clone(), id);
        }

        self.sessions.insert(
            id,
            SessionEntry {
                id,
                reference,
                host: init.host,
                port: init.port,
                kind: init.kind,
                tab_index: init.tab_index,
                browser_key,
                created_at: SystemTime::now(),
                last_activity: Instant::now(),
                session: Arc::new(Mutex::new(init.session)),
            },
        );

        if self.active.is_none() {
            self.active = Some(id);
        }
        tracing::info!(session = %id, "session registered");
        Ok(id)
    }

    /// Validate a raw reference and return its normalized form.
    /// Uniqueness and the reserved-word check both run on the normalized
    /// form, never the raw text.
    pub fn validate_reference(&self, raw: &str) -> Result<String> {
        let normalized = normalize_reference(raw);
        if normalized.is_empty() || RESERVED_REFERENCES.contains(&normalized.as_str()) {
            return Err(Error::ReferenceReserved {
                reference: raw.to_string(),
            });
        }
        if let Some(holder) = self.references.get(&normalized) {
            return Err(Error::ReferenceConflict {
                reference: normalized,
                holder: holder.to_string(),
            });
        }
        Ok(normalized)
    }

    /// Look up a session by id first, then by normalized reference
    pub fn resolve(&self, selector: &str) -> Option<&SessionEntry> {
        if let Some(id) = SessionId::parse(selector) {
            if let Some(entry) = self.sessions.get(&id) {
                return Some(entry);
            }
        }
        self.references
            .get(&normalize_reference(selector))
            .and_then(|id| self.sessions.get(id))
    }

    /// Resolve a selector, falling back to the active session
    pub fn resolve_or_active(&self, selector: Option<&str>) -> Result<&SessionEntry> {
        match selector {
            Some(selector) => self
                .resolve(selector)
                .ok_or_else(|| Error::SessionNotFound(selector.to_string())),
            None => self
                .active
                .and_then(|id| self.sessions.get(&id))
                .ok_or(Error::NoActiveSession),
        }
    }

    pub fn get(&self, id: SessionId) -> Option<&SessionEntry> {
        self.sessions.get(&id)
    }

    /// Refresh a session's last-activity timestamp
    pub fn touch(&mut self, id: SessionId) {
        if let Some(entry) = self.sessions.get_mut(&id) {
            entry.last_activity = Instant::now();
        }
    }

    /// Make a session the default target for reference-free operations
    pub fn set_active(&mut self, id: SessionId) -> bool {
        if !self.sessions.contains_key(&id) {
            return false;
        }
        self.active = Some(id);
        self.touch(id);
        true
    }

    pub fn active_id(&self) -> Option<SessionId> {
        self.active
    }

    /// Close a session: disconnect, drop its reference and BrowserInstance
    /// membership, and promote a survivor to active if it was active.
    /// Idempotent; closing an unknown id returns false.
    pub async fn close(&mut self, id: SessionId) -> bool {
        let Some(entry) = self.sessions.remove(&id) else {
            return false;
        };

        if let Some(reference) = &entry.reference {
            self.references.remove(reference);
        }
        if let Some(key) = &entry.browser_key {
            if let Some(instance) = self.browsers.get_mut(key) {
                instance.members.remove(&id);
                if instance.members.is_empty() {
                    self.browsers.remove(key);
                }
            }
        }
        if self.active == Some(id) {
            self.active = self.sessions.keys().next().copied();
        }

        entry.session.lock().await.disconnect().await;
        tracing::info!(session = %id, "session closed");
        true
    }

    /// Close every session idle past `threshold`. Returns how many closed.
    ///
    /// A session whose lock is held is in use right now and is skipped this
    /// round. A paused session is still reaped, but never silently: paused
    /// state is live debugging state.
    pub async fn reap_inactive(&mut self, threshold: Duration) -> usize {
        let stale: Vec<SessionId> = self
            .sessions
            .values()
            .filter(|entry| entry.idle_for() > threshold)
            .map(|entry| entry.id)
            .collect();

        let mut closed = 0;
        for id in stale {
            let Some(entry) = self.sessions.get(&id) else {
                continue;
            };
            let state = match entry.session.try_lock() {
                Ok(session) => session.state(),
                Err(_) => continue,
            };
            if state == SessionState::Paused {
                tracing::warn!(
                    session = %id,
                    "reaping an inactive session that is paused mid-inspection; its paused state is discarded"
                );
            }
            if self.close(id).await {
                closed += 1;
            }
        }
        closed
    }

    /// Tear down every session (daemon shutdown)
    pub async fn close_all(&mut self) {
        let sessions: Vec<_> = self
            .sessions
            .drain()
            .map(|(_, entry)| entry.session)
            .collect();
        self.references.clear();
        self.browsers.clear();
        self.active = None;

        join_all(sessions.into_iter().map(|session| async move {
            session.lock().await.disconnect().await;
        }))
        .await;
    }

    /// All sessions, ordered by id
    pub fn list(&self) -> Vec<&SessionEntry> {
        let mut entries: Vec<_> = self.sessions.values().collect();
        entries.sort_by_key(|e| e.id);
        entries
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Number of sessions grouped under a `host:port`, if any
    pub fn browser_members(&self, host: &str, port: u16) -> Option<usize> {
        self.browsers
            .get(&format!("{}:{}", host, port))
            .map(|b| b.members.len())
    }

    #[cfg(test)]
    pub(crate) fn force_idle(&mut self, id: SessionId, age: Duration) {
        if let Some(entry) = self.sessions.get_mut(&id) {
            entry.last_activity = Instant::now()
                .checked_sub(age)
                .unwrap_or_else(Instant::now);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use async_trait::async_trait;
    use tokio::sync::mpsc;

    use crate::cdp::{CommandRequest, Transport};
    use crate::common::config::Config;
    use crate::sourcemap::IdentityMapper;

    /// Transport that acknowledges every command; the runtime-kind probe is
    /// answered per `node`
    struct AutoReply {
        node: bool,
        tx: mpsc::UnboundedSender<String>,
        rx: mpsc::UnboundedReceiver<String>,
    }

    #[async_trait]
    impl Transport for AutoReply {
        async fn send(&mut self, text: &str) -> Result<()> {
            let request: CommandRequest = serde_json::from_str(text).unwrap();
            let result = if text.contains("process.versions.node") {
                let answer = if self.node { "node" } else { "" };
                serde_json::json!({"result": {"type": "string", "value": answer}})
            } else {
                serde_json::json!({})
            };
            let response = serde_json::json!({"id": request.id, "result": result});
            self.tx.send(response.to_string()).unwrap();
            Ok(())
        }

        async fn recv(&mut self) -> Result<Option<String>> {
            Ok(self.rx.recv().await)
        }
    }

    async fn test_session(node: bool) -> DebugSession {
        let (tx, rx) = mpsc::unbounded_channel();
        let transport = AutoReply { node, tx, rx };
        DebugSession::connect(
            Box::new(transport),
            std::sync::Arc::new(IdentityMapper),
            Config::default(),
        )
        .await
        .unwrap()
    }

    async fn browser_init(reference: Option<&str>, host: &str, port: u16) -> SessionInit {
        SessionInit {
            reference: reference.map(String::from),
            host: host.to_string(),
            port,
            kind: RuntimeKind::Browser,
            tab_index: 0,
            session: test_session(false).await,
        }
    }

    async fn node_init(reference: Option<&str>, port: u16) -> SessionInit {
        SessionInit {
            reference: reference.map(String::from),
            host: "127.0.0.1".to_string(),
            port,
            kind: RuntimeKind::ScriptRuntime,
            tab_index: 0,
            session: test_session(true).await,
        }
    }

    #[test]
    fn normalization_collapses_case_and_whitespace() {
        assert_eq!(normalize_reference("Test Payment Flow"), "test-payment-flow");
        assert_eq!(
            normalize_reference("test  payment   flow"),
            "test-payment-flow"
        );
        assert_eq!(normalize_reference("  checkout "), "checkout");
        assert_eq!(normalize_reference("already-hyphenated"), "already-hyphenated");
    }

    #[test]
    fn session_id_round_trips_through_display() {
        let id = SessionId(42);
        assert_eq!(id.to_string(), "s42");
        assert_eq!(SessionId::parse("s42"), Some(id));
        assert_eq!(SessionId::parse("42"), None);
        assert_eq!(SessionId::parse("sX"), None);
    }

    #[tokio::test]
    async fn first_session_becomes_active() {
        let mut registry = SessionRegistry::new();
        let first = registry.create(node_init(None, 9229).await).unwrap();
        let second = registry.create(node_init(None, 9230).await).unwrap();
        assert_eq!(registry.active_id(), Some(first));
        assert_ne!(first, second);
    }

    #[tokio::test]
    async fn normalized_reference_variants_collide() {
        let mut registry = SessionRegistry::new();
        registry
            .create(node_init(Some("Test Payment Flow"), 9229).await)
            .unwrap();

        let err = registry
            .create(node_init(Some("test  payment  flow"), 9230).await)
            .unwrap_err();
        assert!(matches!(err, Error::ReferenceConflict { .. }));
    }

    #[tokio::test]
    async fn reserved_references_rejected_in_any_spelling() {
        let mut registry = SessionRegistry::new();
        for raw in ["none", "None", "  NULL ", "Active", "aLL", "  current  "] {
            let err = registry
                .create(node_init(Some(raw), 9229).await)
                .unwrap_err();
            assert!(
                matches!(err, Error::ReferenceReserved { .. }),
                "'{}' should be reserved",
                raw
            );
        }
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn resolves_by_id_then_reference() {
        let mut registry = SessionRegistry::new();
        let id = registry
            .create(node_init(Some("Checkout Flow"), 9229).await)
            .unwrap();

        assert_eq!(registry.resolve(&id.to_string()).unwrap().id, id);
        assert_eq!(registry.resolve("checkout-flow").unwrap().id, id);
        // Raw spelling variants resolve through normalization
        assert_eq!(registry.resolve("Checkout  Flow").unwrap().id, id);
        assert!(registry.resolve("unknown").is_none());
    }

    #[tokio::test]
    async fn closing_active_promotes_a_survivor() {
        let mut registry = SessionRegistry::new();
        let first = registry.create(node_init(None, 9229).await).unwrap();
        let second = registry.create(node_init(None, 9230).await).unwrap();

        assert!(registry.close(first).await);
        assert_eq!(registry.active_id(), Some(second));

        assert!(registry.close(second).await);
        assert_eq!(registry.active_id(), None);
        assert!(registry.is_empty());

        // Second close of the same id is a no-op
        assert!(!registry.close(second).await);
    }

    #[tokio::test]
    async fn closed_references_are_freed() {
        let mut registry = SessionRegistry::new();
        let id = registry
            .create(node_init(Some("checkout"), 9229).await)
            .unwrap();
        registry.close(id).await;
        assert!(registry.resolve("checkout").is_none());

        // The name is reusable once its holder is gone
        registry
            .create(node_init(Some("checkout"), 9230).await)
            .unwrap();
    }

    #[tokio::test]
    async fn browser_sessions_group_by_target_process() {
        let mut registry = SessionRegistry::new();
        let first = registry
            .create(browser_init(None, "127.0.0.1", 9222).await)
            .unwrap();
        let second = registry
            .create(browser_init(None, "127.0.0.1", 9222).await)
            .unwrap();
        let elsewhere = registry
            .create(browser_init(None, "127.0.0.1", 9333).await)
            .unwrap();

        assert_eq!(registry.browser_members("127.0.0.1", 9222), Some(2));
        assert_eq!(registry.browser_members("127.0.0.1", 9333), Some(1));

        registry.close(first).await;
        assert_eq!(registry.browser_members("127.0.0.1", 9222), Some(1));

        // The instance lives exactly as long as its last member
        registry.close(second).await;
        assert_eq!(registry.browser_members("127.0.0.1", 9222), None);

        registry.close(elsewhere).await;
        assert_eq!(registry.browser_members("127.0.0.1", 9333), None);
    }

    #[tokio::test]
    async fn script_runtimes_do_not_form_browser_instances() {
        let mut registry = SessionRegistry::new();
        registry.create(node_init(None, 9229).await).unwrap();
        assert_eq!(registry.browser_members("127.0.0.1", 9229), None);
    }

    #[tokio::test]
    async fn reaper_closes_only_stale_sessions() {
        let mut registry = SessionRegistry::new();
        let stale = registry.create(node_init(None, 9229).await).unwrap();
        let fresh = registry.create(node_init(None, 9230).await).unwrap();

        registry.force_idle(stale, Duration::from_secs(3600));
        let closed = registry.reap_inactive(Duration::from_secs(1800)).await;

        assert_eq!(closed, 1);
        assert!(registry.get(stale).is_none());
        assert!(registry.get(fresh).is_some());
        assert_eq!(registry.active_id(), Some(fresh));
    }
}
