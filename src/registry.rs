//! ==============================================================================
//! registry.rs - device session registry
//! ==============================================================================
//!
//! purpose:
//!     the heart of the relay: a map from device id to its measurement
//!     session. three actors drive it through a handful of operations:
//!     - the dashboard signals `start` (device should begin sampling)
//!     - the device polls `poll` for instructions, then calls `upload`
//!     - viewers call `poll` / `list` for the latest ready payload
//!
//! state machine (per session):
//!
//!         StartSignal              Upload
//!     Idle ────────────> Collecting ─────> Ready
//!       ^                    ^               │ age > threshold
//!       │     StartSignal    │               ▼ (lazy, computed on read)
//!       └────────────────────┴──────────── Stale
//!
//!     StartSignal always moves a session to Collecting and resets its
//!     payload, regardless of prior state. Upload is deliberately lenient:
//!     it accepts a payload from any state (late or unsolicited uploads
//!     still land), which matches device behavior in the field.
//!
//! concurrency:
//!     shared state behind arc<rwlock<>> in the style of the rest of the
//!     host: writers take the exclusive lock, readers get a consistent
//!     snapshot of a session, so a poll never observes a torn payload.
//!     staleness is recomputed lazily at read time against a monotonic
//!     clock; the stored state is never rewritten by a read.
//!
//! ==============================================================================

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use serde::Serialize;
use serde_json::Value;
use tokio::sync::RwLock;

use crate::domain::{EcgPayload, ValidationError};

/// Sessions in `Ready` older than this report as `Stale` (original relay
/// used 5 minutes); overridable through `hub.toml`.
pub const DEFAULT_STALE_AFTER: Duration = Duration::from_secs(300);

/// Stored per-session state. `Stale` is not stored: it is a view of `Ready`
/// computed lazily from the session's age at read time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionState {
    Idle,
    Collecting,
    Ready,
}

/// Logical status reported to callers, staleness already applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Idle,
    Collecting,
    Ready,
    Stale,
}

impl SessionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Collecting => "collecting",
            Self::Ready => "ready",
            Self::Stale => "stale",
        }
    }
}

/// What a poll observed. The API layer maps each variant to the advisory
/// message the device/dashboard expects.
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    /// id was unknown; a fresh idle session was created implicitly
    Initialized,
    Idle,
    Collecting,
    Stale,
    Ready(EcgPayload),
}

/// Per-device summary returned by `list`.
#[derive(Debug, Clone, Serialize)]
pub struct DeviceSummary {
    pub esp_id: String,
    pub status: SessionStatus,
    pub ready: bool,
    pub collecting: bool,
    pub last_update_ms: u64,
    pub seconds_ago: f64,
    pub has_data: bool,
}

/// Full diagnostic snapshot of one session (`debug` endpoint).
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub esp_id: String,
    pub status: SessionStatus,
    pub ready: bool,
    pub collecting: bool,
    pub last_update_ms: u64,
    pub seconds_since_update: f64,
    pub has_data: bool,
    pub data: Option<EcgPayload>,
}

struct Session {
    state: SessionState,
    payload: Option<EcgPayload>,
    /// monotonic instant of the last state-changing operation; reads never
    /// touch it, so polling is timing-neutral
    last_update: Instant,
    /// wall-clock mirror of `last_update` for display in list/debug output
    last_update_ms: u64,
}

impl Session {
    fn idle() -> Self {
        Self {
            state: SessionState::Idle,
            payload: None,
            last_update: Instant::now(),
            last_update_ms: now_ms(),
        }
    }

    fn collecting() -> Self {
        Self {
            state: SessionState::Collecting,
            payload: None,
            last_update: Instant::now(),
            last_update_ms: now_ms(),
        }
    }

    fn ready(payload: EcgPayload) -> Self {
        Self {
            state: SessionState::Ready,
            payload: Some(payload),
            last_update: Instant::now(),
            last_update_ms: now_ms(),
        }
    }
}

/// unix timestamp in milliseconds
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

// ==============================================================================
// registry - main public interface
// ==============================================================================

/// The session registry shared by every request handler. Cheap to clone:
/// all clones point at the same session map.
#[derive(Clone)]
pub struct DeviceRegistry {
    sessions: Arc<RwLock<HashMap<String, Session>>>,
    stale_after: Duration,
}

impl DeviceRegistry {
    pub fn new(stale_after: Duration) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            stale_after,
        }
    }

    /// Signal a device to begin sampling.
    ///
    /// Always succeeds and always lands in `Collecting`, resetting any
    /// previous payload: re-issuing while already collecting just restarts
    /// the measurement window.
    pub async fn start(&self, id: &str) {
        let mut sessions = self.sessions.write().await;
        sessions.insert(id.to_string(), Session::collecting());
    }

    /// Store a measurement uploaded by a device.
    ///
    /// Validation failures leave the registry untouched. A valid payload
    /// moves the session to `Ready` from *any* prior state (see module
    /// docs on leniency), creating the session if the id is unknown.
    pub async fn upload(&self, id: &str, raw: &Value) -> Result<EcgPayload, ValidationError> {
        let payload = EcgPayload::from_json(raw)?;
        let mut sessions = self.sessions.write().await;
        sessions.insert(id.to_string(), Session::ready(payload.clone()));
        Ok(payload)
    }

    /// Report the logical state of a session.
    ///
    /// Read-only with one exception: an unknown id is implicitly created in
    /// `Idle` so the device shows up in listings from its first contact.
    /// Never refreshes `last_update`.
    pub async fn poll(&self, id: &str) -> PollOutcome {
        {
            let sessions = self.sessions.read().await;
            if let Some(session) = sessions.get(id) {
                return self.outcome_of(session);
            }
        }

        // unknown id: upgrade to the write lock and create an idle session.
        // another request may have created it between the two locks, so
        // re-check before inserting.
        let mut sessions = self.sessions.write().await;
        match sessions.get(id) {
            Some(session) => self.outcome_of(session),
            None => {
                sessions.insert(id.to_string(), Session::idle());
                PollOutcome::Initialized
            }
        }
    }

    fn outcome_of(&self, session: &Session) -> PollOutcome {
        match session.state {
            SessionState::Idle => PollOutcome::Idle,
            SessionState::Collecting => PollOutcome::Collecting,
            SessionState::Ready => {
                if session.last_update.elapsed() > self.stale_after {
                    return PollOutcome::Stale;
                }
                match &session.payload {
                    Some(payload) => PollOutcome::Ready(payload.clone()),
                    // Ready implies a stored payload; treat a violation as idle
                    None => PollOutcome::Idle,
                }
            }
        }
    }

    fn status_of(&self, session: &Session) -> SessionStatus {
        match session.state {
            SessionState::Idle => SessionStatus::Idle,
            SessionState::Collecting => SessionStatus::Collecting,
            SessionState::Ready => {
                if session.last_update.elapsed() > self.stale_after {
                    SessionStatus::Stale
                } else {
                    SessionStatus::Ready
                }
            }
        }
    }

    /// Summaries for every registered session, staleness applied.
    pub async fn list(&self) -> Vec<DeviceSummary> {
        let sessions = self.sessions.read().await;
        sessions
            .iter()
            .map(|(id, session)| DeviceSummary {
                esp_id: id.clone(),
                status: self.status_of(session),
                ready: session.state == SessionState::Ready,
                collecting: session.state == SessionState::Collecting,
                last_update_ms: session.last_update_ms,
                seconds_ago: session.last_update.elapsed().as_secs_f64(),
                has_data: session.payload.is_some(),
            })
            .collect()
    }

    /// Remove one session. Idempotent: returns whether it existed.
    pub async fn clear(&self, id: &str) -> bool {
        let mut sessions = self.sessions.write().await;
        sessions.remove(id).is_some()
    }

    /// Remove every session, returning how many existed beforehand.
    pub async fn clear_all(&self) -> usize {
        let mut sessions = self.sessions.write().await;
        let count = sessions.len();
        sessions.clear();
        count
    }

    /// Number of registered sessions (health endpoint).
    pub async fn count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Full diagnostic snapshot of one session, or `None` if unknown.
    /// Unlike `poll`, an unknown id is *not* auto-created here.
    pub async fn debug_snapshot(&self, id: &str) -> Option<SessionSnapshot> {
        let sessions = self.sessions.read().await;
        sessions.get(id).map(|session| SessionSnapshot {
            esp_id: id.to_string(),
            status: self.status_of(session),
            ready: session.state == SessionState::Ready,
            collecting: session.state == SessionState::Collecting,
            last_update_ms: session.last_update_ms,
            seconds_since_update: session.last_update.elapsed().as_secs_f64(),
            has_data: session.payload.is_some(),
            data: session.payload.clone(),
        })
    }
}

impl Default for DeviceRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_STALE_AFTER)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn valid_payload() -> Value {
        json!({
            "hr": 71.2,
            "spo2": 98.4,
            "ecg": [0.0, 0.4, 1.1, 0.4, 0.0],
            "rest_ecg": 0,
        })
    }

    #[tokio::test]
    async fn unknown_id_polls_idle_and_is_listed() {
        let registry = DeviceRegistry::default();
        assert_eq!(registry.poll("esp32_01").await, PollOutcome::Initialized);

        let summaries = registry.list().await;
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].esp_id, "esp32_01");
        assert_eq!(summaries[0].status, SessionStatus::Idle);
        assert!(!summaries[0].has_data);

        // the session now exists, so a second poll is plain idle
        assert_eq!(registry.poll("esp32_01").await, PollOutcome::Idle);
    }

    #[tokio::test]
    async fn start_always_reports_collecting() {
        let registry = DeviceRegistry::default();

        registry.start("dev").await;
        assert_eq!(registry.poll("dev").await, PollOutcome::Collecting);

        // re-issue while already collecting: still collecting
        registry.start("dev").await;
        assert_eq!(registry.poll("dev").await, PollOutcome::Collecting);

        // start after ready resets the payload
        registry.upload("dev", &valid_payload()).await.unwrap();
        registry.start("dev").await;
        assert_eq!(registry.poll("dev").await, PollOutcome::Collecting);
        let summaries = registry.list().await;
        assert!(!summaries[0].has_data);
    }

    #[tokio::test]
    async fn upload_after_start_reports_ready_with_payload() {
        let registry = DeviceRegistry::default();
        registry.start("dev").await;

        let stored = registry.upload("dev", &valid_payload()).await.unwrap();
        match registry.poll("dev").await {
            PollOutcome::Ready(payload) => assert_eq!(payload, stored),
            other => panic!("expected ready, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn invalid_upload_leaves_state_unchanged() {
        let registry = DeviceRegistry::default();
        registry.start("dev").await;

        let err = registry
            .upload("dev", &json!({"hr": 70.0, "spo2": 96.0}))
            .await
            .unwrap_err();
        assert_eq!(err, ValidationError::MissingField("ecg"));

        assert_eq!(registry.poll("dev").await, PollOutcome::Collecting);
    }

    #[tokio::test]
    async fn unsolicited_upload_is_accepted() {
        // deliberate leniency: no prior start signal required
        let registry = DeviceRegistry::default();
        registry.upload("dev", &valid_payload()).await.unwrap();
        assert!(matches!(registry.poll("dev").await, PollOutcome::Ready(_)));
    }

    #[tokio::test]
    async fn ready_session_goes_stale_and_start_revives_it() {
        let registry = DeviceRegistry::new(Duration::from_millis(40));
        registry.upload("dev", &valid_payload()).await.unwrap();
        assert!(matches!(registry.poll("dev").await, PollOutcome::Ready(_)));

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(registry.poll("dev").await, PollOutcome::Stale);

        // staleness is a view, not a stored state: the summary still says
        // the session holds data
        let summaries = registry.list().await;
        assert_eq!(summaries[0].status, SessionStatus::Stale);
        assert!(summaries[0].ready);
        assert!(summaries[0].has_data);

        registry.start("dev").await;
        assert_eq!(registry.poll("dev").await, PollOutcome::Collecting);
    }

    #[tokio::test]
    async fn polling_does_not_refresh_last_update() {
        let registry = DeviceRegistry::new(Duration::from_millis(40));
        registry.upload("dev", &valid_payload()).await.unwrap();

        // keep polling across the threshold; the session must still expire
        for _ in 0..4 {
            tokio::time::sleep(Duration::from_millis(20)).await;
            registry.poll("dev").await;
        }
        assert_eq!(registry.poll("dev").await, PollOutcome::Stale);
    }

    #[tokio::test]
    async fn rest_ecg_is_derived_when_device_omits_it() {
        let registry = DeviceRegistry::default();
        let raw = json!({
            "hr": 70.0,
            "spo2": 96.0,
            "ecg": [0.0, 0.0, 0.0, 0.0, 10.0],
        });
        let stored = registry.upload("dev", &raw).await.unwrap();
        assert_eq!(stored.rest_ecg, 2);
    }

    #[tokio::test]
    async fn clear_all_reports_prior_count() {
        let registry = DeviceRegistry::default();
        registry.start("a").await;
        registry.start("b").await;
        registry.upload("c", &valid_payload()).await.unwrap();

        assert_eq!(registry.clear_all().await, 3);
        assert!(registry.list().await.is_empty());
        assert_eq!(registry.count().await, 0);
    }

    #[tokio::test]
    async fn clear_is_idempotent() {
        let registry = DeviceRegistry::default();
        registry.start("a").await;
        assert!(registry.clear("a").await);
        assert!(!registry.clear("a").await);
    }

    #[tokio::test]
    async fn concurrent_uploads_to_different_ids_are_independent() {
        let registry = DeviceRegistry::default();

        let mut handles = Vec::new();
        for i in 0..16 {
            let registry = registry.clone();
            handles.push(tokio::spawn(async move {
                let id = format!("esp32_{i:02}");
                let raw = json!({
                    "hr": 60.0 + i as f64,
                    "spo2": 95.0,
                    "ecg": [0.0, 1.0],
                });
                registry.upload(&id, &raw).await.unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        for i in 0..16 {
            let id = format!("esp32_{i:02}");
            match registry.poll(&id).await {
                PollOutcome::Ready(payload) => assert_eq!(payload.hr, 60.0 + i as f64),
                other => panic!("{id}: expected ready, got {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn debug_snapshot_does_not_create_sessions() {
        let registry = DeviceRegistry::default();
        assert!(registry.debug_snapshot("ghost").await.is_none());
        assert_eq!(registry.count().await, 0);

        registry.upload("dev", &valid_payload()).await.unwrap();
        let snapshot = registry.debug_snapshot("dev").await.unwrap();
        assert_eq!(snapshot.status, SessionStatus::Ready);
        assert!(snapshot.has_data);
        assert_eq!(snapshot.data.unwrap().spo2, 98.4);
    }
}
