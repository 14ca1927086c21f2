use std::ops::DerefMut;

use anyhow::anyhow;
use async_trait::async_trait;
use atomic_refcell::AtomicRefCell;
use serde_json::Value;

use crate::services::sessions::InMemorySessionStore;
use crate::session::types::{
    BrokerContext, EntityToken, MultiplayerApi, RequestServerRequest, ServerDetailsRequest,
    SessionKey, SessionRecord, SessionStore, UpdateOutcome, WriteCondition,
};
use crate::settings::Settings;

#[derive(PartialEq, Debug, Clone)]
pub enum RecordedCall {
    EntityToken,
    Details(ServerDetailsRequest),
    Request(RequestServerRequest),
}

impl RecordedCall {
    pub fn details(build_id: &str, session_id: &str, region: &str) -> RecordedCall {
        RecordedCall::Details(ServerDetailsRequest {
            build_id: build_id.to_string(),
            session_id: session_id.to_string(),
            region: region.to_string(),
        })
    }
}

/// PlayFab and session store stand-in that records every call.
pub struct MockContext {
    calls: AtomicRefCell<Vec<RecordedCall>>,
    token: AtomicRefCell<Result<EntityToken, String>>,
    details: AtomicRefCell<Result<Value, String>>,
    request: AtomicRefCell<Result<Value, String>>,
    sessions: InMemorySessionStore,
    writes: AtomicRefCell<usize>,
    store_fails: AtomicRefCell<bool>,
    claim: AtomicRefCell<Option<(SessionKey, String)>>,
    settings: Settings,
}

impl MockContext {
    pub fn new() -> Self {
        Self::with_settings(Settings::default())
    }

    pub fn with_settings(settings: Settings) -> Self {
        MockContext {
            calls: Default::default(),
            token: AtomicRefCell::new(Ok(EntityToken {
                entity_token: "entity-token".to_string(),
                token_expiration: None,
            })),
            details: AtomicRefCell::new(Ok(Value::Object(Default::default()))),
            request: AtomicRefCell::new(Ok(Value::Object(Default::default()))),
            sessions: Default::default(),
            writes: Default::default(),
            store_fails: Default::default(),
            claim: Default::default(),
            settings,
        }
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        std::mem::take(self.calls.borrow_mut().deref_mut())
    }

    pub fn writes(&self) -> usize {
        *self.writes.borrow()
    }

    pub fn token_returns(&self, result: Result<EntityToken, String>) {
        *self.token.borrow_mut() = result;
    }

    pub fn details_returns(&self, result: Result<Value, String>) {
        *self.details.borrow_mut() = result;
    }

    pub fn request_returns(&self, result: Result<Value, String>) {
        *self.request.borrow_mut() = result;
    }

    pub fn fail_store(&self) {
        *self.store_fails.borrow_mut() = true;
    }

    /// Simulates another invocation recording `session_id` between this
    /// invocation's read and write.
    pub fn claim_before_write(&self, key: &SessionKey, session_id: &str) {
        *self.claim.borrow_mut() = Some((key.clone(), session_id.to_string()));
    }

    pub async fn seed(&self, key: &SessionKey, record: SessionRecord) {
        self.sessions
            .update(key, &record, WriteCondition::Always)
            .await
            .unwrap();
    }

    pub async fn stored(&self, key: &SessionKey) -> SessionRecord {
        self.sessions.get(key).await.unwrap()
    }

    fn record(&self, call: RecordedCall) {
        self.calls.borrow_mut().push(call);
    }

    fn check_store(&self) -> anyhow::Result<()> {
        if *self.store_fails.borrow() {
            return Err(anyhow!("store unavailable"));
        }
        anyhow::Ok(())
    }
}

#[async_trait]
impl MultiplayerApi for MockContext {
    async fn get_entity_token(&self) -> anyhow::Result<EntityToken> {
        self.record(RecordedCall::EntityToken);
        self.token.borrow().clone().map_err(|e| anyhow!(e))
    }

    async fn get_server_details(
        &self,
        _: &EntityToken,
        request: &ServerDetailsRequest,
    ) -> anyhow::Result<Value> {
        self.record(RecordedCall::Details(request.clone()));
        self.details.borrow().clone().map_err(|e| anyhow!(e))
    }

    async fn request_server(
        &self,
        _: &EntityToken,
        request: &RequestServerRequest,
    ) -> anyhow::Result<Value> {
        self.record(RecordedCall::Request(request.clone()));
        self.request.borrow().clone().map_err(|e| anyhow!(e))
    }
}

#[async_trait]
impl SessionStore for MockContext {
    async fn get(&self, key: &SessionKey) -> anyhow::Result<SessionRecord> {
        self.check_store()?;
        self.sessions.get(key).await
    }

    async fn update(
        &self,
        key: &SessionKey,
        record: &SessionRecord,
        condition: WriteCondition,
    ) -> anyhow::Result<UpdateOutcome> {
        self.check_store()?;
        let claim = self.claim.borrow_mut().take();
        if let Some((claimed_key, session_id)) = claim {
            if &claimed_key == key {
                self.seed(key, SessionRecord::with_session(session_id.as_str()))
                    .await;
            }
        }
        *self.writes.borrow_mut() += 1;
        self.sessions.update(key, record, condition).await
    }
}

impl BrokerContext for MockContext {
    fn multiplayer(&self) -> &dyn MultiplayerApi {
        self
    }

    fn sessions(&self) -> &dyn SessionStore {
        self
    }

    fn settings(&self) -> &Settings {
        &self.settings
    }
}
