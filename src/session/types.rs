use std::fmt::{Display, Formatter};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::settings::Settings;

pub type EntityId = String;

/// Body posted by the function runtime for every invocation.
#[derive(Default, Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct FunctionExecutionContext {
    #[serde(default)]
    pub caller_entity_profile: Option<EntityProfile>,
    #[serde(default)]
    pub title_authentication_context: Option<TitleAuthenticationContext>,
    #[serde(default)]
    pub generate_play_stream_event: Option<bool>,
    #[serde(default)]
    pub function_argument: Option<ServerArguments>,
}

#[derive(Default, Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ServerArguments {
    #[serde(default)]
    pub build_id: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
}

#[derive(Default, Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct EntityProfile {
    #[serde(default)]
    pub entity: Option<EntityKey>,
    #[serde(default)]
    pub display_name: Option<String>,
}

#[derive(Default, Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct EntityKey {
    pub id: EntityId,
    #[serde(default, rename = "Type")]
    pub kind: Option<String>,
}

#[derive(Default, Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct TitleAuthenticationContext {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub entity_token: Option<String>,
}

impl FunctionExecutionContext {
    /// Entity the session record belongs to: the calling player when present,
    /// otherwise the title entity that issued the call.
    pub fn caller_id(&self) -> Option<EntityId> {
        self.caller_entity_profile
            .as_ref()
            .and_then(|p| p.entity.as_ref())
            .map(|e| e.id.clone())
            .or_else(|| {
                self.title_authentication_context
                    .as_ref()
                    .and_then(|t| t.id.clone())
            })
            .filter(|id| !id.trim().is_empty())
    }
}

/// A validated invocation: both arguments present and a caller to key on.
#[derive(PartialEq, Debug, Clone)]
pub struct ServerCall {
    pub key: SessionKey,
    pub build_id: String,
    pub region: String,
}

#[derive(PartialEq, Debug, Clone, Hash, Eq, Default)]
pub struct SessionKey {
    pub title_id: String,
    pub entity_id: EntityId,
}

impl SessionKey {
    pub fn new(title_id: &str, entity_id: &str) -> SessionKey {
        SessionKey {
            title_id: title_id.to_string(),
            entity_id: entity_id.to_string(),
        }
    }
}

impl Display for SessionKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.title_id, self.entity_id)
    }
}

/// Stored document for one caller. Attributes other than `sessionId` are
/// carried through untouched.
#[derive(Default, Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SessionRecord {
    #[serde(rename = "sessionId", default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(flatten)]
    pub attributes: Map<String, Value>,
}

impl SessionRecord {
    pub fn with_session(session_id: &str) -> SessionRecord {
        SessionRecord {
            session_id: Some(session_id.to_string()),
            attributes: Default::default(),
        }
    }

    pub fn has_session(&self) -> bool {
        self.session_id.is_some()
    }

    /// Sets the session id unless one is already recorded. Returns whether
    /// the record changed.
    pub fn assign_session(&mut self, session_id: &str) -> bool {
        if self.has_session() {
            return false;
        }
        self.session_id = Some(session_id.to_string());
        true
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct ServerDetailsRequest {
    pub build_id: String,
    pub session_id: String,
    pub region: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct RequestServerRequest {
    pub build_id: String,
    pub session_id: String,
    pub preferred_regions: Vec<String>,
}

#[derive(Default, Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct EntityToken {
    pub entity_token: String,
    #[serde(default)]
    pub token_expiration: Option<String>,
}

#[derive(PartialEq, Debug, Clone, Copy, Eq, Serialize)]
pub enum UpstreamCall {
    GetEntityToken,
    GetMultiplayerServerDetails,
    RequestMultiplayerServer,
}

impl Display for UpstreamCall {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            UpstreamCall::GetEntityToken => "GetEntityToken",
            UpstreamCall::GetMultiplayerServerDetails => "GetMultiplayerServerDetails",
            UpstreamCall::RequestMultiplayerServer => "RequestMultiplayerServer",
        };
        f.write_str(name)
    }
}

#[derive(PartialEq, Debug, Clone, Copy, Eq)]
pub enum WriteCondition {
    Always,
    /// Only write when the stored record has no `sessionId` yet.
    SessionUnset,
}

#[derive(PartialEq, Debug, Clone)]
pub enum UpdateOutcome {
    Written,
    Conflict { existing: SessionRecord },
}

#[async_trait]
pub trait MultiplayerApi: Send + Sync {
    async fn get_entity_token(&self) -> anyhow::Result<EntityToken>;
    async fn get_server_details(
        &self,
        token: &EntityToken,
        request: &ServerDetailsRequest,
    ) -> anyhow::Result<Value>;
    async fn request_server(
        &self,
        token: &EntityToken,
        request: &RequestServerRequest,
    ) -> anyhow::Result<Value>;
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Returns an empty record when nothing is stored for the key.
    async fn get(&self, key: &SessionKey) -> anyhow::Result<SessionRecord>;
    async fn update(
        &self,
        key: &SessionKey,
        record: &SessionRecord,
        condition: WriteCondition,
    ) -> anyhow::Result<UpdateOutcome>;
}

pub trait BrokerContext: Send + Sync {
    fn multiplayer(&self) -> &dyn MultiplayerApi;
    fn sessions(&self) -> &dyn SessionStore;
    fn settings(&self) -> &Settings;
}
