use std::sync::Arc;

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use hyper::client::HttpConnector;
use hyper::header::CONTENT_TYPE;
use hyper::{Body, Client, Method, Request, StatusCode};
use hyper_rustls::HttpsConnector;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::session::types::{
    EntityToken, MultiplayerApi, RequestServerRequest, ServerDetailsRequest,
};
use crate::settings::Settings;

const SECRET_KEY_HEADER: &str = "X-SecretKey";
const ENTITY_TOKEN_HEADER: &str = "X-EntityToken";

/// REST client for the PlayFab authentication and multiplayer-server APIs.
pub struct PlayFabService {
    client: Arc<Client<HttpsConnector<HttpConnector>, Body>>,
    api_url: String,
    secret_key: String,
}

impl PlayFabService {
    pub fn new(settings: &Settings) -> Self {
        let https = hyper_rustls::HttpsConnectorBuilder::new()
            .with_native_roots()
            .https_or_http()
            .enable_http1()
            .build();
        PlayFabService {
            client: Arc::new(Client::builder().build(https)),
            api_url: settings.api_url.clone(),
            secret_key: settings.developer_secret_key.clone(),
        }
    }

    async fn call<T: Serialize>(
        &self,
        path: &str,
        auth: (&str, &str),
        payload: &T,
    ) -> anyhow::Result<Value> {
        let request = Request::builder()
            .method(Method::POST)
            .uri(format!("{}{}", self.api_url, path))
            .header(CONTENT_TYPE, "application/json")
            .header(auth.0, auth.1)
            .body(Body::from(serde_json::to_vec(payload)?))?;
        let response = self
            .client
            .request(request)
            .await
            .with_context(|| format!("{} is unreachable", path))?;
        let status = response.status();
        let buf = hyper::body::to_bytes(response.into_body()).await?;
        log::debug!("{} answered {}", path, status);
        unwrap_envelope(status, buf.as_ref())
    }
}

/// Extracts `data` from a PlayFab response, turning the error envelope into
/// an `Err` carrying PlayFab's error name and message.
fn unwrap_envelope(status: StatusCode, buf: &[u8]) -> anyhow::Result<Value> {
    let envelope: ApiEnvelope = match serde_json::from_slice(buf) {
        Ok(envelope) => envelope,
        Err(_) if !status.is_success() => return Err(anyhow!("HTTP {}", status)),
        Err(err) => return Err(err).context("Malformed PlayFab response"),
    };
    if let Some(error) = envelope.error {
        return Err(anyhow!(
            "{} ({}): {}",
            error,
            envelope.error_code.unwrap_or_default(),
            envelope.error_message.unwrap_or_default()
        ));
    }
    if !status.is_success() {
        return Err(anyhow!("HTTP {}", status));
    }
    envelope
        .data
        .ok_or_else(|| anyhow!("PlayFab response has no data"))
}

#[async_trait]
impl MultiplayerApi for PlayFabService {
    async fn get_entity_token(&self) -> anyhow::Result<EntityToken> {
        let data = self
            .call(
                "/Authentication/GetEntityToken",
                (SECRET_KEY_HEADER, self.secret_key.as_str()),
                &GetEntityTokenRequest::default(),
            )
            .await?;
        let token = serde_json::from_value(data).context("Unexpected entity token payload")?;
        anyhow::Ok(token)
    }

    async fn get_server_details(
        &self,
        token: &EntityToken,
        request: &ServerDetailsRequest,
    ) -> anyhow::Result<Value> {
        self.call(
            "/MultiplayerServer/GetMultiplayerServerDetails",
            (ENTITY_TOKEN_HEADER, token.entity_token.as_str()),
            request,
        )
        .await
    }

    async fn request_server(
        &self,
        token: &EntityToken,
        request: &RequestServerRequest,
    ) -> anyhow::Result<Value> {
        self.call(
            "/MultiplayerServer/RequestMultiplayerServer",
            (ENTITY_TOKEN_HEADER, token.entity_token.as_str()),
            request,
        )
        .await
    }
}

#[derive(Default, Serialize)]
#[serde(rename_all = "PascalCase")]
struct GetEntityTokenRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    custom_tags: Option<Value>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiEnvelope {
    #[serde(default)]
    data: Option<Value>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    error_code: Option<i64>,
    #[serde(default)]
    error_message: Option<String>,
}
