use serde_json::Value;
use uuid::Uuid;

use crate::session::error::BrokerError;
use crate::session::types::*;
use crate::settings::Settings;
use crate::text_util::non_blank;

#[derive(Default)]
pub struct SessionBroker {}

struct CallContext<'a> {
    call: ServerCall,
    record: SessionRecord,
    token: EntityToken,
    app_context: &'a dyn BrokerContext,
}

impl<'a> CallContext<'a> {
    async fn open(
        call: ServerCall,
        app_context: &'a dyn BrokerContext,
    ) -> Result<CallContext<'a>, BrokerError> {
        let token = app_context
            .multiplayer()
            .get_entity_token()
            .await
            .map_err(|e| BrokerError::upstream(UpstreamCall::GetEntityToken, e))?;
        let record = app_context
            .sessions()
            .get(&call.key)
            .await
            .map_err(BrokerError::store)?;
        Ok(CallContext {
            call,
            record,
            token,
            app_context,
        })
    }

    async fn server_details(&self, session_id: String) -> Result<Value, BrokerError> {
        let request = ServerDetailsRequest {
            build_id: self.call.build_id.clone(),
            session_id,
            region: self.call.region.clone(),
        };
        log::debug!("Fetching details for {:?}", request);
        self.app_context
            .multiplayer()
            .get_server_details(&self.token, &request)
            .await
            .map_err(|e| BrokerError::upstream(UpstreamCall::GetMultiplayerServerDetails, e))
    }

    async fn request_server(&mut self) -> Result<Value, BrokerError> {
        let request = RequestServerRequest {
            build_id: self.call.build_id.clone(),
            session_id: Uuid::new_v4().to_string(),
            preferred_regions: self.app_context.settings().preferred_regions.clone(),
        };
        log::info!("Requesting server {:?}", request);
        let result = self
            .app_context
            .multiplayer()
            .request_server(&self.token, &request)
            .await
            .map_err(|e| BrokerError::upstream(UpstreamCall::RequestMultiplayerServer, e))?;
        let session_id = result["SessionId"]
            .as_str()
            .filter(|s| !s.is_empty())
            .unwrap_or(request.session_id.as_str());
        if self.record.assign_session(session_id) {
            self.store_progress().await?;
        }
        Ok(result)
    }

    async fn store_progress(&self) -> Result<(), BrokerError> {
        let outcome = self
            .app_context
            .sessions()
            .update(&self.call.key, &self.record, WriteCondition::SessionUnset)
            .await
            .map_err(BrokerError::store)?;
        if let UpdateOutcome::Conflict { existing } = outcome {
            log::warn!(
                "Session for {} was claimed concurrently by {:?}, {:?} is not recorded",
                self.call.key,
                existing.session_id,
                self.record.session_id
            );
        }
        Ok(())
    }

    async fn process(&mut self) -> Result<Value, BrokerError> {
        match self.record.session_id.clone() {
            Some(session_id) => self.server_details(session_id).await,
            None => self.request_server().await,
        }
    }
}

impl SessionBroker {
    /// Validates the invocation payload. Missing arguments are a typed
    /// condition rather than a runtime lookup failure. Calls that carry no
    /// caller identity share one title-scoped record.
    pub fn accept(
        &self,
        context: &FunctionExecutionContext,
        settings: &Settings,
    ) -> Result<ServerCall, BrokerError> {
        let args = context
            .function_argument
            .as_ref()
            .ok_or(BrokerError::ArgumentsMissing)?;
        match (
            non_blank(args.build_id.as_ref()),
            non_blank(args.region.as_ref()),
        ) {
            (Some(build_id), Some(region)) => Ok(ServerCall {
                key: SessionKey::new(
                    settings.title_id.as_str(),
                    context
                        .caller_id()
                        .unwrap_or_else(|| settings.title_id.clone())
                        .as_str(),
                ),
                build_id: build_id.to_string(),
                region: region.to_string(),
            }),
            _ => Err(BrokerError::ArgumentsMissing),
        }
    }

    pub async fn handle(
        &self,
        context: &FunctionExecutionContext,
        app_context: &dyn BrokerContext,
    ) -> Result<Value, BrokerError> {
        let call = self.accept(context, app_context.settings())?;
        let result = Self::run(call, app_context).await;
        if let Err(err) = &result {
            log::error!("{}", err);
        }
        result
    }

    async fn run(call: ServerCall, app_context: &dyn BrokerContext) -> Result<Value, BrokerError> {
        let mut ctx = CallContext::open(call, app_context).await?;
        ctx.process().await
    }
}
