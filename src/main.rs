use std::sync::Arc;

use async_trait::async_trait;
use broker::function_srv::{FunctionHandler, FunctionServer};
use broker::services::playfab::PlayFabService;
use broker::services::sessions::{FileSessionStore, InMemorySessionStore};
use broker::session::engine::SessionBroker;
use broker::session::error::BrokerError;
use broker::session::types::{
    BrokerContext, FunctionExecutionContext, MultiplayerApi, SessionStore,
};
use broker::settings::Settings;
use serde_json::Value;

#[tokio::main]
async fn main() {
    env_logger::init();
    let settings = match Settings::from_env() {
        Ok(settings) => settings,
        Err(err) => {
            log::error!("Invalid configuration: {:#}", err);
            std::process::exit(1);
        }
    };
    let port = settings.port;
    let error_responses = settings.error_responses;
    let ctx = match create_context(settings).await {
        Ok(ctx) => ctx,
        Err(err) => {
            log::error!("Failed to initialise: {:#}", err);
            std::process::exit(1);
        }
    };
    log::info!(
        "Using title {}, preferred regions {:?}",
        ctx.settings.title_id,
        ctx.settings.preferred_regions
    );
    let server = Box::leak(Box::new(FunctionServer::new(
        error_responses,
        HandlerAdapter::new(ctx),
    )));
    if let Err(err) = server.start(port).await {
        log::error!("Server failed to start {}", err)
    }
}

struct HandlerAdapter {
    broker: SessionBroker,
    ctx: &'static dyn BrokerContext,
}

impl HandlerAdapter {
    pub fn new(ctx: &'static dyn BrokerContext) -> Arc<HandlerAdapter> {
        Arc::new(HandlerAdapter {
            broker: Default::default(),
            ctx,
        })
    }
}

#[async_trait]
impl FunctionHandler for HandlerAdapter {
    async fn invoke(&self, context: FunctionExecutionContext) -> Result<Value, BrokerError> {
        self.broker.handle(&context, self.ctx).await
    }
}

struct WebApplicationContext {
    multiplayer: PlayFabService,
    sessions: Box<dyn SessionStore>,
    settings: Settings,
}

impl BrokerContext for WebApplicationContext {
    fn multiplayer(&self) -> &dyn MultiplayerApi {
        &self.multiplayer
    }

    fn sessions(&self) -> &dyn SessionStore {
        self.sessions.as_ref()
    }

    fn settings(&self) -> &Settings {
        &self.settings
    }
}

async fn create_context(settings: Settings) -> anyhow::Result<&'static WebApplicationContext> {
    let sessions: Box<dyn SessionStore> = match &settings.session_store_dir {
        Some(dir) => Box::new(FileSessionStore::open(dir).await?),
        None => {
            log::warn!("SESSION_STORE_DIR is not set, sessions are kept in memory");
            Box::new(InMemorySessionStore::default())
        }
    };
    anyhow::Ok(Box::leak(Box::new(WebApplicationContext {
        multiplayer: PlayFabService::new(&settings),
        sessions,
        settings,
    })))
}
