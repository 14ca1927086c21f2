use broker::services::playfab::PlayFabService;
use broker::services::sessions::InMemorySessionStore;
use broker::session::engine::SessionBroker;
use broker::session::types::{
    BrokerContext, EntityKey, EntityProfile, FunctionExecutionContext, MultiplayerApi,
    ServerArguments, SessionStore,
};
use broker::settings::Settings;
use broker::text_util::split_list;

const CONSOLE_PLAYER: &str = "console";

/// Reads `<buildId> <region> [entityId]` lines and prints what the function
/// would answer. Sessions live for the duration of the process.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();
    let app = ConsoleApp::new(Settings::from_env()?);
    let mut line = String::new();
    loop {
        line.clear();
        if std::io::stdin().read_line(&mut line)? == 0 || line.trim() == ":q" {
            break;
        }
        let words = split_list(line.as_str());
        if words.is_empty() {
            continue;
        }
        app.process(words).await;
    }
    anyhow::Ok(())
}

struct ConsoleApp {
    broker: SessionBroker,
    multiplayer: PlayFabService,
    sessions: InMemorySessionStore,
    settings: Settings,
}

impl ConsoleApp {
    fn new(settings: Settings) -> ConsoleApp {
        ConsoleApp {
            broker: Default::default(),
            multiplayer: PlayFabService::new(&settings),
            sessions: Default::default(),
            settings,
        }
    }

    async fn process(&self, words: Vec<String>) {
        let entity_id = words
            .get(2)
            .cloned()
            .unwrap_or_else(|| CONSOLE_PLAYER.to_string());
        let context = FunctionExecutionContext {
            caller_entity_profile: Some(EntityProfile {
                entity: Some(EntityKey {
                    id: entity_id,
                    kind: Some("title_player_account".to_string()),
                }),
                display_name: None,
            }),
            function_argument: Some(ServerArguments {
                build_id: words.first().cloned(),
                region: words.get(1).cloned(),
            }),
            ..Default::default()
        };
        match self.broker.handle(&context, self).await {
            Ok(value) => println!("{:#}", value),
            Err(err) => println!("null ({})", err),
        }
    }
}

impl BrokerContext for ConsoleApp {
    fn multiplayer(&self) -> &dyn MultiplayerApi {
        &self.multiplayer
    }

    fn sessions(&self) -> &dyn SessionStore {
        &self.sessions
    }

    fn settings(&self) -> &Settings {
        &self.settings
    }
}
