use crate::{
    afk::AfkRegistry, audit::messages::RecentMessages, audit::voice::VoiceSessions,
    automod::SpamTracker, config::Config, streams::StreamTracker,
};
use bot_db::{BotDb, clans::ClanDb, pending::PendingDb, settings::SettingsDb};
use chrono::{DateTime, Utc};
use color_eyre::eyre::{Error, Result, WrapErr};
use std::{
    path::Path,
    sync::{Arc, atomic::AtomicBool},
};
use tokio::sync::RwLock;

/// The global state of the bot
/// Arc because I can't be arsed.
pub type State = Arc<RawAppState>;

pub struct RawAppState {
    pub config: Arc<RwLock<Config>>,
    /// Config file watcher that refreshes the config if it changes
    ///
    /// Attached to the app state to keep the watcher alive
    _watcher: notify::RecommendedWatcher,
    /// The path to the config file.
    /// This is to allow for reloading the config.
    pub config_path: Box<Path>,
    pub db: BotDb,
    pub settings: SettingsDb,
    pub clans: ClanDb,
    pub pending: PendingDb,
    pub afk: AfkRegistry,
    pub spam: SpamTracker,
    pub voice_sessions: VoiceSessions,
    pub streams: StreamTracker,
    pub recent_messages: RecentMessages,
    pub started_at: DateTime<Utc>,
    /// The online report goes out on the first `Ready` only, not on reconnects.
    pub announced_startup: AtomicBool,
}

impl RawAppState {
    pub fn new(config: Config, config_path: String) -> Result<RawAppState> {
        let db = BotDb::open(&config.database_path)?;
        let recent_messages = RecentMessages::new(config.message_cache_capacity);

        let config = Arc::new(RwLock::new(config));

        use notify::{
            Event, EventKind, RecursiveMode, Watcher,
            event::{AccessKind, AccessMode},
        };

        let config_clone = Arc::clone(&config);
        let reload_config_path = config_path.clone();
        let config_path: Box<Path> = Path::new(&config_path).into();

        let mut watcher = notify::recommended_watcher(move |res| match res {
            Ok(Event {
                kind: EventKind::Access(AccessKind::Close(AccessMode::Write)),
                ..
            }) => {
                tracing::info!("config changed, reloading...");

                config_clone.blocking_write().reload(&*reload_config_path);
            }
            Err(e) => tracing::error!("watch error: {:?}", e),
            _ => {}
        })
        .wrap_err("Failed to create file watcher")?;

        watcher
            .watch(&config_path, RecursiveMode::NonRecursive)
            .wrap_err("Failed to watch config file")?;

        Ok(RawAppState {
            config,
            _watcher: watcher,
            config_path,
            settings: SettingsDb::new(&db)?,
            clans: ClanDb::new(&db)?,
            pending: PendingDb::new(&db)?,
            db,
            afk: AfkRegistry::default(),
            spam: SpamTracker::default(),
            voice_sessions: VoiceSessions::default(),
            streams: StreamTracker::default(),
            recent_messages,
            started_at: Utc::now(),
            announced_startup: AtomicBool::new(false),
        })
    }
}

// User data, which is stored and accessible in all command invocations
pub type PoiseContext<'a> = poise::Context<'a, State, Error>;
