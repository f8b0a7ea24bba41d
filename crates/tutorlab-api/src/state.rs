//! Application state wiring all services together.
//!
//! AppState holds the concrete service instances used by both CLI and REST API.
//! Services are generic over repository/upstream/hasher traits, but AppState
//! pins them to the concrete infra implementations.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};

use tutorlab_core::chat::ChatService;
use tutorlab_core::clock::{Clock, SystemClock};
use tutorlab_core::directory::SessionDirectory;
use tutorlab_core::ledger::TurnLedger;
use tutorlab_core::relay::{ChatRelay, RelaySettings};
use tutorlab_core::scheduler::{ResetScheduler, Sweeper};
use tutorlab_core::service::{AuthService, ProgressService};
use tutorlab_core::topic::TopicCalendar;
use tutorlab_infra::config::{admin_password, upstream_api_key};
use tutorlab_infra::crypto::hash::Sha256PasswordHasher;
use tutorlab_infra::filesystem::{database_path, ensure_data_dir};
use tutorlab_infra::sqlite::message::SqliteMessageRepository;
use tutorlab_infra::sqlite::pool::{DatabasePool, database_url};
use tutorlab_infra::sqlite::session::SqliteSessionRepository;
use tutorlab_infra::sqlite::sweep::SqliteSweepRepository;
use tutorlab_infra::sqlite::user::SqliteUserRepository;
use tutorlab_infra::upstream::OpenAiCompatUpstream;
use tutorlab_types::config::AppConfig;

use crate::token_store::TokenStore;

/// Concrete type aliases for the service generics pinned to infra implementations.
pub type ConcreteChatService = ChatService<
    SqliteUserRepository,
    SqliteSessionRepository,
    SqliteMessageRepository,
    OpenAiCompatUpstream,
>;

pub type ConcreteProgressService =
    ProgressService<SqliteUserRepository, SqliteSessionRepository, SqliteMessageRepository>;

pub type ConcreteAuthService = AuthService<SqliteUserRepository, Sha256PasswordHasher>;

pub type ConcreteLedger = TurnLedger<SqliteSessionRepository, SqliteMessageRepository>;

pub type ConcreteScheduler = ResetScheduler<SqliteSessionRepository, SqliteSweepRepository>;

/// Secrets resolved from the environment at startup.
#[derive(Default)]
pub struct Secrets {
    pub upstream_api_key: Option<SecretString>,
    pub admin_password: Option<SecretString>,
}

impl Secrets {
    pub fn from_env(config: &AppConfig) -> Self {
        Self {
            upstream_api_key: upstream_api_key(config),
            admin_password: admin_password(config),
        }
    }
}

/// Shared application state holding all services.
///
/// Used by both CLI commands and REST API handlers.
#[derive(Clone)]
pub struct AppState {
    pub chat_service: Arc<ConcreteChatService>,
    pub progress_service: Arc<ConcreteProgressService>,
    pub auth_service: Arc<ConcreteAuthService>,
    pub ledger: Arc<ConcreteLedger>,
    pub scheduler: Arc<ConcreteScheduler>,
    pub tokens: Arc<TokenStore>,
    pub calendar: TopicCalendar,
    pub clock: Arc<dyn Clock>,
    pub config: Arc<AppConfig>,
    pub data_dir: PathBuf,
}

impl AppState {
    /// Initialize the application state: connect to DB, wire services.
    pub async fn init(data_dir: PathBuf, config: AppConfig) -> anyhow::Result<Self> {
        ensure_data_dir(&data_dir).await?;

        let db_path = database_path(&data_dir, &config.store);
        let db_pool = DatabasePool::connect(&database_url(&db_path), &config.store).await?;

        let secrets = Secrets::from_env(&config);
        Self::build(data_dir, config, db_pool, Arc::new(SystemClock), secrets)
    }

    /// Wire services over an open pool.
    pub fn build(
        data_dir: PathBuf,
        config: AppConfig,
        db_pool: DatabasePool,
        clock: Arc<dyn Clock>,
        secrets: Secrets,
    ) -> anyhow::Result<Self> {
        // Create repository instances
        let users = SqliteUserRepository::new(db_pool.clone());
        let sessions = SqliteSessionRepository::new(db_pool.clone());
        let messages = SqliteMessageRepository::new(db_pool.clone());
        let sweeps = SqliteSweepRepository::new(db_pool);

        let calendar = TopicCalendar::from_config(&config.experiment);
        let directory = Arc::new(SessionDirectory::new(sessions.clone(), Arc::clone(&clock)));
        let ledger = Arc::new(TurnLedger::new(
            sessions.clone(),
            messages,
            Arc::clone(&clock),
            Duration::from_millis(config.experiment.dedup_window_ms),
        ));

        let upstream = OpenAiCompatUpstream::from_config(&config.upstream, secrets.upstream_api_key)?;
        let relay = ChatRelay::new(Arc::new(upstream), RelaySettings::from(&config.upstream));

        let chat_service = ChatService::new(
            users.clone(),
            Arc::clone(&directory),
            Arc::clone(&ledger),
            relay,
            calendar.clone(),
            Arc::clone(&clock),
        );

        let progress_service = ProgressService::new(
            users.clone(),
            sessions.clone(),
            directory,
            Arc::clone(&ledger),
            calendar.clone(),
            Arc::clone(&clock),
        );

        let mut auth_service = AuthService::new(users, Sha256PasswordHasher::new());
        match &secrets.admin_password {
            Some(password) => {
                auth_service =
                    auth_service.with_admin(config.auth.admin_username.clone(), password.expose_secret());
            }
            None => tracing::info!(
                var = %config.auth.admin_password_env,
                "admin password not set; admin login disabled"
            ),
        }

        let sweeper = Arc::new(Sweeper::new(sessions, sweeps, Arc::clone(&clock)));
        let scheduler = ResetScheduler::new(sweeper, config.scheduler.hour, config.scheduler.minute);

        Ok(Self {
            chat_service: Arc::new(chat_service),
            progress_service: Arc::new(progress_service),
            auth_service: Arc::new(auth_service),
            ledger,
            scheduler: Arc::new(scheduler),
            tokens: Arc::new(TokenStore::init()),
            calendar,
            clock,
            config: Arc::new(config),
            data_dir,
        })
    }
}
