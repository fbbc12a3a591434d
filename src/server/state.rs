use std::sync::Arc;

use crate::config::Config;
use crate::db::Pool;
use crate::discord::DiscordNotifier;
use crate::mailer::Mailer;

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub pool: Pool,
    pub config: Arc<Config>,
    pub mailer: Arc<dyn Mailer>,
    pub discord: Arc<dyn DiscordNotifier>,
}

impl AppState {
    pub fn new(
        pool: Pool,
        config: Config,
        mailer: Arc<dyn Mailer>,
        discord: Arc<dyn DiscordNotifier>,
    ) -> Self {
        Self {
            pool,
            config: Arc::new(config),
            mailer,
            discord,
        }
    }
}
