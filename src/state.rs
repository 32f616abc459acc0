use std::{sync::Arc, time::Duration};

use chrono::Utc;
use tokio::time::{MissedTickBehavior, interval};

use crate::{
    cart::CartStore,
    config::AppConfig,
    db::{DbPool, OrmConn, orm_from_pool},
    services::chat_service::ChatNotifier,
    sessions::SessionRegistry,
};

#[derive(Clone)]
pub struct AppState {
    pub pool: DbPool,
    pub orm: OrmConn,
    pub config: Arc<AppConfig>,
    pub sessions: SessionRegistry,
    pub carts: CartStore,
    pub chat: ChatNotifier,
}

impl AppState {
    pub fn new(pool: DbPool, config: AppConfig) -> Self {
        let orm = orm_from_pool(&pool);
        Self {
            pool,
            orm,
            config: Arc::new(config),
            sessions: SessionRegistry::new(),
            carts: CartStore::new(),
            chat: ChatNotifier::new(),
        }
    }

    /// Drops expired sessions with their carts, then anonymous carts idle
    /// for longer than a session may live. Returns `(sessions, carts)`.
    pub fn sweep_expired(&self) -> (usize, usize) {
        let expired = self.sessions.sweep_expired(Utc::now());
        let mut carts = expired
            .iter()
            .filter(|id| self.carts.discard(**id))
            .count();
        carts += self.carts.sweep_idle(self.config.session_ttl());
        (expired.len(), carts)
    }

    pub fn spawn_sweeper(&self, every: Duration) {
        let state = self.clone();
        tokio::spawn(async move {
            let mut ticker = interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let (sessions, carts) = state.sweep_expired();
                if sessions > 0 || carts > 0 {
                    tracing::debug!(sessions, carts, "expired sessions swept");
                }
            }
        });
    }
}
