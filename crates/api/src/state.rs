//! Application state

use std::sync::Arc;

use acerto_billing::{BillingService, BillingStore, InvariantChecker, PgBillingStore};
use acerto_shared::{Clock, SystemClock};
use sqlx::PgPool;

use crate::{auth::JwtManager, config::Config};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub jwt_manager: JwtManager,
    pub billing: BillingService,
    /// Needs SQL access; absent when running on the in-memory store
    pub invariants: Option<Arc<InvariantChecker>>,
}

impl AppState {
    pub fn new(pool: PgPool, config: Config) -> Self {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let tz = config.business_timezone;

        let store = Arc::new(PgBillingStore::new(pool.clone()));
        let invariants = InvariantChecker::new(pool, tz, clock.clone());

        tracing::info!(timezone = %tz, "Billing service initialized");

        Self {
            jwt_manager: JwtManager::new(&config.supabase_jwt_secret),
            billing: BillingService::new(store, clock, tz),
            invariants: Some(Arc::new(invariants)),
            config,
        }
    }

    /// State over an arbitrary store, without SQL invariant checks
    pub fn with_store(config: Config, store: Arc<dyn BillingStore>, clock: Arc<dyn Clock>) -> Self {
        let tz = config.business_timezone;
        Self {
            jwt_manager: JwtManager::new(&config.supabase_jwt_secret),
            billing: BillingService::new(store, clock, tz),
            invariants: None,
            config,
        }
    }
}
