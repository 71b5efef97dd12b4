use std::num::NonZeroU32;
use std::sync::Arc;

use dispatch_config::AppConfig;
use dispatch_db::PgPool;
use governor::{Quota, RateLimiter};

/// Guards the SMS ingest endpoint: bank providers retry aggressively on
/// timeout, and a forwarding storm to managers should never be allowed
/// to amplify into one against us.
pub type SmsRateLimiter = RateLimiter<
    governor::state::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Arc<AppConfig>,
    pub http: reqwest::Client,
    pub sms_limiter: Arc<SmsRateLimiter>,
}

impl AppState {
    pub fn new(pool: PgPool, config: AppConfig) -> Self {
        let quota = Quota::per_second(NonZeroU32::new(20).unwrap());
        Self {
            pool,
            config: Arc::new(config),
            http: reqwest::Client::new(),
            sms_limiter: Arc::new(RateLimiter::direct(quota)),
        }
    }
}
