use std::sync::Arc;
use tracing::{info, warn};

use crate::config::Args;
use crate::guard::clock::{Clock, SystemClock};
use crate::guard::redis_store::RedisStore;
use crate::guard::store::{MemoryStore, StoreError, SuppressionStore, sweeper};
use crate::guard::Guard;
use crate::shopify::{ShopifyClient, Storefront};
use crate::steadfast::{Courier, SteadfastClient};
use crate::tiktok::{ConversionSink, TikTokClient};

// app's shared state
pub struct AppState {
    pub guard: Guard,
    pub storefront: Arc<dyn Storefront>,
    pub conversions: Arc<dyn ConversionSink>,
    pub courier: Arc<dyn Courier>,
    pub clock: Arc<dyn Clock>,
    pub config: Args,
}

impl AppState {
    /// Wire the real clients from configuration. With no redis url the block
    /// table lives in memory and a sweeper task is spawned to compact it.
    pub async fn from_args(config: Args) -> Result<Arc<Self>, StoreError> {
        let client = reqwest::Client::new();
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let timeout = config.upstream_timeout();

        let store: Arc<dyn SuppressionStore> = match &config.redis_url {
            Some(url) => Arc::new(RedisStore::connect(url, &config.redis_prefix).await?),
            None => {
                warn!("No REDIS_URL set, duplicate-order blocks only hold within this instance");
                let memory = Arc::new(MemoryStore::new());
                tokio::spawn(sweeper(
                    memory.clone(),
                    clock.clone(),
                    config.block_window(),
                    config.sweep_interval(),
                ));
                memory as Arc<dyn SuppressionStore>
            }
        };

        if config.shopify_webhook_secret.is_none() {
            warn!("SHOPIFY_WEBHOOK_SECRET not set, courier webhook will refuse every call");
        }

        let guard = Guard::new(
            store,
            clock.clone(),
            config.block_window(),
            config.guard_failure_policy,
        );

        info!(
            window_secs = config.block_window_secs,
            policy = ?config.guard_failure_policy,
            anonymous_devices_together = config.block_anonymous_devices_together,
            "Duplicate-order guard ready"
        );

        let storefront = Arc::new(ShopifyClient::new(
            client.clone(),
            &config.shopify_store_domain,
            &config.shopify_api_version,
            &config.shopify_access_token,
            timeout,
        ));
        let conversions = Arc::new(TikTokClient::new(
            client.clone(),
            &config.tiktok_events_url,
            &config.tiktok_pixel_id,
            &config.tiktok_access_token,
            timeout,
        ));
        let courier = Arc::new(SteadfastClient::new(
            client,
            &config.steadfast_api_url,
            &config.steadfast_api_key,
            &config.steadfast_secret_key,
            timeout,
        ));

        Ok(Arc::new(Self {
            guard,
            storefront,
            conversions,
            courier,
            clock,
            config,
        }))
    }

    pub fn now_secs(&self) -> i64 {
        self.clock.now_ms() / 1000
    }
}
