use clap::Parser;
use std::time::Duration;

use crate::guard::FailurePolicy;

pub const MAX_BLOCK_WINDOW_SECS: u64 = 365 * 24 * 60 * 60;

// CLI argument structure. Every flag can also come from the environment,
// which is how the serverless deployments set them.
#[derive(Parser, Debug, Clone)]
#[command(name = "order-relay")]
#[command(about = "Relays landing-page checkouts to the storefront, ad platform and courier")]
pub struct Args {
    // Port to run the server on
    #[arg(short, long, env = "PORT", default_value_t = 8080)]
    pub port: u16,

    // Allowed CORS origins (comma-separated). Empty allows any origin.
    // Example: "https://shop.example.com,https://promo.example.com"
    #[arg(long, env = "ALLOWED_ORIGIN", default_value = "")]
    pub allowed_origins: String,

    // Storefront admin API
    #[arg(long, env = "SHOPIFY_STORE_DOMAIN", default_value = "")]
    pub shopify_store_domain: String,

    #[arg(long, env = "SHOPIFY_ADMIN_API_ACCESS_TOKEN", default_value = "", hide_env_values = true)]
    pub shopify_access_token: String,

    #[arg(long, env = "SHOPIFY_API_VERSION", default_value = "2025-01")]
    pub shopify_api_version: String,

    #[arg(long, env = "SHOPIFY_WEBHOOK_SECRET", hide_env_values = true)]
    pub shopify_webhook_secret: Option<String>,

    // Ad platform events API
    #[arg(long, env = "TIKTOK_PIXEL_ID", default_value = "")]
    pub tiktok_pixel_id: String,

    #[arg(long, env = "TIKTOK_ACCESS_TOKEN", default_value = "", hide_env_values = true)]
    pub tiktok_access_token: String,

    #[arg(
        long,
        env = "TIKTOK_EVENTS_URL",
        default_value = "https://business-api.tiktok.com/open_api/v1.3/event/track/"
    )]
    pub tiktok_events_url: String,

    // Courier
    #[arg(long, env = "STEADFAST_API_URL", default_value = "")]
    pub steadfast_api_url: String,

    #[arg(long, env = "STEADFAST_API_KEY", default_value = "", hide_env_values = true)]
    pub steadfast_api_key: String,

    #[arg(long, env = "STEADFAST_SECRET_KEY", default_value = "", hide_env_values = true)]
    pub steadfast_secret_key: String,

    #[arg(long, env = "DELIVERY_AREA", default_value = "Dhaka")]
    pub delivery_area: String,

    #[arg(long, env = "PICKUP_ADDRESS", default_value = "Default Pickup")]
    pub pickup_address: String,

    // Order defaults
    #[arg(long, env = "STORE_COUNTRY", default_value = "Bangladesh")]
    pub country: String,

    #[arg(long, env = "STORE_CURRENCY", default_value = "BDT")]
    pub currency: String,

    // Use x-forwarded-for / x-real-ip as the client address. Only safe behind
    // a proxy that overwrites them; otherwise the socket peer is used.
    #[arg(long, env = "TRUST_FORWARDED_FOR", default_value_t = false)]
    pub trust_forwarded_for: bool,

    // Duplicate-order block window in seconds, at most one year
    #[arg(
        long,
        env = "BLOCK_WINDOW_SECS",
        default_value_t = 86_400,
        value_parser = clap::value_parser!(u64).range(1..=MAX_BLOCK_WINDOW_SECS)
    )]
    pub block_window_secs: u64,

    // Treat every request without a device fingerprint as the same device
    #[arg(long, env = "BLOCK_ANONYMOUS_DEVICES_TOGETHER", default_value_t = false)]
    pub block_anonymous_devices_together: bool,

    // What to do when the block table can't be reached
    #[arg(long, env = "GUARD_FAILURE_POLICY", value_enum, default_value_t = FailurePolicy::Open)]
    pub guard_failure_policy: FailurePolicy,

    // Shared block table. Without it blocks only hold within one instance.
    #[arg(long, env = "REDIS_URL")]
    pub redis_url: Option<String>,

    #[arg(long, env = "REDIS_PREFIX", default_value = crate::guard::redis_store::DEFAULT_PREFIX)]
    pub redis_prefix: String,

    // How often the in-memory block table is compacted
    #[arg(long, env = "SWEEP_INTERVAL_SECS", default_value_t = 600)]
    pub sweep_interval_secs: u64,

    // Timeout for every outbound API call
    #[arg(long, env = "UPSTREAM_TIMEOUT_SECS", default_value_t = 15)]
    pub upstream_timeout_secs: u64,
}

impl Args {
    pub fn allowed_origins(&self) -> Vec<String> {
        self.allowed_origins
            .split(',')
            .map(|s| s.trim()) // remove spaces
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    }

    pub fn block_window(&self) -> Duration {
        Duration::from_secs(self.block_window_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }

    pub fn upstream_timeout(&self) -> Duration {
        Duration::from_secs(self.upstream_timeout_secs)
    }
}
