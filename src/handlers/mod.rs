mod client;
mod create_order;
mod get_order;
mod health;
mod manual_fire;
mod metrics;
mod order_paid;
mod shopify_webhook;

pub use client::{ClientMeta, DEVICE_HEADER};
pub use create_order::create_order_handler;
pub use get_order::get_order_handler;
pub use health::health_handler;
pub use manual_fire::manual_fire_handler;
pub use metrics::metrics_handler;
pub use order_paid::order_paid_handler;
pub use shopify_webhook::shopify_webhook_handler;
