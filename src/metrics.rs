use lazy_static::lazy_static;
use prometheus::{
    Counter, CounterVec, Gauge, Histogram, register_counter, register_counter_vec,
    register_gauge, register_histogram,
};

lazy_static! {
    pub static ref REQUEST_TOTAL: CounterVec = register_counter_vec!(
        "relay_requests_total",
        "Total number of requests per endpoint",
        &["endpoint"]
    )
    .expect("metric can be registered");
    pub static ref ORDERS_CREATED: Counter =
        register_counter!("relay_orders_created_total", "Orders accepted by the storefront")
            .expect("metric can be registered");
    pub static ref ORDERS_BLOCKED: CounterVec = register_counter_vec!(
        "relay_orders_blocked_total",
        "Checkout attempts refused by the duplicate guard",
        &["reason"]
    )
    .expect("metric can be registered");
    pub static ref GUARD_STORE_FAILURES: Counter = register_counter!(
        "relay_guard_store_failures_total",
        "Block table reads/writes that failed"
    )
    .expect("metric can be registered");
    pub static ref WEBHOOKS_REJECTED: Counter = register_counter!(
        "relay_webhooks_rejected_total",
        "Webhooks dropped for a bad signature"
    )
    .expect("metric can be registered");
    pub static ref UPSTREAM_LATENCY: Histogram = register_histogram!(
        "relay_upstream_latency_seconds",
        "Latency of calls to storefront, ad platform and courier"
    )
    .expect("metric can be registered");
    pub static ref BLOCK_TABLE_SIZE: Gauge =
        register_gauge!("relay_block_table_size", "Entries in the in-memory block table")
            .expect("metric can be registered");
}
