use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    extract::ConnectInfo,
    http::{Request, StatusCode, header},
};
use clap::Parser;
use serde_json::{Value, json};
use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tower::ServiceExt;

use order_relay::config::Args;
use order_relay::error::UpstreamError;
use order_relay::guard::clock::ManualClock;
use order_relay::guard::store::{MemoryStore, StoreError, SuppressionStore};
use order_relay::guard::{DEFAULT_WINDOW, Guard};
use order_relay::router;
use order_relay::shopify::{NewCustomer, NewOrder, Storefront};
use order_relay::signature::sign_shopify_body;
use order_relay::state::AppState;
use order_relay::steadfast::{Consignment, Courier};
use order_relay::tiktok::{ConversionEvent, ConversionSink};

const WEBHOOK_SECRET: &str = "whsec_relay_test";

#[derive(Default)]
struct FakeStorefront {
    customers: Mutex<Vec<Value>>,
    orders: Mutex<Vec<NewOrder>>,
    searches: Mutex<Vec<String>>,
    // next N create_order calls fail
    failing_orders: AtomicUsize,
    next_id: AtomicU64,
}

#[async_trait]
impl Storefront for FakeStorefront {
    async fn search_customer(&self, query: &str) -> Result<Option<Value>, UpstreamError> {
        self.searches.lock().unwrap().push(query.to_string());
        Ok(self
            .customers
            .lock()
            .unwrap()
            .iter()
            .find(|c| query == format!("phone:{}", c["phone"].as_str().unwrap_or_default()))
            .cloned())
    }

    async fn create_customer(&self, customer: &NewCustomer) -> Result<Value, UpstreamError> {
        let id = 500 + self.next_id.fetch_add(1, Ordering::SeqCst);
        let created = json!({ "id": id, "phone": customer.phone, "first_name": customer.first_name });
        self.customers.lock().unwrap().push(created.clone());
        Ok(created)
    }

    async fn create_order(&self, order: &NewOrder) -> Result<Value, UpstreamError> {
        let failing = self.failing_orders.load(Ordering::SeqCst);
        if failing > 0 {
            self.failing_orders.store(failing - 1, Ordering::SeqCst);
            return Err(UpstreamError::Status {
                status: 502,
                body: Some(json!({ "errors": "upstream hiccup" })),
            });
        }
        self.orders.lock().unwrap().push(order.clone());
        let id = 9000 + self.next_id.fetch_add(1, Ordering::SeqCst);
        Ok(json!({ "id": id, "name": format!("#{id}") }))
    }

    async fn get_order(&self, order_id: &str) -> Result<Value, UpstreamError> {
        if order_id == "404" {
            return Err(UpstreamError::Status {
                status: 404,
                body: Some(json!({ "errors": "Not Found" })),
            });
        }
        Ok(json!({ "id": order_id.parse::<u64>().unwrap(), "financial_status": "pending" }))
    }
}

#[derive(Default)]
struct FakeSink {
    events: Mutex<Vec<ConversionEvent>>,
}

#[async_trait]
impl ConversionSink for FakeSink {
    async fn track(&self, event: &ConversionEvent) -> Result<Value, UpstreamError> {
        self.events.lock().unwrap().push(event.clone());
        Ok(json!({ "code": 0, "message": "OK" }))
    }
}

#[derive(Default)]
struct FakeCourier {
    consignments: Mutex<Vec<Consignment>>,
}

#[async_trait]
impl Courier for FakeCourier {
    async fn create_consignment(&self, consignment: &Consignment) -> Result<Value, UpstreamError> {
        self.consignments.lock().unwrap().push(consignment.clone());
        Ok(json!({ "status": 200, "consignment": { "tracking_code": "SF123" } }))
    }
}

struct BrokenStore;

#[async_trait]
impl SuppressionStore for BrokenStore {
    async fn get(&self, _key: &str) -> Result<Option<i64>, StoreError> {
        Err(StoreError("redis down".into()))
    }
    async fn set(&self, _key: &str, _at: i64, _ttl: Duration) -> Result<(), StoreError> {
        Err(StoreError("redis down".into()))
    }
    async fn delete(&self, _key: &str) -> Result<(), StoreError> {
        Err(StoreError("redis down".into()))
    }
}

struct Harness {
    app: Router,
    storefront: Arc<FakeStorefront>,
    sink: Arc<FakeSink>,
    courier: Arc<FakeCourier>,
    clock: Arc<ManualClock>,
}

fn harness_with(store: Arc<dyn SuppressionStore>, extra_args: &[&str]) -> Harness {
    let storefront = Arc::new(FakeStorefront::default());
    let sink = Arc::new(FakeSink::default());
    let courier = Arc::new(FakeCourier::default());
    let clock = Arc::new(ManualClock::new(1_700_000_000_000));

    let mut argv = vec!["order-relay", "--shopify-webhook-secret", WEBHOOK_SECRET];
    if !extra_args.contains(&"--allowed-origins") {
        argv.extend(["--allowed-origins", "https://shop.example.com"]);
    }
    argv.extend_from_slice(extra_args);
    let config = Args::parse_from(argv);

    let guard = Guard::new(
        store,
        clock.clone(),
        DEFAULT_WINDOW,
        config.guard_failure_policy,
    );

    let state = Arc::new(AppState {
        guard,
        storefront: storefront.clone(),
        conversions: sink.clone(),
        courier: courier.clone(),
        clock: clock.clone(),
        config,
    });

    Harness {
        app: router(state),
        storefront,
        sink,
        courier,
        clock,
    }
}

fn harness() -> Harness {
    harness_with(Arc::new(MemoryStore::new()), &[])
}

async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
    let res = app.clone().oneshot(req).await.unwrap();
    let status = res.status();
    let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
}

// Checkout arriving straight from `ip`, as the socket peer
fn checkout(phone: &str, ip: &str, body_extra: Value) -> Request<Body> {
    let mut body = json!({
        "name": "Rahim",
        "phone": phone,
        "address": "House 4, Mirpur, Dhaka",
        "note": "call before",
        "delivery_charge": 60,
        "variant_id": "4455"
    });
    if let (Some(obj), Some(extra)) = (body.as_object_mut(), body_extra.as_object()) {
        obj.extend(extra.clone());
    }

    let peer: IpAddr = ip.parse().unwrap();
    Request::post("/api/create-order")
        .header(header::CONTENT_TYPE, "application/json")
        .extension(ConnectInfo(SocketAddr::new(peer, 41_000)))
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn forwarded_for(mut req: Request<Body>, ip: &str) -> Request<Body> {
    req.headers_mut()
        .insert("x-forwarded-for", ip.parse().unwrap());
    req
}

#[tokio::test]
async fn creates_customer_and_order() {
    let h = harness();
    let (status, body) = send(&h.app, checkout("01711000001", "203.0.113.1", json!({}))).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["customer"]["phone"], "+8801711000001");
    assert!(body["order"]["id"].is_u64());

    let orders = h.storefront.orders.lock().unwrap();
    assert_eq!(orders.len(), 1);
    assert_eq!(orders[0].line_items[0].variant_id, 4455);
    assert_eq!(orders[0].shipping_lines[0].price, "60.00");
    assert_eq!(orders[0].financial_status, "pending");
}

#[tokio::test]
async fn existing_customer_is_reused() {
    let h = harness();
    h.storefront
        .customers
        .lock()
        .unwrap()
        .push(json!({ "id": 42, "phone": "+8801711000002" }));

    let (status, body) = send(&h.app, checkout("+880 1711 000002", "203.0.113.2", json!({}))).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["customer"]["id"], 42);
    assert_eq!(h.storefront.orders.lock().unwrap()[0].customer_id, json!(42));
    // found on the first query, nothing else tried
    assert_eq!(h.storefront.searches.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn missing_fields_are_rejected() {
    let h = harness();
    let req = Request::post("/api/create-order")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(json!({ "name": "Rahim", "phone": "01711000003" }).to_string()))
        .unwrap();

    let (status, body) = send(&h.app, req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Missing required fields (name, phone, address, variant_id)");
    assert!(h.storefront.orders.lock().unwrap().is_empty());
}

#[tokio::test]
async fn same_phone_in_another_format_is_blocked() {
    let h = harness();
    let (status, _) = send(&h.app, checkout("01711000004", "203.0.113.4", json!({}))).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(&h.app, checkout("+8801711000004", "198.51.100.4", json!({}))).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert!(body["error"].as_str().unwrap().contains("phone"));
    assert_eq!(h.storefront.orders.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn same_ip_is_blocked() {
    let h = harness();
    send(&h.app, checkout("01711000005", "203.0.113.5", json!({}))).await;

    let (status, body) = send(&h.app, checkout("01711999995", "203.0.113.5", json!({}))).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert!(body["error"].as_str().unwrap().contains("ip"));
}

#[tokio::test]
async fn rotating_forwarded_for_does_not_dodge_ip_block() {
    let h = harness();
    let first = forwarded_for(checkout("01711000020", "192.0.2.20", json!({})), "203.0.113.50");
    assert_eq!(send(&h.app, first).await.0, StatusCode::OK);

    let second = forwarded_for(checkout("01711999920", "192.0.2.20", json!({})), "203.0.113.51");
    let (status, body) = send(&h.app, second).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert!(body["error"].as_str().unwrap().contains("ip"));
}

#[tokio::test]
async fn forwarded_for_is_the_client_behind_a_trusted_proxy() {
    let h = harness_with(Arc::new(MemoryStore::new()), &["--trust-forwarded-for"]);

    // two shoppers behind the same proxy
    let a = forwarded_for(checkout("01711000021", "10.0.0.2", json!({})), "203.0.113.60");
    let b = forwarded_for(checkout("01711000022", "10.0.0.2", json!({})), "203.0.113.61");
    assert_eq!(send(&h.app, a).await.0, StatusCode::OK);
    assert_eq!(send(&h.app, b).await.0, StatusCode::OK);

    // same shopper through another proxy node
    let again = forwarded_for(checkout("01711999921", "10.0.0.3", json!({})), "203.0.113.60");
    let (status, body) = send(&h.app, again).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert!(body["error"].as_str().unwrap().contains("ip"));
}

#[tokio::test]
async fn same_device_is_blocked() {
    let h = harness();
    let first = checkout("01711000006", "203.0.113.6", json!({ "device_id": "fp-abc" }));
    assert_eq!(send(&h.app, first).await.0, StatusCode::OK);

    // fingerprint via header this time
    let mut second = checkout("01711999996", "198.51.100.6", json!({}));
    second
        .headers_mut()
        .insert("x-device-id", "fp-abc".parse().unwrap());
    let (status, body) = send(&h.app, second).await;

    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert!(body["error"].as_str().unwrap().contains("device"));
}

#[tokio::test]
async fn anonymous_devices_are_not_cross_blocked() {
    let h = harness();
    let (a, _) = send(&h.app, checkout("01711000007", "203.0.113.7", json!({}))).await;
    let (b, _) = send(&h.app, checkout("01711000008", "203.0.113.8", json!({}))).await;

    assert_eq!(a, StatusCode::OK);
    assert_eq!(b, StatusCode::OK);
}

#[tokio::test]
async fn anonymous_devices_block_together_when_configured() {
    let h = harness_with(
        Arc::new(MemoryStore::new()),
        &["--block-anonymous-devices-together"],
    );
    let (a, _) = send(&h.app, checkout("01711000009", "203.0.113.9", json!({}))).await;
    let (b, body) = send(&h.app, checkout("01711000010", "203.0.113.10", json!({}))).await;

    assert_eq!(a, StatusCode::OK);
    assert_eq!(b, StatusCode::TOO_MANY_REQUESTS);
    assert!(body["error"].as_str().unwrap().contains("device"));
}

#[tokio::test]
async fn failed_order_does_not_block_retry() {
    let h = harness();
    h.storefront.failing_orders.store(1, Ordering::SeqCst);

    let (status, body) = send(&h.app, checkout("01711000011", "203.0.113.11", json!({}))).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "Failed creating order");
    assert_eq!(body["details"]["errors"], "upstream hiccup");

    let (status, body) = send(&h.app, checkout("01711000011", "203.0.113.11", json!({}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
}

#[tokio::test]
async fn block_lifts_after_window() {
    let h = harness();
    send(&h.app, checkout("01711000012", "203.0.113.12", json!({}))).await;

    h.clock.advance(DEFAULT_WINDOW.as_millis() as i64);
    let (status, _) = send(&h.app, checkout("01711000012", "203.0.113.12", json!({}))).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);

    h.clock.advance(1);
    let (status, _) = send(&h.app, checkout("01711000012", "203.0.113.12", json!({}))).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn store_outage_fails_open_by_default() {
    let h = harness_with(Arc::new(BrokenStore), &[]);
    let (status, _) = send(&h.app, checkout("01711000013", "203.0.113.13", json!({}))).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn store_outage_fails_closed_with_distinct_reason() {
    let h = harness_with(Arc::new(BrokenStore), &["--guard-failure-policy", "closed"]);
    let (status, body) = send(&h.app, checkout("01711000014", "203.0.113.14", json!({}))).await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert!(!body["error"].as_str().unwrap().contains("already placed"));
    assert!(h.storefront.orders.lock().unwrap().is_empty());
}

#[tokio::test]
async fn cors_preflight_for_allowed_origin() {
    let h = harness();
    let req = Request::builder()
        .method("OPTIONS")
        .uri("/api/create-order")
        .header(header::ORIGIN, "https://shop.example.com")
        .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
        .body(Body::empty())
        .unwrap();

    let res = h.app.clone().oneshot(req).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(
        res.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
        "https://shop.example.com"
    );
}

#[tokio::test]
async fn without_configured_origins_only_lookup_is_open() {
    let h = harness_with(Arc::new(MemoryStore::new()), &["--allowed-origins", ""]);

    let mut order = checkout("01711000030", "192.0.2.30", json!({}));
    order
        .headers_mut()
        .insert(header::ORIGIN, "https://anywhere.example.com".parse().unwrap());
    let res = h.app.clone().oneshot(order).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert!(!res.headers().contains_key(header::ACCESS_CONTROL_ALLOW_ORIGIN));

    let lookup = Request::get("/api/get-order?order_id=9001")
        .header(header::ORIGIN, "https://anywhere.example.com")
        .body(Body::empty())
        .unwrap();
    let res = h.app.clone().oneshot(lookup).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
}

#[tokio::test]
async fn get_order_roundtrip() {
    let h = harness();

    let (status, body) = send(&h.app, Request::get("/api/get-order").body(Body::empty()).unwrap()).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "order_id missing");

    let (status, body) = send(
        &h.app,
        Request::get("/api/get-order?order_id=9001").body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["order"]["id"], 9001);

    let (status, body) = send(
        &h.app,
        Request::get("/api/get-order?order_id=404").body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "Failed to fetch order");
}

#[tokio::test]
async fn manual_fire_sends_complete_payment() {
    let h = harness();
    let req = Request::post("/api/manual-fire")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(
            json!({ "orderId": 1042, "totalPrice": "990", "ttclid": "click-1" }).to_string(),
        ))
        .unwrap();

    let (status, body) = send(&h.app, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["response"]["code"], 0);

    let events = h.sink.events.lock().unwrap();
    assert_eq!(events[0].event, "CompletePayment");
    assert_eq!(events[0].event_id, "manual_1042");
    assert_eq!(events[0].properties.value, 990.0);
    assert_eq!(events[0].properties.ttclid.as_deref(), Some("click-1"));
    assert_eq!(events[0].timestamp, 1_700_000_000);
}

#[tokio::test]
async fn manual_fire_requires_id_and_price() {
    let h = harness();
    let req = Request::post("/api/manual-fire")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(json!({ "orderId": 1042 }).to_string()))
        .unwrap();

    let (status, body) = send(&h.app, req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "orderId and totalPrice required");
    assert!(h.sink.events.lock().unwrap().is_empty());
}

#[tokio::test]
async fn order_paid_only_reports_paid_orders() {
    let h = harness();
    let post = |order: Value| {
        Request::post("/api/shopify-order-paid")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(order.to_string()))
            .unwrap()
    };

    let (status, body) = send(&h.app, post(json!({ "id": 1, "financial_status": "pending" }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["skipped"], true);
    assert!(h.sink.events.lock().unwrap().is_empty());

    let paid = json!({ "id": 2, "financial_status": "paid", "total_price": "1310.00" });
    let (status, body) = send(&h.app, post(paid)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);

    let events = h.sink.events.lock().unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event, "Purchase");
    assert_eq!(events[0].event_id, "order_2");
}

fn webhook(body: &str, signature: Option<&str>) -> Request<Body> {
    let mut req = Request::post("/api/shopify-webhook").header(header::CONTENT_TYPE, "application/json");
    if let Some(sig) = signature {
        req = req.header("x-shopify-hmac-sha256", sig);
    }
    req.body(Body::from(body.to_string())).unwrap()
}

#[tokio::test]
async fn webhook_with_valid_signature_dispatches_courier() {
    let h = harness();
    let order = json!({
        "id": 7001,
        "total_price": "1310.00",
        "note": "call before",
        "shipping_address": { "first_name": "Rahim", "phone": "+8801711000015", "address1": "Mirpur" },
        "line_items": [{ "title": "Panjabi", "quantity": 1 }]
    })
    .to_string();
    let sig = sign_shopify_body(WEBHOOK_SECRET, order.as_bytes()).unwrap();

    let (status, body) = send(&h.app, webhook(&order, Some(&sig))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["sent_to_steadfast"]["consignment"]["tracking_code"], "SF123");

    let sent = h.courier.consignments.lock().unwrap();
    assert_eq!(sent[0].invoice, "7001");
    assert_eq!(sent[0].recipient_phone, "+8801711000015");
    assert_eq!(sent[0].product_details, "Panjabi x1");
    assert_eq!(sent[0].cod_amount, 1310.0);
}

#[tokio::test]
async fn webhook_with_bad_signature_is_rejected() {
    let h = harness();
    let order = json!({ "id": 7002 }).to_string();
    let forged = sign_shopify_body("not-the-secret", order.as_bytes()).unwrap();

    let (status, body) = send(&h.app, webhook(&order, Some(&forged))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Unauthorized - HMAC Mismatch");

    let (status, _) = send(&h.app, webhook(&order, None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(h.courier.consignments.lock().unwrap().is_empty());
}

#[tokio::test]
async fn health_reports_ok() {
    let h = harness();
    let (status, body) = send(&h.app, Request::get("/health").body(Body::empty()).unwrap()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
}
