use async_trait::async_trait;
use reqwest::{Method, Url};
use serde::Serialize;
use serde_json::{Value, json};
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{AppError, UpstreamError};
use crate::models::{CheckoutForm, NumOrText};
use crate::phone::NormalizedPhone;
use crate::upstream::send_json;

/// Storefront admin operations the relay needs.
#[async_trait]
pub trait Storefront: Send + Sync {
    /// First customer matching a search query (`phone:+880...`, `email:...`)
    async fn search_customer(&self, query: &str) -> Result<Option<Value>, UpstreamError>;

    async fn create_customer(&self, customer: &NewCustomer) -> Result<Value, UpstreamError>;

    async fn create_order(&self, order: &NewOrder) -> Result<Value, UpstreamError>;

    async fn get_order(&self, order_id: &str) -> Result<Value, UpstreamError>;
}

pub struct ShopifyClient {
    client: reqwest::Client,
    base_url: String,
    access_token: String,
    timeout: Duration,
}

impl ShopifyClient {
    pub fn new(
        client: reqwest::Client,
        store_domain: &str,
        api_version: &str,
        access_token: &str,
        timeout: Duration,
    ) -> Self {
        // accept both "shop.myshopify.com" and a full url
        let domain = store_domain.trim().trim_end_matches('/');
        let base_url = if domain.starts_with("http") {
            format!("{domain}/admin/api/{api_version}")
        } else {
            format!("https://{domain}/admin/api/{api_version}")
        };

        Self {
            client,
            base_url,
            access_token: access_token.to_string(),
            timeout,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn call(
        &self,
        method: Method,
        url: Url,
        body: Option<Value>,
    ) -> Result<Value, UpstreamError> {
        let mut req = self
            .client
            .request(method, url)
            .header("X-Shopify-Access-Token", &self.access_token)
            .timeout(self.timeout);
        if let Some(body) = body {
            req = req.json(&body);
        }

        send_json("storefront", req).await
    }

    fn parse(&self, url: &str) -> Result<Url, UpstreamError> {
        Url::parse(url).map_err(|e| UpstreamError::Malformed(e.to_string()))
    }
}

#[async_trait]
impl Storefront for ShopifyClient {
    async fn search_customer(&self, query: &str) -> Result<Option<Value>, UpstreamError> {
        let url = Url::parse_with_params(&self.url("/customers/search.json"), &[("query", query)])
            .map_err(|e| UpstreamError::Malformed(e.to_string()))?;

        let json = self.call(Method::GET, url, None).await?;
        Ok(json["customers"]
            .as_array()
            .and_then(|customers| customers.first())
            .cloned())
    }

    async fn create_customer(&self, customer: &NewCustomer) -> Result<Value, UpstreamError> {
        let url = self.parse(&self.url("/customers.json"))?;
        let body = json!({ "customer": customer });

        let mut json = self.call(Method::POST, url, Some(body)).await?;
        match json.get_mut("customer").map(Value::take) {
            Some(customer) if customer.is_object() => Ok(customer),
            _ => Err(UpstreamError::Malformed("no customer in response".to_string())),
        }
    }

    async fn create_order(&self, order: &NewOrder) -> Result<Value, UpstreamError> {
        let url = self.parse(&self.url("/orders.json"))?;
        let body = json!({ "order": order });

        let mut json = self.call(Method::POST, url, Some(body)).await?;
        Ok(match json.get_mut("order").map(Value::take) {
            Some(order) if !order.is_null() => order,
            _ => json,
        })
    }

    async fn get_order(&self, order_id: &str) -> Result<Value, UpstreamError> {
        let url = self.parse(&self.url(&format!("/orders/{order_id}.json")))?;

        let mut json = self.call(Method::GET, url, None).await?;
        Ok(json
            .get_mut("order")
            .map(Value::take)
            .unwrap_or(Value::Null))
    }
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct PostalAddress {
    pub first_name: String,
    pub phone: String,
    pub address1: String,
    pub country: String,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct NewCustomer {
    pub first_name: String,
    pub email: String,
    pub phone: String,
    pub addresses: Vec<PostalAddress>,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct NewLineItem {
    pub variant_id: u64,
    pub quantity: u32,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct NewShippingLine {
    pub title: String,
    pub price: String,
    pub code: String,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct NewOrder {
    pub customer_id: Value,
    pub email: String,
    pub phone: String,
    pub line_items: Vec<NewLineItem>,
    pub shipping_address: PostalAddress,
    pub billing_address: PostalAddress,
    pub note: String,
    pub tags: String,
    pub financial_status: String,
    pub shipping_lines: Vec<NewShippingLine>,
}

/// A validated checkout form.
#[derive(Debug, Clone)]
pub struct Checkout {
    pub name: String,
    pub phone_input: String,
    pub phone: NormalizedPhone,
    pub address: String,
    pub note: String,
    pub delivery_charge: String,
    pub variant_id: u64,
}

fn required(value: Option<String>) -> Option<String> {
    value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

impl Checkout {
    pub fn from_form(form: CheckoutForm) -> Result<Self, AppError> {
        let name = required(form.name);
        let phone_input = required(form.phone);
        let address = required(form.address);
        let variant = form.variant_id.filter(|v| !v.is_blank());

        let (Some(name), Some(phone_input), Some(address), Some(variant)) =
            (name, phone_input, address, variant)
        else {
            return Err(AppError::Validation(
                "Missing required fields (name, phone, address, variant_id)".to_string(),
            ));
        };

        let variant_id = variant
            .as_u64()
            .ok_or_else(|| AppError::Validation("variant_id must be a number".to_string()))?;

        let phone = NormalizedPhone::parse(&phone_input);
        if phone.is_empty() {
            return Err(AppError::Validation("phone must contain digits".to_string()));
        }

        Ok(Self {
            name,
            phone_input,
            phone,
            address,
            note: form.note.unwrap_or_default().trim().to_string(),
            delivery_charge: form
                .delivery_charge
                .as_ref()
                .map(NumOrText::as_text)
                .unwrap_or_default(),
            variant_id,
        })
    }

    // Queries tried in order until one finds an existing customer
    pub fn customer_queries(&self) -> Vec<String> {
        let mut queries = vec![format!("phone:{}", self.phone.e164)];
        let local = self.phone.local();
        if !local.is_empty() {
            queries.push(format!("phone:{local}"));
        }
        queries.push(format!("email:{}", self.phone.fallback_email()));
        queries
    }

    /// Everything the customer typed, in one line for the fulfilment team.
    pub fn order_note(&self) -> String {
        [
            format!("নাম: {}", self.name),
            format!("ফোন: {}", self.phone_input),
            format!("ঠিকানা: {}", self.address),
            format!("কাস্টমার নোট: {}", self.note),
            format!("ডেলিভারি চার্জ: {}৳", self.delivery_charge),
        ]
        .join(" | ")
    }

    fn postal_address(&self, country: &str) -> PostalAddress {
        PostalAddress {
            first_name: self.name.clone(),
            phone: self.phone.e164.clone(),
            address1: self.address.clone(),
            country: country.to_string(),
        }
    }

    pub fn new_customer(&self, country: &str) -> NewCustomer {
        NewCustomer {
            first_name: self.name.clone(),
            email: self.phone.fallback_email(),
            phone: self.phone.e164.clone(),
            addresses: vec![self.postal_address(country)],
        }
    }

    pub fn new_order(&self, customer_id: Value, country: &str) -> NewOrder {
        let shipping_price = self.delivery_charge.parse::<f64>().unwrap_or(0.0);

        NewOrder {
            customer_id,
            email: self.phone.fallback_email(),
            phone: self.phone.e164.clone(),
            line_items: vec![NewLineItem {
                variant_id: self.variant_id,
                quantity: 1,
            }],
            shipping_address: self.postal_address(country),
            billing_address: self.postal_address(country),
            note: self.order_note(),
            tags: format!("LandingPage, Delivery-{}", self.delivery_charge),
            financial_status: "pending".to_string(),
            shipping_lines: vec![NewShippingLine {
                title: "Delivery Charge".to_string(),
                price: format!("{shipping_price:.2}"),
                code: "CUSTOM_DELIVERY".to_string(),
            }],
        }
    }
}

/// Find the customer for this checkout, creating one if nobody matches.
pub async fn find_or_create_customer(
    storefront: &dyn Storefront,
    checkout: &Checkout,
    country: &str,
) -> Result<Value, AppError> {
    for query in checkout.customer_queries() {
        match storefront.search_customer(&query).await {
            Ok(Some(customer)) => {
                debug!(query = %query, "Found existing customer");
                return Ok(customer);
            }
            Ok(None) => {}
            // a failed search only means we fall through to creating one
            Err(e) => warn!(query = %query, error = %e, "Customer search failed"),
        }
    }

    storefront
        .create_customer(&checkout.new_customer(country))
        .await
        .map_err(AppError::upstream("Failed creating customer"))
}
