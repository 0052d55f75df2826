use serde::{Deserialize, Serialize};

// Landing pages send numbers both as JSON numbers and as strings
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(untagged)]
pub enum NumOrText {
    Num(serde_json::Number),
    Text(String),
}

impl NumOrText {
    pub fn as_text(&self) -> String {
        match self {
            NumOrText::Num(n) => n.to_string(),
            NumOrText::Text(s) => s.trim().to_string(),
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            NumOrText::Num(n) => n.as_f64(),
            NumOrText::Text(s) => s.trim().parse().ok(),
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self {
            NumOrText::Num(n) => n.as_u64(),
            NumOrText::Text(s) => s.trim().parse().ok(),
        }
    }

    pub fn is_blank(&self) -> bool {
        matches!(self, NumOrText::Text(s) if s.trim().is_empty())
    }
}

// Checkout form posted by the landing page
#[derive(Deserialize, Clone, Debug, Default)]
pub struct CheckoutForm {
    pub name: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub note: Option<String>,
    pub delivery_charge: Option<NumOrText>,
    pub variant_id: Option<NumOrText>,
    // optional client fingerprint for the duplicate guard
    pub device_id: Option<String>,
}

#[derive(Deserialize, Debug)]
pub struct GetOrderQuery {
    pub order_id: Option<String>,
}

#[derive(Deserialize, Debug)]
pub struct ManualFireRequest {
    #[serde(rename = "orderId")]
    pub order_id: Option<NumOrText>,
    #[serde(rename = "totalPrice")]
    pub total_price: Option<NumOrText>,
    pub ttclid: Option<String>,
}

// The parts of a storefront order the webhooks read. Everything is
// optional because webhook payloads vary between topics.
#[derive(Deserialize, Serialize, Clone, Debug, Default)]
pub struct ShopifyOrder {
    pub id: Option<u64>,
    pub financial_status: Option<String>,
    pub order_status_url: Option<String>,
    pub customer: Option<CustomerRef>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub currency: Option<String>,
    pub total_price: Option<NumOrText>,
    pub note: Option<String>,
    #[serde(default)]
    pub line_items: Vec<LineItem>,
    pub shipping_address: Option<ShippingAddress>,
}

impl ShopifyOrder {
    pub fn is_paid(&self) -> bool {
        self.financial_status.as_deref() == Some("paid")
    }

    pub fn total(&self) -> f64 {
        self.total_price
            .as_ref()
            .and_then(NumOrText::as_f64)
            .unwrap_or(0.0)
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, Default)]
pub struct CustomerRef {
    pub id: Option<u64>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default)]
pub struct LineItem {
    pub product_id: Option<u64>,
    pub title: Option<String>,
    pub quantity: Option<u32>,
    pub price: Option<NumOrText>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default)]
pub struct ShippingAddress {
    pub first_name: Option<String>,
    pub phone: Option<String>,
    pub address1: Option<String>,
}
