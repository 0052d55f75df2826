//! Duplicate-submission guard.
//!
//! Remembers when the last order was accepted for a phone number, client
//! address or device fingerprint, and rejects new checkout attempts from any
//! of those identities until the suppression window has passed.
//!
//! The handler drives it in two steps:
//! - [`Guard::check`] before calling the storefront
//! - [`Guard::record_all`] only after the storefront accepted the order
//!
//! Nothing is recorded for attempts that fail or are abandoned midway, so a
//! retry after a transient upstream error goes through.

pub mod clock;
pub mod redis_store;
pub mod store;

use sha2::{Digest, Sha256};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, warn};

use crate::metrics::GUARD_STORE_FAILURES;
use clock::Clock;
use store::{StoreError, SuppressionStore};

// Shared device key used only when anonymous devices are blocked together
pub const ANONYMOUS_DEVICE: &str = "unknown-device";

/// Window length in clock milliseconds, saturating for absurdly long windows.
pub fn window_ms(window: Duration) -> i64 {
    i64::try_from(window.as_millis()).unwrap_or(i64::MAX)
}

pub const DEFAULT_WINDOW: Duration = Duration::from_secs(24 * 60 * 60);

// What to do when the backing store can't be reached
#[derive(clap::ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// Let the order through and count the failure
    #[default]
    Open,
    /// Refuse the order with a reason distinct from a duplicate
    Closed,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum IdentityKey {
    Phone(String),
    Ip(String),
    Device(String),
}

impl IdentityKey {
    /// Device key from a client-supplied fingerprint, hashed so arbitrary
    /// client input never becomes an unbounded store key.
    pub fn device(fingerprint: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(fingerprint.as_bytes());
        IdentityKey::Device(format!("{:x}", hasher.finalize()))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            IdentityKey::Phone(_) => "phone",
            IdentityKey::Ip(_) => "ip",
            IdentityKey::Device(_) => "device",
        }
    }
}

impl fmt::Display for IdentityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IdentityKey::Phone(digits) => write!(f, "phone:{digits}"),
            IdentityKey::Ip(addr) => write!(f, "ip:{addr}"),
            IdentityKey::Device(fp) => write!(f, "device:{fp}"),
        }
    }
}

/// All identity keys derived from one checkout request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdentityKeys(Vec<IdentityKey>);

impl IdentityKeys {
    /// `phone_digits` must already be normalized. A missing or blank
    /// fingerprint drops the device dimension unless
    /// `anonymous_devices_together` is set.
    pub fn from_request(
        phone_digits: &str,
        ip: Option<&str>,
        fingerprint: Option<&str>,
        anonymous_devices_together: bool,
    ) -> Self {
        let mut keys = Vec::with_capacity(3);

        if !phone_digits.is_empty() {
            keys.push(IdentityKey::Phone(phone_digits.to_string()));
        }

        if let Some(ip) = ip.map(str::trim).filter(|s| !s.is_empty()) {
            keys.push(IdentityKey::Ip(ip.to_string()));
        }

        match fingerprint.map(str::trim).filter(|s| !s.is_empty()) {
            Some(fp) => keys.push(IdentityKey::device(fp)),
            None if anonymous_devices_together => {
                keys.push(IdentityKey::Device(ANONYMOUS_DEVICE.to_string()))
            }
            None => {}
        }

        Self(keys)
    }

    pub fn iter(&self) -> impl Iterator<Item = &IdentityKey> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Allowed,
    Duplicate { key: IdentityKey },
    StoreUnavailable,
}

pub struct Guard {
    store: Arc<dyn SuppressionStore>,
    clock: Arc<dyn Clock>,
    window: Duration,
    failure_policy: FailurePolicy,
}

impl Guard {
    pub fn new(
        store: Arc<dyn SuppressionStore>,
        clock: Arc<dyn Clock>,
        window: Duration,
        failure_policy: FailurePolicy,
    ) -> Self {
        Self {
            store,
            clock,
            window,
            failure_policy,
        }
    }

    /// True while `now - recorded_at <= window`. An expired entry is removed
    /// on the way out.
    pub async fn is_blocked(&self, key: &IdentityKey) -> Result<bool, StoreError> {
        let key = key.to_string();

        let Some(recorded_at) = self.store.get(&key).await? else {
            return Ok(false);
        };

        let elapsed = self.clock.now_ms().saturating_sub(recorded_at);
        if elapsed > window_ms(self.window) {
            // the entry is dead either way, a failed delete just leaves it for the sweeper
            if let Err(e) = self.store.delete(&key).await {
                warn!(key = %key, error = %e, "Failed to drop expired block entry");
            }
            return Ok(false);
        }

        Ok(true)
    }

    /// Start (or restart) the window for `key` from now.
    pub async fn record_success(&self, key: &IdentityKey) -> Result<(), StoreError> {
        self.store
            .set(&key.to_string(), self.clock.now_ms(), self.window)
            .await
    }

    pub async fn check(&self, keys: &IdentityKeys) -> Decision {
        for key in keys.iter() {
            match self.is_blocked(key).await {
                Ok(true) => return Decision::Duplicate { key: key.clone() },
                Ok(false) => {}
                Err(e) => {
                    GUARD_STORE_FAILURES.inc();
                    match self.failure_policy {
                        FailurePolicy::Open => {
                            warn!(kind = key.kind(), error = %e, "Block lookup failed, allowing");
                        }
                        FailurePolicy::Closed => {
                            error!(kind = key.kind(), error = %e, "Block lookup failed, refusing");
                            return Decision::StoreUnavailable;
                        }
                    }
                }
            }
        }
        Decision::Allowed
    }

    // Only call once the external order exists. Failures are logged, the
    // order itself stands.
    pub async fn record_all(&self, keys: &IdentityKeys) {
        for key in keys.iter() {
            if let Err(e) = self.record_success(key).await {
                GUARD_STORE_FAILURES.inc();
                error!(kind = key.kind(), error = %e, "Failed to record block entry");
            }
        }
    }
}
