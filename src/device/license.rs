//! Expiry-based license gate.

use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};

use super::LicenseGate;

#[derive(Debug)]
struct Grant {
    expires_at: Option<DateTime<Utc>>,
    last_activity: Option<DateTime<Utc>>,
}

/// A license that is valid until a fixed instant.
///
/// The grant itself (how the expiry was obtained or verified) is outside this
/// type; it only tracks the expiry and the last time the user was active.
#[derive(Debug)]
pub struct ExpiryLicense {
    grant: Mutex<Grant>,
}

impl ExpiryLicense {
    pub fn new(expires_at: DateTime<Utc>) -> Self {
        Self {
            grant: Mutex::new(Grant {
                expires_at: Some(expires_at),
                last_activity: Some(Utc::now()),
            }),
        }
    }

    /// A license valid for `duration` from now.
    pub fn valid_for(duration: Duration) -> Self {
        Self::new(Utc::now() + duration)
    }

    /// A license that was never granted.
    pub fn none() -> Self {
        Self {
            grant: Mutex::new(Grant {
                expires_at: None,
                last_activity: None,
            }),
        }
    }

    fn grant(&self) -> std::sync::MutexGuard<'_, Grant> {
        self.grant.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.grant().expires_at
    }

    pub fn last_activity(&self) -> Option<DateTime<Utc>> {
        self.grant().last_activity
    }

    /// Time left before expiry. Zero once expired, `None` without a grant.
    pub fn remaining(&self) -> Option<Duration> {
        let expires_at = self.grant().expires_at?;
        Some((expires_at - Utc::now()).max(Duration::zero()))
    }

    /// Moves the expiry to a new instant.
    pub fn renew(&self, expires_at: DateTime<Utc>) {
        let mut grant = self.grant();
        grant.expires_at = Some(expires_at);
        grant.last_activity = Some(Utc::now());
        info!(%expires_at, "license renewed");
    }

    /// Clears the grant. The gate stays closed until renewed.
    pub fn revoke(&self) {
        let mut grant = self.grant();
        grant.expires_at = None;
        grant.last_activity = None;
        info!("license revoked");
    }
}

impl LicenseGate for ExpiryLicense {
    fn is_valid(&self) -> bool {
        let now = Utc::now();
        let mut grant = self.grant();
        match grant.expires_at {
            Some(expires_at) if now <= expires_at => {
                grant.last_activity = Some(now);
                true
            }
            Some(expires_at) => {
                warn!(%expires_at, "license expired");
                false
            }
            None => {
                debug!("no license granted");
                false
            }
        }
    }

    fn touch_activity(&self) {
        self.grant().last_activity = Some(Utc::now());
    }

    fn is_expired(&self) -> bool {
        self.grant()
            .expires_at
            .is_some_and(|expires_at| Utc::now() > expires_at)
    }
}
