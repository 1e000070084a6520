//! Purchase & Price Store.
//!
//! Keeps the price catalog fetched from the server and the purchases owned by
//! this installation. Purchases live in one of two sets: the live set (not
//! yet swept, possibly already past expiry) and the expired set (moved there
//! by exactly one call to [`PurchaseStore::expire`]).

use crate::authorization::Authorization;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Catalog entry, keyed by (class, distinguisher).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchasePrice {
    pub transaction_class: String,
    pub distinguisher: String,
    pub price: i64,
}

/// A purchase confirmed by the server.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Purchase {
    /// Server-assigned, unique across the store.
    pub transaction_id: String,
    pub transaction_class: String,
    pub distinguisher: String,
    pub server_time_expiry: Option<DateTime<Utc>>,
    /// Server expiry shifted onto the local clock.
    pub local_time_expiry: Option<DateTime<Utc>>,
    pub authorization: Option<Authorization>,
}

impl Purchase {
    /// The expiry that governs this purchase: local time when known,
    /// otherwise server time. `None` means the purchase never expires.
    pub fn controlling_expiry(&self) -> Option<DateTime<Utc>> {
        self.local_time_expiry.or(self.server_time_expiry)
    }

    /// Expired once `now` is strictly past the controlling expiry.
    ///
    /// At the expiry instant itself the purchase is still live, while its
    /// [`Authorization`] is already inactive. Sweeps report the purchase on
    /// the first call after that instant.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.controlling_expiry().is_some_and(|expiry| now > expiry)
    }

    /// Shift the server expiry onto the local clock.
    ///
    /// `server_time_diff_ms` is the server clock minus the local clock.
    pub fn set_local_expiry_from_server(&mut self, server_time_diff_ms: i64) {
        self.local_time_expiry = self
            .server_time_expiry
            .map(|t| t - chrono::Duration::milliseconds(server_time_diff_ms));
    }

    pub fn iso8601_server_time_expiry(&self) -> Option<String> {
        self.server_time_expiry
            .map(|t| t.to_rfc3339_opts(SecondsFormat::Millis, true))
    }

    pub fn iso8601_local_time_expiry(&self) -> Option<String> {
        self.local_time_expiry
            .map(|t| t.to_rfc3339_opts(SecondsFormat::Millis, true))
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseStore {
    prices: Vec<PurchasePrice>,
    purchases: Vec<Purchase>,
    expired: Vec<Purchase>,
}

impl PurchaseStore {
    pub fn new() -> Self {
        Self::default()
    }

    // ========================================================================
    // Prices
    // ========================================================================

    /// The catalog, ordered by class then distinguisher.
    pub fn prices(&self) -> &[PurchasePrice] {
        &self.prices
    }

    pub fn price_for(&self, transaction_class: &str, distinguisher: &str) -> Option<i64> {
        self.prices
            .iter()
            .find(|p| p.transaction_class == transaction_class && p.distinguisher == distinguisher)
            .map(|p| p.price)
    }

    /// Replace the whole catalog.
    ///
    /// Entries are sorted; on a duplicate key the last entry wins.
    pub fn replace_prices(&mut self, prices: Vec<PurchasePrice>) {
        let mut catalog: Vec<PurchasePrice> = Vec::with_capacity(prices.len());
        for price in prices {
            match catalog.iter_mut().find(|p| {
                p.transaction_class == price.transaction_class
                    && p.distinguisher == price.distinguisher
            }) {
                Some(existing) => *existing = price,
                None => catalog.push(price),
            }
        }
        catalog.sort_by(|a, b| {
            (a.transaction_class.as_str(), a.distinguisher.as_str())
                .cmp(&(b.transaction_class.as_str(), b.distinguisher.as_str()))
        });
        self.prices = catalog;
    }

    // ========================================================================
    // Purchases
    // ========================================================================

    /// Live purchases, including ones past expiry that have not been swept.
    pub fn purchases(&self) -> &[Purchase] {
        &self.purchases
    }

    /// Purchases moved to the expired set by earlier sweeps.
    pub fn expired(&self) -> &[Purchase] {
        &self.expired
    }

    /// Live purchases that are not expired at `now`.
    pub fn active(&self, now: DateTime<Utc>) -> Vec<Purchase> {
        self.purchases
            .iter()
            .filter(|p| !p.is_expired(now))
            .cloned()
            .collect()
    }

    /// Every purchase the store knows of, live first.
    pub fn all(&self) -> impl Iterator<Item = &Purchase> {
        self.purchases.iter().chain(self.expired.iter())
    }

    /// Live purchase with the earliest controlling expiry.
    pub fn next_expiring(&self) -> Option<&Purchase> {
        self.purchases
            .iter()
            .filter(|p| p.controlling_expiry().is_some())
            .min_by_key(|p| p.controlling_expiry())
    }

    /// Record a confirmed purchase.
    ///
    /// A purchase with a known transaction ID replaces the stored one, so
    /// replaying a server confirmation is harmless.
    pub fn record(&mut self, purchase: Purchase) {
        self.expired
            .retain(|p| p.transaction_id != purchase.transaction_id);
        match self
            .purchases
            .iter_mut()
            .find(|p| p.transaction_id == purchase.transaction_id)
        {
            Some(existing) => *existing = purchase,
            None => self.purchases.push(purchase),
        }
    }

    /// Move every live purchase past its expiry into the expired set.
    ///
    /// Returns exactly the purchases moved by this call.
    pub fn expire(&mut self, now: DateTime<Utc>) -> Vec<Purchase> {
        let (newly_expired, live): (Vec<Purchase>, Vec<Purchase>) = self
            .purchases
            .drain(..)
            .partition(|p| p.is_expired(now));
        self.purchases = live;
        self.expired.extend(newly_expired.iter().cloned());
        newly_expired
    }

    /// Remove purchases by transaction ID from either set.
    ///
    /// Unknown IDs are ignored. Returns the purchases actually removed.
    pub fn remove<S: AsRef<str>>(&mut self, transaction_ids: &[S]) -> Vec<Purchase> {
        let wanted: HashSet<&str> = transaction_ids.iter().map(|s| s.as_ref()).collect();
        let mut removed = Vec::new();

        for set in [&mut self.purchases, &mut self.expired] {
            let (gone, kept): (Vec<Purchase>, Vec<Purchase>) = set
                .drain(..)
                .partition(|p| wanted.contains(p.transaction_id.as_str()));
            *set = kept;
            removed.extend(gone);
        }

        removed
    }

    /// Recompute every local expiry after the clock offset changed.
    pub fn rebase_local_expiries(&mut self, server_time_diff_ms: i64) {
        for purchase in self.purchases.iter_mut().chain(self.expired.iter_mut()) {
            purchase.set_local_expiry_from_server(server_time_diff_ms);
        }
    }
}
