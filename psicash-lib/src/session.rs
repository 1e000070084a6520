//! The `PsiCash` session.
//!
//! A [`PsiCash`] value is the explicit session object: it starts
//! uninitialized, becomes usable through [`PsiCash::initialize`], and owns the
//! stores, the sync engine and the datastore from then on.
//!
//! # Concurrency
//!
//! Session state sits behind one `RwLock`. Queries take the read lock and
//! may run in parallel. Every mutation (refresh, purchase, sweep, removal,
//! metadata, reset) holds the write lock for its whole duration, HTTP round
//! trips included, so readers never see a half-applied change. A mutation
//! works on a clone of [`UserData`], writes it to the datastore, and only then
//! swaps it in.

use crate::authorization::{Authorization, AuthorizationRegistry};
use crate::config::{datastore_suffix_for, Config};
use crate::datastore::{Datastore, FileDatastore};
use crate::purchases::{Purchase, PurchasePrice};
use crate::status::Status;
use crate::sync::{append_psicash_param, RefreshOutcome, SyncEngine};
use crate::tokens::TokenType;
use crate::transport::HttpRequester;
use crate::user_data::UserData;
use crate::{PsiCashError, Result};
use chrono::Utc;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};

/// Outcome of [`PsiCash::new_expiring_purchase`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct NewExpiringPurchaseResponse {
    pub status: Status,
    /// The recorded purchase. Present iff `status` is `Success`.
    pub purchase: Option<Purchase>,
}

impl NewExpiringPurchaseResponse {
    fn declined(status: Status) -> Self {
        Self {
            status,
            purchase: None,
        }
    }
}

struct Session {
    config: Config,
    datastore: Box<dyn Datastore>,
    engine: SyncEngine,
    data: UserData,
}

impl Session {
    fn open(config: Config, requester: Arc<dyn HttpRequester>) -> Result<Self> {
        if config.user_agent.trim().is_empty() {
            return Err(PsiCashError::invalid_argument(
                "user_agent",
                "must not be empty",
            ));
        }

        let datastore = FileDatastore::open(&config.file_store_root, config.datastore_suffix())?;
        let data = UserData::load(&datastore)?;
        let engine = SyncEngine::new(
            requester,
            config.endpoint(),
            config.user_agent.clone(),
            config.retry.clone(),
        );

        Ok(Self {
            config,
            datastore: Box::new(datastore),
            engine,
            data,
        })
    }

    /// Persist `data`, then make it current.
    fn commit(&mut self, data: UserData) -> Result<()> {
        data.save(self.datastore.as_ref())?;
        self.data = data;
        Ok(())
    }

    fn earner_token(&self) -> Result<&str> {
        self.data
            .tokens
            .value(TokenType::Earner)
            .ok_or_else(|| PsiCashError::MissingTokens("no valid earner token".to_string()))
    }

    fn refresh(&mut self, purchase_classes: &[String]) -> Result<Status> {
        let mut data = self.data.clone();
        let mut minted = false;

        loop {
            if !data.tokens.any_valid() {
                if data.tokens.is_account() {
                    tracing::info!("account tokens are invalid; sign-in required");
                    self.commit(data)?;
                    return Ok(Status::InvalidTokens);
                }
                let issued = self.engine.new_tracker(&data.request_metadata)?;
                data.tokens.replace_all(issued, false);
                minted = true;
                // Freshly issued tokens are durable even if the refresh below fails.
                self.commit(data.clone())?;
            }

            let outcome =
                self.engine
                    .refresh_state(&data.tokens, purchase_classes, &data.request_metadata)?;

            match outcome {
                RefreshOutcome::ServerError => {
                    tracing::warn!("refresh-state returned a server error");
                    return Ok(Status::ServerError);
                }
                RefreshOutcome::InvalidTokens => {
                    data.tokens.invalidate_all();
                    if data.tokens.is_account() || minted {
                        self.commit(data)?;
                        return Ok(Status::InvalidTokens);
                    }
                    tracing::info!("tracker tokens rejected; requesting new ones");
                }
                RefreshOutcome::Refreshed(reply) => {
                    data.tokens.apply_validity(&reply.tokens_valid);
                    data.tokens.set_is_account(reply.is_account);

                    let invalid = data.tokens.invalid_token_types();
                    if !invalid.is_empty() {
                        if reply.is_account || minted {
                            tracing::info!(?invalid, "server reports invalid tokens");
                            self.commit(data)?;
                            return Ok(Status::InvalidTokens);
                        }
                        tracing::info!(?invalid, "tracker tokens expired; requesting new ones");
                        data.tokens.invalidate_all();
                        continue;
                    }

                    data.balance = reply.balance;
                    data.purchases.replace_prices(reply.prices);
                    if let Some(diff) = reply.server_time_diff_ms {
                        data.server_time_diff_ms = diff;
                        data.purchases.rebase_local_expiries(diff);
                    }
                    self.commit(data)?;

                    tracing::info!(
                        balance = self.data.balance,
                        prices = self.data.purchases.prices().len(),
                        is_account = self.data.tokens.is_account(),
                        "state refreshed"
                    );
                    return Ok(Status::Success);
                }
            }
        }
    }

    fn purchase(
        &mut self,
        transaction_class: &str,
        distinguisher: &str,
        expected_price: i64,
    ) -> Result<NewExpiringPurchaseResponse> {
        if transaction_class.is_empty() {
            return Err(PsiCashError::invalid_argument(
                "transaction_class",
                "must not be empty",
            ));
        }
        if distinguisher.is_empty() {
            return Err(PsiCashError::invalid_argument(
                "distinguisher",
                "must not be empty",
            ));
        }
        if expected_price < 0 {
            return Err(PsiCashError::invalid_argument(
                "expected_price",
                "must not be negative",
            ));
        }

        if let Some(cached) = self.data.purchases.price_for(transaction_class, distinguisher) {
            if cached != expected_price {
                tracing::info!(
                    transaction_class,
                    distinguisher,
                    cached,
                    expected_price,
                    "expected price differs from catalog"
                );
                return Ok(NewExpiringPurchaseResponse::declined(
                    Status::TransactionAmountMismatch,
                ));
            }
        }

        let Some(spender) = self.data.tokens.value(TokenType::Spender).map(str::to_string) else {
            tracing::info!("no valid spender token; purchase needs a refresh first");
            return Ok(NewExpiringPurchaseResponse::declined(Status::InvalidTokens));
        };

        let reply = self.engine.new_transaction(
            &spender,
            transaction_class,
            distinguisher,
            expected_price,
            &self.data.request_metadata,
        )?;

        match reply.status {
            Status::Success => {
                let confirmed = reply.confirmed.ok_or_else(|| {
                    PsiCashError::Internal("successful transaction without a body".to_string())
                })?;

                let mut data = self.data.clone();
                if let Some(diff) = reply.server_time_diff_ms {
                    data.server_time_diff_ms = diff;
                    data.purchases.rebase_local_expiries(diff);
                }
                if let Some(balance) = confirmed.balance {
                    data.balance = balance;
                }

                let mut purchase = Purchase {
                    transaction_id: confirmed.transaction_id,
                    transaction_class: transaction_class.to_string(),
                    distinguisher: distinguisher.to_string(),
                    server_time_expiry: confirmed.server_time_expiry,
                    local_time_expiry: None,
                    authorization: confirmed.authorization,
                };
                purchase.set_local_expiry_from_server(data.server_time_diff_ms);
                data.purchases.record(purchase.clone());
                self.commit(data)?;

                tracing::info!(
                    transaction_id = %purchase.transaction_id,
                    transaction_class,
                    distinguisher,
                    "purchase recorded"
                );
                Ok(NewExpiringPurchaseResponse {
                    status: Status::Success,
                    purchase: Some(purchase),
                })
            }
            Status::InvalidTokens => {
                let mut data = self.data.clone();
                data.tokens.invalidate_all();
                self.commit(data)?;
                Ok(NewExpiringPurchaseResponse::declined(Status::InvalidTokens))
            }
            status => Ok(NewExpiringPurchaseResponse::declined(status)),
        }
    }
}

/// A PsiCash session.
///
/// # Example
///
/// ```no_run
/// use psicash_lib::{HttpParams, HttpResult, PsiCash};
/// use std::sync::Arc;
///
/// let requester = Arc::new(|_: &HttpParams| HttpResult::recoverable("offline"));
/// let psicash = PsiCash::new();
/// psicash
///     .initialize("MyApp/1.0", "/var/lib/myapp/psicash", requester, false)
///     .unwrap();
/// assert_eq!(psicash.balance().unwrap(), 0);
/// ```
pub struct PsiCash {
    state: RwLock<Option<Session>>,
}

impl Default for PsiCash {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for PsiCash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PsiCash")
            .field("initialized", &self.initialized())
            .finish()
    }
}

impl PsiCash {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(None),
        }
    }

    fn read<T>(&self, f: impl FnOnce(&Session) -> Result<T>) -> Result<T> {
        let guard = self.state.read().unwrap_or_else(|e| e.into_inner());
        let session = guard.as_ref().ok_or(PsiCashError::NotInitialized)?;
        f(session)
    }

    fn write<T>(&self, f: impl FnOnce(&mut Session) -> Result<T>) -> Result<T> {
        let mut guard = self.state.write().unwrap_or_else(|e| e.into_inner());
        let session = guard.as_mut().ok_or(PsiCashError::NotInitialized)?;
        f(session)
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Initialize against `file_store_root`, loading any persisted state.
    ///
    /// Calling this again replaces the current session.
    ///
    /// # Errors
    ///
    /// Critical error if the root is unusable or the persisted state is
    /// unreadable. Recover with [`PsiCash::reset`].
    pub fn initialize(
        &self,
        user_agent: &str,
        file_store_root: impl Into<PathBuf>,
        requester: Arc<dyn HttpRequester>,
        test: bool,
    ) -> Result<()> {
        self.initialize_with_config(Config::new(user_agent, file_store_root, test), requester)
    }

    pub fn initialize_with_config(
        &self,
        config: Config,
        requester: Arc<dyn HttpRequester>,
    ) -> Result<()> {
        let mut guard = self.state.write().unwrap_or_else(|e| e.into_inner());
        let session = Session::open(config, requester)
            .inspect_err(|e| tracing::error!(error = %e, "initialize failed"))?;

        tracing::info!(
            root = %session.config.file_store_root.display(),
            test = session.config.test,
            valid_tokens = ?session.data.tokens.valid_token_types(),
            purchases = session.data.purchases.purchases().len(),
            "PsiCash initialized"
        );
        *guard = Some(session);
        Ok(())
    }

    /// Wipe all persisted state under `file_store_root`.
    ///
    /// An initialized session continues with empty stores on that root,
    /// keeping its transport and user agent. An uninitialized one stays
    /// uninitialized.
    pub fn reset(&self, file_store_root: impl Into<PathBuf>, test: bool) -> Result<()> {
        let file_store_root = file_store_root.into();
        let mut guard = self.state.write().unwrap_or_else(|e| e.into_inner());

        FileDatastore::open(&file_store_root, datastore_suffix_for(test))?.clear()?;

        if let Some(current) = guard.as_ref() {
            let mut config = current.config.clone();
            config.file_store_root = file_store_root.clone();
            config.test = test;
            let requester = current.engine.requester();
            *guard = Some(Session::open(config, requester)?);
        }

        tracing::info!(
            root = %file_store_root.display(),
            test,
            initialized = guard.is_some(),
            "PsiCash reset"
        );
        Ok(())
    }

    pub fn initialized(&self) -> bool {
        self.state
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .is_some()
    }

    /// Attach a key/value echoed in the metadata of every later request.
    pub fn set_request_metadata_item(&self, key: &str, value: &str) -> Result<()> {
        if key.is_empty() {
            return Err(PsiCashError::invalid_argument("key", "must not be empty"));
        }
        self.write(|session| {
            let mut data = session.data.clone();
            data.request_metadata
                .insert(key.to_string(), value.to_string());
            session.commit(data)
        })
    }

    // ========================================================================
    // Queries
    // ========================================================================

    pub fn valid_token_types(&self) -> Result<Vec<TokenType>> {
        self.read(|s| Ok(s.data.tokens.valid_token_types()))
    }

    pub fn is_account(&self) -> Result<bool> {
        self.read(|s| Ok(s.data.tokens.is_account()))
    }

    /// Last balance reported by the server.
    pub fn balance(&self) -> Result<i64> {
        self.read(|s| Ok(s.data.balance))
    }

    pub fn get_purchase_prices(&self) -> Result<Vec<PurchasePrice>> {
        self.read(|s| Ok(s.data.purchases.prices().to_vec()))
    }

    /// Every purchase not yet swept by [`PsiCash::expire_purchases`].
    pub fn get_purchases(&self) -> Result<Vec<Purchase>> {
        self.read(|s| Ok(s.data.purchases.purchases().to_vec()))
    }

    pub fn active_purchases(&self) -> Result<Vec<Purchase>> {
        self.read(|s| Ok(s.data.purchases.active(Utc::now())))
    }

    pub fn expired_purchases(&self) -> Result<Vec<Purchase>> {
        self.read(|s| Ok(s.data.purchases.expired().to_vec()))
    }

    pub fn get_authorizations(&self, active_only: bool) -> Result<Vec<Authorization>> {
        self.read(|s| {
            let registry = AuthorizationRegistry::index(s.data.purchases.all());
            Ok(registry.authorizations(active_only, Utc::now()))
        })
    }

    pub fn get_purchases_by_authorization_id<S: AsRef<str>>(
        &self,
        authorization_ids: &[S],
    ) -> Result<Vec<Purchase>> {
        self.read(|s| {
            let registry = AuthorizationRegistry::index(s.data.purchases.all());
            Ok(registry.purchases_by_authorization_id(authorization_ids))
        })
    }

    pub fn next_expiring_purchase(&self) -> Result<Option<Purchase>> {
        self.read(|s| Ok(s.data.purchases.next_expiring().cloned()))
    }

    // ========================================================================
    // Local mutations
    // ========================================================================

    /// Move purchases past their expiry into the expired set.
    ///
    /// Returns only the purchases moved by this call.
    pub fn expire_purchases(&self) -> Result<Vec<Purchase>> {
        self.write(|session| {
            let mut data = session.data.clone();
            let expired = data.purchases.expire(Utc::now());
            if !expired.is_empty() {
                session.commit(data)?;
            }
            tracing::debug!(count = expired.len(), "expired purchases swept");
            Ok(expired)
        })
    }

    /// Remove purchases by transaction ID. Unknown IDs are ignored.
    pub fn remove_purchases<S: AsRef<str>>(&self, transaction_ids: &[S]) -> Result<Vec<Purchase>> {
        self.write(|session| {
            let mut data = session.data.clone();
            let removed = data.purchases.remove(transaction_ids);
            if !removed.is_empty() {
                session.commit(data)?;
            }
            tracing::debug!(count = removed.len(), "purchases removed");
            Ok(removed)
        })
    }

    // ========================================================================
    // Landing pages
    // ========================================================================

    /// Add PsiCash tracking data to a PsiCash landing page URL.
    pub fn modify_landing_page(&self, url: &str) -> Result<String> {
        self.read(|s| {
            let earner = s.data.tokens.value(TokenType::Earner);
            let payload = s
                .engine
                .landing_page_payload(earner, &s.data.request_metadata);
            append_psicash_param(url, &payload)
        })
    }

    /// URL of the buy-PsiCash page for this installation.
    pub fn get_buy_psi_url(&self) -> Result<String> {
        self.read(|s| {
            if s.data.tokens.is_account() {
                return Err(PsiCashError::MissingTokens(
                    "account installations have no tracker earner token".to_string(),
                ));
            }
            let earner = s.earner_token()?;
            let payload = s
                .engine
                .landing_page_payload(Some(earner), &s.data.request_metadata);
            Ok(format!("{}#!psicash={}", s.config.buy_base_url(), payload))
        })
    }

    /// Opaque blob identifying the earner to a rewarded-activity provider.
    pub fn get_rewarded_activity_data(&self) -> Result<String> {
        self.read(|s| {
            let earner = s.earner_token()?;
            Ok(s.engine
                .rewarded_activity_payload(earner, &s.data.request_metadata))
        })
    }

    /// Support snapshot as JSON. Never contains token values.
    pub fn get_diagnostic_info(&self) -> Result<String> {
        self.read(|s| {
            let now = Utc::now();
            let purchases: Vec<serde_json::Value> = s
                .data
                .purchases
                .all()
                .map(|p| {
                    serde_json::json!({
                        "id": p.transaction_id,
                        "class": p.transaction_class,
                        "distinguisher": p.distinguisher,
                        "expiry": p.controlling_expiry(),
                    })
                })
                .collect();

            let info = serde_json::json!({
                "test": s.config.test,
                "validTokenTypes": s.data.tokens.valid_token_types(),
                "isAccount": s.data.tokens.is_account(),
                "balance": s.data.balance,
                "serverTimeDiffMs": s.data.server_time_diff_ms,
                "purchasePrices": s.data.purchases.prices(),
                "purchaseCount": s.data.purchases.purchases().len(),
                "activePurchaseCount": s.data.purchases.active(now).len(),
                "expiredPurchaseCount": s.data.purchases.expired().len(),
                "purchases": purchases,
            });
            Ok(info.to_string())
        })
    }

    // ========================================================================
    // Server round trips
    // ========================================================================

    /// Sync balance, prices for `purchase_classes` and token validity.
    ///
    /// Obtains tracker tokens first if the installation holds none.
    pub fn refresh_state<S: AsRef<str>>(&self, purchase_classes: &[S]) -> Result<Status> {
        let classes: Vec<String> = purchase_classes
            .iter()
            .map(|c| c.as_ref().to_string())
            .collect();
        self.write(|session| session.refresh(&classes))
    }

    /// Buy a time-limited (class, distinguisher) at `expected_price`.
    ///
    /// Non-success statuses are returned in the response, not as errors, and
    /// leave the purchase set untouched.
    pub fn new_expiring_purchase(
        &self,
        transaction_class: &str,
        distinguisher: &str,
        expected_price: i64,
    ) -> Result<NewExpiringPurchaseResponse> {
        self.write(|session| session.purchase(transaction_class, distinguisher, expected_price))
    }

    /// Grant currency on the development server. Test mode only.
    pub fn test_reward(&self, transaction_class: &str, distinguisher: &str) -> Result<()> {
        self.read(|s| {
            if !s.config.test {
                return Err(PsiCashError::invalid_argument(
                    "test",
                    "rewards can only be granted in test mode",
                ));
            }
            let earner = s.earner_token()?;
            s.engine
                .reward(earner, transaction_class, distinguisher, &s.data.request_metadata)
        })
    }
}
