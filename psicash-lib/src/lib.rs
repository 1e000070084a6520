//! PsiCash client library.
//!
//! Keeps an installation's PsiCash tokens, balance, price catalog and
//! purchases persisted locally and synchronized with the PsiCash server.
//! HTTP execution is delegated to the embedder through [`HttpRequester`];
//! persistence goes to a directory supplied at initialization.
//!
//! # Features
//!
//! - **Session**: [`PsiCash`] composes the stores and the sync engine behind
//!   one read/write lock
//! - **Sync Engine**: request construction, bounded retry of transport
//!   failures, decoding of server replies
//! - **Boundary**: flat records for binding layers in [`boundary`]
//!
//! # Feature Flags
//!
//! - `http-transport`: blocking [`ReqwestTransport`]
//!
//! # Example
//!
//! ```ignore
//! use psicash_lib::{PsiCash, Status};
//! use std::sync::Arc;
//!
//! let psicash = PsiCash::new();
//! psicash.initialize("MyApp/1.0", data_dir, Arc::new(my_requester), false)?;
//! psicash.set_request_metadata_item("client_version", "42")?;
//!
//! if psicash.refresh_state(&["speed-boost"])? == Status::Success {
//!     let response = psicash.new_expiring_purchase("speed-boost", "1hr", 100)?;
//!     if let Some(purchase) = response.purchase {
//!         println!("bought {}", purchase.transaction_id);
//!     }
//! }
//! ```

pub mod authorization;
pub mod boundary;
pub mod config;
pub mod datastore;
pub mod errors;
pub mod purchases;
pub mod session;
pub mod status;
pub mod sync;
pub mod tokens;
pub mod transport;
pub mod user_data;

pub use authorization::{Authorization, AuthorizationRegistry};
pub use config::{Config, RetryPolicy, ServerEndpoint};
pub use datastore::{Datastore, FileDatastore, MemoryDatastore};
pub use errors::{PsiCashError, PsiCashErrorCode};
pub use purchases::{Purchase, PurchasePrice, PurchaseStore};
pub use session::{NewExpiringPurchaseResponse, PsiCash};
pub use status::Status;
pub use tokens::{TokenStore, TokenType};
pub use transport::{HttpParams, HttpRequester, HttpResult};

#[cfg(feature = "http-transport")]
pub use transport::ReqwestTransport;

/// Common result alias for PsiCash operations.
pub type Result<T> = std::result::Result<T, PsiCashError>;
