//! # Marketplace tools
//!
//! A typed client for the marketplace's seller REST API, plus the OAuth token machinery
//! that keeps per-seller sessions alive.
//!
//! The two moving parts:
//! * [`MeliApi`] — a per-session client. Each instance owns one seller's decrypted token
//!   pair for the duration of a single request or webhook, attaches the bearer token to
//!   every call, and transparently refreshes-and-replays exactly once on a 401.
//! * [`TokenAuthority`] — the process-wide refresh coordinator. Refresh tokens are
//!   single-use, so refreshes for a given seller are single-flight: concurrent callers
//!   that observe an expired token all await the same in-flight refresh and share its
//!   result.
//!
//! Marketplace-reported errors (a structured 4xx/5xx body) are returned as data via
//! [`MeliResult`] so callers can branch on them; only transport failures and
//! authentication dead-ends are surfaced as `Err`.

pub mod api;
pub mod config;
pub mod data_objects;
mod error;
pub mod oauth;

pub use api::{MeliApi, MeliApiFactory, Session};
pub use config::MeliConfig;
pub use data_objects::{Notification, NotificationTopic, Order, OrderStatus, TokenResponse};
pub use error::{AuthError, MeliApiError, MeliResult, RemoteApiError};
pub use oauth::{MeliOauth, TokenAuthority};
