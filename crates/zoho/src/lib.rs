//! Zoho CRM adapter - the production [`RecordProvider`] behind the executor.
//!
//! - **Regions** (`region`) - accounts and API hosts per data center
//! - **OAuth** (`token`) - refresh-token grant with an on-disk token cache
//! - **Records** (`client`) - `GET /crm/v2/{module}` and payload decoding
//!
//! # Getting Started
//!
//! 1. Register a self client at https://api-console.zoho.com
//! 2. Generate a refresh token with the `ZohoCRM.modules.READ` scope
//! 3. Set `ZOHO_CLIENT_ID`, `ZOHO_CLIENT_SECRET`, `ZOHO_REFRESH_TOKEN`
//!
//! [`RecordProvider`]: crmquery_core::RecordProvider

pub mod client;
pub mod region;
pub mod token;

pub use client::{decode_response, ZohoRecordsClient};
pub use region::ZohoEndpoints;
pub use token::{CachedToken, OAuthCredentials, TokenError, TokenManager, TOKEN_CACHE_FILE};
