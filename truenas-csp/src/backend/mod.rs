//! TrueNAS REST API v2.0 client.
//!
//! A `Backend` is constructed per request from the credentials the CSI
//! driver supplies and talks to `https://<array>/api/v2.0/`. The typed
//! lookup helpers (`find_all`, `find_one`, `find_one_matching`) are the
//! repository layer the managers build on.

pub mod client;
pub mod error;
pub mod query;
pub mod version;

pub use client::{Backend, Reply, uri_id};
pub use error::{BackendError, Result};
pub use query::Filter;
pub use version::SystemVersion;
