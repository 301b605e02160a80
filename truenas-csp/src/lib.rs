//! TrueNAS Container Storage Provider
//!
//! This library implements the HPE CSI driver's Container Storage Provider
//! contract on top of the TrueNAS/FreeNAS REST API v2.0, managing ZFS
//! zvols and their iSCSI exports.
//!
//! The library is split into several modules:
//! - `api`: HTTP facade (routes, credential middleware, response shaping)
//! - `backend`: authenticated TrueNAS REST client and typed lookups
//! - `zfs`: volume and snapshot management
//! - `iscsi`: target composition, initiator groups, publish coordination
//! - `metrics`: Prometheus metrics collection

pub mod api;
pub mod backend;
pub mod config;
pub mod ident;
pub mod iscsi;
pub mod locks;
pub mod metrics;
pub mod net;
pub mod zfs;

pub use api::{AppState, CspError, router};
pub use backend::{Backend, BackendError, SystemVersion};
pub use config::CspConfig;
