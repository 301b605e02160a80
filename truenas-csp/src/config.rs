//! Adapter configuration and protocol constants.
//!
//! Everything the CSP needs to know that is not carried on a request:
//! dataset provisioning defaults (overridable through the `DEFAULT_*`
//! environment variables), the retry budget toward the appliance, and the
//! fixed constants of the HPE CSI contract (id dividers, portal comment,
//! accepted iSCSI basenames).

use std::time::Duration;

/// Divider used in CSP volume and snapshot identifiers (`tank_pvc-1`).
pub const VOLUME_DIVIDER: char = '_';

/// Divider used in ZFS dataset paths (`tank/pvc-1`).
pub const DATASET_DIVIDER: char = '/';

/// iSCSI basenames the appliance may be configured with.
pub const ACCEPTED_BASENAMES: [&str; 2] = [
    "iqn.2011-08.org.truenas.ctl",
    "iqn.2005-10.org.freenas.ctl",
];

/// Comment that marks the discovery portal managed for the CSI driver.
pub const TARGET_PORTAL_COMMENT: &str = "hpe-csi";

/// Comment stamped onto extents created by the adapter.
pub const EXTENT_COMMENT: &str = "Managed by HPE CSI Driver for Kubernetes";

/// Snapshots named with this prefix back clone-from-PVC provisioning and
/// never receive a ZFS hold.
pub const CLONE_FROM_PVC_PREFIX: &str = "snap-for-clone-";

/// Retry budget for appliance operations that settle asynchronously.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Number of re-attempts after the initial try.
    pub attempts: u32,
    /// Pause between attempts.
    pub delay: Duration,
}

impl RetryPolicy {
    pub async fn wait(&self) {
        tokio::time::sleep(self.delay).await;
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 15,
            delay: Duration::from_millis(1500),
        }
    }
}

/// Defaults applied to dataset creation when the request config omits a key.
#[derive(Debug, Clone)]
pub struct DatasetDefaults {
    pub deduplication: String,
    pub compression: String,
    pub sync: String,
    /// String form ("true"/"false"), parsed at creation time.
    pub sparse: String,
    /// Pool (or pool/dataset) under which volumes are created.
    pub root: String,
    pub volblocksize: String,
    /// Comment template rendered with `{pv}`, `{pvc}` and `{namespace}`.
    pub description: String,
}

impl Default for DatasetDefaults {
    fn default() -> Self {
        Self {
            deduplication: "OFF".to_string(),
            compression: "LZ4".to_string(),
            sync: "STANDARD".to_string(),
            sparse: "true".to_string(),
            root: "tank".to_string(),
            volblocksize: "8K".to_string(),
            description: "Dataset created by HPE CSI Driver for Kubernetes \
                          as {pv} in {namespace} from {pvc}"
                .to_string(),
        }
    }
}

/// Runtime configuration for the adapter.
#[derive(Debug, Clone)]
pub struct CspConfig {
    /// URL scheme used toward the appliance (`https` in production).
    pub backend_scheme: String,
    /// Verify the appliance TLS certificate. Off by default because the
    /// typical appliance runs with a self-signed certificate.
    pub verify_tls: bool,
    pub retry: RetryPolicy,
    /// Numeric tag identifying the CHAP credential record on the appliance.
    pub chap_tag: u32,
    pub dataset_defaults: DatasetDefaults,
}

impl Default for CspConfig {
    fn default() -> Self {
        Self {
            backend_scheme: "https".to_string(),
            verify_tls: false,
            retry: RetryPolicy::default(),
            chap_tag: 4_730_274,
            dataset_defaults: DatasetDefaults::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_contract() {
        let config = CspConfig::default();
        assert_eq!(config.backend_scheme, "https");
        assert!(!config.verify_tls);
        assert_eq!(config.retry.attempts, 15);
        assert_eq!(config.retry.delay, Duration::from_millis(1500));
        assert_eq!(config.chap_tag, 4_730_274);
        assert_eq!(config.dataset_defaults.root, "tank");
        assert_eq!(config.dataset_defaults.volblocksize, "8K");
        assert_eq!(config.dataset_defaults.compression, "LZ4");
    }

    #[test]
    fn test_accepted_basenames() {
        assert!(ACCEPTED_BASENAMES.contains(&"iqn.2011-08.org.truenas.ctl"));
        assert!(ACCEPTED_BASENAMES.contains(&"iqn.2005-10.org.freenas.ctl"));
        assert!(!ACCEPTED_BASENAMES.contains(&"iqn.1991-05.com.microsoft"));
    }
}
