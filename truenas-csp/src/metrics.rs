//! Prometheus metrics for the adapter.
//!
//! Two views of the service are exported: what the CSI driver asked for
//! (mutating CSP operations, labeled by outcome) and what that cost
//! against the appliance (REST round trips by verb and status). The
//! second matters because a single publish fans out into a dozen
//! appliance calls and the retry loops can multiply that.

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing::info;

/// Counter: finished CSP operations, labeled by `operation` and `outcome`
/// (`success` or the error code sent to the driver).
pub const OPERATIONS_TOTAL: &str = "truenas_csp_operations_total";

/// Histogram: wall-clock seconds per CSP operation, including all
/// appliance round trips and retry waits.
pub const OPERATION_SECONDS: &str = "truenas_csp_operation_seconds";

/// Counter: appliance REST requests, labeled by `verb` and `status`.
pub const BACKEND_REQUESTS_TOTAL: &str = "truenas_csp_backend_requests_total";

/// The mutating CSP operations. Read-only lookups are not measured; they
/// are single appliance calls and the backend counter covers them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CspOperation {
    VolumeCreate,
    VolumeUpdate,
    VolumeDelete,
    Publish,
    Unpublish,
    HostApply,
    HostDelete,
    SnapshotCreate,
    SnapshotDelete,
}

impl CspOperation {
    pub fn as_str(self) -> &'static str {
        match self {
            CspOperation::VolumeCreate => "volume_create",
            CspOperation::VolumeUpdate => "volume_update",
            CspOperation::VolumeDelete => "volume_delete",
            CspOperation::Publish => "publish",
            CspOperation::Unpublish => "unpublish",
            CspOperation::HostApply => "host_apply",
            CspOperation::HostDelete => "host_delete",
            CspOperation::SnapshotCreate => "snapshot_create",
            CspOperation::SnapshotDelete => "snapshot_delete",
        }
    }

    /// Start the clock on one operation.
    pub fn measure(self) -> Measured {
        Measured {
            operation: self,
            started: Instant::now(),
        }
    }
}

/// An in-flight CSP operation. Stamp it with the outcome that went out on
/// the wire.
#[must_use]
pub struct Measured {
    operation: CspOperation,
    started: Instant,
}

impl Measured {
    pub fn finish(self, outcome: &str) {
        let elapsed = self.started.elapsed().as_secs_f64();
        counter!(OPERATIONS_TOTAL, "operation" => self.operation.as_str(), "outcome" => outcome.to_string())
            .increment(1);
        histogram!(OPERATION_SECONDS, "operation" => self.operation.as_str()).record(elapsed);
    }
}

/// Count one appliance round trip.
pub fn backend_request(verb: &'static str, status: u16) {
    counter!(BACKEND_REQUESTS_TOTAL, "verb" => verb, "status" => status.to_string()).increment(1);
}

/// Expose the `/metrics` endpoint and register the metric descriptions.
pub fn serve(addr: SocketAddr) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;

    describe_counter!(
        OPERATIONS_TOTAL,
        "Finished CSP operations by operation and outcome"
    );
    describe_histogram!(
        OPERATION_SECONDS,
        "Wall-clock seconds spent per CSP operation"
    );
    describe_counter!(
        BACKEND_REQUESTS_TOTAL,
        "TrueNAS REST requests by verb and response status"
    );

    info!("Metrics server listening on http://{}/metrics", addr);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_names() {
        assert_eq!(CspOperation::VolumeCreate.as_str(), "volume_create");
        assert_eq!(CspOperation::Publish.as_str(), "publish");
        assert_eq!(CspOperation::Unpublish.as_str(), "unpublish");
        assert_eq!(CspOperation::SnapshotDelete.as_str(), "snapshot_delete");
    }

    #[test]
    fn test_recording_without_exporter() {
        // With no exporter installed the recorders are no-ops; none of
        // these may panic.
        CspOperation::HostApply.measure().finish("success");
        CspOperation::VolumeDelete.measure().finish("Conflict");
        backend_request("GET", 200);
        backend_request("DELETE", 422);
    }
}
