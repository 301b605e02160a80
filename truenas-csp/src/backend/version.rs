//! Appliance variant detection.
//!
//! The adapter changes behavior in a few places depending on whether it
//! talks to TrueNAS SCALE, TrueNAS CORE, or a legacy FreeNAS release:
//! SCALE carries `auth_networks` on the target and supports snapshot
//! holds, CORE and legacy restrict initiators with host-form
//! `auth_network` entries, and legacy needs residual target cleanup on
//! unpublish.

use std::fmt::{self, Display};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemVersion {
    Scale,
    Core,
    Legacy,
    Unknown,
}

impl SystemVersion {
    /// Classify the `system/version` banner.
    pub fn from_banner(banner: &str) -> Self {
        if banner.contains("TrueNAS-SCALE") {
            SystemVersion::Scale
        } else if banner.contains("TrueNAS") {
            SystemVersion::Core
        } else if banner.contains("FreeNAS") {
            SystemVersion::Legacy
        } else {
            SystemVersion::Unknown
        }
    }

    pub fn is_scale(self) -> bool {
        self == SystemVersion::Scale
    }

    pub fn is_legacy(self) -> bool {
        self == SystemVersion::Legacy
    }

    /// CORE and legacy FreeNAS hold initiator access networks in host form.
    pub fn host_form_networks(self) -> bool {
        matches!(self, SystemVersion::Core | SystemVersion::Legacy)
    }
}

impl Display for SystemVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SystemVersion::Scale => write!(f, "SCALE"),
            SystemVersion::Core => write!(f, "CORE"),
            SystemVersion::Legacy => write!(f, "LEGACY"),
            SystemVersion::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_banner_classification() {
        assert_eq!(
            SystemVersion::from_banner("TrueNAS-SCALE-24.04.2"),
            SystemVersion::Scale
        );
        assert_eq!(
            SystemVersion::from_banner("TrueNAS-13.0-U6"),
            SystemVersion::Core
        );
        assert_eq!(
            SystemVersion::from_banner("FreeNAS-11.3-U5"),
            SystemVersion::Legacy
        );
        assert_eq!(
            SystemVersion::from_banner("SomethingElse-1.0"),
            SystemVersion::Unknown
        );
    }

    #[test]
    fn test_gating() {
        assert!(SystemVersion::Scale.is_scale());
        assert!(!SystemVersion::Scale.host_form_networks());
        assert!(SystemVersion::Core.host_form_networks());
        assert!(SystemVersion::Legacy.host_form_networks());
        assert!(SystemVersion::Legacy.is_legacy());
        assert!(!SystemVersion::Unknown.host_form_networks());
    }
}
