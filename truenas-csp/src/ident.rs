//! Translation between CSP identifiers and ZFS dataset paths.
//!
//! The CSP hands out volume and snapshot ids that are the dataset path with
//! `/` swapped for `_` (`tank/pvc-1` becomes `tank_pvc-1`, and snapshot
//! `tank/pvc-1@snap1` becomes `tank_pvc-1@snap1`). The access name shared
//! by a volume's target, extent and target-extent mapping is the dataset
//! leaf name.

use crate::config::{DATASET_DIVIDER, VOLUME_DIVIDER};

/// Dataset path for a CSP volume or snapshot id.
pub fn id_to_dataset(id: &str) -> String {
    id.replace(VOLUME_DIVIDER, &DATASET_DIVIDER.to_string())
}

/// CSP id for a dataset path or snapshot name.
pub fn dataset_to_id(dataset: &str) -> String {
    dataset.replace(DATASET_DIVIDER, &VOLUME_DIVIDER.to_string())
}

/// Leaf name of a CSP volume id (`tank_a_pvc-1` -> `pvc-1`).
pub fn volume_id_to_name(volume_id: &str) -> &str {
    volume_id.rsplit(VOLUME_DIVIDER).next().unwrap_or(volume_id)
}

/// Leaf name of a dataset path (`tank/a/pvc-1` -> `pvc-1`). This is also
/// the access name of the volume's iSCSI resources.
pub fn leaf_name(dataset: &str) -> &str {
    dataset.rsplit(DATASET_DIVIDER).next().unwrap_or(dataset)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_to_dataset() {
        assert_eq!(id_to_dataset("tank_pvc-1"), "tank/pvc-1");
        assert_eq!(id_to_dataset("tank_a_b_name"), "tank/a/b/name");
        assert_eq!(id_to_dataset("tank_pvc-1@snap1"), "tank/pvc-1@snap1");
    }

    #[test]
    fn test_dataset_to_id() {
        assert_eq!(dataset_to_id("tank/pvc-1"), "tank_pvc-1");
        assert_eq!(dataset_to_id("tank/a/b/name"), "tank_a_b_name");
    }

    #[test]
    fn test_round_trip() {
        let dataset = "root/a/b/name";
        assert_eq!(id_to_dataset(&dataset_to_id(dataset)), dataset);
    }

    #[test]
    fn test_volume_id_to_name() {
        assert_eq!(volume_id_to_name("root_a_b_name"), "name");
        assert_eq!(volume_id_to_name("tank_pvc-1"), "pvc-1");
        assert_eq!(volume_id_to_name("plain"), "plain");
    }

    #[test]
    fn test_leaf_name() {
        assert_eq!(leaf_name("tank/a/pvc-1"), "pvc-1");
        assert_eq!(leaf_name("pvc-1"), "pvc-1");
    }
}
