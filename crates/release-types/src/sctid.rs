//! SNOMED CT Identifier (SCTID) type and partition identifiers.
//!
//! SCTIDs are 64-bit unsigned integers that uniquely identify components
//! within SNOMED CT. The two least significant digits before the check digit
//! form the partition identifier, which encodes the component kind and
//! whether the identifier carries a namespace.

use crate::rf2::INTERNATIONAL_NAMESPACE_ID;

/// A SNOMED CT identifier (SCTID).
///
/// SCTIDs are 64-bit unsigned integers that uniquely identify components
/// within SNOMED CT. They follow a specific structure with a partition
/// identifier and check digit.
///
/// # Examples
///
/// ```
/// use release_types::SctId;
///
/// let concept_id: SctId = 73211009; // Diabetes mellitus
/// let is_a_type: SctId = 116680003; // IS_A relationship type
/// ```
pub type SctId = u64;

/// The component kind encoded by an SCTID partition identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PartitionKind {
    /// Concept components.
    Concept,
    /// Description and text definition components.
    Description,
    /// Relationship components, stated or inferred.
    Relationship,
}

/// Returns the two-digit partition identifier for a component kind.
///
/// International (namespace 0) identifiers use the short-format partitions
/// `00`/`01`/`02`; extension identifiers use the long-format partitions
/// `10`/`11`/`12`.
///
/// # Examples
///
/// ```
/// use release_types::{partition_id, PartitionKind};
///
/// assert_eq!(partition_id(PartitionKind::Concept, 0), "00");
/// assert_eq!(partition_id(PartitionKind::Relationship, 1000003), "12");
/// ```
pub fn partition_id(kind: PartitionKind, namespace_id: u32) -> &'static str {
    let international = namespace_id == INTERNATIONAL_NAMESPACE_ID;
    match (kind, international) {
        (PartitionKind::Concept, true) => "00",
        (PartitionKind::Description, true) => "01",
        (PartitionKind::Relationship, true) => "02",
        (PartitionKind::Concept, false) => "10",
        (PartitionKind::Description, false) => "11",
        (PartitionKind::Relationship, false) => "12",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_format_partitions() {
        assert_eq!(partition_id(PartitionKind::Concept, 0), "00");
        assert_eq!(partition_id(PartitionKind::Description, 0), "01");
        assert_eq!(partition_id(PartitionKind::Relationship, 0), "02");
    }

    #[test]
    fn test_long_format_partitions() {
        assert_eq!(partition_id(PartitionKind::Concept, 1000003), "10");
        assert_eq!(partition_id(PartitionKind::Description, 1000003), "11");
        assert_eq!(partition_id(PartitionKind::Relationship, 1000003), "12");
    }
}
