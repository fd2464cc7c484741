//! Well-known RF2 constants.
//!
//! Column separator, line ending and the fixed SCTIDs referenced by the
//! transformation pipeline. Identifier values are kept as string slices
//! because RF2 columns are transported as text.

/// Column separator used by all RF2 files.
pub const COLUMN_SEPARATOR: char = '\t';

/// Canonical RF2 line ending.
pub const LINE_ENDING: &str = "\r\n";

/// File extension for RF2 data files.
pub const TXT_FILE_EXTENSION: &str = ".txt";

/// Release type token for delta files.
pub const DELTA: &str = "Delta";

/// Release type token for snapshot files.
pub const SNAPSHOT: &str = "Snapshot";

/// Prefix applied to output file names of beta releases.
pub const BETA_RELEASE_PREFIX: &str = "x";

/// The namespace identifier of the International release.
pub const INTERNATIONAL_NAMESPACE_ID: u32 = 0;

/// SNOMED CT core module.
pub const INTERNATIONAL_CORE_MODULE_ID: &str = "900000000000207008";

/// SNOMED CT model component module.
pub const INTERNATIONAL_MODEL_COMPONENT_ID: &str = "900000000000012004";

/// The IS-A relationship type concept.
pub const IS_A_TYPE_ID: &str = "116680003";

/// Stated relationship characteristic type.
pub const STATED_RELATIONSHIP_ID: &str = "900000000000010007";

/// CTV3 simple map reference set.
pub const CTV3_ID_REFSET_ID: &str = "900000000000497000";

/// SNOMED RT simple map reference set.
pub const SNOMED_ID_REFSET_ID: &str = "900000000000498005";

/// Active flag value for active components.
pub const ACTIVE_FLAG: &str = "1";

/// Literal used by authoring tools for absent values.
pub const NULL_STRING: &str = "null";

/// File name fragment identifying the simple map refset delta.
pub const SIMPLE_MAP_REFSET_DELTA: &str = "sRefset_SimpleMapDelta";

/// File name fragment identifying the concept delta.
pub const CONCEPT_DELTA: &str = "sct2_Concept_Delta";

/// File name fragment identifying the stated relationship delta.
pub const STATED_RELATIONSHIP_DELTA: &str = "sct2_StatedRelationship_Delta";
