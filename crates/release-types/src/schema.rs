//! RF2 table schema types.
//!
//! A [`TableSchema`] describes one RF2 file: the component type it carries,
//! its release type, its canonical output file name and its ordered column
//! list. Schemas are derived from file names by the recognizer in the
//! transform crate and are immutable once built.

use serde::{Deserialize, Serialize};

/// The component type carried by an RF2 file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ComponentType {
    /// Concept file (`sct2_Concept_*`).
    Concept,
    /// Description file (`sct2_Description_*`).
    Description,
    /// Text definition file (`sct2_TextDefinition_*`).
    TextDefinition,
    /// Inferred relationship file (`sct2_Relationship_*`).
    Relationship,
    /// Stated relationship file (`sct2_StatedRelationship_*`).
    StatedRelationship,
    /// Identifier file (`sct2_Identifier_*`).
    Identifier,
    /// Reference set file (`der2_*Refset_*`).
    Refset,
}

impl ComponentType {
    /// The ordered column names of the base RF2 format for this type.
    ///
    /// Refset files may carry additional columns beyond the base set;
    /// transformations only address columns by index so extra columns pass
    /// through untouched.
    pub fn field_names(&self) -> &'static [&'static str] {
        match self {
            ComponentType::Concept => &[
                "id",
                "effectiveTime",
                "active",
                "moduleId",
                "definitionStatusId",
            ],
            ComponentType::Description | ComponentType::TextDefinition => &[
                "id",
                "effectiveTime",
                "active",
                "moduleId",
                "conceptId",
                "languageCode",
                "typeId",
                "term",
                "caseSignificanceId",
            ],
            ComponentType::Relationship | ComponentType::StatedRelationship => &[
                "id",
                "effectiveTime",
                "active",
                "moduleId",
                "sourceId",
                "destinationId",
                "relationshipGroup",
                "typeId",
                "characteristicTypeId",
                "modifierId",
            ],
            ComponentType::Identifier => &[
                "identifierSchemeId",
                "alternateIdentifier",
                "effectiveTime",
                "active",
                "moduleId",
                "referencedComponentId",
            ],
            ComponentType::Refset => &[
                "id",
                "effectiveTime",
                "active",
                "moduleId",
                "refsetId",
                "referencedComponentId",
            ],
        }
    }
}

/// The release type of an RF2 file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReleaseType {
    /// Changes since the previous release.
    Delta,
    /// Current state of every component.
    Snapshot,
    /// Every version of every component.
    Full,
}

/// Schema of one recognized RF2 file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    /// The component type carried by the file.
    pub component_type: ComponentType,
    /// The release type of the file.
    pub release_type: ReleaseType,
    /// Canonical output file name (input `rel2_` prefixes already mapped to
    /// their `sct2_`/`der2_` output form).
    pub filename: String,
    /// Ordered column names.
    pub fields: Vec<String>,
}

impl TableSchema {
    /// Creates a schema for a component type with its base RF2 columns.
    pub fn new(
        component_type: ComponentType,
        release_type: ReleaseType,
        filename: impl Into<String>,
    ) -> Self {
        TableSchema {
            component_type,
            release_type,
            filename: filename.into(),
            fields: component_type
                .field_names()
                .iter()
                .map(|f| (*f).to_string())
                .collect(),
        }
    }
}
