//! RF2 file name recognition.
//!
//! Maps a file name of the form
//! `<prefix>_<ComponentType>_<Delta|Snapshot|Full>[-lang]_<namespace>_<yyyymmdd>.txt`
//! to a [`TableSchema`]. Input files use the `rel2_` prefix; the canonical
//! output name substitutes `sct2_` (or `der2_` for reference sets).

use release_types::rf2::TXT_FILE_EXTENSION;
use release_types::{ComponentType, ReleaseType, TableSchema};

use crate::error::RecognitionError;

const INPUT_PREFIX: &str = "rel2";
const COMPONENT_PREFIX: &str = "sct2";
const REFSET_PREFIX: &str = "der2";

/// Recognizes an RF2 file name and derives its table schema.
///
/// # Errors
///
/// Returns a [`RecognitionError`] when the name does not follow the RF2
/// convention. Callers copy such files through unmodified.
///
/// # Examples
///
/// ```
/// use release_transform::recognize_filename;
/// use release_types::ComponentType;
///
/// let schema = recognize_filename("rel2_Concept_Delta_INT_20240101.txt").unwrap();
/// assert_eq!(schema.component_type, ComponentType::Concept);
/// assert_eq!(schema.filename, "sct2_Concept_Delta_INT_20240101.txt");
/// ```
pub fn recognize_filename(filename: &str) -> Result<TableSchema, RecognitionError> {
    let not_recognized = || RecognitionError {
        filename: filename.to_string(),
    };

    let stem = filename
        .strip_suffix(TXT_FILE_EXTENSION)
        .ok_or_else(not_recognized)?;
    let parts: Vec<&str> = stem.split('_').collect();
    let (prefix, type_token, release_token, date) = match parts.as_slice() {
        [prefix, type_token, release_token, _namespace, date] => {
            (*prefix, *type_token, *release_token, *date)
        }
        _ => return Err(not_recognized()),
    };
    if !matches!(prefix, INPUT_PREFIX | COMPONENT_PREFIX | REFSET_PREFIX) {
        return Err(not_recognized());
    }
    if date.len() != 8 || !date.bytes().all(|b| b.is_ascii_digit()) {
        return Err(not_recognized());
    }

    // Refset file names embed the release type at the end of the refset
    // token, e.g. `sRefset_SimpleMapDelta` or `cRefset_LanguageDelta-en`.
    let (component_type, release_type) = if type_token.ends_with("Refset") {
        let base = release_token.split('-').next().unwrap_or(release_token);
        (ComponentType::Refset, release_type_suffix(base).ok_or_else(not_recognized)?)
    } else {
        let component = match type_token {
            "Concept" => ComponentType::Concept,
            "Description" => ComponentType::Description,
            "TextDefinition" => ComponentType::TextDefinition,
            "Relationship" => ComponentType::Relationship,
            "StatedRelationship" => ComponentType::StatedRelationship,
            "Identifier" => ComponentType::Identifier,
            _ => return Err(not_recognized()),
        };
        let base = release_token.split('-').next().unwrap_or(release_token);
        let release = match base {
            "Delta" => ReleaseType::Delta,
            "Snapshot" => ReleaseType::Snapshot,
            "Full" => ReleaseType::Full,
            _ => return Err(not_recognized()),
        };
        (component, release)
    };

    let canonical_prefix = match component_type {
        ComponentType::Refset => REFSET_PREFIX,
        _ => COMPONENT_PREFIX,
    };
    let canonical = if prefix == INPUT_PREFIX {
        format!("{canonical_prefix}_{}", &stem[INPUT_PREFIX.len() + 1..]) + TXT_FILE_EXTENSION
    } else {
        filename.to_string()
    };

    Ok(TableSchema::new(component_type, release_type, canonical))
}

fn release_type_suffix(token: &str) -> Option<ReleaseType> {
    if token.ends_with("Delta") {
        Some(ReleaseType::Delta)
    } else if token.ends_with("Snapshot") {
        Some(ReleaseType::Snapshot)
    } else if token.ends_with("Full") {
        Some(ReleaseType::Full)
    } else {
        None
    }
}

/// Extracts the `yyyymmdd` effective date segment from an RF2 file name.
///
/// Returns `None` when the name does not end with a date segment.
pub fn effective_date_of(filename: &str) -> Option<&str> {
    let stem = filename.strip_suffix(TXT_FILE_EXTENSION)?;
    let date = stem.rsplit('_').next()?;
    (date.len() == 8 && date.bytes().all(|b| b.is_ascii_digit())).then_some(date)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recognize_component_files() {
        let schema = recognize_filename("rel2_StatedRelationship_Delta_INT_20240101.txt").unwrap();
        assert_eq!(schema.component_type, ComponentType::StatedRelationship);
        assert_eq!(schema.release_type, ReleaseType::Delta);
        assert_eq!(
            schema.filename,
            "sct2_StatedRelationship_Delta_INT_20240101.txt"
        );

        let schema = recognize_filename("sct2_Identifier_Snapshot_INT_20240101.txt").unwrap();
        assert_eq!(schema.component_type, ComponentType::Identifier);
        assert_eq!(schema.release_type, ReleaseType::Snapshot);
    }

    #[test]
    fn test_recognize_language_variant() {
        let schema = recognize_filename("rel2_TextDefinition_Delta-en_INT_20240101.txt").unwrap();
        assert_eq!(schema.component_type, ComponentType::TextDefinition);
        assert_eq!(
            schema.filename,
            "sct2_TextDefinition_Delta-en_INT_20240101.txt"
        );
    }

    #[test]
    fn test_recognize_refset_files() {
        let schema = recognize_filename("rel2_sRefset_SimpleMapDelta_INT_20240101.txt").unwrap();
        assert_eq!(schema.component_type, ComponentType::Refset);
        assert_eq!(schema.release_type, ReleaseType::Delta);
        assert_eq!(
            schema.filename,
            "der2_sRefset_SimpleMapDelta_INT_20240101.txt"
        );

        let schema = recognize_filename("der2_cRefset_LanguageDelta-en_INT_20240101.txt").unwrap();
        assert_eq!(schema.component_type, ComponentType::Refset);
        assert_eq!(
            schema.filename,
            "der2_cRefset_LanguageDelta-en_INT_20240101.txt"
        );
    }

    #[test]
    fn test_unknown_names_fail_recognition() {
        assert!(recognize_filename("readme.md").is_err());
        assert!(recognize_filename("sct2_Concept_Delta_INT.txt").is_err());
        assert!(recognize_filename("sct2_Widget_Delta_INT_20240101.txt").is_err());
        assert!(recognize_filename("sct2_Concept_Delta_INT_2024010.txt").is_err());
    }

    #[test]
    fn test_effective_date_extraction() {
        assert_eq!(
            effective_date_of("sct2_Concept_Delta_INT_20240101.txt"),
            Some("20240101")
        );
        assert_eq!(effective_date_of("notes.txt"), None);
    }
}
