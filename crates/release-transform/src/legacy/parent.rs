//! Parent concept lookup from stated relationships.

use std::collections::{HashMap, HashSet};
use std::io::Read;

use release_types::rf2::{ACTIVE_FLAG, IS_A_TYPE_ID, STATED_RELATIONSHIP_ID};
use release_types::SctId;

use crate::error::TransformError;

const ACTIVE_COL: usize = 2;
const SOURCE_ID_COL: usize = 4;
const DESTINATION_ID_COL: usize = 5;
const TYPE_ID_COL: usize = 7;
const CHARACTERISTIC_TYPE_ID_COL: usize = 8;

/// Finds the parent concept of each wanted concept by scanning a transformed
/// stated relationship delta for active stated IS-A rows.
///
/// A concept with several parents keeps the first one the scan encounters.
/// The scan stops as soon as every wanted concept has a parent. Concepts
/// with no stated IS-A row in the delta are simply absent from the result.
pub fn find_parent_ids<R: Read>(
    reader: R,
    wanted: &HashSet<SctId>,
) -> Result<HashMap<SctId, SctId>, TransformError> {
    let mut parents = HashMap::with_capacity(wanted.len());
    if wanted.is_empty() {
        return Ok(parents);
    }

    let mut csv_reader = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(true)
        .flexible(true)
        .from_reader(reader);

    for record in csv_reader.records() {
        let record = record?;
        if record.get(ACTIVE_COL) != Some(ACTIVE_FLAG)
            || record.get(TYPE_ID_COL) != Some(IS_A_TYPE_ID)
            || record.get(CHARACTERISTIC_TYPE_ID_COL) != Some(STATED_RELATIONSHIP_ID)
        {
            continue;
        }
        let source: SctId = match record.get(SOURCE_ID_COL).and_then(|v| v.parse().ok()) {
            Some(id) => id,
            None => continue,
        };
        if !wanted.contains(&source) || parents.contains_key(&source) {
            continue;
        }
        if let Some(destination) = record.get(DESTINATION_ID_COL).and_then(|v| v.parse().ok()) {
            parents.insert(source, destination);
            if parents.len() == wanted.len() {
                break;
            }
        }
    }
    Ok(parents)
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = "id\teffectiveTime\tactive\tmoduleId\tsourceId\tdestinationId\t\
                          relationshipGroup\ttypeId\tcharacteristicTypeId\tmodifierId";

    fn row(
        active: &str,
        source: u64,
        destination: u64,
        type_id: &str,
        characteristic: &str,
    ) -> String {
        format!(
            "100021\t20240101\t{active}\t900000000000207008\t{source}\t{destination}\t0\t\
             {type_id}\t{characteristic}\t900000000000451002"
        )
    }

    #[test]
    fn test_finds_stated_is_a_parent() {
        let input = format!(
            "{HEADER}\n{}\n{}\n",
            // Inferred row over the same pair must be ignored.
            row(
                "1",
                800001001,
                73211009,
                IS_A_TYPE_ID,
                "900000000000011006"
            ),
            row("1", 800001001, 404684003, IS_A_TYPE_ID, STATED_RELATIONSHIP_ID),
        );
        let wanted: HashSet<SctId> = [800001001].into();
        let parents = find_parent_ids(input.as_bytes(), &wanted).unwrap();
        assert_eq!(parents[&800001001], 404684003);
    }

    #[test]
    fn test_inactive_and_non_is_a_rows_skipped() {
        let input = format!(
            "{HEADER}\n{}\n{}\n",
            row("0", 800001001, 404684003, IS_A_TYPE_ID, STATED_RELATIONSHIP_ID),
            row("1", 800001001, 404684003, "363698007", STATED_RELATIONSHIP_ID),
        );
        let wanted: HashSet<SctId> = [800001001].into();
        let parents = find_parent_ids(input.as_bytes(), &wanted).unwrap();
        assert!(parents.is_empty());
    }

    #[test]
    fn test_first_parent_wins() {
        let input = format!(
            "{HEADER}\n{}\n{}\n",
            row("1", 800001001, 111111, IS_A_TYPE_ID, STATED_RELATIONSHIP_ID),
            row("1", 800001001, 222222, IS_A_TYPE_ID, STATED_RELATIONSHIP_ID),
        );
        let wanted: HashSet<SctId> = [800001001].into();
        let parents = find_parent_ids(input.as_bytes(), &wanted).unwrap();
        assert_eq!(parents[&800001001], 111111);
    }
}
