//! Legacy identifier generation for newly created concepts.
//!
//! Besides its SCTID, a new concept can carry two legacy identifiers: a CTV3
//! id and a SNOMED RT id. SNOMED RT ids are derived from the parent
//! concept's id, so generation must see parents before children; the
//! [`DependencyGraph`] provides that ordering and rejects cyclic parent
//! data. Parent concepts are looked up from the transformed stated
//! relationship delta by [`find_parent_ids`].

mod generator;
mod graph;
mod parent;

pub use generator::{LegacyConceptIds, LegacyIdGenerator};
pub use graph::DependencyGraph;
pub use parent::find_parent_ids;
