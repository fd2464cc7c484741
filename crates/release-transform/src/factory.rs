//! Composition of per-component-type transformation pipelines.

use std::sync::Arc;

use release_types::{partition_id, ComponentType, PartitionKind};

use crate::engine::StreamingFileTransformation;
use crate::idgen::{CachedSctidFactory, UuidGenerator};
use crate::line::{
    RepeatableRelationshipUuidTransform, ReplaceValueLineTransformation,
    SctidFromCacheTransformation, SctidTransformation, UuidTransformation,
};

/// Builds the column pipeline for each RF2 component type.
///
/// Pipelines address columns by index, so refset files with extra columns
/// beyond the base format pass their extra columns through untouched. All
/// pipelines built by one factory share one [`CachedSctidFactory`], which is
/// what lets a relationship file resolve a concept id that was assigned while
/// transforming the concept file.
pub struct TransformationFactory {
    effective_time: String,
    namespace_id: u32,
    sctid_factory: Arc<CachedSctidFactory>,
    uuid_generator: Arc<dyn UuidGenerator>,
    buffer_size: usize,
}

impl TransformationFactory {
    /// Creates a factory for one build execution.
    pub fn new(
        effective_time: impl Into<String>,
        namespace_id: u32,
        sctid_factory: Arc<CachedSctidFactory>,
        uuid_generator: Arc<dyn UuidGenerator>,
        buffer_size: usize,
    ) -> Self {
        TransformationFactory {
            effective_time: effective_time.into(),
            namespace_id,
            sctid_factory,
            uuid_generator,
            buffer_size,
        }
    }

    /// The shared SCTID factory backing every pipeline.
    pub fn sctid_factory(&self) -> &Arc<CachedSctidFactory> {
        &self.sctid_factory
    }

    fn partition(&self, kind: PartitionKind) -> &'static str {
        partition_id(kind, self.namespace_id)
    }

    fn sctid(&self, id_col: usize, module_col: usize, kind: PartitionKind) -> SctidTransformation {
        SctidTransformation::new(
            id_col,
            module_col,
            self.partition(kind),
            self.sctid_factory.clone(),
        )
    }

    fn from_cache(&self, column: usize) -> SctidFromCacheTransformation {
        SctidFromCacheTransformation::new(column, self.sctid_factory.clone())
    }

    /// The id-assignment pipeline run over concept and description files
    /// before any other file is transformed.
    ///
    /// Concept files have their component ids and module ids assigned;
    /// description files only their component ids. Every other file type
    /// resolves references to those ids from the shared cache, which is why
    /// this pass must finish first. Returns `None` for types with no
    /// pre-process step.
    pub fn pre_process_transformation(
        &self,
        component_type: ComponentType,
    ) -> Option<StreamingFileTransformation> {
        match component_type {
            ComponentType::Concept => Some(
                StreamingFileTransformation::new(self.buffer_size)
                    .add_batch(Box::new(self.sctid(0, 3, PartitionKind::Concept)))
                    .add_batch(Box::new(self.sctid(3, 3, PartitionKind::Concept))),
            ),
            ComponentType::Description => Some(
                StreamingFileTransformation::new(self.buffer_size)
                    .add_batch(Box::new(self.sctid(0, 3, PartitionKind::Description))),
            ),
            _ => None,
        }
    }

    /// The main pipeline for a component type.
    pub fn transformation(&self, component_type: ComponentType) -> StreamingFileTransformation {
        let engine = StreamingFileTransformation::new(self.buffer_size);
        match component_type {
            ComponentType::Concept => engine
                .add_line(Box::new(ReplaceValueLineTransformation::new(
                    1,
                    self.effective_time.clone(),
                )))
                .add_line(Box::new(self.from_cache(3)))
                .add_line(Box::new(self.from_cache(4))),
            ComponentType::Description | ComponentType::TextDefinition => engine
                .add_line(Box::new(ReplaceValueLineTransformation::new(
                    1,
                    self.effective_time.clone(),
                )))
                .add_line(Box::new(self.from_cache(3)))
                .add_line(Box::new(self.from_cache(4)))
                .add_line(Box::new(self.from_cache(6)))
                .add_line(Box::new(self.from_cache(8)))
                .add_batch(Box::new(self.sctid(0, 3, PartitionKind::Description))),
            ComponentType::Relationship | ComponentType::StatedRelationship => {
                let repeatable = if component_type == ComponentType::StatedRelationship {
                    RepeatableRelationshipUuidTransform::stated()
                } else {
                    RepeatableRelationshipUuidTransform::inferred()
                };
                engine
                    .add_line(Box::new(ReplaceValueLineTransformation::new(
                        1,
                        self.effective_time.clone(),
                    )))
                    .add_line(Box::new(repeatable))
                    .add_line(Box::new(self.from_cache(3)))
                    .add_line(Box::new(self.from_cache(4)))
                    .add_line(Box::new(self.from_cache(5)))
                    .add_line(Box::new(self.from_cache(7)))
                    .add_line(Box::new(self.from_cache(8)))
                    .add_line(Box::new(self.from_cache(9)))
                    .add_batch(Box::new(self.sctid(0, 3, PartitionKind::Relationship)))
            }
            ComponentType::Identifier => engine
                .add_line(Box::new(ReplaceValueLineTransformation::new(
                    2,
                    self.effective_time.clone(),
                )))
                .add_line(Box::new(self.from_cache(4)))
                .add_batch(Box::new(self.sctid(5, 4, PartitionKind::Concept))),
            ComponentType::Refset => engine
                .add_line(Box::new(ReplaceValueLineTransformation::new(
                    1,
                    self.effective_time.clone(),
                )))
                .add_line(Box::new(UuidTransformation::new(
                    0,
                    self.uuid_generator.clone(),
                )))
                .add_line(Box::new(self.from_cache(3)))
                .add_line(Box::new(self.from_cache(4)))
                .add_line(Box::new(self.from_cache(5))),
        }
    }
}
