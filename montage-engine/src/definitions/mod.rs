//! Job definitions
//!
//! The four pipelines, each an ordered sequence of named steps written
//! against [`StepContext`]. Pipelines are replayed from the top on every
//! run, so they must derive every decision from step results and trigger
//! parameters only.

pub mod image_generate;
pub mod prompts;
pub mod scheduled_publish;
pub mod video_create;
pub mod video_render;

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

use montage_core::domain::instance::DefinitionName;

use crate::collaborators::Collaborators;
use crate::config::EngineConfig;
use crate::context::StepContext;
use crate::error::{Interrupt, StepError};

pub use image_generate::ImageGeneratePipeline;
pub use scheduled_publish::ScheduledPublishPipeline;
pub use video_create::VideoCreatePipeline;
pub use video_render::VideoRenderPipeline;

#[async_trait]
pub trait Pipeline: Send + Sync {
    fn definition(&self) -> DefinitionName;

    /// Runs (or replays) the pipeline to its end or to the next interrupt
    async fn execute(&self, ctx: &StepContext) -> Result<(), Interrupt>;

    /// Surfaces a terminal failure on the domain record
    async fn on_failure(&self, ctx: &StepContext, error: &str) -> Result<(), StepError>;
}

/// Dispatcher table from definition name to pipeline
#[derive(Clone, Default)]
pub struct Pipelines {
    pipelines: HashMap<DefinitionName, Arc<dyn Pipeline>>,
}

impl Pipelines {
    pub fn new() -> Self {
        Self::default()
    }

    /// All four pipelines wired to the same collaborators
    pub fn standard(collaborators: Collaborators, config: &EngineConfig) -> Self {
        let mut pipelines = Self::new();
        pipelines.register(Arc::new(VideoCreatePipeline::new(collaborators.clone())));
        pipelines.register(Arc::new(ImageGeneratePipeline::new(collaborators.clone())));
        pipelines.register(Arc::new(ScheduledPublishPipeline::new(
            collaborators.clone(),
            config,
        )));
        pipelines.register(Arc::new(VideoRenderPipeline::new(collaborators, config)));
        pipelines
    }

    pub fn register(&mut self, pipeline: Arc<dyn Pipeline>) {
        self.pipelines.insert(pipeline.definition(), pipeline);
    }

    pub fn get(&self, definition: DefinitionName) -> Option<Arc<dyn Pipeline>> {
        self.pipelines.get(&definition).cloned()
    }
}
