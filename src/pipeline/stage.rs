//! Staged pipeline insertions, committed as one step.
//!
//! A configurator describes a protocol stack against a stage instead of the
//! live pipeline. Nothing is visible until [`PipelineStage::commit`]; a
//! dropped stage installs nothing, and a failed commit removes whatever part
//! of the stack it had already inserted.

use crate::net::connection::ConnectionId;
use crate::pipeline::chain::{HandlerId, Pipeline};
use crate::pipeline::error::PipelineError;
use crate::pipeline::handler::Handler;

pub struct PipelineStage<'p> {
    pipeline: &'p mut Pipeline,
    staged: Vec<(String, Box<dyn Handler>)>,
}

impl<'p> PipelineStage<'p> {
    pub(crate) fn new(pipeline: &'p mut Pipeline) -> Self {
        Self {
            pipeline,
            staged: Vec::new(),
        }
    }

    pub fn connection_id(&self) -> ConnectionId {
        self.pipeline.connection_id()
    }

    /// The live pipeline, as it looks before the commit.
    pub fn pipeline(&self) -> &Pipeline {
        self.pipeline
    }

    /// Stage a handler to be appended at the tail.
    pub fn add_last<H: Handler>(
        &mut self,
        name: impl Into<String>,
        handler: H,
    ) -> Result<&mut Self, PipelineError> {
        let name = name.into();
        if self.pipeline.contains(&name) || self.staged.iter().any(|(n, _)| *n == name) {
            return Err(PipelineError::DuplicateName(name));
        }
        self.staged.push((name, Box::new(handler)));
        Ok(self)
    }

    /// Names staged so far, in insertion order.
    pub fn staged_names(&self) -> Vec<&str> {
        self.staged.iter().map(|(n, _)| n.as_str()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.staged.is_empty()
    }

    /// Install every staged handler, or none of them.
    pub fn commit(self) -> Result<Vec<HandlerId>, PipelineError> {
        let PipelineStage { pipeline, staged } = self;
        let mut installed = Vec::with_capacity(staged.len());

        for (name, handler) in staged {
            match pipeline.insert_boxed(pipeline.len(), name, handler) {
                Ok(id) => installed.push(id),
                Err(e) => {
                    for id in installed {
                        pipeline.remove_id(id);
                    }
                    return Err(e);
                }
            }
        }

        Ok(installed)
    }
}
