mod counting;
mod depend;
mod sequential;

pub use crate::executor::{
    counting::CountingTaskGraph, depend::DependTaskGraph, sequential::LoopGraph,
};
use crate::{
    config::ExecConfig,
    dag::{Dag, GraphError},
    resource::Resource,
    sync::FanIn,
};
use derive_more::Deref;

/// A runnable plan derived from a frozen [`Dag`].
///
/// Every backend honors the same contract: each node runs exactly once per
/// [`exec`](Self::exec), and for every edge `u -> v`, `v` starts only after
/// `u` and the event it returned have completed. Siblings are unordered.
pub trait DagExec<R: Resource>: Sized {
    /// Build the plan, taking ownership of `dag`.
    ///
    /// # Errors
    /// - [`GraphError::UndefinedNode`] or [`GraphError::Cycle`] if validation
    ///   is enabled by `config` and the graph is malformed.
    /// - [`GraphError::ThreadPool`] if the dedicated pool cannot be built.
    fn from_dag(dag: Dag<R>, config: &ExecConfig) -> Result<Self, GraphError>;

    /// Run every node once on `resource`.
    ///
    /// Waits for work already pending on `resource` first and returns an
    /// event covering the whole run.
    fn exec(&mut self, resource: &R) -> R::Event;

    /// Give the graph back for further building.
    fn into_dag(self) -> Dag<R>;
}

fn validate<R: Resource>(dag: &Dag<R>, config: &ExecConfig) -> Result<(), GraphError> {
    if config.validation().enabled() {
        dag.validate()?;
    }
    Ok(())
}

/// A [`FanIn`] on its own cache line.
#[derive(Debug, Deref)]
#[repr(align(128))]
struct FanInSlot(FanIn);

impl FanInSlot {
    fn new(total: usize) -> Self {
        Self(FanIn::new(total))
    }
}
