use crate::{
    config::ExecConfig,
    dag::{Dag, GraphError},
    executor::{DagExec, validate},
    resource::Resource,
    types::NodeId,
};
use core::fmt;
use tracing::{debug, trace};

/// Runs nodes one after another on the calling thread.
///
/// The order is materialized once at construction and replayed on every
/// `exec`, so runs are deterministic and can be repeated.
pub struct LoopGraph<R: Resource> {
    dag: Dag<R>,
    order: Vec<NodeId>,
}

impl<R: Resource> LoopGraph<R> {
    /// Node ids in execution order.
    #[must_use]
    pub fn order(&self) -> &[NodeId] {
        &self.order
    }
}

impl<R: Resource> DagExec<R> for LoopGraph<R> {
    fn from_dag(dag: Dag<R>, config: &ExecConfig) -> Result<Self, GraphError> {
        validate(&dag, config)?;
        let order = dag.topological_order();
        debug!(nodes = dag.len(), scheduled = order.len(), "built loop graph");
        Ok(Self { dag, order })
    }

    fn exec(&mut self, resource: &R) -> R::Event {
        resource.wait();
        let nodes = self.dag.nodes_mut();
        for &id in &self.order {
            trace!(node = id, "running node");
            // Work issued on `resource` is ordered by the resource itself.
            let _event = nodes[id].exec(resource);
        }
        resource.get_event()
    }

    fn into_dag(self) -> Dag<R> {
        self.dag
    }
}

impl<R: Resource> fmt::Debug for LoopGraph<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoopGraph")
            .field("dag", &self.dag)
            .field("order", &self.order)
            .finish()
    }
}
