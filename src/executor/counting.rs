use crate::{
    config::ExecConfig,
    dag::{Dag, GraphError, Node},
    executor::{DagExec, FanInSlot, validate},
    resource::Resource,
    sync,
    types::{NodeId, SyncUnsafeCell},
};
use core::fmt;
use rayon::ThreadPool;
use std::sync::Arc;
use tracing::{debug, trace};

/// Recursive fan-out on the rayon pool with atomic fan-in counting.
///
/// Key points:
/// - Roots are split in halves with `rayon::join` and run in parallel.
/// - A node's children are classified once, at construction. A child with
///   a single dependency is `owned` by its parent and runs right after it
///   without any synchronization. A child with several dependencies is
///   `shared` and goes through its [`FanIn`](crate::FanIn): only the parent
///   whose arrival completes the count runs it.
/// - Runnable children of a node are again split in halves with
///   `rayon::join`.
///
/// Counters reset themselves when they fire, so the graph can be run again.
pub struct CountingTaskGraph<R: Resource> {
    dag: Dag<R>,
    layouts: Vec<LayoutSlot>,
    fan_ins: Vec<FanInSlot>,
    roots: Vec<NodeId>,
    pool: Option<Arc<ThreadPool>>,
}

type LayoutSlot = SyncUnsafeCell<NodeLayout>;

#[derive(Debug)]
struct NodeLayout {
    /// Children depending on this node only. They can be started right after
    /// it completes.
    owned_children: Vec<NodeId>,
    /// Children with other dependencies too.
    shared_children: Vec<NodeId>,
}

impl<R: Resource> DagExec<R> for CountingTaskGraph<R> {
    fn from_dag(dag: Dag<R>, config: &ExecConfig) -> Result<Self, GraphError> {
        validate(&dag, config)?;
        let pool = config.build_pool()?;
        let nodes = dag.nodes();
        let layouts = nodes
            .iter()
            .map(|node| {
                let (owned_children, shared_children) = node
                    .children()
                    .iter()
                    .copied()
                    .partition(|&child| nodes[child].dependency_count() == 1);
                SyncUnsafeCell::new(NodeLayout {
                    owned_children,
                    shared_children,
                })
            })
            .collect();
        let fan_ins = nodes
            .iter()
            .map(|node| FanInSlot::new(node.dependency_count()))
            .collect();
        let roots: Vec<_> = dag.roots().collect();
        debug!(nodes = dag.len(), roots = roots.len(), "built counting task graph");
        Ok(Self {
            dag,
            layouts,
            fan_ins,
            roots,
            pool,
        })
    }

    fn exec(&mut self, resource: &R) -> R::Event {
        resource.wait();
        let plan = Plan {
            nodes: self.dag.nodes(),
            layouts: &self.layouts,
            fan_ins: &self.fan_ins,
            resource,
        };
        let roots = self.roots.as_slice();
        // SAFETY: roots have no dependencies, each appears once, and no other
        // run of this plan is in progress since `exec` borrows `self` mutably.
        let run = || unsafe { plan.join_nodes(roots) };
        match &self.pool {
            Some(pool) => pool.install(run),
            None => run(),
        }
        resource.get_event()
    }

    fn into_dag(self) -> Dag<R> {
        self.dag
    }
}

struct Plan<'a, R: Resource> {
    nodes: &'a [Node<R>],
    layouts: &'a [LayoutSlot],
    fan_ins: &'a [FanInSlot],
    resource: &'a R,
}

impl<R: Resource> Clone for Plan<'_, R> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<R: Resource> Copy for Plan<'_, R> {}

impl<R: Resource> Plan<'_, R> {
    /// # Safety
    ///
    /// - Every id in `ready` must have all of its dependencies completed in
    ///   the current run.
    /// - No id in `ready` may be run by anyone else during the current run.
    unsafe fn join_nodes(self, ready: &[NodeId]) {
        match *ready {
            [] => {}
            [id] => {
                // SAFETY: forwarded from the caller.
                unsafe { self.exec_node(id) };
            }
            _ => {
                let (left, right) = ready.split_at(ready.len() / 2);
                // SAFETY: the two halves are disjoint sets of ready nodes.
                sync::join(
                    || unsafe { self.join_nodes(left) },
                    || unsafe { self.join_nodes(right) },
                );
            }
        }
    }

    /// # Safety
    ///
    /// Same as [`join_nodes`](Self::join_nodes) for the single node `id`.
    unsafe fn exec_node(self, id: NodeId) {
        trace!(node = id, "running node");
        // SAFETY: `id` is run by this thread only.
        let event = unsafe { self.nodes[id].exec_unchecked(self.resource) };
        self.resource.wait_for(&event);

        // SAFETY: the layout of a node is only touched by the thread running it.
        let NodeLayout {
            owned_children,
            shared_children,
        } = unsafe { &mut *self.layouts[id].get() };
        let num_owned = owned_children.len();
        for &child in shared_children.iter() {
            if self.fan_ins[child].arrive() {
                owned_children.push(child);
            }
        }
        // SAFETY: owned children depend on `id` only, and promoted shared
        // children had their last dependency arrive here.
        unsafe { self.join_nodes(owned_children) };
        owned_children.truncate(num_owned);
    }
}

impl<R: Resource> fmt::Debug for CountingTaskGraph<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CountingTaskGraph")
            .field("dag", &self.dag)
            .field("roots", &self.roots)
            .field("fan_ins", &self.fan_ins)
            .finish_non_exhaustive()
    }
}
