use crate::{
    config::ExecConfig,
    executor::DagExec,
    node::{Empty, WorkItem},
    resource::Resource,
    types::{IndexSet, NodeId, SyncUnsafeCell},
};
use core::fmt;
use rayon::ThreadPoolBuildError;
use thiserror::Error;

/// Error kind for malformed graphs and executor construction failures.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum GraphError {
    /// The dependency graph contains cycle(s).
    #[error("graph contains cycle(s)")]
    Cycle,
    /// A node was named as a dependency but never added.
    #[error("node {id} is referenced as a dependency but was never added")]
    UndefinedNode {
        /// Id of the missing node.
        id: NodeId,
    },
    /// The dedicated thread pool could not be built.
    #[error("failed to build the executor thread pool")]
    ThreadPool(#[from] ThreadPoolBuildError),
}

/// A vertex of a [`Dag`].
pub struct Node<R: Resource> {
    id: NodeId,
    defined: bool,
    dependency_count: usize,
    children: Vec<NodeId>,
    work: SyncUnsafeCell<Box<dyn WorkItem<R>>>,
}

impl<R: Resource> Node<R> {
    fn placeholder(id: NodeId) -> Self {
        Self {
            id,
            defined: false,
            dependency_count: 0,
            children: Vec::new(),
            work: SyncUnsafeCell::new(Box::new(Empty)),
        }
    }

    /// Id of this node.
    #[must_use]
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Number of distinct nodes this one depends on.
    #[must_use]
    pub fn dependency_count(&self) -> usize {
        self.dependency_count
    }

    /// Ids of the nodes depending on this one, in insertion order.
    #[must_use]
    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    /// Whether the node was added, as opposed to only being named as a
    /// dependency.
    #[must_use]
    pub fn is_defined(&self) -> bool {
        self.defined
    }

    /// Run the work item of this node.
    pub fn exec(&mut self, resource: &R) -> R::Event {
        self.work.get_mut().exec(resource)
    }

    /// Run the work item of this node through a shared reference.
    ///
    /// # Safety
    /// No other access to this node's work item may be live during the call.
    pub(crate) unsafe fn exec_unchecked(&self, resource: &R) -> R::Event {
        // SAFETY: exclusivity is guaranteed by the caller.
        unsafe { (*self.work.get()).exec(resource) }
    }
}

impl<R: Resource> fmt::Debug for Node<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("id", &self.id)
            .field("defined", &self.defined)
            .field("dependency_count", &self.dependency_count)
            .field("children", &self.children)
            .finish_non_exhaustive()
    }
}

/// Directed acyclic graph of work items driven by resource `R`.
///
/// Nodes live in dense slots indexed by their [`NodeId`]. The graph is
/// append-only while being built and frozen once moved into an executor
/// via [`instantiate`](Self::instantiate). [`DagExec::into_dag`] gives it
/// back for further building.
///
/// ```
/// use workgraph::{dag::Dag, executor::LoopGraph, executor::DagExec, node, resource::Host};
///
/// let mut dag = Dag::<Host>::new();
/// dag.add_node(0, [], node::empty());
/// dag.add_node(1, [0], node::function(|| println!("after 0")));
/// let mut exec = dag.instantiate::<LoopGraph<Host>>().unwrap();
/// exec.exec(&Host);
/// ```
pub struct Dag<R: Resource> {
    nodes: Vec<Node<R>>,
}

impl<R: Resource> Default for Dag<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: Resource> Dag<R> {
    /// Empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self { nodes: Vec::new() }
    }

    /// Empty graph with room for `capacity` nodes.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            nodes: Vec::with_capacity(capacity),
        }
    }

    /// Number of node slots, including placeholders.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the graph has no node.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// The node in slot `id`.
    #[must_use]
    pub fn node(&self, id: NodeId) -> Option<&Node<R>> {
        self.nodes.get(id)
    }

    /// All node slots, in id order.
    #[must_use]
    pub fn nodes(&self) -> &[Node<R>] {
        &self.nodes
    }

    pub(crate) fn nodes_mut(&mut self) -> &mut [Node<R>] {
        &mut self.nodes
    }

    /// Ids of nodes without dependencies, in id order.
    pub fn roots(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes
            .iter()
            .filter(|node| node.dependency_count == 0)
            .map(|node| node.id)
    }

    fn ensure_slot(&mut self, id: NodeId) {
        if id >= self.nodes.len() {
            let start = self.nodes.len();
            self.nodes.extend((start..=id).map(Node::placeholder));
        }
    }

    /// Add node `id` running `work` after every node in `dependencies`.
    ///
    /// Dependencies may be added later; until then they are placeholders that
    /// [`validate`](Self::validate) reports. Repeated dependency ids count
    /// once.
    ///
    /// # Panics
    /// If `id` was already added or appears among its own dependencies.
    pub fn add_node(
        &mut self,
        id: NodeId,
        dependencies: impl IntoIterator<Item = NodeId>,
        work: impl WorkItem<R> + 'static,
    ) {
        self.ensure_slot(id);
        assert!(!self.nodes[id].defined, "Dag::add_node: node {id} added twice");
        let dependencies: IndexSet<NodeId> = dependencies.into_iter().collect();
        assert!(
            !dependencies.contains(&id),
            "Dag::add_node: node {id} depends on itself"
        );
        for &dep in &dependencies {
            self.ensure_slot(dep);
            self.nodes[dep].children.push(id);
        }
        let node = &mut self.nodes[id];
        node.defined = true;
        node.dependency_count = dependencies.len();
        node.work = SyncUnsafeCell::new(Box::new(work));
    }

    /// Walk every reachable node once in dependency order.
    ///
    /// `pre` fires when a node is first reached from a parent (or, for roots,
    /// right before it is visited), `visit` once all of its dependencies
    /// have been visited, and `post` after all of its children were handled.
    /// `visit` therefore sees nodes in topological order. Nodes on or behind a
    /// cycle never reach `visit`.
    pub fn forward_traverse(
        &self,
        mut pre: impl FnMut(&Node<R>),
        mut visit: impl FnMut(&Node<R>),
        mut post: impl FnMut(&Node<R>),
    ) {
        let mut arrivals = vec![0usize; self.nodes.len()];
        // (node, index of the next child to handle)
        let mut stack: Vec<(NodeId, usize)> = Vec::new();
        for root in self.roots() {
            let node = &self.nodes[root];
            pre(node);
            visit(node);
            stack.push((root, 0));
            while let Some(&(id, next)) = stack.last() {
                let node = &self.nodes[id];
                let Some(&child_id) = node.children.get(next) else {
                    stack.pop();
                    post(node);
                    continue;
                };
                if let Some(top) = stack.last_mut() {
                    top.1 = next + 1;
                }
                let child = &self.nodes[child_id];
                if arrivals[child_id] == 0 {
                    pre(child);
                }
                arrivals[child_id] += 1;
                if arrivals[child_id] == child.dependency_count {
                    visit(child);
                    stack.push((child_id, 0));
                }
            }
        }
    }

    /// Ids of nodes in the order [`forward_traverse`](Self::forward_traverse)
    /// visits them.
    #[must_use]
    pub fn topological_order(&self) -> Vec<NodeId> {
        let mut order = Vec::with_capacity(self.nodes.len());
        self.forward_traverse(|_| {}, |node| order.push(node.id), |_| {});
        order
    }

    /// Check that every referenced node was added and that the graph is
    /// acyclic.
    ///
    /// # Errors
    /// [`GraphError::UndefinedNode`] for the first placeholder slot, otherwise
    /// [`GraphError::Cycle`] if some node can never be visited.
    pub fn validate(&self) -> Result<(), GraphError> {
        if let Some(node) = self.nodes.iter().find(|node| !node.defined) {
            return Err(GraphError::UndefinedNode { id: node.id });
        }
        let mut visited = 0usize;
        self.forward_traverse(|_| {}, |_| visited += 1, |_| {});
        if visited != self.nodes.len() {
            return Err(GraphError::Cycle);
        }
        Ok(())
    }

    /// Freeze the graph into executor `E` with the default [`ExecConfig`].
    ///
    /// # Errors
    /// See [`DagExec::from_dag`].
    pub fn instantiate<E: DagExec<R>>(self) -> Result<E, GraphError> {
        E::from_dag(self, &ExecConfig::default())
    }

    /// Freeze the graph into executor `E` configured by `config`.
    ///
    /// # Errors
    /// See [`DagExec::from_dag`].
    pub fn instantiate_with<E: DagExec<R>>(self, config: &ExecConfig) -> Result<E, GraphError> {
        E::from_dag(self, config)
    }
}

impl<R: Resource> fmt::Debug for Dag<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dag").field("nodes", &self.nodes).finish()
    }
}
