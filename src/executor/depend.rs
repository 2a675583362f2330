use crate::{
    config::ExecConfig,
    dag::{Dag, GraphError, Node},
    executor::{DagExec, FanInSlot, validate},
    resource::Resource,
    types::{HashMap, IndexSet, NodeId},
};
use core::{fmt, mem};
use rayon::{Scope, ThreadPool};
use std::sync::Arc;
use tracing::{debug, trace};

/// Tasks declared with data-flow tags, ordered by a tag resolver.
///
/// Construction walks the graph with
/// [`forward_traverse`](crate::dag::Dag::forward_traverse) and submits every
/// visited node as a task with one [`Tag::In`] on its own id and one
/// [`Tag::Out`] per child. The resolver turns the tags into predecessor sets,
/// and `exec` spawns each task on a `rayon` scope once its last predecessor
/// has finished.
pub struct DependTaskGraph<R: Resource> {
    dag: Dag<R>,
    schedule: Schedule,
    /// Node run by each task, in submission order.
    tasks: Vec<NodeId>,
    pool: Option<Arc<ThreadPool>>,
}

impl<R: Resource> DependTaskGraph<R> {
    /// Ids of the nodes each task must wait for, by node id.
    ///
    /// Nodes never submitted (on or behind a cycle) are absent.
    #[must_use]
    pub fn predecessors(&self) -> HashMap<NodeId, Vec<NodeId>> {
        self.schedule
            .predecessors
            .iter()
            .enumerate()
            .map(|(task, preds)| {
                let preds = preds.iter().map(|&pred| self.tasks[pred]).collect();
                (self.tasks[task], preds)
            })
            .collect()
    }
}

impl<R: Resource> DagExec<R> for DependTaskGraph<R> {
    fn from_dag(dag: Dag<R>, config: &ExecConfig) -> Result<Self, GraphError> {
        validate(&dag, config)?;
        let pool = config.build_pool()?;
        let mut resolver = TagResolver::default();
        let mut tasks = Vec::with_capacity(dag.len());
        dag.forward_traverse(
            |_| {},
            |node| {
                let tags = core::iter::once(Tag::In(node.id()))
                    .chain(node.children().iter().copied().map(Tag::Out));
                resolver.submit(tags);
                tasks.push(node.id());
            },
            |_| {},
        );
        let schedule = resolver.finish();
        debug!(
            nodes = dag.len(),
            tasks = tasks.len(),
            ready = schedule.ready.len(),
            "built depend task graph"
        );
        Ok(Self {
            dag,
            schedule,
            tasks,
            pool,
        })
    }

    fn exec(&mut self, resource: &R) -> R::Event {
        resource.wait();
        let plan = Plan {
            nodes: self.dag.nodes(),
            tasks: &self.tasks,
            schedule: &self.schedule,
            resource,
        };
        let run = || {
            rayon::scope(|scope| {
                for &task in &plan.schedule.ready {
                    // SAFETY: ready tasks have no predecessor and are listed once.
                    unsafe { plan.spawn(scope, task) };
                }
            });
        };
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
    tasks: &'a [NodeId],
    schedule: &'a Schedule,
    resource: &'a R,
}

impl<R: Resource> Clone for Plan<'_, R> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<R: Resource> Copy for Plan<'_, R> {}

impl<'a, R: Resource> Plan<'a, R> {
    /// # Safety
    ///
    /// Every predecessor of `task` must have completed in the current run, and
    /// `task` must not be spawned again during it.
    unsafe fn spawn(self, scope: &Scope<'a>, task: usize) {
        scope.spawn(move |scope| {
            let id = self.tasks[task];
            trace!(node = id, task, "running node");
            // SAFETY: each task, hence each node, is spawned once per run.
            let event = unsafe { self.nodes[id].exec_unchecked(self.resource) };
            self.resource.wait_for(&event);
            for &succ in &self.schedule.successors[task] {
                if self.schedule.fan_ins[succ].arrive() {
                    // SAFETY: this was the last predecessor of `succ` to finish.
                    unsafe { self.spawn(scope, succ) };
                }
            }
        });
    }
}

impl<R: Resource> fmt::Debug for DependTaskGraph<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DependTaskGraph")
            .field("dag", &self.dag)
            .field("tasks", &self.tasks)
            .field("schedule", &self.schedule)
            .finish_non_exhaustive()
    }
}

/// A data-flow annotation of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Tag {
    /// The task reads the tag: it runs after the tag's current writers.
    In(usize),
    /// The task writes the tag: it runs after the tag's current readers.
    /// Consecutive writers with no reader in between run concurrently.
    Out(usize),
}

#[derive(Debug, Default)]
struct TagState {
    /// Writers of the current group.
    writers: Vec<usize>,
    /// What every writer of the current group waits for.
    writer_preds: Vec<usize>,
    /// Readers since the current group started.
    readers: Vec<usize>,
}

/// Derives task predecessors from tags, in submission order.
#[derive(Debug, Default)]
pub(crate) struct TagResolver {
    tags: HashMap<usize, TagState>,
    predecessors: Vec<IndexSet<usize>>,
}

impl TagResolver {
    /// Submit the next task and return its index.
    pub(crate) fn submit(&mut self, tags: impl IntoIterator<Item = Tag>) -> usize {
        let task = self.predecessors.len();
        let mut preds = IndexSet::default();
        for tag in tags {
            match tag {
                Tag::In(tag) => {
                    let state = self.tags.entry(tag).or_default();
                    preds.extend(state.writers.iter().copied());
                    state.readers.push(task);
                }
                Tag::Out(tag) => {
                    let state = self.tags.entry(tag).or_default();
                    if !state.readers.is_empty() {
                        state.writer_preds = mem::take(&mut state.readers);
                        state.writers.clear();
                    }
                    preds.extend(state.writer_preds.iter().copied());
                    state.writers.push(task);
                }
            }
        }
        preds.swap_remove(&task);
        self.predecessors.push(preds);
        task
    }

    /// Freeze the submitted tasks into a runnable schedule.
    pub(crate) fn finish(self) -> Schedule {
        let num_tasks = self.predecessors.len();
        let mut successors = vec![Vec::new(); num_tasks];
        for (task, preds) in self.predecessors.iter().enumerate() {
            for &pred in preds {
                successors[pred].push(task);
            }
        }
        let ready = (0..num_tasks)
            .filter(|&task| self.predecessors[task].is_empty())
            .collect();
        let fan_ins = self
            .predecessors
            .iter()
            .map(|preds| FanInSlot::new(preds.len()))
            .collect();
        Schedule {
            predecessors: self.predecessors,
            successors,
            fan_ins,
            ready,
        }
    }
}

#[derive(Debug)]
pub(crate) struct Schedule {
    predecessors: Vec<IndexSet<usize>>,
    successors: Vec<Vec<usize>>,
    fan_ins: Vec<FanInSlot>,
    /// Tasks without predecessors.
    ready: Vec<usize>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn preds(schedule: &Schedule, task: usize) -> Vec<usize> {
        let mut preds: Vec<_> = schedule.predecessors[task].iter().copied().collect();
        preds.sort_unstable();
        preds
    }

    #[test]
    fn reader_waits_for_all_writers() {
        let mut resolver = TagResolver::default();
        let a = resolver.submit([Tag::Out(7)]);
        let b = resolver.submit([Tag::Out(7)]);
        let c = resolver.submit([Tag::In(7)]);
        let schedule = resolver.finish();
        assert!(preds(&schedule, a).is_empty());
        assert!(preds(&schedule, b).is_empty());
        assert_eq!(preds(&schedule, c), [a, b]);
        assert_eq!(schedule.ready, [a, b]);
        assert_eq!(schedule.successors[a], [c]);
    }

    #[test]
    fn writer_waits_for_readers() {
        let mut resolver = TagResolver::default();
        let w0 = resolver.submit([Tag::Out(1)]);
        let r0 = resolver.submit([Tag::In(1)]);
        let r1 = resolver.submit([Tag::In(1)]);
        let w1 = resolver.submit([Tag::Out(1)]);
        let r2 = resolver.submit([Tag::In(1)]);
        let schedule = resolver.finish();
        assert_eq!(preds(&schedule, r0), [w0]);
        assert_eq!(preds(&schedule, r1), [w0]);
        assert_eq!(preds(&schedule, w1), [r0, r1]);
        assert_eq!(preds(&schedule, r2), [w1]);
        assert_eq!(schedule.fan_ins[w1].total(), 2);
    }

    #[test]
    fn own_tags_do_not_self_depend() {
        let mut resolver = TagResolver::default();
        let a = resolver.submit([Tag::Out(0), Tag::In(0)]);
        let schedule = resolver.finish();
        assert!(preds(&schedule, a).is_empty());
        assert_eq!(schedule.ready, [a]);
    }
}
