mod work_group;

pub use crate::node::work_group::WorkGroupNode;
use crate::resource::Resource;
use core::{fmt, ops::Range};
use rayon::prelude::*;

/// The unit of work held by a graph node.
///
/// Called once per executor run, after every node it depends on has
/// completed. Any work issued on `resource` must be covered by the returned
/// event.
pub trait WorkItem<R: Resource>: Send {
    /// Run the work on `resource`.
    fn exec(&mut self, resource: &R) -> R::Event;
}

/// A node with nothing to do. Useful as a join point.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Empty;

/// Create an [`Empty`] work item.
#[must_use]
pub fn empty() -> Empty {
    Empty
}

impl<R: Resource> WorkItem<R> for Empty {
    fn exec(&mut self, resource: &R) -> R::Event {
        resource.get_event()
    }
}

/// A single host callable.
pub struct Function<F>(F);

/// Wrap `f` as a work item.
pub fn function<F: FnMut() + Send>(f: F) -> Function<F> {
    Function(f)
}

impl<R: Resource, F: FnMut() + Send> WorkItem<R> for Function<F> {
    fn exec(&mut self, resource: &R) -> R::Event {
        (self.0)();
        resource.get_event()
    }
}

impl<F> fmt::Debug for Function<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Function").finish_non_exhaustive()
    }
}

/// How a [`Forall`] walks its index range.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum ForallPolicy {
    /// In increasing order on the executing thread.
    #[default]
    Sequential,
    /// Split across the rayon pool.
    Parallel,
}

/// A data-parallel loop calling `body(i)` for every index of a range.
pub struct Forall<F> {
    range: Range<usize>,
    policy: ForallPolicy,
    body: F,
}

/// Sequential loop over `range`.
pub fn forall<F: Fn(usize) + Send + Sync>(range: Range<usize>, body: F) -> Forall<F> {
    Forall {
        range,
        policy: ForallPolicy::Sequential,
        body,
    }
}

/// Parallel loop over `range`.
pub fn par_forall<F: Fn(usize) + Send + Sync>(range: Range<usize>, body: F) -> Forall<F> {
    Forall {
        range,
        policy: ForallPolicy::Parallel,
        body,
    }
}

impl<R: Resource, F: Fn(usize) + Send + Sync> WorkItem<R> for Forall<F> {
    fn exec(&mut self, resource: &R) -> R::Event {
        let Self {
            range,
            policy,
            body,
        } = self;
        match policy {
            ForallPolicy::Sequential => range.clone().for_each(&*body),
            ForallPolicy::Parallel => range.clone().into_par_iter().for_each(&*body),
        }
        resource.get_event()
    }
}

impl<F> fmt::Debug for Forall<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Forall")
            .field("range", &self.range)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

/// Runs `work` on its own resource inside a graph driven by another one.
///
/// The graph resource first waits for its pending work, so inputs produced
/// there are visible to `work`. After `work` is issued, the graph resource
/// waits for its event, so dependents of this node observe its results.
#[derive(Debug)]
pub struct OnResource<W, R2> {
    work: W,
    resource: R2,
}

/// Bind `work` to `resource`.
pub fn on_resource<W, R2>(work: W, resource: R2) -> OnResource<W, R2>
where
    R2: Resource,
    W: WorkItem<R2>,
{
    OnResource { work, resource }
}

impl<R, R2, W> WorkItem<R> for OnResource<W, R2>
where
    R: Resource,
    R2: Resource,
    W: WorkItem<R2>,
{
    fn exec(&mut self, resource: &R) -> R::Event {
        resource.wait();
        let event = self.work.exec(&self.resource);
        resource.wait_for(&event);
        resource.get_event()
    }
}

impl<R: Resource> WorkItem<R> for Box<dyn WorkItem<R>> {
    fn exec(&mut self, resource: &R) -> R::Event {
        (**self).exec(resource)
    }
}
