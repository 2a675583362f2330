mod stream;

pub use crate::resource::stream::{Stream, StreamEvent};
use std::sync::Arc;

/// A completion marker for work issued on some [`Resource`].
pub trait Event: Send + Sync {
    /// Block until the work behind this event has completed.
    fn wait(&self);
    /// Non-blocking completion check.
    fn is_complete(&self) -> bool;
}

/// An execution context that work can be issued to and synchronized with.
///
/// There is no process-wide default instance: callers construct the
/// resource they want and pass it to [`DagExec::exec`](crate::executor::DagExec::exec)
/// explicitly.
pub trait Resource: Send + Sync {
    /// Event type produced by this resource.
    type Event: Event;

    /// Block until all previously issued work on this resource completes.
    fn wait(&self);

    /// Block until `event`, possibly produced by another resource, completes.
    fn wait_for<E: Event + ?Sized>(&self, event: &E);

    /// Event marking everything issued on this resource so far.
    fn get_event(&self) -> Self::Event;
}

/// The calling host thread.
///
/// Work executed "on the host" has completed by the time the call that ran
/// it returns, so every host event is already complete.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Host;

/// Event of the [`Host`] resource. Always complete.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct HostEvent;

impl Event for HostEvent {
    fn wait(&self) {}

    fn is_complete(&self) -> bool {
        true
    }
}

impl Resource for Host {
    type Event = HostEvent;

    fn wait(&self) {}

    fn wait_for<E: Event + ?Sized>(&self, event: &E) {
        event.wait();
    }

    fn get_event(&self) -> HostEvent {
        HostEvent
    }
}

impl<R: Resource> Resource for Arc<R> {
    type Event = R::Event;

    fn wait(&self) {
        (**self).wait();
    }

    fn wait_for<E: Event + ?Sized>(&self, event: &E) {
        (**self).wait_for(event);
    }

    fn get_event(&self) -> R::Event {
        (**self).get_event()
    }
}
