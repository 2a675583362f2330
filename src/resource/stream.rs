use crate::resource::{Event, Resource};
use parking_lot::{Condvar, Mutex};
use std::{
    collections::VecDeque,
    fmt,
    io,
    panic::{AssertUnwindSafe, catch_unwind},
    sync::Arc,
    thread::{self, JoinHandle},
};
use tracing::{debug, error};

type Command = Box<dyn FnOnce() + Send + 'static>;

/// An in-order queue of host closures executed by one dedicated thread.
///
/// Models an asynchronous device stream: [`submit`](Self::submit) returns
/// immediately with an event, the work runs later in submission order. Used
/// to drive graph nodes whose work lives on a different resource than the
/// graph itself.
pub struct Stream {
    shared: Arc<Shared>,
    worker: Option<JoinHandle<()>>,
}

/// Event produced by a [`Stream`]. Complete once every command submitted up
/// to and including the one it marks has run.
#[derive(Clone)]
pub struct StreamEvent {
    seq: u64,
    shared: Arc<Shared>,
}

struct Shared {
    state: Mutex<State>,
    /// Signalled when commands are queued or shutdown is requested.
    queued: Condvar,
    /// Signalled whenever `completed` advances.
    progressed: Condvar,
}

#[derive(Default)]
struct State {
    commands: VecDeque<Command>,
    submitted: u64,
    completed: u64,
    shutdown: bool,
}

impl Stream {
    /// Spawn the worker thread backing a new stream.
    ///
    /// # Errors
    /// If the OS refuses to spawn the thread.
    pub fn new(name: impl Into<String>) -> io::Result<Self> {
        let shared = Arc::new(Shared {
            state: Mutex::new(State::default()),
            queued: Condvar::new(),
            progressed: Condvar::new(),
        });
        let worker_shared = Arc::clone(&shared);
        let name = name.into();
        debug!(stream = %name, "starting stream worker");
        let worker = thread::Builder::new()
            .name(name)
            .spawn(move || worker_shared.work())?;
        Ok(Self {
            shared,
            worker: Some(worker),
        })
    }

    /// Queue `command` behind everything submitted before it.
    pub fn submit(&self, command: impl FnOnce() + Send + 'static) -> StreamEvent {
        let seq = {
            let mut state = self.shared.state.lock();
            state.commands.push_back(Box::new(command));
            state.submitted += 1;
            state.submitted
        };
        self.shared.queued.notify_one();
        StreamEvent {
            seq,
            shared: Arc::clone(&self.shared),
        }
    }
}

impl Shared {
    fn work(&self) {
        loop {
            let command = {
                let mut state = self.state.lock();
                loop {
                    if let Some(command) = state.commands.pop_front() {
                        break command;
                    }
                    if state.shutdown {
                        return;
                    }
                    self.queued.wait(&mut state);
                }
            };
            if catch_unwind(AssertUnwindSafe(command)).is_err() {
                error!("stream command panicked");
            }
            self.state.lock().completed += 1;
            self.progressed.notify_all();
        }
    }

    fn wait_until(&self, seq: u64) {
        let mut state = self.state.lock();
        while state.completed < seq {
            self.progressed.wait(&mut state);
        }
    }
}

impl Event for StreamEvent {
    fn wait(&self) {
        self.shared.wait_until(self.seq);
    }

    fn is_complete(&self) -> bool {
        self.shared.state.lock().completed >= self.seq
    }
}

impl Resource for Stream {
    type Event = StreamEvent;

    fn wait(&self) {
        let submitted = self.shared.state.lock().submitted;
        self.shared.wait_until(submitted);
    }

    fn wait_for<E: Event + ?Sized>(&self, event: &E) {
        event.wait();
    }

    fn get_event(&self) -> StreamEvent {
        StreamEvent {
            seq: self.shared.state.lock().submitted,
            shared: Arc::clone(&self.shared),
        }
    }
}

impl Drop for Stream {
    fn drop(&mut self) {
        self.shared.state.lock().shutdown = true;
        self.shared.queued.notify_all();
        if let Some(worker) = self.worker.take() {
            // The worker drains the queue before it observes the shutdown.
            if worker.join().is_err() {
                error!("stream worker terminated abnormally");
            }
        }
    }
}

impl fmt::Debug for Stream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.state.lock();
        f.debug_struct("Stream")
            .field("submitted", &state.submitted)
            .field("completed", &state.completed)
            .finish_non_exhaustive()
    }
}

impl fmt::Debug for StreamEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamEvent")
            .field("seq", &self.seq)
            .finish_non_exhaustive()
    }
}
