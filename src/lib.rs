//! DAG executor and type-erased heterogeneous work storage.
//!
//! This crate runs graphs of interdependent work items exactly once each, in
//! an order consistent with their dependencies, and batches many small
//! callables of different types into compact replayable storages. It:
//! - Derives every execution plan from a single dependency-respecting walk
//!   (`Dag::forward_traverse`).
//! - Offers three interchangeable backends: a sequential loop, a recursive
//!   fan-out with atomic fan-in counters, and tasks ordered by data-flow
//!   tags.
//! - Packs jobs of arbitrary types behind per-type static vtables under
//!   three memory layouts, relocating them on growth without ever leaving a
//!   storage half-moved.
//!
//! Key modules:
//! - `dag`: graph building, traversal and validation.
//! - `executor`: the `DagExec` trait and its backends.
//! - `node`: work items that graph nodes hold.
//! - `resource`: execution resources and their events.
//! - `work`: job storages, runners, and the pool/group batching layer.
//! - `config`: executor options.
//!
//! Quick start:
//! 1. Build a `Dag` with `add_node(id, dependencies, work)`.
//! 2. Freeze it into a backend with `Dag::instantiate`.
//! 3. Call `exec` with the resource to run on, as many times as needed.
//!
//! When a node runs, all of its dependencies have completed and their events
//! have been waited on by the graph resource, so their effects are visible.

/// Executor options: validation mode and dedicated thread pool.
pub mod config;
/// Graph building, generic traversal and structural validation.
pub mod dag;
/// Execution plans derived from a frozen graph.
///
/// Contains the `DagExec` trait, a sequential backend and two backends
/// running nodes in parallel on the rayon pool.
pub mod executor;
/// Work items held by graph nodes.
pub mod node;
/// Execution resources: the host thread and in-order streams.
pub mod resource;
mod sync;
/// Common aliases and the `SyncUnsafeCell` primitive used internally.
pub mod types;
/// Type-erased heterogeneous job storage.
///
/// Jobs of arbitrary callable types are stored as records made of a pointer
/// to a per-type static vtable followed by the job itself. Three layout
/// policies trade growth cost against iteration locality.
pub mod work;

pub use crate::sync::FanIn;
