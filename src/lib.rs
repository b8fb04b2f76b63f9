// Library exports for testing and embedding
//
// # Mutex Usage Policy
//
//   - `parking_lot::Mutex`: use for sync-only state where you need a fast,
//     non-async lock (store file access, consumer registry, scheduler state).
//     Never hold one across an `.await`.
//
//   - `tokio::sync` channels: the scheduler worker owns its queue; callers
//     talk to it over mpsc/oneshot/watch rather than sharing the queue
//     behind a lock.

/// Application version (root crate version, for use by sub-crates).
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[macro_use]
pub mod debug;

pub mod cli;
pub mod sync;
