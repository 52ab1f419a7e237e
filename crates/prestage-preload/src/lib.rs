//! Prestage Preload
//!
//! Stages media resources (images, audio, video) in a hidden DOM container
//! before they are needed, so later "show this media" requests resolve
//! instantly.
//!
//! Features:
//! - Sequential, dedup-aware preload queue with pause/resume
//! - "Rush" fast path for urgently needed resources
//! - Polling progress estimation with tiered timeouts
//! - Typed event signals and a host-pumped cooperative scheduler
//!
//! Nothing here performs I/O: the browser's media pipeline is observed
//! through the element state in `prestage-dom`, and all deferred work runs
//! when the host pumps [`Preloader::run_due`].

pub mod events;
pub mod timer;

mod preloader;
mod resource;

pub use events::{ListenerId, Signal};
pub use preloader::{Preloader, PreloaderEvents, PreloaderOptions, Task};
pub use resource::{
    LoadState, MediaKind, PollPolicy, PollVerdict, Resource, ResourceEvents, ResourceId,
};
pub use timer::{Scheduler, TaskId};

/// Preload failure
///
/// Failures travel through the completion-callback/event channel, never as
/// panics: every operation here is asynchronous.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PreloadError {
    /// The element was removed while loading; the normal cancellation
    /// outcome of an abort.
    #[error("element removed while loading")]
    ElementRemoved,

    /// The resource stayed under half progress past the stall window;
    /// likely a missing or unreachable asset.
    #[error("load stalled past the timeout window")]
    LoadTimeout,
}
