//! Resource State Machine
//!
//! One loadable media asset: a kind plus an ordered list of alternative
//! URLs. Owns its staged DOM subtree while loading and reports lifecycle
//! through typed signals. Knows nothing about other resources; sequencing
//! lives in the preloader.

use std::fmt;
use std::time::{Duration, Instant};

use prestage_dom::{DomTree, NodeId};
use prestage_media::mime_for_url;

use crate::events::Signal;
use crate::timer::TaskId;
use crate::PreloadError;

/// Identifier of a resource within one preloader (arena index)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResourceId(pub(crate) usize);

/// Media kind, fixed at resource creation
///
/// Each kind owns its element-construction and progress-estimation
/// strategy. Unrecognized tags become [`MediaKind::Other`]: an inert
/// placeholder that reports no progress and never errors on its own, so
/// the timeout policy alone decides when it finishes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MediaKind {
    Image,
    Audio,
    Video,
    Other(String),
}

impl MediaKind {
    /// Classify a tag name
    pub fn from_tag(tag: &str) -> Self {
        match tag.to_ascii_lowercase().as_str() {
            "image" | "img" => Self::Image,
            "audio" => Self::Audio,
            "video" => Self::Video,
            other => Self::Other(other.to_string()),
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Image => f.write_str("image"),
            Self::Audio => f.write_str("audio"),
            Self::Video => f.write_str("video"),
            Self::Other(tag) => f.write_str(tag),
        }
    }
}

/// Lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoadState {
    /// No element staged
    #[default]
    Idle,
    /// Element staged, poll chain active
    Loading,
    /// Judged loaded enough; terminal until abort
    Complete,
    /// Failed; settled for scheduling, re-load starts over
    Errored,
}

/// Timing policy for the poll loop
///
/// The tiers trade correctness for responsiveness: browsers do not reliably
/// fire load events for hidden preloaded media, so partial loads are
/// accepted after a grace period and stalls are cut off entirely.
#[derive(Debug, Clone)]
pub struct PollPolicy {
    /// Delay between progress polls
    pub poll_interval: Duration,
    /// Rush mode: accept > 50% progress after this long
    pub rush_timeout: Duration,
    /// Normal mode: accept > 50% progress after this long
    pub settle_timeout: Duration,
    /// Give up with a timeout error after this long
    pub stall_timeout: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(250),
            rush_timeout: Duration::from_millis(2000),
            settle_timeout: Duration::from_millis(5000),
            stall_timeout: Duration::from_millis(20000),
        }
    }
}

/// What one poll decided
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollVerdict {
    /// Re-arm the poll
    Continue,
    /// Loaded enough; finish successfully
    Finish,
    /// Give up with an error
    Fail(PreloadError),
}

impl PollPolicy {
    /// Tier decision as a pure function of elapsed time, estimated
    /// progress, and rush mode. The stall tier is the single terminal
    /// tier: nothing past it finishes without an error.
    pub fn verdict(&self, elapsed: Duration, completed: f64, rush: bool) -> PollVerdict {
        if completed > 0.99 {
            return PollVerdict::Finish;
        }
        if rush && elapsed > self.rush_timeout && completed > 0.5 {
            return PollVerdict::Finish;
        }
        if !rush && elapsed > self.settle_timeout && completed > 0.5 {
            return PollVerdict::Finish;
        }
        if elapsed > self.stall_timeout {
            return PollVerdict::Fail(PreloadError::LoadTimeout);
        }
        PollVerdict::Continue
    }
}

/// Lifecycle signals of one resource
#[derive(Debug, Default)]
pub struct ResourceEvents {
    /// Estimated progress in [0, 1]; repeated values are normal
    pub progress: Signal<f64>,
    /// Successful completion
    pub finish: Signal<()>,
    /// Failure, with the error that settled the resource
    pub error: Signal<PreloadError>,
}

pub(crate) type ReadyFn = Box<dyn FnOnce(Option<&PreloadError>, Option<NodeId>)>;

/// One loadable media asset
pub struct Resource {
    kind: MediaKind,
    urls: Vec<String>,
    pub(crate) state: LoadState,
    pub(crate) element: Option<NodeId>,
    pub(crate) started_at: Option<Instant>,
    pub(crate) rush: bool,
    pub(crate) error: Option<PreloadError>,
    pub(crate) poll_task: Option<TaskId>,
    pub(crate) waiters: Vec<ReadyFn>,
    /// Lifecycle signals
    pub events: ResourceEvents,
}

impl Resource {
    pub(crate) fn new(kind: MediaKind, urls: Vec<String>) -> Self {
        Self {
            kind,
            urls,
            state: LoadState::Idle,
            element: None,
            started_at: None,
            rush: false,
            error: None,
            poll_task: None,
            waiters: Vec::new(),
            events: ResourceEvents::default(),
        }
    }

    pub fn kind(&self) -> &MediaKind {
        &self.kind
    }

    pub fn urls(&self) -> &[String] {
        &self.urls
    }

    pub fn state(&self) -> LoadState {
        self.state
    }

    /// Monotonic success flag; reset only by abort
    pub fn complete(&self) -> bool {
        self.state == LoadState::Complete
    }

    /// The staged element, while one exists
    pub fn element(&self) -> Option<NodeId> {
        self.element
    }

    /// The error that settled this resource, if it failed
    pub fn error(&self) -> Option<&PreloadError> {
        self.error.as_ref()
    }

    /// Settled means the scheduler is done with it: complete or errored
    pub fn is_settled(&self) -> bool {
        matches!(self.state, LoadState::Complete | LoadState::Errored)
    }

    /// Identity rule for dedup: same kind, same URLs in order and count
    pub fn matches(&self, kind: &MediaKind, urls: &[&str]) -> bool {
        self.kind == *kind
            && self.urls.len() == urls.len()
            && self.urls.iter().zip(urls).all(|(a, b)| a == b)
    }

    /// Build the kind-appropriate element tree, detached
    pub(crate) fn build_element(&self, tree: &mut DomTree) -> NodeId {
        match &self.kind {
            MediaKind::Image => {
                // Parallel fallback: one img per candidate URL, any completion wins
                let wrapper = tree.create_element("div");
                for url in &self.urls {
                    let img = tree.create_element("img");
                    tree.set_attr(img, "src", url);
                    tree.append_child(wrapper, img);
                }
                wrapper
            }
            MediaKind::Audio | MediaKind::Video => {
                let tag = if self.kind == MediaKind::Audio { "audio" } else { "video" };
                let media = tree.create_element(tag);
                tree.set_attr(media, "preload", "auto");
                for url in &self.urls {
                    let source = tree.create_element("source");
                    tree.set_attr(source, "src", url);
                    if let Some(mime) = mime_for_url(url) {
                        tree.set_attr(source, "type", mime);
                    }
                    tree.append_child(media, source);
                }
                media
            }
            MediaKind::Other(tag) => tree.create_element(tag),
        }
    }

    /// Estimated progress in [0, 1]
    ///
    /// Image: binary, 1.0 once any candidate img has decoded. Audio/video:
    /// buffered head over duration, 0.0 while duration is unknown. Other:
    /// always 0.0, leaving completion to the timeout policy.
    pub(crate) fn estimate(&self, tree: &DomTree) -> f64 {
        let Some(element) = self.element else {
            return 0.0;
        };
        match &self.kind {
            MediaKind::Image => {
                let any_complete = tree
                    .children(element)
                    .any(|child| tree.image(child).is_some_and(|img| img.complete));
                if any_complete {
                    1.0
                } else {
                    0.0
                }
            }
            MediaKind::Audio | MediaKind::Video => {
                tree.media(element).map_or(0.0, |m| m.buffered_ratio())
            }
            MediaKind::Other(_) => 0.0,
        }
    }

    /// Detach and reset to idle. Safe without an element (no-op).
    ///
    /// Videos first get their source `src` attributes cleared and the media
    /// element's `load()` reset invoked; without that, browsers keep
    /// buffering a removed element in the background.
    pub(crate) fn abort_dom(&mut self, tree: &mut DomTree) -> bool {
        let Some(element) = self.element.take() else {
            return false;
        };

        if self.kind == MediaKind::Video {
            let sources: Vec<NodeId> = tree.children(element).collect();
            for source in sources {
                tree.remove_attr(source, "src");
            }
            if let Some(media) = tree.media_mut(element) {
                media.load();
            }
        }

        tree.detach(element);
        self.state = LoadState::Idle;
        self.started_at = None;
        self.rush = false;
        self.error = None;
        true
    }
}

impl fmt::Debug for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resource")
            .field("kind", &self.kind)
            .field("urls", &self.urls)
            .field("state", &self.state)
            .field("element", &self.element)
            .field("waiters", &self.waiters.len())
            .finish()
    }
}
