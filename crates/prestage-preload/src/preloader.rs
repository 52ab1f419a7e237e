//! Preloader
//!
//! Queue and loop controller. Owns an ordered arena of resources, drives
//! them one at a time in queue order, deduplicates by (kind, urls)
//! identity, and offers a rush fast path that trades strict ordering for
//! immediate availability of one asset.

use std::mem;
use std::time::Instant;

use prestage_dom::{Document, NodeId};

use crate::events::Signal;
use crate::resource::{LoadState, MediaKind, PollPolicy, PollVerdict, Resource, ResourceId};
use crate::timer::Scheduler;
use crate::PreloadError;

/// Scheduled work items
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Task {
    /// Progress poll for a loading resource
    Poll(ResourceId),
    /// Deferred ready notification for an already-settled resource
    Notify(ResourceId),
}

/// Construction options
#[derive(Debug, Clone, Default)]
pub struct PreloaderOptions {
    /// Emit per-poll and per-transition debug diagnostics
    pub verbose: bool,
    /// Staging container to use instead of the auto-created hidden one
    pub container: Option<NodeId>,
    /// Timing policy for the poll loop
    pub policy: PollPolicy,
}

/// Queue-level signals
#[derive(Debug, Default)]
pub struct PreloaderEvents {
    /// Queue drained: no idle or loading resource left. Re-emitted by later
    /// driver calls that find the queue still drained; "currently drained",
    /// not a one-shot terminal event.
    pub finish: Signal<()>,
}

/// Sequential media preloader
pub struct Preloader {
    resources: Vec<Resource>,
    paused: bool,
    container: Option<NodeId>,
    scheduler: Scheduler<Task>,
    policy: PollPolicy,
    verbose: bool,
    /// Queue-level signals
    pub events: PreloaderEvents,
}

impl Preloader {
    pub fn new(options: PreloaderOptions) -> Self {
        Self {
            resources: Vec::new(),
            paused: false,
            container: options.container,
            scheduler: Scheduler::new(),
            policy: options.policy,
            verbose: options.verbose,
            events: PreloaderEvents::default(),
        }
    }

    /// Request a resource, rush-aware. The entry point for calling code.
    ///
    /// Resolves the resource by (kind, urls) identity, creating and queueing
    /// it only if no equal resource exists. With `rush` the automatic loop
    /// is paused, any other in-flight resource is aborted, and this one is
    /// staged immediately, bypassing queue order. The callback fires exactly
    /// once, off the caller's stack, with `(error, element)` once the shared
    /// resource settles; repeated loads of the same identity share one
    /// resource and every callback fires.
    pub fn load(
        &mut self,
        dom: &mut Document,
        kind: MediaKind,
        urls: &[&str],
        rush: bool,
        now: Instant,
        callback: impl FnOnce(Option<&PreloadError>, Option<NodeId>) + 'static,
    ) -> ResourceId {
        if urls.is_empty() {
            log::warn!("load: empty url list for {} resource", kind);
        }

        let id = match self.find(&kind, urls) {
            Some(id) => id,
            None => {
                let id = ResourceId(self.resources.len());
                let urls = urls.iter().map(|u| u.to_string()).collect();
                self.resources.push(Resource::new(kind, urls));
                if self.verbose {
                    let r = &self.resources[id.0];
                    log::debug!("queued {} #{} ({} urls)", r.kind(), id.0, r.urls().len());
                }
                id
            }
        };

        if rush {
            self.paused = true;
            if let Some(active) = self.current_loading() {
                if active != id {
                    if self.verbose {
                        log::debug!("rush: aborting in-flight #{}", active.0);
                    }
                    self.abort_resource(dom, active);
                }
            }
        }

        // A failed resource keeps its dead element around; clear it so the
        // new attempt re-enters loading from idle.
        if self.resources[id.0].state == LoadState::Errored {
            self.abort_resource(dom, id);
        }

        if rush {
            if self.resources[id.0].element.is_none() {
                self.insert_resource(dom, id, true, now);
            }
        } else if !self.paused {
            self.advance(dom, now);
        }

        self.ready(id, callback);
        id
    }

    /// Invoke `callback` once the resource settles, or on the next pump if
    /// it already completed. Never runs on the caller's stack.
    pub fn ready(
        &mut self,
        id: ResourceId,
        callback: impl FnOnce(Option<&PreloadError>, Option<NodeId>) + 'static,
    ) {
        let complete = {
            let Some(r) = self.resources.get_mut(id.0) else {
                log::warn!("ready: unknown resource {:?}", id);
                return;
            };
            r.waiters.push(Box::new(callback));
            r.state == LoadState::Complete
        };
        if complete {
            self.scheduler.schedule_immediate(Task::Notify(id));
        }
    }

    /// Stop the automatic loop; the in-flight resource is untouched
    pub fn pause(&mut self) {
        self.paused = true;
    }

    /// Restart the automatic loop
    pub fn resume(&mut self, dom: &mut Document, now: Instant) {
        self.paused = false;
        self.advance(dom, now);
    }

    /// Abort the in-flight resource, if any
    pub fn abort(&mut self, dom: &mut Document) {
        if let Some(id) = self.current_loading() {
            self.abort_resource(dom, id);
        }
    }

    /// Cancel and reset one resource: detach its element, cancel its poll
    /// chain, and return it to idle. Safe on any state; a no-op without a
    /// staged element. Waiters pending on a mid-load abort are failed with
    /// `ElementRemoved`, matching what the stale poll would have reported.
    pub fn abort_resource(&mut self, dom: &mut Document, id: ResourceId) {
        let Some(resource) = self.resources.get_mut(id.0) else {
            log::warn!("abort_resource: unknown resource {:?}", id);
            return;
        };
        if let Some(task) = resource.poll_task.take() {
            self.scheduler.cancel(task);
        }

        let was_loading = self.resources[id.0].state == LoadState::Loading;
        if !self.resources[id.0].abort_dom(dom.tree_mut()) {
            return;
        }
        if self.verbose {
            log::debug!("aborted {} #{}", self.resources[id.0].kind(), id.0);
        }

        if was_loading {
            let waiters = mem::take(&mut self.resources[id.0].waiters);
            let err = PreloadError::ElementRemoved;
            self.resources[id.0].events.error.emit(&err);
            for waiter in waiters {
                waiter(Some(&err), None);
            }
        }
    }

    /// The loop driver: stage the first idle resource in queue order.
    ///
    /// Idempotent and safe to call at any time. No-op while paused or while
    /// a queued resource is already staged; emits the `finish` signal when
    /// nothing is left to drive.
    pub fn advance(&mut self, dom: &mut Document, now: Instant) {
        if self.paused {
            return;
        }
        let Some(index) = self.resources.iter().position(|r| !r.is_settled()) else {
            if self.verbose {
                log::debug!("queue drained");
            }
            self.events.finish.emit(&());
            return;
        };
        if self.resources[index].element.is_some() {
            // Already staged; its poll chain is driving it
            return;
        }
        self.insert_resource(dom, ResourceId(index), false, now);
    }

    /// Move all staged children to a new container, preserving document
    /// order, and use it from now on
    pub fn set_container(&mut self, dom: &mut Document, new_container: NodeId) {
        if dom.tree().get(new_container).is_none() {
            log::warn!("set_container: unknown node {:?}", new_container);
            return;
        }
        if let Some(old) = self.container {
            if old != new_container {
                let staged: Vec<NodeId> = dom.tree().children(old).collect();
                for child in staged {
                    dom.tree_mut().append_child(new_container, child);
                }
            }
        }
        self.container = Some(new_container);
    }

    /// Execute every task that is due at `now`. The host's pump: call from
    /// a timer or frame loop, using [`Preloader::next_deadline`] to sleep
    /// between pumps.
    pub fn run_due(&mut self, dom: &mut Document, now: Instant) {
        while let Some(task) = self.scheduler.pop_due(now) {
            match task {
                Task::Poll(id) => self.poll(dom, id, now),
                Task::Notify(id) => self.notify(id),
            }
        }
    }

    /// Earliest pending poll deadline, for host sleep scheduling
    pub fn next_deadline(&self) -> Option<Instant> {
        self.scheduler.next_deadline()
    }

    /// Whether a pump is wanted right now (deferred notifications pending)
    pub fn has_immediate_work(&self) -> bool {
        self.scheduler.has_immediate()
    }

    /// Number of known resources, settled or not
    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Number of resources the loop still has to drive
    pub fn pending(&self) -> usize {
        self.resources.iter().filter(|r| !r.is_settled()).count()
    }

    /// Whether every queued resource has settled
    pub fn is_drained(&self) -> bool {
        self.pending() == 0
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// The current staging container, once one exists
    pub fn container(&self) -> Option<NodeId> {
        self.container
    }

    /// Look up a resource by identity
    pub fn find(&self, kind: &MediaKind, urls: &[&str]) -> Option<ResourceId> {
        self.resources
            .iter()
            .position(|r| r.matches(kind, urls))
            .map(ResourceId)
    }

    pub fn contains(&self, kind: &MediaKind, urls: &[&str]) -> bool {
        self.find(kind, urls).is_some()
    }

    pub fn resource(&self, id: ResourceId) -> Option<&Resource> {
        self.resources.get(id.0)
    }

    pub fn resource_mut(&mut self, id: ResourceId) -> Option<&mut Resource> {
        self.resources.get_mut(id.0)
    }

    fn current_loading(&self) -> Option<ResourceId> {
        self.resources
            .iter()
            .position(|r| r.state == LoadState::Loading)
            .map(ResourceId)
    }

    fn ensure_container(&mut self, dom: &mut Document) -> NodeId {
        if let Some(container) = self.container {
            if dom.tree().get(container).is_some() {
                return container;
            }
            log::warn!("staging container {:?} vanished, recreating", container);
        }
        let body = dom.body();
        let tree = dom.tree_mut();
        let container = tree.create_element("div");
        tree.set_attr(container, "hidden", "");
        tree.set_attr(container, "aria-hidden", "true");
        tree.append_child(body, container);
        self.container = Some(container);
        if self.verbose {
            log::debug!("created staging container {:?}", container);
        }
        container
    }

    /// Stage a resource: build its element, start its poll chain
    fn insert_resource(&mut self, dom: &mut Document, id: ResourceId, rush: bool, now: Instant) {
        let container = self.ensure_container(dom);
        let element = self.resources[id.0].build_element(dom.tree_mut());
        dom.tree_mut().append_child(container, element);

        let poll = self
            .scheduler
            .schedule_at(now + self.policy.poll_interval, Task::Poll(id));

        let r = &mut self.resources[id.0];
        r.element = Some(element);
        r.state = LoadState::Loading;
        r.started_at = Some(now);
        r.rush = rush;
        r.error = None;
        r.poll_task = Some(poll);

        if self.verbose {
            let r = &self.resources[id.0];
            let mode = if rush { " (rush)" } else { "" };
            log::debug!("staged {} #{}{}", r.kind(), id.0, mode);
        }
    }

    /// The single completion funnel. Settles the resource, notifies signal
    /// listeners and waiters (on success and failure alike), and keeps the
    /// queue moving unless paused.
    fn finish_resource(
        &mut self,
        dom: &mut Document,
        id: ResourceId,
        error: Option<PreloadError>,
        now: Instant,
    ) {
        if self.resources[id.0].state != LoadState::Loading {
            return;
        }
        if let Some(task) = self.resources[id.0].poll_task.take() {
            self.scheduler.cancel(task);
        }

        let (waiters, element) = {
            let r = &mut self.resources[id.0];
            match &error {
                None => {
                    r.state = LoadState::Complete;
                    r.error = None;
                    r.events.finish.emit(&());
                }
                Some(err) => {
                    r.state = LoadState::Errored;
                    r.error = Some(err.clone());
                    r.events.error.emit(err);
                }
            }
            (mem::take(&mut r.waiters), r.element)
        };

        match &error {
            None => {
                if self.verbose {
                    log::debug!("finished {} #{}", self.resources[id.0].kind(), id.0);
                }
            }
            Some(err) => {
                log::warn!("{} #{} failed: {}", self.resources[id.0].kind(), id.0, err);
            }
        }

        for waiter in waiters {
            waiter(error.as_ref(), element);
        }

        if !self.paused {
            self.advance(dom, now);
        }
    }

    /// One poll of a loading resource
    fn poll(&mut self, dom: &mut Document, id: ResourceId, now: Instant) {
        if self.resources[id.0].state != LoadState::Loading {
            // Structurally cancelled; a stale task means nothing to do
            return;
        }
        self.resources[id.0].poll_task = None;

        let Some(element) = self.resources[id.0].element else {
            self.finish_resource(dom, id, Some(PreloadError::ElementRemoved), now);
            return;
        };
        if !dom.tree().is_attached(element) {
            // The host removed the element behind our back
            self.finish_resource(dom, id, Some(PreloadError::ElementRemoved), now);
            return;
        }

        let completed = self.resources[id.0].estimate(dom.tree());
        self.resources[id.0].events.progress.emit(&completed);

        let (elapsed, rush) = {
            let r = &self.resources[id.0];
            let started = r.started_at.unwrap_or(now);
            (now.saturating_duration_since(started), r.rush)
        };
        let verdict = self.policy.verdict(elapsed, completed, rush);
        if self.verbose {
            log::debug!(
                "poll {} #{}: {:.2} after {}ms -> {:?}",
                self.resources[id.0].kind(),
                id.0,
                completed,
                elapsed.as_millis(),
                verdict
            );
        }

        match verdict {
            PollVerdict::Continue => {
                let task = self
                    .scheduler
                    .schedule_at(now + self.policy.poll_interval, Task::Poll(id));
                self.resources[id.0].poll_task = Some(task);
            }
            PollVerdict::Finish => self.finish_resource(dom, id, None, now),
            PollVerdict::Fail(err) => self.finish_resource(dom, id, Some(err), now),
        }
    }

    /// Deferred delivery for `ready` on an already-settled resource
    fn notify(&mut self, id: ResourceId) {
        let Some(r) = self.resources.get_mut(id.0) else {
            return;
        };
        if r.state == LoadState::Loading {
            // Re-staged since the notification was queued; the completion
            // funnel will deliver instead
            return;
        }
        let waiters = mem::take(&mut r.waiters);
        let element = r.element;
        let error = r.error.clone();
        for waiter in waiters {
            waiter(error.as_ref(), element);
        }
    }
}

impl Default for Preloader {
    fn default() -> Self {
        Self::new(PreloaderOptions::default())
    }
}
