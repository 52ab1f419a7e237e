//! Edge case tests for prestage-preload
//!
//! Abort semantics, failure recovery, and recovery from host-side
//! interference with staged elements.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::{Duration, Instant};

use prestage_dom::{Document, NodeId};
use prestage_preload::{LoadState, MediaKind, PreloadError, Preloader};

fn at(t0: Instant, ms: u64) -> Instant {
    t0 + Duration::from_millis(ms)
}

fn complete_image(dom: &mut Document, wrapper: NodeId) {
    let candidates: Vec<NodeId> = dom.tree().children(wrapper).collect();
    for img in candidates {
        if let Some(state) = dom.tree_mut().image_mut(img) {
            state.complete = true;
        }
    }
}

#[test]
fn test_host_removed_element_fails_with_element_removed() {
    let t0 = Instant::now();
    let mut dom = Document::new();
    let mut pre = Preloader::default();

    let errs = Rc::new(RefCell::new(Vec::new()));
    let sink = errs.clone();
    let gone = pre.load(&mut dom, MediaKind::Image, &["gone.png"], false, t0, move |err, _| {
        sink.borrow_mut().push(err.cloned());
    });
    let survivor = pre.load(&mut dom, MediaKind::Image, &["next.png"], false, t0, |_, _| {});

    // The host rips the staged element out of the document directly
    let element = pre.resource(gone).unwrap().element().unwrap();
    dom.tree_mut().detach(element);

    pre.run_due(&mut dom, at(t0, 250));

    assert_eq!(pre.resource(gone).unwrap().state(), LoadState::Errored);
    assert_eq!(*errs.borrow(), vec![Some(PreloadError::ElementRemoved)]);

    // Treated as settled: the loop moved on
    assert_eq!(pre.resource(survivor).unwrap().state(), LoadState::Loading);
}

#[test]
fn test_abort_resets_and_is_idempotent() {
    let t0 = Instant::now();
    let mut dom = Document::new();
    let mut pre = Preloader::default();

    let errs = Rc::new(RefCell::new(Vec::new()));
    let sink = errs.clone();
    let id = pre.load(&mut dom, MediaKind::Video, &["clip.mp4"], false, t0, move |err, el| {
        sink.borrow_mut().push((err.cloned(), el));
    });

    let event_errs = Rc::new(RefCell::new(0));
    let hits = event_errs.clone();
    pre.resource_mut(id)
        .unwrap()
        .events
        .error
        .subscribe(move |_| *hits.borrow_mut() += 1);

    pre.abort(&mut dom);

    let resource = pre.resource(id).unwrap();
    assert_eq!(resource.state(), LoadState::Idle);
    assert_eq!(resource.element(), None);
    assert!(!resource.complete());
    assert_eq!(*errs.borrow(), vec![(Some(PreloadError::ElementRemoved), None)]);
    assert_eq!(*event_errs.borrow(), 1);

    // Nothing loading anymore: both abort flavors are no-ops now
    pre.abort(&mut dom);
    pre.abort_resource(&mut dom, id);
    assert_eq!(errs.borrow().len(), 1);
    assert_eq!(*event_errs.borrow(), 1);

    // The cancelled poll chain left no work behind
    pre.run_due(&mut dom, at(t0, 250));
    assert_eq!(pre.resource(id).unwrap().state(), LoadState::Idle);
}

#[test]
fn test_abort_of_complete_resource_resets_it() {
    let t0 = Instant::now();
    let mut dom = Document::new();
    let mut pre = Preloader::default();

    let id = pre.load(&mut dom, MediaKind::Image, &["a.png"], false, t0, |_, _| {});
    complete_image(&mut dom, pre.resource(id).unwrap().element().unwrap());
    pre.run_due(&mut dom, at(t0, 250));
    assert!(pre.resource(id).unwrap().complete());

    pre.abort_resource(&mut dom, id);

    let resource = pre.resource(id).unwrap();
    assert!(!resource.complete());
    assert_eq!(resource.state(), LoadState::Idle);
    assert_eq!(resource.element(), None);
}

#[test]
fn test_reload_after_failure_reuses_resource_and_recovers() {
    let t0 = Instant::now();
    let mut dom = Document::new();
    let mut pre = Preloader::default();

    let first = pre.load(&mut dom, MediaKind::Image, &["flaky.png"], false, t0, |_, _| {});
    let stale_element = pre.resource(first).unwrap().element().unwrap();

    pre.run_due(&mut dom, at(t0, 20_250));
    assert_eq!(pre.resource(first).unwrap().state(), LoadState::Errored);

    // Same identity resolves to the same resource, re-entering loading
    // from idle with a fresh element
    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = seen.clone();
    let again = pre.load(
        &mut dom,
        MediaKind::Image,
        &["flaky.png"],
        false,
        at(t0, 21_000),
        move |err, el| sink.borrow_mut().push((err.cloned(), el)),
    );

    assert_eq!(first, again);
    assert_eq!(pre.len(), 1);
    assert_eq!(pre.resource(again).unwrap().state(), LoadState::Loading);
    let fresh_element = pre.resource(again).unwrap().element().unwrap();
    assert_ne!(fresh_element, stale_element);
    assert!(!dom.tree().is_attached(stale_element));

    // This time it loads
    complete_image(&mut dom, fresh_element);
    pre.run_due(&mut dom, at(t0, 21_250));
    assert!(pre.resource(again).unwrap().complete());
    assert_eq!(*seen.borrow(), vec![(None, Some(fresh_element))]);
}

#[test]
fn test_rush_of_in_flight_resource_keeps_it_loading() {
    let t0 = Instant::now();
    let mut dom = Document::new();
    let mut pre = Preloader::default();

    let id = pre.load(&mut dom, MediaKind::Video, &["clip.mp4"], false, t0, |_, _| {});
    let element = pre.resource(id).unwrap().element().unwrap();

    // Rushing the resource that is already in flight must not abort it
    let rushed = pre.load(&mut dom, MediaKind::Video, &["clip.mp4"], true, at(t0, 100), |_, _| {});

    assert_eq!(id, rushed);
    assert!(pre.is_paused());
    assert_eq!(pre.resource(id).unwrap().state(), LoadState::Loading);
    assert_eq!(pre.resource(id).unwrap().element(), Some(element));
    assert!(dom.tree().is_attached(element));
}

#[test]
fn test_unknown_kind_gets_inert_placeholder() {
    let t0 = Instant::now();
    let mut dom = Document::new();
    let mut pre = Preloader::default();

    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = seen.clone();
    let id = pre.load(
        &mut dom,
        MediaKind::from_tag("model"),
        &["scene.glb"],
        false,
        t0,
        move |err, _| sink.borrow_mut().push(err.cloned()),
    );

    // The placeholder is an element of the requested tag
    let element = pre.resource(id).unwrap().element().unwrap();
    assert_eq!(dom.tree().tag(element), Some("model"));

    // It reports no progress of its own; the timeout policy settles it
    pre.run_due(&mut dom, at(t0, 250));
    assert_eq!(pre.resource(id).unwrap().state(), LoadState::Loading);

    pre.run_due(&mut dom, at(t0, 20_250));
    assert_eq!(*seen.borrow(), vec![Some(PreloadError::LoadTimeout)]);
}

#[test]
fn test_ready_attached_mid_load_fires_on_finish() {
    let t0 = Instant::now();
    let mut dom = Document::new();
    let mut pre = Preloader::default();

    let id = pre.load(&mut dom, MediaKind::Image, &["a.png"], false, t0, |_, _| {});

    let hits = Rc::new(RefCell::new(0));
    let sink = hits.clone();
    pre.ready(id, move |err, el| {
        assert!(err.is_none());
        assert!(el.is_some());
        *sink.borrow_mut() += 1;
    });
    assert_eq!(*hits.borrow(), 0);

    complete_image(&mut dom, pre.resource(id).unwrap().element().unwrap());
    pre.run_due(&mut dom, at(t0, 250));
    assert_eq!(*hits.borrow(), 1);

    pre.run_due(&mut dom, at(t0, 500));
    assert_eq!(*hits.borrow(), 1);
}

#[test]
fn test_empty_url_list_settles_by_timeout() {
    let t0 = Instant::now();
    let mut dom = Document::new();
    let mut pre = Preloader::default();

    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = seen.clone();
    pre.load(&mut dom, MediaKind::Image, &[], false, t0, move |err, _| {
        sink.borrow_mut().push(err.cloned());
    });

    // No candidates to ever complete; the stall tier reports the failure
    pre.run_due(&mut dom, at(t0, 20_250));
    assert_eq!(*seen.borrow(), vec![Some(PreloadError::LoadTimeout)]);
    assert!(pre.is_drained());
}
