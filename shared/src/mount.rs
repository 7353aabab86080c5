//! Per-instance state ownership for mounted widgets.
//!
//! A widget keeps its session in a [`MountSlot`] and gives event handlers,
//! timers and frame callbacks only [`SlotHandle`]s. Once the slot is dropped
//! at unmount every handle turns inert, so a callback that fires late cannot
//! touch a torn-down instance or leak into its replacement.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use tracing::warn;

pub struct MountSlot<S> {
    inner: Rc<RefCell<Option<S>>>,
}

impl<S> MountSlot<S> {
    pub fn new(state: S) -> Self {
        Self {
            inner: Rc::new(RefCell::new(Some(state))),
        }
    }

    pub fn handle(&self) -> SlotHandle<S> {
        SlotHandle {
            inner: Rc::downgrade(&self.inner),
        }
    }

    pub fn with<R>(&self, f: impl FnOnce(&mut S) -> R) -> Option<R> {
        self.handle().with(f)
    }
}

impl<S> Drop for MountSlot<S> {
    fn drop(&mut self) {
        if let Ok(mut state) = self.inner.try_borrow_mut() {
            state.take();
        }
    }
}

/// Weak reference to a slot's state, safe to capture in long-lived closures.
pub struct SlotHandle<S> {
    inner: Weak<RefCell<Option<S>>>,
}

impl<S> Clone for SlotHandle<S> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<S> SlotHandle<S> {
    /// Run `f` on the state if the instance is still mounted.
    pub fn with<R>(&self, f: impl FnOnce(&mut S) -> R) -> Option<R> {
        let inner = self.inner.upgrade()?;
        let Ok(mut state) = inner.try_borrow_mut() else {
            warn!("re-entrant widget state access ignored");
            return None;
        };
        state.as_mut().map(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EditorConfig;
    use crate::editor::{DrawState, EditorEvent, EditorSession};
    use crate::projection::MapPoint;
    use crate::viewport::MapView;

    fn view() -> MapView {
        let mut view = MapView::new(MapPoint::new(0.0, 0.0), 10.0, 19.0);
        view.set_size(400.0, 400.0);
        view
    }

    #[test]
    fn teardown_leaves_no_trace_in_the_next_instance() {
        let view = view();
        let slot = MountSlot::new(EditorSession::new(EditorConfig::default()));
        let late_pointer_handler = slot.handle();

        let events = slot
            .with(|session| {
                let mut events = session.toggle_drawing();
                events.extend(session.add_vertex(view.screen_to_world(50.0, 50.0), &view));
                events.extend(session.add_vertex(view.screen_to_world(200.0, 50.0), &view));
                events.extend(session.add_vertex(view.screen_to_world(120.0, 200.0), &view));
                events.extend(session.finish_drawing());
                events
            })
            .unwrap();
        assert!(events.iter().any(|e| matches!(e, EditorEvent::DrawEnd(_))));
        drop(slot);

        let moved = late_pointer_handler.with(|session| {
            session.pointer_moved(view.screen_to_world(10.0, 10.0), &view);
        });
        assert!(moved.is_none());

        let fresh = MountSlot::new(EditorSession::new(EditorConfig::default()));
        let (state, geometry) = fresh
            .with(|session| (session.state(), session.geometry()))
            .unwrap();
        assert_eq!(state, DrawState::Empty);
        assert!(geometry.is_none());
        assert!(late_pointer_handler.with(|_| ()).is_none());
    }

    #[test]
    fn reentrant_access_is_refused() {
        let slot = MountSlot::new(Vec::<u32>::new());
        let handle = slot.handle();
        let nested = slot.with(|_| handle.with(|v| v.push(1)));
        assert_eq!(nested, Some(None));
        assert_eq!(slot.with(|v| v.len()), Some(0));
    }
}
