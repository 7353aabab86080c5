use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use wasm_bindgen::prelude::*;

/// Coalesces repaint requests into at most one `requestAnimationFrame`
/// callback per vsync.
///
/// Each mounted map owns one scheduler. Tile loads and pointer handlers hold
/// a [`FrameHandle`] instead, so a late image `onload` after unmount only
/// finds a dead weak reference.
pub struct FrameScheduler {
    inner: Rc<Inner>,
}

struct Inner {
    window: Option<web_sys::Window>,
    dirty: Cell<bool>,
    scheduled: Cell<bool>,
    raf_id: Cell<Option<i32>>,
    callback: RefCell<Option<Closure<dyn FnMut()>>>,
}

impl Inner {
    fn request(&self) {
        if self.scheduled.get() {
            return;
        }
        let callback = self.callback.borrow();
        let (Some(cb), Some(window)) = (callback.as_ref(), self.window.as_ref()) else {
            return;
        };
        self.scheduled.set(true);
        match window.request_animation_frame(cb.as_ref().unchecked_ref()) {
            Ok(id) => self.raf_id.set(Some(id)),
            Err(_) => self.scheduled.set(false),
        }
    }

    fn mark_dirty(&self) {
        self.dirty.set(true);
        self.request();
    }
}

impl FrameScheduler {
    /// `paint` returns `true` while it wants another frame (tiles still
    /// fading in, for example).
    pub fn new(paint: impl Fn() -> bool + 'static) -> Self {
        let inner = Rc::new(Inner {
            window: web_sys::window(),
            dirty: Cell::new(false),
            scheduled: Cell::new(false),
            raf_id: Cell::new(None),
            callback: RefCell::new(None),
        });

        let weak = Rc::downgrade(&inner);
        let cb = Closure::<dyn FnMut()>::new(move || {
            let Some(inner) = weak.upgrade() else {
                return;
            };
            inner.scheduled.set(false);
            inner.raf_id.set(None);
            if !inner.dirty.replace(false) {
                return;
            }
            if paint() {
                inner.mark_dirty();
            }
        });
        *inner.callback.borrow_mut() = Some(cb);

        Self { inner }
    }

    pub fn mark_dirty(&self) {
        self.inner.mark_dirty();
    }

    pub fn handle(&self) -> FrameHandle {
        FrameHandle {
            inner: Rc::downgrade(&self.inner),
        }
    }
}

impl Drop for FrameScheduler {
    fn drop(&mut self) {
        if let Some(raf_id) = self.inner.raf_id.replace(None)
            && let Some(window) = self.inner.window.as_ref()
        {
            let _ = window.cancel_animation_frame(raf_id);
        }
        self.inner.scheduled.set(false);
        self.inner.dirty.set(false);
        self.inner.callback.borrow_mut().take();
    }
}

/// Weak repaint trigger for callbacks that may outlive the map.
#[derive(Clone, Default)]
pub struct FrameHandle {
    inner: Weak<Inner>,
}

impl FrameHandle {
    pub fn mark_dirty(&self) {
        if let Some(inner) = self.inner.upgrade() {
            inner.mark_dirty();
        }
    }
}
