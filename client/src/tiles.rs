//! Raster basemap tiles for one mounted map.
//!
//! [`TileBook`] is the bookkeeping (what is cached, failed, queued or in
//! flight) and knows nothing about the DOM. [`TileLayer`] drives it with
//! `HtmlImageElement` loads. Every map instance owns its own layer, so two
//! maps on one page never share a cache and nothing survives an unmount.

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet, VecDeque};
use std::rc::{Rc, Weak};

use fieldmap_shared::basemap::{BasemapKind, TileCoord, VisibleTile};
use fieldmap_shared::config::{TILE_CACHE_MAX_ENTRIES, TILE_CONCURRENCY};
use js_sys::Reflect;
use tracing::debug;
use wasm_bindgen::JsCast;
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::JsFuture;
use web_sys::HtmlImageElement;

use crate::render_loop::FrameHandle;

const ONLOAD_HANDLE_KEY: &str = "__fieldmapTileOnload";
const ONERROR_HANDLE_KEY: &str = "__fieldmapTileOnerror";

/// How many zoom levels up to look for a stand-in while a tile loads.
pub const FALLBACK_LEVELS: u32 = 3;

pub struct TileBook<I> {
    generation: u64,
    ready: HashMap<TileCoord, I>,
    ready_order: VecDeque<TileCoord>,
    failed: HashSet<TileCoord>,
    loading: HashSet<TileCoord>,
    queue: VecDeque<TileCoord>,
    concurrency: usize,
    capacity: usize,
}

impl<I> TileBook<I> {
    pub fn new(concurrency: usize, capacity: usize) -> Self {
        Self {
            generation: 0,
            ready: HashMap::new(),
            ready_order: VecDeque::new(),
            failed: HashSet::new(),
            loading: HashSet::new(),
            queue: VecDeque::new(),
            concurrency: concurrency.max(1),
            capacity: capacity.max(1),
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Forget everything. Loads started before the reset are ignored when
    /// they complete.
    pub fn reset(&mut self) {
        self.generation += 1;
        self.ready.clear();
        self.ready_order.clear();
        self.failed.clear();
        self.loading.clear();
        self.queue.clear();
    }

    /// Replace the queue with the tiles in `wanted` that still need fetching,
    /// keeping their order. Wrapped copies of one tile are fetched once.
    pub fn want(&mut self, wanted: impl IntoIterator<Item = TileCoord>) {
        let mut seen = HashSet::new();
        self.queue = wanted
            .into_iter()
            .filter(|c| {
                seen.insert(*c)
                    && !self.ready.contains_key(c)
                    && !self.failed.contains(c)
                    && !self.loading.contains(c)
            })
            .collect();
    }

    /// Next tile to start loading, if a slot is free.
    pub fn next_job(&mut self) -> Option<TileCoord> {
        if self.loading.len() >= self.concurrency {
            return None;
        }
        let coord = self.queue.pop_front()?;
        self.loading.insert(coord);
        Some(coord)
    }

    /// Record a finished load. Returns `false` for loads from before a reset.
    pub fn finish(&mut self, generation: u64, coord: TileCoord, image: Option<I>) -> bool {
        if generation != self.generation {
            return false;
        }
        self.loading.remove(&coord);
        match image {
            Some(image) => {
                if self.ready.insert(coord, image).is_none() {
                    self.ready_order.push_back(coord);
                }
                self.evict();
            }
            None => {
                self.failed.insert(coord);
            }
        }
        true
    }

    fn evict(&mut self) {
        while self.ready.len() > self.capacity {
            let Some(oldest) = self.ready_order.pop_front() else {
                break;
            };
            self.ready.remove(&oldest);
        }
    }

    pub fn get(&self, coord: TileCoord) -> Option<&I> {
        self.ready.get(&coord)
    }

    /// The tile itself or the closest loaded ancestor within `levels` zooms.
    pub fn best(&self, coord: TileCoord, levels: u32) -> Option<(&I, TileCoord)> {
        (0..=levels.min(coord.z))
            .filter_map(|up| ancestor(coord, up))
            .find_map(|c| self.ready.get(&c).map(|image| (image, c)))
    }

    pub fn is_idle(&self) -> bool {
        self.loading.is_empty() && self.queue.is_empty()
    }

    pub fn cached(&self) -> usize {
        self.ready.len()
    }
}

pub fn ancestor(coord: TileCoord, levels: u32) -> Option<TileCoord> {
    if levels > coord.z {
        return None;
    }
    Some(TileCoord {
        z: coord.z - levels,
        x: coord.x >> levels,
        y: coord.y >> levels,
    })
}

/// Part of `ancestor`'s image that covers `coord`, as fractions of the
/// image size: `(left, top, size)`.
pub fn ancestor_crop(coord: TileCoord, ancestor: TileCoord) -> (f64, f64, f64) {
    let levels = coord.z.saturating_sub(ancestor.z);
    let span = (1_u64 << levels) as f64;
    let mask = (1_u32 << levels) - 1;
    (
        (coord.x & mask) as f64 / span,
        (coord.y & mask) as f64 / span,
        1.0 / span,
    )
}

pub struct TileLayer {
    inner: Rc<LayerInner>,
}

struct LayerInner {
    kind: Cell<BasemapKind>,
    book: RefCell<TileBook<HtmlImageElement>>,
    pending: RefCell<HashMap<TileCoord, HtmlImageElement>>,
    repaint: RefCell<FrameHandle>,
}

impl TileLayer {
    pub fn new(kind: BasemapKind) -> Self {
        Self {
            inner: Rc::new(LayerInner {
                kind: Cell::new(kind),
                book: RefCell::new(TileBook::new(TILE_CONCURRENCY, TILE_CACHE_MAX_ENTRIES)),
                pending: RefCell::new(HashMap::new()),
                repaint: RefCell::new(FrameHandle::default()),
            }),
        }
    }

    /// Who to wake when a tile arrives.
    pub fn set_repaint(&self, handle: FrameHandle) {
        *self.inner.repaint.borrow_mut() = handle;
    }

    pub fn kind(&self) -> BasemapKind {
        self.inner.kind.get()
    }

    /// Switch providers, dropping every cached and in-flight tile.
    pub fn set_basemap(&self, kind: BasemapKind) -> bool {
        if self.inner.kind.get() == kind {
            return false;
        }
        debug!(from = ?self.inner.kind.get(), to = ?kind, "basemap switched");
        self.inner.kind.set(kind);
        self.inner.abort_pending();
        self.inner.book.borrow_mut().reset();
        true
    }

    /// Queue what the current frame needs (already sorted nearest-first)
    /// and start loads up to the concurrency limit.
    pub fn request(&self, tiles: &[VisibleTile]) {
        self.inner
            .book
            .borrow_mut()
            .want(tiles.iter().map(|t| t.coord));
        pump(&self.inner);
    }

    pub fn best(&self, coord: TileCoord) -> Option<(HtmlImageElement, TileCoord)> {
        self.inner
            .book
            .borrow()
            .best(coord, FALLBACK_LEVELS)
            .map(|(image, c)| (image.clone(), c))
    }
}

impl Drop for TileLayer {
    fn drop(&mut self) {
        self.inner.abort_pending();
        self.inner.book.borrow_mut().reset();
        *self.inner.repaint.borrow_mut() = FrameHandle::default();
    }
}

impl LayerInner {
    fn abort_pending(&self) {
        for (_, img) in self.pending.borrow_mut().drain() {
            clear_image_handlers(&img);
        }
    }
}

fn pump(inner: &Rc<LayerInner>) {
    loop {
        let job = {
            let mut book = inner.book.borrow_mut();
            book.next_job().map(|coord| (coord, book.generation()))
        };
        let Some((coord, generation)) = job else {
            break;
        };
        load_tile(inner, coord, generation);
    }
}

fn load_tile(inner: &Rc<LayerInner>, coord: TileCoord, generation: u64) {
    let url = inner.kind.get().tile_url(coord);
    let weak = Rc::downgrade(inner);
    let Ok(img) = HtmlImageElement::new() else {
        settle(&weak, generation, coord, None);
        return;
    };

    let img_for_load = img.clone();
    let weak_load = weak.clone();
    let onload = Closure::<dyn FnMut()>::new(move || {
        clear_image_handlers(&img_for_load);
        let img = img_for_load.clone();
        let weak = weak_load.clone();
        wasm_bindgen_futures::spawn_local(async move {
            let _ = JsFuture::from(img.decode()).await;
            settle(&weak, generation, coord, Some(img));
        });
    });

    let img_for_error = img.clone();
    let onerror = Closure::<dyn FnMut()>::new(move || {
        clear_image_handlers(&img_for_error);
        debug!(z = coord.z, x = coord.x, y = coord.y, "tile failed to load");
        settle(&weak, generation, coord, None);
    });

    let onload_js = onload.into_js_value();
    let onerror_js = onerror.into_js_value();
    img.set_onload(Some(onload_js.unchecked_ref()));
    img.set_onerror(Some(onerror_js.unchecked_ref()));
    let _ = Reflect::set(
        img.as_ref(),
        &JsValue::from_str(ONLOAD_HANDLE_KEY),
        &onload_js,
    );
    let _ = Reflect::set(
        img.as_ref(),
        &JsValue::from_str(ONERROR_HANDLE_KEY),
        &onerror_js,
    );
    inner.pending.borrow_mut().insert(coord, img.clone());
    img.set_src(&url);
}

fn settle(
    weak: &Weak<LayerInner>,
    generation: u64,
    coord: TileCoord,
    image: Option<HtmlImageElement>,
) {
    let Some(inner) = weak.upgrade() else {
        return;
    };
    let loaded = image.is_some();
    if !inner.book.borrow_mut().finish(generation, coord, image) {
        return;
    }
    inner.pending.borrow_mut().remove(&coord);
    if loaded {
        inner.repaint.borrow().mark_dirty();
    }
    pump(&inner);
}

fn clear_image_handlers(img: &HtmlImageElement) {
    img.set_onload(None);
    img.set_onerror(None);
    let _ = Reflect::delete_property(img.as_ref(), &JsValue::from_str(ONLOAD_HANDLE_KEY));
    let _ = Reflect::delete_property(img.as_ref(), &JsValue::from_str(ONERROR_HANDLE_KEY));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn c(z: u32, x: u32, y: u32) -> TileCoord {
        TileCoord { z, x, y }
    }

    #[test]
    fn loads_respect_concurrency_and_skip_known_tiles() {
        let mut book: TileBook<u32> = TileBook::new(2, 16);
        book.want([c(3, 0, 0), c(3, 1, 0), c(3, 2, 0)]);
        assert_eq!(book.next_job(), Some(c(3, 0, 0)));
        assert_eq!(book.next_job(), Some(c(3, 1, 0)));
        assert_eq!(book.next_job(), None);

        let generation = book.generation();
        assert!(book.finish(generation, c(3, 0, 0), Some(7)));
        assert!(book.finish(generation, c(3, 1, 0), None));
        assert_eq!(book.next_job(), Some(c(3, 2, 0)));

        // Loaded, failed and in-flight tiles are never queued again.
        book.want([c(3, 0, 0), c(3, 1, 0), c(3, 2, 0), c(3, 3, 0)]);
        assert_eq!(book.next_job(), Some(c(3, 3, 0)));
        assert_eq!(book.next_job(), None);
        assert_eq!(book.get(c(3, 0, 0)), Some(&7));
    }

    #[test]
    fn loads_from_before_a_basemap_switch_are_dropped() {
        let mut book: TileBook<u32> = TileBook::new(4, 16);
        book.want([c(2, 1, 1)]);
        let job = book.next_job().unwrap();
        let old = book.generation();
        book.reset();
        assert!(!book.finish(old, job, Some(1)));
        assert_eq!(book.cached(), 0);
        assert!(book.is_idle());
    }

    #[test]
    fn oldest_tiles_are_evicted_past_capacity() {
        let mut book: TileBook<u32> = TileBook::new(8, 2);
        book.want([c(1, 0, 0), c(1, 1, 0), c(1, 0, 1)]);
        let g = book.generation();
        for (i, coord) in [c(1, 0, 0), c(1, 1, 0), c(1, 0, 1)].into_iter().enumerate() {
            assert_eq!(book.next_job(), Some(coord));
            book.finish(g, coord, Some(i as u32));
        }
        assert_eq!(book.cached(), 2);
        assert!(book.get(c(1, 0, 0)).is_none());
        assert_eq!(book.get(c(1, 0, 1)), Some(&2));
    }

    #[test]
    fn missing_tile_falls_back_to_loaded_parent() {
        let mut book: TileBook<&str> = TileBook::new(4, 16);
        book.want([c(4, 2, 3)]);
        book.next_job();
        book.finish(book.generation(), c(4, 2, 3), Some("parent"));

        let (image, from) = book.best(c(6, 9, 13), FALLBACK_LEVELS).unwrap();
        assert_eq!((*image, from), ("parent", c(4, 2, 3)));
        assert!(book.best(c(8, 36, 52), FALLBACK_LEVELS).is_none());
    }

    #[test]
    fn ancestor_crop_selects_the_matching_quadrant() {
        let child = c(5, 13, 6);
        let parent = ancestor(child, 1).unwrap();
        assert_eq!(parent, c(4, 6, 3));
        assert_eq!(ancestor_crop(child, parent), (0.5, 0.0, 0.5));

        let grand = ancestor(child, 2).unwrap();
        assert_eq!(ancestor_crop(child, grand), (0.25, 0.5, 0.25));
        assert_eq!(ancestor_crop(child, child), (0.0, 0.0, 1.0));
        assert!(ancestor(c(1, 0, 0), 2).is_none());
    }
}
