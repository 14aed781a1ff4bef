#![allow(dead_code)]

use std::{
    fmt,
    ptr::NonNull,
    sync::{
        atomic::{AtomicBool, AtomicIsize, AtomicUsize, Ordering::SeqCst},
        Arc,
    },
};

use atomicref::{RefCounted, Strong};
use parking_lot::Mutex;
use tracing_subscriber::filter::LevelFilter;

/// Installs a test-writer subscriber. Safe to call from every test.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(LevelFilter::TRACE)
        .try_init();
}

#[derive(Default)]
struct Stats {
    acquired: AtomicUsize,
    released: AtomicUsize,
    destroyed: AtomicUsize,
    violations: AtomicUsize,
}

/// Point inside [`RefCounted::acquire`] where a stalled acquisition waits.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stall {
    BeforeIncrement,
    AfterIncrement,
}

type StallHook = (Stall, Box<dyn FnOnce() + Send>);

/// Heap object whose destruction is only recorded.
///
/// Storage lives in the [`TrackedHeap`] arena until the heap is dropped,
/// so touching a destroyed object is counted as a violation instead of being undefined behavior.
pub struct Tracked {
    id: usize,
    count: AtomicIsize,
    frozen: AtomicBool,
    destroyed: AtomicBool,
    stall: Mutex<Option<StallHook>>,
    stats: Arc<Stats>,
}

impl Tracked {
    pub fn id(&self) -> usize {
        self.id
    }

    pub fn count(&self) -> isize {
        self.count.load(SeqCst)
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(SeqCst)
    }

    pub fn freeze(&self) {
        self.frozen.store(true, SeqCst);
    }

    /// Makes the next acquisition on this object run `wait` at the given point.
    pub fn stall_next_acquire(&self, at: Stall, wait: impl FnOnce() + Send + 'static) {
        *self.stall.lock() = Some((at, Box::new(wait)));
    }

    fn violation(&self) {
        self.stats.violations.fetch_add(1, SeqCst);
    }
}

unsafe impl RefCounted for Tracked {
    fn acquire(&self) {
        let mut hook = self.stall.lock().take();
        stalled_at(Stall::BeforeIncrement, &mut hook);

        self.stats.acquired.fetch_add(1, SeqCst);
        let old = self.count.fetch_add(1, SeqCst);
        if old <= 0 || self.is_destroyed() {
            self.violation();
        }

        stalled_at(Stall::AfterIncrement, &mut hook);
    }

    unsafe fn release(this: NonNull<Self>) {
        let object = this.as_ref();
        object.stats.released.fetch_add(1, SeqCst);
        let old = object.count.fetch_sub(1, SeqCst);
        if old == 1 {
            if object.destroyed.swap(true, SeqCst) {
                object.violation();
            }
            object.stats.destroyed.fetch_add(1, SeqCst);
        } else if old <= 0 {
            object.violation();
        }
    }

    fn is_frozen(&self) -> bool {
        self.frozen.load(SeqCst)
    }
}

fn stalled_at(at: Stall, hook: &mut Option<StallHook>) {
    if hook.as_ref().map_or(false, |(point, _)| *point == at) {
        if let Some((_, wait)) = hook.take() {
            wait();
        }
    }
}

impl fmt::Debug for Tracked {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tracked")
            .field("id", &self.id)
            .field("count", &self.count())
            .field("destroyed", &self.is_destroyed())
            .finish()
    }
}

/// Instrumented fake heap.
pub struct TrackedHeap {
    stats: Arc<Stats>,
    arena: Mutex<Vec<Box<Tracked>>>,
}

impl TrackedHeap {
    pub fn new() -> Self {
        TrackedHeap {
            stats: Arc::default(),
            arena: Mutex::new(Vec::new()),
        }
    }

    /// Allocates an object and returns the only unit on it.
    pub fn alloc(&self, frozen: bool) -> Strong<Tracked> {
        let mut arena = self.arena.lock();
        let object = Box::new(Tracked {
            id: arena.len(),
            count: AtomicIsize::new(1),
            frozen: AtomicBool::new(frozen),
            destroyed: AtomicBool::new(false),
            stall: Mutex::new(None),
            stats: self.stats.clone(),
        });
        let ptr = NonNull::from(&*object);
        arena.push(object);

        unsafe { Strong::from_raw(ptr) }
    }

    pub fn frozen(&self) -> Strong<Tracked> {
        self.alloc(true)
    }

    pub fn mutable(&self) -> Strong<Tracked> {
        self.alloc(false)
    }

    pub fn allocated(&self) -> usize {
        self.arena.lock().len()
    }

    pub fn acquired(&self) -> usize {
        self.stats.acquired.load(SeqCst)
    }

    pub fn released(&self) -> usize {
        self.stats.released.load(SeqCst)
    }

    pub fn destroyed(&self) -> usize {
        self.stats.destroyed.load(SeqCst)
    }

    pub fn violations(&self) -> usize {
        self.stats.violations.load(SeqCst)
    }

    /// Sum of strong counts over every object ever allocated.
    pub fn outstanding(&self) -> isize {
        self.arena.lock().iter().map(|object| object.count()).sum()
    }

    /// Allocations plus acquisitions minus releases.
    pub fn balance(&self) -> isize {
        (self.allocated() + self.acquired()) as isize - self.released() as isize
    }
}
