//! Deferred deallocation for render-thread data
//!
//! The mixer publishes its track list as a `basedrop::SharedCell`. When a new
//! list is published, the old one may still be referenced by the render
//! thread; its final drop only enqueues it, and a background thread named
//! `cuemix-gc` frees it. The render thread never runs a deallocation.

use basedrop::{Collector, Handle};
use std::sync::mpsc;
use std::sync::OnceLock;
use std::thread;
use std::time::Duration;

static GC_HANDLE: OnceLock<Handle> = OnceLock::new();

/// How often the collector thread reclaims queued drops
const COLLECT_INTERVAL: Duration = Duration::from_millis(100);

fn init_gc() -> Handle {
    let (tx, rx) = mpsc::channel();

    let spawned = thread::Builder::new()
        .name("cuemix-gc".to_string())
        .spawn(move || {
            // Collector is !Sync, so it lives on this thread only
            let mut collector = Collector::new();
            if tx.send(collector.handle()).is_err() {
                return;
            }
            log::info!("Collector thread started");

            loop {
                collector.collect();
                thread::sleep(COLLECT_INTERVAL);
            }
        });

    match spawned.ok().and_then(|_| rx.recv().ok()) {
        Some(handle) => handle,
        None => {
            // No collector thread: reclaim nothing rather than fail. Memory
            // queued through this handle is leaked.
            log::error!("Could not start collector thread; deferred drops will leak");
            let collector = Collector::new();
            let handle = collector.handle();
            std::mem::forget(collector);
            handle
        }
    }
}

/// Handle for creating `Shared<T>` / `SharedCell<T>` values
pub fn gc_handle() -> Handle {
    GC_HANDLE.get_or_init(init_gc).clone()
}

#[cfg(test)]
mod tests {
    use super::*;
    use basedrop::{Shared, SharedCell};

    #[test]
    fn test_shared_cell_swap() {
        let handle = gc_handle();
        let cell = SharedCell::new(Shared::new(&handle, vec![1, 2, 3]));
        let before = cell.get();
        let old = cell.replace(Shared::new(&handle, vec![4]));
        assert_eq!(*before, vec![1, 2, 3]);
        assert_eq!(*old, vec![1, 2, 3]);
        assert_eq!(*cell.get(), vec![4]);
    }
}
