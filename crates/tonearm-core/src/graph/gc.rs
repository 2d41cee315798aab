//! Deferred deallocation for render-thread values
//!
//! Source nodes and convolvers hold decoded audio and FFT state that can run
//! to hundreds of megabytes. They travel to the renderer wrapped in
//! `basedrop::Owned`, so when the renderer drops one it only enqueues a
//! pointer. The memory is released on the `tonearm-gc` thread.

use basedrop::{Collector, Handle};
use std::sync::mpsc;
use std::sync::OnceLock;
use std::thread;
use std::time::Duration;

static COLLECTOR: OnceLock<Handle> = OnceLock::new();

/// How often the collector thread reclaims queued drops
const COLLECT_INTERVAL: Duration = Duration::from_millis(100);

fn spawn_collector() -> Handle {
    let (tx, rx) = mpsc::channel();

    let spawned = thread::Builder::new()
        .name("tonearm-gc".to_string())
        .spawn(move || {
            // Collector is !Sync, it must live on this thread
            let mut collector = Collector::new();
            if tx.send(collector.handle()).is_err() {
                return;
            }
            log::debug!("Deferred drop collector running");

            loop {
                collector.collect();
                thread::sleep(COLLECT_INTERVAL);
            }
        });

    let handle = match spawned {
        Ok(_) => rx.recv().ok(),
        Err(e) => {
            log::error!("Failed to spawn audio GC thread: {}", e);
            None
        }
    };

    handle.unwrap_or_else(|| {
        // Deferred drops leak instead of being reclaimed
        log::error!("Audio GC unavailable, render-thread drops will not be reclaimed");
        let collector = Collector::new();
        let handle = collector.handle();
        std::mem::forget(collector);
        handle
    })
}

/// Handle for wrapping values in `Owned<T>` / `Shared<T>`
pub fn gc_handle() -> Handle {
    COLLECTOR.get_or_init(spawn_collector).clone()
}

#[cfg(test)]
mod tests {
    use super::*;
    use basedrop::Owned;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::time::Instant;

    struct Flag(Arc<AtomicBool>);

    impl Drop for Flag {
        fn drop(&mut self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_drop_is_reclaimed_by_collector_thread() {
        let dropped = Arc::new(AtomicBool::new(false));
        let owned = Owned::new(&gc_handle(), Flag(dropped.clone()));
        drop(owned);

        let deadline = Instant::now() + Duration::from_secs(5);
        while !dropped.load(Ordering::SeqCst) && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }
        assert!(dropped.load(Ordering::SeqCst));
    }
}
