// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::{config::GcConfig, gc::GcStatus, volume::Volume};
use std::{
    sync::{Arc, Condvar, Mutex},
    thread::JoinHandle,
    time::Duration,
};

/// Handle of the background worker thread
pub(crate) struct WorkerHandle {
    thread: JoinHandle<()>,
    stop: Arc<(Mutex<bool>, Condvar)>,
}

/// Additive back-off, clamped to the configured maximum.
fn increase_sleep_time(config: &GcConfig, wait_ms: u64) -> u64 {
    (wait_ms + config.min_sleep_ms).min(config.max_sleep_ms)
}

/// Additive speed-up, clamped to the configured minimum.
fn decrease_sleep_time(config: &GcConfig, wait_ms: u64) -> u64 {
    wait_ms
        .saturating_sub(config.min_sleep_ms)
        .max(config.min_sleep_ms)
}

/// The background GC loop.
///
/// Triggering conditions per tick:
/// 0. no checkpoint freeze is pending,
/// 1. no GC is running already (the mutex is only try-locked),
/// 2. the filesystem balancer ran,
/// 3. the I/O side is idle.
///
/// GCs must not fire too frequently: segments dirtied a moment ago may be
/// invalidated wholesale by the user shortly, so the sleep widens whenever
/// there is contention and narrows only while invalid blocks pile up.
fn worker_loop(volume: &Volume, stop: &(Mutex<bool>, Condvar)) {
    let config = volume.config.clone();
    let mut wait_ms = config.min_sleep_ms;

    loop {
        volume.wait_writable();

        {
            let (lock, cvar) = stop;
            let stopped = lock.lock().expect("lock is poisoned");
            let (stopped, _) = cvar
                .wait_timeout_while(stopped, Duration::from_millis(wait_ms), |stopped| !*stopped)
                .expect("lock is poisoned");

            if *stopped {
                break;
            }
        }

        if !volume.is_active() {
            break;
        }

        if let Err(e) = volume.balance_fs() {
            log::warn!("filesystem balancing failed: {e}");
            continue;
        }

        if !config.bg_gc {
            continue;
        }

        let Ok(guard) = volume.gc_mutex.try_lock() else {
            // a foreground pass is running
            continue;
        };

        if !volume.is_idle() {
            drop(guard);
            wait_ms = increase_sleep_time(&config, wait_ms);
            continue;
        }

        wait_ms = if volume.has_enough_invalid_blocks() {
            decrease_sleep_time(&config, wait_ms)
        } else {
            increase_sleep_time(&config, wait_ms)
        };

        volume.stat.inc_bg_gc();

        let status = volume.run_gc(1);
        drop(guard);

        match status {
            Ok(GcStatus::None) => wait_ms = config.nogc_sleep_ms,
            Ok(_) => {
                if wait_ms == config.nogc_sleep_ms {
                    wait_ms = config.max_sleep_ms;
                }
            }
            Err(e) => log::warn!("background GC failed: {e}"),
        }
    }

    log::info!("background GC worker stopped");
}

impl Volume {
    /// Starts the background GC worker.
    ///
    /// A no-op if the worker is already running.
    ///
    /// # Errors
    ///
    /// Will return `Err` if the thread cannot be spawned.
    pub fn start_gc_thread(&self) -> crate::Result<()> {
        let mut worker = self.worker.lock().expect("lock is poisoned");

        if worker.is_some() {
            return Ok(());
        }

        let stop = Arc::new((Mutex::new(false), Condvar::new()));

        let thread = {
            let volume = self.clone();
            let stop = stop.clone();

            std::thread::Builder::new()
                .name(String::from("lfs-gc"))
                .spawn(move || worker_loop(&volume, &stop))?
        };

        log::info!("background GC worker started");
        *worker = Some(WorkerHandle { thread, stop });

        Ok(())
    }

    /// Signals the background worker to stop and waits for it.
    ///
    /// A no-op if no worker is running. The worker never aborts
    /// mid-evacuation; at worst this waits out one section's worth of GC.
    pub fn stop_gc_thread(&self) {
        let handle = self.worker.lock().expect("lock is poisoned").take();

        if let Some(handle) = handle {
            {
                let (lock, cvar) = &*handle.stop;
                *lock.lock().expect("lock is poisoned") = true;
                cvar.notify_all();
            }

            if handle.thread.join().is_err() {
                log::warn!("background GC worker panicked");
            }
        }
    }
}
