//! Mutual exclusion that works under any threading substrate
//!
//! Threads of the threaded backend's pool expect to be released quickly, so
//! they wait by spinning, then by handing their time slice back to the OS.
//! They never run other pool jobs while waiting, since those jobs could
//! contend for the same lock on the same stack. Plain OS threads, on the other
//! hand, sleep until the lock is released. [`HybridLock`] picks the right
//! waiting strategy for the calling thread.

#[allow(unused_imports)]
use log::{debug, error, info, log, trace, warn};
use std::{
    hint,
    marker::PhantomData,
    sync::{
        atomic::{AtomicBool, Ordering},
        Condvar, Mutex, PoisonError,
    },
    thread,
};

/// Number of busy-wait iterations of a pool worker before it starts yielding
/// to the OS scheduler
const POOL_SPIN_LIMIT: u32 = 64;

/// Threading substrate of the calling thread
#[derive(Copy, Clone, Debug, Eq, Hash, PartialEq)]
pub enum Substrate {
    /// Worker thread of a rayon pool
    Pool,

    /// Any other thread
    Os,
}
//
impl Substrate {
    /// Detect the substrate of the calling thread
    pub fn current() -> Self {
        if rayon::current_thread_index().is_some() {
            Self::Pool
        } else {
            Self::Os
        }
    }
}

/// Mutual exclusion lock usable from pool workers and OS threads alike
///
/// Exclusion holds between holders of different substrates. The lock is
/// neither `Clone` nor `Copy`, and a held lock cannot be moved since its
/// guard borrows it.
#[derive(Debug, Default)]
pub struct HybridLock {
    /// Truth that the lock is held
    locked: AtomicBool,

    /// Number of OS threads sleeping until the lock is released
    sleepers: Mutex<usize>,

    /// Wakes up sleeping OS threads
    wakeup: Condvar,
}
//
impl HybridLock {
    /// Set up an unlocked lock
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the lock, waiting in the manner of the calling thread's
    /// substrate until it is available
    ///
    /// The lock is released when the guard is dropped. Recursive locking
    /// deadlocks.
    pub fn lock(&self) -> HybridLockGuard<'_> {
        let substrate = Substrate::current();
        match substrate {
            Substrate::Pool => {
                let mut spins = 0;
                while !self.try_acquire() {
                    if spins < POOL_SPIN_LIMIT {
                        spins += 1;
                        hint::spin_loop();
                    } else {
                        thread::yield_now();
                    }
                }
            }
            Substrate::Os => {
                if !self.try_acquire() {
                    let mut sleepers =
                        self.sleepers.lock().unwrap_or_else(PoisonError::into_inner);
                    *sleepers += 1;
                    while !self.try_acquire() {
                        sleepers = self
                            .wakeup
                            .wait(sleepers)
                            .unwrap_or_else(PoisonError::into_inner);
                    }
                    *sleepers -= 1;
                }
            }
        }
        HybridLockGuard::new(self, substrate)
    }

    /// Acquire the lock if it is available right away
    pub fn try_lock(&self) -> Option<HybridLockGuard<'_>> {
        self.try_acquire()
            .then(|| HybridLockGuard::new(self, Substrate::current()))
    }

    /// Truth that the lock is currently held
    pub fn is_locked(&self) -> bool {
        self.locked.load(Ordering::Relaxed)
    }

    /// Try to flip the lock word from unlocked to locked
    fn try_acquire(&self) -> bool {
        self.locked
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
    }

    /// Release the lock and wake up a sleeping OS thread, if any
    ///
    /// Pool workers poll the lock word, so they need no wakeup.
    fn unlock(&self) {
        self.locked.store(false, Ordering::Release);
        let sleepers = self.sleepers.lock().unwrap_or_else(PoisonError::into_inner);
        if *sleepers > 0 {
            self.wakeup.notify_one();
        }
    }
}

/// Proof that a [`HybridLock`] is held, releases the lock on drop
///
/// Guards cannot be sent to another thread, so the lock is always released
/// from the substrate it was acquired from.
#[derive(Debug)]
#[must_use = "the lock is released as soon as the guard is dropped"]
pub struct HybridLockGuard<'lock> {
    /// Lock being held
    lock: &'lock HybridLock,

    /// Substrate that the lock was acquired from
    substrate: Substrate,

    /// Guards are bound to the thread that acquired the lock
    _not_send: PhantomData<*const ()>,
}
//
impl<'lock> HybridLockGuard<'lock> {
    /// Record a successful acquisition
    fn new(lock: &'lock HybridLock, substrate: Substrate) -> Self {
        Self {
            lock,
            substrate,
            _not_send: PhantomData,
        }
    }

    /// Substrate that the lock was acquired from
    pub fn substrate(&self) -> Substrate {
        self.substrate
    }
}
//
impl Drop for HybridLockGuard<'_> {
    fn drop(&mut self) {
        debug_assert_eq!(
            Substrate::current(),
            self.substrate,
            "threading substrate changed while a HybridLock was held"
        );
        self.lock.unlock();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rayon::prelude::*;
    use std::{
        sync::{atomic::AtomicUsize, Once},
        time::Duration,
    };

    fn init_logger() {
        static INIT_LOGGER: Once = Once::new();
        INIT_LOGGER.call_once(|| {
            let _ = env_logger::builder().is_test(true).try_init();
        });
    }

    /// Non-atomic increment, which loses updates unless externally
    /// synchronized
    fn racy_increment(counter: &AtomicUsize) {
        let value = counter.load(Ordering::Relaxed);
        std::thread::yield_now();
        counter.store(value + 1, Ordering::Relaxed);
    }

    #[test]
    fn substrate_detection() {
        init_logger();
        assert_eq!(Substrate::current(), Substrate::Os);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(2)
            .build()
            .unwrap();
        assert_eq!(pool.install(Substrate::current), Substrate::Pool);
    }

    #[test]
    fn try_lock() {
        init_logger();
        let lock = HybridLock::new();
        let guard = lock.try_lock().unwrap();
        assert_eq!(guard.substrate(), Substrate::Os);
        assert!(lock.is_locked());
        assert!(lock.try_lock().is_none());
        drop(guard);
        assert!(!lock.is_locked());
        assert!(lock.try_lock().is_some());
    }

    #[test]
    fn mixed_substrate_exclusion() {
        init_logger();
        const OS_THREADS: usize = 4;
        const ITERS: usize = 200;
        let lock = HybridLock::new();
        let counter = AtomicUsize::new(0);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(4)
            .build()
            .unwrap();
        std::thread::scope(|s| {
            for _ in 0..OS_THREADS {
                s.spawn(|| {
                    for _ in 0..ITERS {
                        let _guard = lock.lock();
                        racy_increment(&counter);
                    }
                });
            }
            pool.install(|| {
                (0..OS_THREADS * ITERS).into_par_iter().for_each(|_| {
                    let guard = lock.lock();
                    assert_eq!(guard.substrate(), Substrate::Pool);
                    racy_increment(&counter);
                });
            });
        });
        assert_eq!(counter.load(Ordering::Relaxed), 2 * OS_THREADS * ITERS);
        assert!(!lock.is_locked());
    }

    #[test]
    fn pool_waiters_behind_slow_os_holder() {
        init_logger();
        let lock = HybridLock::new();
        let counter = AtomicUsize::new(0);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(4)
            .build()
            .unwrap();
        std::thread::scope(|s| {
            let guard = lock.lock();
            let waiters = s.spawn(|| {
                pool.install(|| {
                    (0..20_000).into_par_iter().for_each(|_| {
                        let _guard = lock.lock();
                        racy_increment(&counter);
                    })
                })
            });
            std::thread::sleep(Duration::from_millis(50));
            assert_eq!(counter.load(Ordering::Relaxed), 0);
            drop(guard);
            waiters.join().unwrap();
        });
        assert_eq!(counter.load(Ordering::Relaxed), 20_000);
        assert!(!lock.is_locked());
    }

    #[cfg(debug_assertions)]
    #[test]
    #[should_panic(expected = "threading substrate changed")]
    fn substrate_must_not_change_while_held() {
        init_logger();
        let lock = HybridLock::new();
        let guard = lock.lock();
        assert_eq!(guard.substrate(), Substrate::Os);
        // Turn the locking thread into a pool worker while the lock is held
        let _pool = rayon::ThreadPoolBuilder::new()
            .num_threads(1)
            .use_current_thread()
            .build()
            .unwrap();
        assert_eq!(Substrate::current(), Substrate::Pool);
        drop(guard);
    }
}
