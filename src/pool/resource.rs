//! Generic bounded resource pool with blocking acquire.

use std::sync::{Condvar, Mutex, MutexGuard};

/// Factory that instantiates fresh pool resources on demand.
type Factory<T> = Box<dyn Fn() -> T + Send + Sync>;

/// A bounded pool of reusable objects.
///
/// Resources are handed out by [`acquire`](ResourcePool::acquire) and must be
/// returned with [`release`](ResourcePool::release); every acquire must be
/// matched by a release or the pool starves. Resources are never silently
/// dropped by the pool itself.
///
/// Invariants:
/// - the live acquired count never exceeds `maximum`;
/// - the pool never shrinks below `minimum` (see
///   [`trim`](ResourcePool::trim)).
pub struct ResourcePool<T> {
    state: Mutex<PoolState<T>>,
    released: Condvar,
    minimum: usize,
    maximum: usize,
    capped: bool,
    factory: Factory<T>,
}

struct PoolState<T> {
    idle: Vec<T>,
    /// Total resources instantiated over the pool's lifetime and not trimmed.
    created: usize,
    /// Resources currently held by callers.
    outstanding: usize,
}

impl<T> ResourcePool<T> {
    /// Create a pool with the default (bounded) acquisition policy,
    /// pre-instantiating `initial` resources.
    pub fn new<F>(initial: usize, minimum: usize, maximum: usize, factory: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        Self::build(initial, minimum, maximum, false, factory)
    }

    /// Create a pool with the capped acquisition policy: once more than half
    /// of `maximum` resources are instantiated and none are idle, further
    /// acquisitions block until a release.
    pub fn capped<F>(initial: usize, minimum: usize, maximum: usize, factory: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        Self::build(initial, minimum, maximum, true, factory)
    }

    fn build<F>(initial: usize, minimum: usize, maximum: usize, capped: bool, factory: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        let initial = initial.min(maximum);
        let idle: Vec<T> = (0..initial).map(|_| factory()).collect();

        Self {
            state: Mutex::new(PoolState {
                idle,
                created: initial,
                outstanding: 0,
            }),
            released: Condvar::new(),
            minimum: minimum.min(maximum),
            maximum,
            capped,
            factory: Box::new(factory),
        }
    }

    fn lock(&self) -> MutexGuard<'_, PoolState<T>> {
        self.state.lock().expect("resource pool mutex poisoned")
    }

    /// Acquire a resource, blocking the calling thread until one is
    /// available under the pool's policy.
    pub fn acquire(&self) -> T {
        let mut state = self.lock();
        loop {
            if self.capped && state.idle.is_empty() && state.created * 2 > self.maximum {
                state = self
                    .released
                    .wait(state)
                    .expect("resource pool mutex poisoned");
                continue;
            }

            if let Some(resource) = Self::grab(&mut state, &self.factory, self.maximum) {
                return resource;
            }

            state = self
                .released
                .wait(state)
                .expect("resource pool mutex poisoned");
        }
    }

    /// Non-blocking acquire; `None` when the pool's policy would block.
    pub fn try_acquire(&self) -> Option<T> {
        let mut state = self.lock();
        if self.capped && state.idle.is_empty() && state.created * 2 > self.maximum {
            return None;
        }
        Self::grab(&mut state, &self.factory, self.maximum)
    }

    /// Fast-fail check: would an acquire succeed right now?
    ///
    /// Unsynchronized with respect to the acquire that may follow; useful
    /// where failing fast beats waiting.
    pub fn can_acquire(&self) -> bool {
        let state = self.lock();
        if self.capped && state.idle.is_empty() && state.created * 2 > self.maximum {
            return false;
        }
        !state.idle.is_empty() || state.created < self.maximum
    }

    fn grab(state: &mut PoolState<T>, factory: &Factory<T>, maximum: usize) -> Option<T> {
        if let Some(resource) = state.idle.pop() {
            state.outstanding += 1;
            return Some(resource);
        }
        if state.created < maximum {
            state.created += 1;
            state.outstanding += 1;
            return Some(factory());
        }
        None
    }

    /// Return a resource to the pool and wake exactly one blocked waiter.
    pub fn release(&self, resource: T) {
        let mut state = self.lock();
        state.outstanding = state.outstanding.saturating_sub(1);
        state.idle.push(resource);
        drop(state);
        self.released.notify_one();
    }

    /// Drop idle resources until the pool holds no more than `minimum`
    /// total. Outstanding resources are never touched.
    pub fn trim(&self) {
        let mut state = self.lock();
        while state.created > self.minimum && state.idle.pop().is_some() {
            state.created -= 1;
        }
    }

    /// Resources currently held by callers.
    pub fn outstanding(&self) -> usize {
        self.lock().outstanding
    }

    /// Resources currently idle in the pool.
    pub fn idle(&self) -> usize {
        self.lock().idle.len()
    }

    /// Total resources instantiated and not trimmed.
    pub fn created(&self) -> usize {
        self.lock().created
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_preinstantiates_initial() {
        let pool = ResourcePool::new(3, 1, 8, || vec![0u8; 16]);
        assert_eq!(pool.idle(), 3);
        assert_eq!(pool.created(), 3);
        assert_eq!(pool.outstanding(), 0);
    }

    #[test]
    fn test_acquire_release_cycle() {
        let pool = ResourcePool::new(1, 1, 2, String::new);
        let a = pool.acquire();
        assert_eq!(pool.outstanding(), 1);
        pool.release(a);
        assert_eq!(pool.outstanding(), 0);
        assert_eq!(pool.idle(), 1);
    }

    #[test]
    fn test_grows_on_demand_up_to_maximum() {
        let pool = ResourcePool::new(0, 0, 2, String::new);
        let _a = pool.acquire();
        let _b = pool.acquire();
        assert_eq!(pool.created(), 2);
        assert!(pool.try_acquire().is_none());
        assert!(!pool.can_acquire());
    }

    #[test]
    fn test_blocked_acquire_wakes_on_release() {
        let pool = Arc::new(ResourcePool::new(1, 1, 1, String::new));
        let held = pool.acquire();

        let acquired = Arc::new(AtomicUsize::new(0));
        let waiter = {
            let pool = Arc::clone(&pool);
            let acquired = Arc::clone(&acquired);
            std::thread::spawn(move || {
                let r = pool.acquire();
                acquired.store(1, Ordering::SeqCst);
                pool.release(r);
            })
        };

        // The waiter must not get through while the resource is held.
        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(acquired.load(Ordering::SeqCst), 0);

        pool.release(held);
        waiter.join().unwrap();
        assert_eq!(acquired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_outstanding_never_exceeds_maximum() {
        let pool = Arc::new(ResourcePool::new(0, 0, 4, || ()));
        let peak = Arc::new(AtomicUsize::new(0));

        let workers: Vec<_> = (0..16)
            .map(|_| {
                let pool = Arc::clone(&pool);
                let peak = Arc::clone(&peak);
                std::thread::spawn(move || {
                    for _ in 0..50 {
                        let r = pool.acquire();
                        peak.fetch_max(pool.outstanding(), Ordering::SeqCst);
                        pool.release(r);
                    }
                })
            })
            .collect();

        for w in workers {
            w.join().unwrap();
        }
        assert!(peak.load(Ordering::SeqCst) <= 4);
    }

    #[test]
    fn test_capped_blocks_past_half_capacity() {
        let pool = ResourcePool::capped(0, 0, 4, String::new);
        let _a = pool.acquire();
        let _b = pool.acquire();
        // created * 2 > maximum and nothing idle: the capped policy refuses.
        assert!(pool.try_acquire().is_none());
        assert!(!pool.can_acquire());
    }

    #[test]
    fn test_capped_allows_reuse_of_idle() {
        let pool = ResourcePool::capped(0, 0, 4, String::new);
        let a = pool.acquire();
        let _b = pool.acquire();
        pool.release(a);
        // An idle resource satisfies the capped policy even past half capacity.
        assert!(pool.can_acquire());
        assert!(pool.try_acquire().is_some());
    }

    #[test]
    fn test_trim_respects_minimum() {
        let pool = ResourcePool::new(6, 2, 8, String::new);
        pool.trim();
        assert_eq!(pool.created(), 2);
        assert_eq!(pool.idle(), 2);
    }
}
