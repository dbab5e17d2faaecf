//! Reusable request wrappers.

use std::cmp::Ordering;

use super::ResourcePool;

/// A reusable container pairing a decoded request with its correlation
/// metadata.
///
/// Wrappers are drawn from a session-scoped pool when a message is fully
/// decoded and recycled after its response has been sent. The `uid` is the
/// caller-assigned correlation token echoed back in the response frame; the
/// `disposable` flag marks wrappers the dispatcher may recycle immediately
/// after dispatch.
#[derive(Debug)]
pub struct PooledRequest<M> {
    message: Option<M>,
    uid: u64,
    disposable: bool,
}

impl<M> PooledRequest<M> {
    /// Create an empty wrapper, ready for [`load`](PooledRequest::load).
    pub fn new() -> Self {
        Self {
            message: None,
            uid: 0,
            disposable: false,
        }
    }

    /// Fill the wrapper with a decoded request and its correlation uid.
    pub fn load(&mut self, message: M, uid: u64) {
        self.message = Some(message);
        self.uid = uid;
        self.disposable = true;
    }

    /// Take the request out of the wrapper, leaving it empty.
    pub fn take_message(&mut self) -> Option<M> {
        self.message.take()
    }

    /// The correlation token echoed in the response frame.
    pub fn uid(&self) -> u64 {
        self.uid
    }

    /// Whether the wrapper may be recycled immediately after dispatch.
    pub fn is_disposable(&self) -> bool {
        self.disposable
    }

    /// Retain the wrapper past dispatch; the caller takes over recycling.
    pub fn set_disposable(&mut self, disposable: bool) {
        self.disposable = disposable;
    }

    /// Reset the wrapper for re-use.
    pub fn clear(&mut self) {
        self.message = None;
        self.uid = 0;
        self.disposable = false;
    }
}

impl<M> Default for PooledRequest<M> {
    fn default() -> Self {
        Self::new()
    }
}

// Ordering is by correlation uid, which is what submission order means to
// the peer that assigned the uids.
impl<M> PartialEq for PooledRequest<M> {
    fn eq(&self, other: &Self) -> bool {
        self.uid == other.uid
    }
}

impl<M> Eq for PooledRequest<M> {}

impl<M> PartialOrd for PooledRequest<M> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<M> Ord for PooledRequest<M> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.uid.cmp(&other.uid)
    }
}

/// Build a session-scoped pool of request wrappers.
pub fn request_pool<M: Send + 'static>(
    initial: usize,
    maximum: usize,
) -> ResourcePool<PooledRequest<M>> {
    ResourcePool::new(initial, initial, maximum, PooledRequest::new)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_take_clear() {
        let mut req: PooledRequest<String> = PooledRequest::new();
        assert!(req.take_message().is_none());

        req.load("ping".to_string(), 42);
        assert_eq!(req.uid(), 42);
        assert!(req.is_disposable());
        assert_eq!(req.take_message().as_deref(), Some("ping"));

        req.clear();
        assert_eq!(req.uid(), 0);
        assert!(!req.is_disposable());
    }

    #[test]
    fn test_ordering_by_uid() {
        let mut a: PooledRequest<()> = PooledRequest::new();
        let mut b: PooledRequest<()> = PooledRequest::new();
        a.load((), 1);
        b.load((), 2);
        assert!(a < b);
        b.clear();
        b.load((), 1);
        assert_eq!(a, b);
    }

    #[test]
    fn test_request_pool_recycles() {
        let pool = request_pool::<String>(2, 4);
        let mut req = pool.acquire();
        req.load("hello".to_string(), 7);
        req.clear();
        pool.release(req);
        assert_eq!(pool.idle(), 2);
    }
}
