use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// RAII helper that marks a session as busy with disk work while it is in
/// scope. Only one guard per flag can exist at a time.
#[derive(Debug)]
pub struct ApplyGuard {
    flag: Arc<AtomicBool>,
}

impl ApplyGuard {
    /// Returns `None` when another guard already holds the flag.
    pub fn acquire(flag: &Arc<AtomicBool>) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| Self {
                flag: Arc::clone(flag),
            })
    }
}

impl Drop for ApplyGuard {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

pub fn is_busy(flag: &AtomicBool) -> bool {
    flag.load(Ordering::SeqCst)
}
