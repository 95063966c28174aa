//! Cooperative cancellation tokens
//!
//! A token is shared between the scheduler and whatever executes a render.
//! Cancellation is advisory: a worker checks the token between work units
//! if its backend decomposes work that way, and a render already past the
//! point of no return simply completes and has its result discarded.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

/// Clone-to-share cancellation flag.
///
/// All clones observe a `cancel()` issued through any of them. Cancelling
/// is idempotent.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_uncancelled() {
        let token = CancellationToken::new();
        assert!(!token.is_cancelled());
    }

    #[test]
    fn clones_share_state() {
        let token = CancellationToken::new();
        let clone = token.clone();

        token.cancel();
        assert!(clone.is_cancelled());
    }

    #[test]
    fn cancel_is_idempotent() {
        let token = CancellationToken::new();
        token.cancel();
        token.cancel();
        assert!(token.is_cancelled());
    }
}
