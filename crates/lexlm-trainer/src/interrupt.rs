//! Ctrl-C handling for the training binary.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::warn;

/// Listens on `signal`. The first interrupt sets `flag` so training winds
/// down gracefully; the function returns `true` on a second interrupt so the
/// caller can abort. Returns `false` if the listener itself fails.
pub async fn watch_interrupts<F, Fut>(mut signal: F, flag: Arc<AtomicBool>) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::io::Result<()>>,
{
    if let Err(e) = signal().await {
        warn!(error = %e, "Could not listen for interrupts");
        return false;
    }
    warn!("Interrupt received; finishing after the current batch (press again to abort)");
    flag.store(true, Ordering::Relaxed);

    match signal().await {
        Ok(()) => true,
        Err(e) => {
            warn!(error = %e, "Could not listen for interrupts");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::sync::atomic::AtomicUsize;

    #[tokio::test]
    async fn test_first_sets_flag_second_aborts() {
        let flag = Arc::new(AtomicBool::new(false));
        let calls = AtomicUsize::new(0);
        let signal = || {
            calls.fetch_add(1, Ordering::SeqCst);
            std::future::ready(Ok(()))
        };

        assert!(watch_interrupts(signal, Arc::clone(&flag)).await);
        assert!(flag.load(Ordering::Relaxed));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_listener_failure_leaves_flag_unset() {
        let flag = Arc::new(AtomicBool::new(false));
        let signal = || std::future::ready(Err(io::Error::other("no signal support")));

        assert!(!watch_interrupts(signal, Arc::clone(&flag)).await);
        assert!(!flag.load(Ordering::Relaxed));
    }
}
