//! Cancellable periodic ticker and non-overlap guard

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures::FutureExt;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Holds a running flag for the lifetime of one pass
///
/// The flag is cleared on drop, so an error or panic inside the pass never
/// leaves it set.
#[derive(Debug)]
pub struct RunGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> RunGuard<'a> {
    /// Set the flag if it is clear; `None` means another pass holds it
    pub fn try_acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag })
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// Run `tick` after `initial_delay`, then every `period`, until cancelled
///
/// Ticks missed while `tick` is still running are skipped, not queued. A
/// tick that panics is logged and the ticker keeps its schedule.
pub fn spawn_ticker<F, Fut>(
    name: impl Into<String>,
    initial_delay: Duration,
    period: Duration,
    cancel: CancellationToken,
    mut tick: F,
) -> JoinHandle<()>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let name = name.into();
    debug!(%name, ?initial_delay, ?period, "spawn_ticker: called");
    let period = period.max(Duration::from_millis(1));

    tokio::spawn(async move {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!(%name, "Ticker cancelled before first tick");
                return;
            }
            _ = tokio::time::sleep(initial_delay) => {}
        }

        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!(%name, "Ticker stopped");
                    break;
                }
                _ = interval.tick() => {
                    if let Err(panic) = AssertUnwindSafe(tick()).catch_unwind().await {
                        error!(%name, panic = %panic_message(panic.as_ref()), "Ticker tick panicked");
                    }
                }
            }
        }
    })
}

/// Best-effort text of a panic payload
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_run_guard_excludes_and_releases() {
        let flag = AtomicBool::new(false);
        {
            let _guard = RunGuard::try_acquire(&flag).unwrap();
            assert!(flag.load(Ordering::Acquire));
            assert!(RunGuard::try_acquire(&flag).is_none());
        }
        assert!(!flag.load(Ordering::Acquire));
        assert!(RunGuard::try_acquire(&flag).is_some());
    }

    #[tokio::test]
    async fn test_ticker_fires_until_cancelled() {
        let count = Arc::new(AtomicUsize::new(0));
        let cancel = CancellationToken::new();

        let counter = count.clone();
        let handle = spawn_ticker("test", Duration::ZERO, Duration::from_millis(10), cancel.clone(), move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });

        tokio::time::sleep(Duration::from_millis(60)).await;
        cancel.cancel();
        handle.await.unwrap();

        let fired = count.load(Ordering::SeqCst);
        assert!(fired >= 2, "fired {fired} times");

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(count.load(Ordering::SeqCst), fired);
    }

    #[tokio::test]
    async fn test_panicking_tick_keeps_schedule() {
        let count = Arc::new(AtomicUsize::new(0));
        let cancel = CancellationToken::new();

        let counter = count.clone();
        let handle = spawn_ticker("test", Duration::ZERO, Duration::from_millis(10), cancel.clone(), move || {
            let counter = counter.clone();
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                    panic!("first tick blows up");
                }
            }
        });

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(!handle.is_finished());
        cancel.cancel();
        handle.await.unwrap();

        let fired = count.load(Ordering::SeqCst);
        assert!(fired >= 3, "fired {fired} times");
    }

    #[test]
    fn test_panic_message_payloads() {
        assert_eq!(panic_message(&"static"), "static");
        assert_eq!(panic_message(&String::from("owned")), "owned");
        assert_eq!(panic_message(&42_u32), "non-string panic payload");
    }

    #[tokio::test]
    async fn test_cancel_during_initial_delay() {
        let count = Arc::new(AtomicUsize::new(0));
        let cancel = CancellationToken::new();

        let counter = count.clone();
        let handle = spawn_ticker("test", Duration::from_secs(60), Duration::from_millis(10), cancel.clone(), move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });

        cancel.cancel();
        handle.await.unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }
}
