//! Single-flight handles.
//!
//! A `Flight` is a cloneable handle to a piece of work that is already
//! running. Whoever started the work holds the matching `FlightDone` and
//! resolves every handle at once when it finishes.

use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::watch;

static NEXT_FLIGHT: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone)]
pub struct Flight<T> {
    id: u64,
    rx: watch::Receiver<Option<T>>,
}

#[derive(Debug)]
pub struct FlightDone<T> {
    tx: watch::Sender<Option<T>>,
}

/// Start a new flight.
pub fn flight<T>() -> (FlightDone<T>, Flight<T>) {
    let (tx, rx) = watch::channel(None);
    let id = NEXT_FLIGHT.fetch_add(1, Ordering::Relaxed);
    (FlightDone { tx }, Flight { id, rx })
}

impl<T: Clone> Flight<T> {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// True when both handles refer to the same run.
    pub fn same_as(&self, other: &Flight<T>) -> bool {
        self.id == other.id
    }

    pub fn is_done(&self) -> bool {
        self.rx.borrow().is_some()
    }

    /// Wait for the outcome. `None` means the runner went away without resolving.
    pub async fn wait(&self) -> Option<T> {
        let mut rx = self.rx.clone();
        let outcome = rx.wait_for(Option::is_some).await.ok().and_then(|v| v.clone());
        outcome
    }
}

impl<T> FlightDone<T> {
    pub fn resolve(self, value: T) {
        self.tx.send_replace(Some(value));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_all_handles_see_the_outcome() {
        let (done, first) = flight::<u32>();
        let second = first.clone();
        assert!(first.same_as(&second));
        assert!(!first.is_done());

        let waiter = tokio::spawn(async move { second.wait().await });
        done.resolve(42);

        assert_eq!(first.wait().await, Some(42));
        assert_eq!(waiter.await.unwrap(), Some(42));
        assert!(first.is_done());
    }

    #[tokio::test]
    async fn test_dropped_runner_resolves_to_none() {
        let (done, handle) = flight::<()>();
        drop(done);
        assert_eq!(handle.wait().await, None);
    }

    #[test]
    fn test_distinct_flights_differ() {
        let (_a_done, a) = flight::<()>();
        let (_b_done, b) = flight::<()>();
        assert!(!a.same_as(&b));
    }
}
