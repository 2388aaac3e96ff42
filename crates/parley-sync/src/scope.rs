// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Runs a per-conversation task that is rebuilt whenever the scope changes.

use std::future::Future;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::trace;

/// Drives `body` for the current value of `scope`.
///
/// When the scope value changes, the running body future is dropped (which
/// drops any [`Subscription`](parley_core::traits::Subscription) it holds and
/// runs its unsubscribe hook) and a new body is started for the new value.
/// Returns when `cancel` fires or the scope sender is gone.
pub async fn run_scoped<K, F, Fut>(mut scope: watch::Receiver<K>, cancel: CancellationToken, mut body: F)
where
    K: Clone + PartialEq + std::fmt::Display,
    F: FnMut(K) -> Fut,
    Fut: Future<Output = ()>,
{
    loop {
        let key = scope.borrow_and_update().clone();
        trace!(scope = %key, "scoped task started");
        let run = body(key.clone());
        tokio::pin!(run);
        let mut finished = false;

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return,
                changed = scope.changed() => {
                    if changed.is_err() {
                        return;
                    }
                    if *scope.borrow() != key {
                        break;
                    }
                }
                _ = &mut run, if !finished => {
                    finished = true;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    async fn settle() {
        for _ in 0..8 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn restarts_body_on_scope_change() {
        let (tx, rx) = watch::channel("a".to_string());
        let cancel = CancellationToken::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let task = {
            let seen = seen.clone();
            let cancel = cancel.clone();
            tokio::spawn(run_scoped(rx, cancel, move |key: String| {
                let seen = seen.clone();
                async move {
                    seen.lock().unwrap().push(key);
                    std::future::pending::<()>().await;
                }
            }))
        };

        settle().await;
        tx.send_replace("b".to_string());
        settle().await;
        // Same value again: no restart.
        tx.send_replace("b".to_string());
        settle().await;

        cancel.cancel();
        task.await.unwrap();
        assert_eq!(*seen.lock().unwrap(), vec!["a".to_string(), "b".to_string()]);
    }

    #[tokio::test]
    async fn finished_body_waits_for_next_scope() {
        let (tx, rx) = watch::channel(1u32);
        let cancel = CancellationToken::new();
        let runs = Arc::new(Mutex::new(0u32));

        let task = {
            let runs = runs.clone();
            tokio::spawn(run_scoped(rx, cancel.clone(), move |_key: u32| {
                let runs = runs.clone();
                async move {
                    *runs.lock().unwrap() += 1;
                }
            }))
        };

        settle().await;
        assert_eq!(*runs.lock().unwrap(), 1);

        drop(tx);
        task.await.unwrap();
    }
}
