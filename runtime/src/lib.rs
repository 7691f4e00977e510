//! # Boxoffice Runtime
//!
//! The [`Store`] owns reducer state, runs the effects a reducer returns and
//! feeds the actions those effects produce back into the reducer.
//!
//! ```text
//! send(action) ──▶ reducer.reduce(&mut state, action, &env)
//!                        │
//!                        ▼
//!                  effects (spawned)
//!                        │  Some(next_action)
//!                        ▼
//!                send(next_action) ──▶ broadcast to observers
//! ```
//!
//! Request/response callers use [`Store::send_and_wait_for`], which
//! subscribes to the action broadcast before sending so the terminal action
//! of a flow cannot be missed.

use boxoffice_core::{effect::Effect, reducer::Reducer};
use futures::future::{join_all, BoxFuture, FutureExt};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, RwLock};

/// Retry with exponential backoff
pub mod retry;

pub use error::StoreError;

/// Error types for the Store runtime
pub mod error {
    use thiserror::Error;

    /// Failures surfaced by [`Store`](super::Store) operations.
    #[derive(Error, Debug, Clone, PartialEq, Eq)]
    pub enum StoreError {
        /// `send` was called after `shutdown`
        #[error("Store is shutting down")]
        ShutdownInProgress,

        /// No matching action arrived before the deadline
        #[error("Timeout waiting for action")]
        Timeout,

        /// The action broadcast channel closed while waiting
        #[error("Action broadcast channel closed")]
        ChannelClosed,
    }
}

/// Default capacity of the action broadcast channel.
pub const DEFAULT_BROADCAST_CAPACITY: usize = 256;

/// Runtime for a single reducer.
///
/// Cloning a `Store` is cheap; clones share state, reducer, environment and
/// the action broadcast.
pub struct Store<S, A, E, R>
where
    R: Reducer<State = S, Action = A, Environment = E>,
{
    state: Arc<RwLock<S>>,
    reducer: Arc<R>,
    environment: Arc<E>,
    shutdown: Arc<AtomicBool>,
    actions: broadcast::Sender<A>,
}

impl<S, A, E, R> Clone for Store<S, A, E, R>
where
    R: Reducer<State = S, Action = A, Environment = E>,
{
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
            reducer: Arc::clone(&self.reducer),
            environment: Arc::clone(&self.environment),
            shutdown: Arc::clone(&self.shutdown),
            actions: self.actions.clone(),
        }
    }
}

impl<S, A, E, R> Store<S, A, E, R>
where
    R: Reducer<State = S, Action = A, Environment = E> + Send + Sync + 'static,
    A: Clone + Send + 'static,
    S: Send + Sync + 'static,
    E: Send + Sync + 'static,
{
    /// Create a store with the default broadcast capacity.
    #[must_use]
    pub fn new(initial_state: S, reducer: R, environment: E) -> Self {
        Self::with_broadcast_capacity(initial_state, reducer, environment, DEFAULT_BROADCAST_CAPACITY)
    }

    /// Create a store whose action broadcast holds `capacity` pending actions
    /// per observer before older ones are dropped.
    #[must_use]
    pub fn with_broadcast_capacity(
        initial_state: S,
        reducer: R,
        environment: E,
        capacity: usize,
    ) -> Self {
        let (actions, _) = broadcast::channel(capacity.max(1));
        Self {
            state: Arc::new(RwLock::new(initial_state)),
            reducer: Arc::new(reducer),
            environment: Arc::new(environment),
            shutdown: Arc::new(AtomicBool::new(false)),
            actions,
        }
    }

    /// Reduce `action` and start executing the resulting effects.
    ///
    /// Returns once the reducer has run; effects continue in the background.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ShutdownInProgress`] after [`Store::shutdown`].
    #[tracing::instrument(skip(self, action), name = "store_send")]
    pub async fn send(&self, action: A) -> Result<(), StoreError> {
        if self.shutdown.load(Ordering::SeqCst) {
            return Err(StoreError::ShutdownInProgress);
        }

        let effects = {
            let mut state = self.state.write().await;
            self.reducer.reduce(&mut state, action, &self.environment)
        };

        for effect in effects {
            if effect.is_none() {
                continue;
            }
            tokio::spawn(Self::run_effect(self.clone(), effect));
        }

        Ok(())
    }

    /// Send `action` and wait for the first effect-produced action matching
    /// `predicate`.
    ///
    /// # Errors
    ///
    /// - [`StoreError::Timeout`] when nothing matches before `timeout`
    /// - [`StoreError::ChannelClosed`] when the broadcast closes
    /// - [`StoreError::ShutdownInProgress`] when the store is shutting down
    pub async fn send_and_wait_for<F>(
        &self,
        action: A,
        predicate: F,
        timeout: Duration,
    ) -> Result<A, StoreError>
    where
        F: Fn(&A) -> bool,
    {
        let mut rx = self.actions.subscribe();
        self.send(action).await?;

        tokio::time::timeout(timeout, async {
            loop {
                match rx.recv().await {
                    Ok(action) if predicate(&action) => return Ok(action),
                    Ok(_) => {},
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "Action observer lagged");
                    },
                    Err(broadcast::error::RecvError::Closed) => {
                        return Err(StoreError::ChannelClosed);
                    },
                }
            }
        })
        .await
        .map_err(|_| StoreError::Timeout)?
    }

    /// Observe every action produced by effects, after it has been reduced.
    #[must_use]
    pub fn subscribe_actions(&self) -> broadcast::Receiver<A> {
        self.actions.subscribe()
    }

    /// Read a value out of the current state.
    pub async fn state<F, T>(&self, f: F) -> T
    where
        F: FnOnce(&S) -> T,
    {
        let state = self.state.read().await;
        f(&state)
    }

    /// Stop accepting new actions. Effects already running finish on their own.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
        tracing::info!("Store shutdown requested");
    }

    /// Environment the reducer runs against.
    #[must_use]
    pub fn environment(&self) -> &E {
        &self.environment
    }

    fn run_effect(store: Self, effect: Effect<A>) -> BoxFuture<'static, ()> {
        async move {
            match effect {
                Effect::None => {},
                Effect::Future(fut) => {
                    metrics::counter!("boxoffice_store_effects_total", "type" => "future").increment(1);
                    if let Some(action) = fut.await {
                        store.feed_back(action).await;
                    }
                },
                Effect::Delay { duration, action } => {
                    metrics::counter!("boxoffice_store_effects_total", "type" => "delay").increment(1);
                    tokio::time::sleep(duration).await;
                    store.feed_back(*action).await;
                },
                Effect::Parallel(effects) => {
                    join_all(effects.into_iter().map(|e| Self::run_effect(store.clone(), e))).await;
                },
                Effect::Sequential(effects) => {
                    for effect in effects {
                        Self::run_effect(store.clone(), effect).await;
                    }
                },
            }
        }
        .boxed()
    }

    async fn feed_back(&self, action: A) {
        if let Err(error) = self.send(action.clone()).await {
            tracing::warn!(%error, "Dropping effect action");
            return;
        }
        // No receivers is the normal case outside request/response flows.
        let _ = self.actions.send(action);
    }
}
