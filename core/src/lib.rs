//! # Boxoffice Core
//!
//! The small functional core the checkout pipeline is written against.
//!
//! - **Reducer**: `(State, Action, Environment) → Effects`, the only place
//!   business decisions are made
//! - **Effect**: a description of asynchronous work (store calls, payment,
//!   timers); the runtime executes it and feeds the resulting action back
//! - **Environment**: injected dependencies, reached through traits such as
//!   [`environment::Clock`]
//!
//! Reducers never perform I/O themselves. Anything that touches the hosted
//! store or the payment simulator is returned as an [`effect::Effect`].
//!
//! ## Example
//!
//! ```
//! use boxoffice_core::{effect::Effect, reducer::Reducer, smallvec, SmallVec};
//!
//! #[derive(Clone, Debug)]
//! enum TallyAction {
//!     Add(u32),
//! }
//!
//! struct TallyReducer;
//!
//! impl Reducer for TallyReducer {
//!     type State = u32;
//!     type Action = TallyAction;
//!     type Environment = ();
//!
//!     fn reduce(
//!         &self,
//!         state: &mut u32,
//!         action: TallyAction,
//!         _env: &(),
//!     ) -> SmallVec<[Effect<TallyAction>; 4]> {
//!         match action {
//!             TallyAction::Add(n) => *state += n,
//!         }
//!         smallvec![Effect::None]
//!     }
//! }
//!
//! let mut total = 0;
//! let effects = TallyReducer.reduce(&mut total, TallyAction::Add(3), &());
//! assert_eq!(total, 3);
//! assert_eq!(effects.len(), 1);
//! ```

pub use chrono::{DateTime, Utc};
pub use smallvec::{smallvec, SmallVec};

/// The reducer trait: all business logic lives behind it.
pub mod reducer {
    use super::effect::Effect;
    use smallvec::SmallVec;

    /// Pure state transition plus a list of effect descriptions.
    ///
    /// Implementations mutate `state` in place and return the work that
    /// has to happen next. Effects are executed by the runtime and may
    /// produce further actions, which are reduced in turn.
    pub trait Reducer {
        /// State this reducer owns
        type State;

        /// Every input the reducer understands (commands and results)
        type Action;

        /// Injected dependencies
        type Environment;

        /// Apply `action` to `state` and describe the follow-up work.
        fn reduce(
            &self,
            state: &mut Self::State,
            action: Self::Action,
            env: &Self::Environment,
        ) -> SmallVec<[Effect<Self::Action>; 4]>;
    }
}

/// Effect descriptions returned by reducers.
pub mod effect {
    use std::future::Future;
    use std::pin::Pin;
    use std::time::Duration;

    /// Boxed future an effect resolves to.
    pub type EffectFuture<Action> = Pin<Box<dyn Future<Output = Option<Action>> + Send>>;

    /// A side effect to be executed by the runtime.
    ///
    /// Effects are values. Returning one from a reducer does nothing until
    /// the Store runs it.
    pub enum Effect<Action> {
        /// Nothing to do
        None,

        /// Run the contained effects concurrently
        Parallel(Vec<Effect<Action>>),

        /// Run the contained effects one after another
        Sequential(Vec<Effect<Action>>),

        /// Dispatch `action` after `duration`
        Delay {
            /// How long to wait
            duration: Duration,
            /// Action dispatched once the delay elapses
            action: Box<Action>,
        },

        /// Arbitrary async work; a `Some` result is fed back into the reducer
        Future(EffectFuture<Action>),
    }

    impl<Action> Effect<Action> {
        /// Wrap an async block as an effect.
        pub fn future<F>(future: F) -> Self
        where
            F: Future<Output = Option<Action>> + Send + 'static,
        {
            Self::Future(Box::pin(future))
        }

        /// Dispatch `action` on the next turn of the runtime.
        pub fn send(action: Action) -> Self
        where
            Action: Send + 'static,
        {
            Self::future(async move { Some(action) })
        }

        /// Run effects concurrently
        #[must_use]
        pub const fn merge(effects: Vec<Self>) -> Self {
            Self::Parallel(effects)
        }

        /// Run effects in order
        #[must_use]
        pub const fn chain(effects: Vec<Self>) -> Self {
            Self::Sequential(effects)
        }

        /// `true` for [`Effect::None`].
        #[must_use]
        pub const fn is_none(&self) -> bool {
            matches!(self, Self::None)
        }
    }

    impl<Action> std::fmt::Debug for Effect<Action>
    where
        Action: std::fmt::Debug,
    {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            match self {
                Self::None => write!(f, "Effect::None"),
                Self::Parallel(effects) => f.debug_tuple("Effect::Parallel").field(effects).finish(),
                Self::Sequential(effects) => {
                    f.debug_tuple("Effect::Sequential").field(effects).finish()
                },
                Self::Delay { duration, action } => f
                    .debug_struct("Effect::Delay")
                    .field("duration", duration)
                    .field("action", action)
                    .finish(),
                Self::Future(_) => write!(f, "Effect::Future(<future>)"),
            }
        }
    }
}

/// Dependency traits injected through reducer environments.
pub mod environment {
    use chrono::{DateTime, Utc};

    /// Source of the current time.
    ///
    /// Production code uses [`SystemClock`]; tests pin time with a fixed
    /// clock so purchase dates and notification timestamps are comparable.
    pub trait Clock: Send + Sync {
        /// Current time
        fn now(&self) -> DateTime<Utc>;
    }

    /// Wall-clock time.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct SystemClock;

    impl Clock for SystemClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }
}
