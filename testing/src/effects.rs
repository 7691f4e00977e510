//! Resolve reducer effects without a Store.
//!
//! Reducer tests often need to know which action an effect would feed back.
//! [`resolve`] runs the effects (including nested `Parallel`/`Sequential`
//! ones, in declaration order) and collects the produced actions.

use boxoffice_core::effect::Effect;
use futures::future::BoxFuture;
use futures::FutureExt;

/// Await every effect and collect the actions they produce.
///
/// `Delay` effects resolve immediately to their action.
pub async fn resolve<A>(effects: Vec<Effect<A>>) -> Vec<A>
where
    A: Send + 'static,
{
    let mut actions = Vec::new();
    for effect in effects {
        actions.extend(resolve_one(effect).await);
    }
    actions
}

fn resolve_one<A>(effect: Effect<A>) -> BoxFuture<'static, Vec<A>>
where
    A: Send + 'static,
{
    async move {
        match effect {
            Effect::None => Vec::new(),
            Effect::Future(fut) => fut.await.into_iter().collect(),
            Effect::Delay { action, .. } => vec![*action],
            Effect::Parallel(effects) | Effect::Sequential(effects) => {
                let mut actions = Vec::new();
                for effect in effects {
                    actions.extend(resolve_one(effect).await);
                }
                actions
            },
        }
    }
    .boxed()
}
