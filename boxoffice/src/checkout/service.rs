use super::{CheckoutAction, CheckoutEnvironment, CheckoutError, CheckoutReceipt, CheckoutReducer, CheckoutRequest, CheckoutState};
use crate::session::Session;
use crate::types::CheckoutId;
use boxoffice_runtime::Store;
use std::time::{Duration, Instant};

type CheckoutStore = Store<CheckoutState, CheckoutAction, CheckoutEnvironment, CheckoutReducer>;

/// Request/response front of the checkout saga.
#[derive(Clone)]
pub struct CheckoutService {
    store: CheckoutStore,
    timeout: Duration,
}

impl CheckoutService {
    /// Service running checkouts in `environment`, waiting at most `timeout`
    /// for each.
    #[must_use]
    pub fn new(environment: CheckoutEnvironment, timeout: Duration) -> Self {
        Self {
            store: Store::new(CheckoutState::default(), CheckoutReducer::new(), environment),
            timeout,
        }
    }

    /// Run one checkout for `session`'s holder.
    ///
    /// # Errors
    ///
    /// Returns the [`CheckoutError`] the saga ended with, or
    /// [`CheckoutError::Runtime`] when it did not finish in time.
    #[tracing::instrument(skip_all, fields(event_id = %request.event_id, quantity = request.quantity))]
    pub async fn checkout(&self, session: &Session, request: CheckoutRequest) -> Result<CheckoutReceipt, CheckoutError> {
        let checkout_id = CheckoutId::new();
        let started = Instant::now();

        let terminal = self
            .store
            .send_and_wait_for(
                CheckoutAction::Start {
                    checkout_id,
                    request,
                    holder: session.holder.clone(),
                },
                move |action| action.is_terminal_for(checkout_id),
                self.timeout,
            )
            .await;

        let result = match terminal {
            Ok(CheckoutAction::TicketIssued {
                issued,
                amount,
                transaction_id,
                ..
            }) => Ok(CheckoutReceipt {
                checkout_id,
                ticket: issued.ticket,
                persistence: issued.persistence,
                amount,
                transaction_id,
            }),
            Ok(CheckoutAction::CheckoutFailed { error, .. }) => Err(error),
            Ok(other) => Err(CheckoutError::Runtime(format!("unexpected terminal action: {other:?}"))),
            Err(error) => {
                tracing::error!(checkout_id = %checkout_id, %error, "Checkout did not finish");
                Err(CheckoutError::Runtime(error.to_string()))
            },
        };

        let status = match &result {
            Ok(_) => "completed",
            Err(error) => error.status_label(),
        };
        crate::metrics::record_checkout(status, started.elapsed());

        result
    }

    /// Checkouts that have started but not finished
    pub async fn in_flight(&self) -> usize {
        self.store.state(|state| state.in_flight.len()).await
    }

    /// Stop accepting checkouts
    pub fn shutdown(&self) {
        self.store.shutdown();
    }
}
