use std::future::Future;
use std::marker::PhantomData;

use serde::{de::DeserializeOwned, Serialize};

use crate::{SubmitFailure, SubmitRequest};

/// Performs the ledger transaction described by a job payload.
///
/// The queue treats the payload and the output as opaque JSON; the handler
/// declares the types it expects and the worker converts on the way in and out.
pub trait SubmissionHandler: Send + Sync + 'static {
    type Payload: DeserializeOwned + Send + 'static;
    type Output: Serialize + Send + 'static;

    fn submit(
        &self,
        request: SubmitRequest<Self::Payload>,
    ) -> impl Future<Output = Result<Self::Output, SubmitFailure>> + Send;

    fn identifier(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

/// Adapter turning an async closure into a [`SubmissionHandler`].
pub struct HandlerFn<F, P, O> {
    f: F,
    _marker: PhantomData<fn(P) -> O>,
}

/// Wraps `f` so it can be used as a submission handler.
///
/// ```
/// use fabric_submit_queue_handler::{handler_fn, SubmitFailure, SubmitRequest};
/// use fabric_submit_queue_job::SubmitTransaction;
///
/// let handler = handler_fn(|request: SubmitRequest<SubmitTransaction>| async move {
///     if request.payload.transaction_name.is_empty() {
///         return Err(SubmitFailure::permanent("missing transaction name"));
///     }
///     Ok::<_, SubmitFailure>(format!("submitted {}", request.payload.transaction_name))
/// });
/// # let _ = handler;
/// ```
pub fn handler_fn<P, O, F, Fut>(f: F) -> HandlerFn<F, P, O>
where
    F: Fn(SubmitRequest<P>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<O, SubmitFailure>> + Send + 'static,
{
    HandlerFn {
        f,
        _marker: PhantomData,
    }
}

impl<P, O, F, Fut> SubmissionHandler for HandlerFn<F, P, O>
where
    P: DeserializeOwned + Send + 'static,
    O: Serialize + Send + 'static,
    F: Fn(SubmitRequest<P>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<O, SubmitFailure>> + Send + 'static,
{
    type Payload = P;
    type Output = O;

    fn submit(
        &self,
        request: SubmitRequest<P>,
    ) -> impl Future<Output = Result<O, SubmitFailure>> + Send {
        (self.f)(request)
    }

    fn identifier(&self) -> &str {
        std::any::type_name::<F>()
    }
}
