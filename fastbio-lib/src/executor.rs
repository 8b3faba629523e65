use futures::{StreamExt, stream};
use log::debug;
use tokio_util::sync::CancellationToken;

use crate::{
    BatchResponse, ErrorKind, LogicalRequest, Outcome, Payload, Result,
    dispatcher::{Dispatcher, Source},
    progress::Progress,
    retry::RetryPolicy,
};

/// Default number of requests in flight at the same time
pub const DEFAULT_MAX_CONCURRENCY: usize = 10;

/// Runs batches of requests through a [`Dispatcher`].
///
/// At most `max_concurrency` requests are in flight at once, independent of
/// the rate limit: the concurrency cap bounds open connections and memory,
/// the rate limiter bounds how often the service is called.
///
/// A failing request never aborts its siblings. Its error is recorded in its
/// own slot and all other requests run to completion. Results are written to
/// the slot of the request's position in the batch, so the order of the
/// [`BatchResponse`] is the order of submission.
#[derive(Debug, Clone)]
pub struct BatchExecutor {
    dispatcher: Dispatcher,
    max_concurrency: usize,
    retry_policy: RetryPolicy,
}

impl BatchExecutor {
    /// Create an executor running up to `max_concurrency` requests at once.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::InvalidConcurrency`] if `max_concurrency` is zero.
    pub fn new(dispatcher: Dispatcher, max_concurrency: usize) -> Result<Self> {
        if max_concurrency == 0 {
            return Err(ErrorKind::InvalidConcurrency);
        }
        Ok(Self {
            dispatcher,
            max_concurrency,
            retry_policy: RetryPolicy::default(),
        })
    }

    /// Retry transient failures of single requests according to `policy`
    #[must_use]
    pub const fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    /// Run all `requests` to completion
    pub async fn run(&self, requests: Vec<LogicalRequest>) -> BatchResponse {
        self.run_with_cancellation(requests, CancellationToken::new())
            .await
    }

    /// Run all `requests` until they are done or `token` is cancelled.
    ///
    /// On cancellation, requests in flight are dropped, which closes their
    /// connections, and every request which did not finish before records
    /// [`ErrorKind::Cancelled`]. A cache write which already started is
    /// completed, as the store never exposes partial entries.
    pub async fn run_with_cancellation(
        &self,
        requests: Vec<LogicalRequest>,
        token: CancellationToken,
    ) -> BatchResponse {
        let total = requests.len();
        let label = self.dispatcher.limiter().key().to_string();
        let mut progress = Progress::new(&label, total);
        let mut slots: Vec<Option<Outcome>> =
            std::iter::repeat_with(|| None).take(total).collect();

        let mut results = stream::iter(requests.into_iter().enumerate())
            .map(|(index, request)| {
                let token = token.clone();
                async move {
                    let result = tokio::select! {
                        biased;
                        () = token.cancelled() => Err(ErrorKind::Cancelled),
                        result = self.dispatch_with_retry(&request) => result,
                    };
                    (index, request, result)
                }
            })
            .buffer_unordered(self.max_concurrency);

        while let Some((index, request, result)) = results.next().await {
            progress.record(matches!(result, Ok((_, Source::Cache))));
            if let Some(slot) = slots.get_mut(index) {
                *slot = Some(Outcome {
                    index,
                    method: request.method(),
                    url: request.url().clone(),
                    result: result.map(|(payload, _)| payload),
                });
            }
        }

        debug!(
            "{label}: batch of {total} done, {} from cache",
            progress.from_cache()
        );
        BatchResponse::new(slots.into_iter().flatten().collect())
    }

    async fn dispatch_with_retry(&self, request: &LogicalRequest) -> Result<(Payload, Source)> {
        self.retry_policy
            .run(move || self.dispatcher.dispatch(request))
            .await
    }

    /// The dispatcher running the single requests
    #[must_use]
    pub const fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Maximum number of requests in flight
    #[must_use]
    pub const fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }
}
