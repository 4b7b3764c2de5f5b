//! Request Governor
//!
//! Serializes all traffic to one remote endpoint through a single worker
//! task. Callers submit requests from anywhere; the worker owns the queue
//! and the rate window, forms batches within the per-second cap, dispatches
//! them, matches replies back by position and resubmits rate-limited work
//! at the head of the queue.
//!
//! ```text
//!  submit() ──┐
//!  submit() ──┼──► mpsc ──► Worker ──► queue ──► RateWindow ──► dispatcher
//!  submit() ──┘               ▲                                     │
//!                             └──── rate-limited, push_front ◄──────┘
//! ```

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::time::{Instant, sleep, timeout_at};
use tracing::{debug, warn};

use crate::backoff::{BackoffPolicy, Classification};
use crate::config::GovernorConfig;
use crate::dispatch::BatchDispatcher;
use crate::error::{DispatchError, GovernorError, GovernorResult, InvalidConfig};
use crate::rate_window::RateWindow;

/// Handle to a governed endpoint. Cheap to clone; every clone feeds the
/// same worker.
pub struct RequestGovernor<Req, Resp> {
    name: Arc<str>,
    tx: mpsc::UnboundedSender<PendingRequest<Req, Resp>>,
    default_timeout: Option<Duration>,
}

impl<Req, Resp> Clone for RequestGovernor<Req, Resp> {
    fn clone(&self) -> Self {
        RequestGovernor {
            name: Arc::clone(&self.name),
            tx: self.tx.clone(),
            default_timeout: self.default_timeout,
        }
    }
}

impl<Req, Resp> RequestGovernor<Req, Resp>
where
    Req: Send + Sync + 'static,
    Resp: Send + 'static,
{
    /// Validate the configuration and spawn the worker. Must be called from
    /// within a tokio runtime; the worker idles until the first submission.
    pub fn new<D>(
        name: impl Into<String>,
        config: GovernorConfig,
        dispatcher: D,
    ) -> Result<Self, InvalidConfig>
    where
        D: BatchDispatcher<Req, Resp>,
    {
        config.validate()?;

        let name: Arc<str> = Arc::from(name.into());
        let (tx, rx) = mpsc::unbounded_channel();
        let default_timeout = config.default_timeout;

        let worker = Worker {
            name: Arc::clone(&name),
            policy: BackoffPolicy::new(config.backoff),
            window: RateWindow::new(config.max_requests_per_second),
            config,
            queue: VecDeque::new(),
            dispatcher,
            batches: 0,
        };
        tokio::spawn(worker.run(rx));

        Ok(RequestGovernor {
            name,
            tx,
            default_timeout,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Submit a request and wait for its terminal outcome, bounded by the
    /// configured default timeout if there is one.
    pub async fn submit(&self, request: Req) -> GovernorResult<Resp> {
        match self.default_timeout {
            Some(timeout) => self.submit_with_timeout(request, timeout).await,
            None => {
                let rx = self.enqueue(request, None)?;
                rx.await.map_err(|_| GovernorError::ShutDown)?
            }
        }
    }

    pub async fn submit_with_timeout(
        &self,
        request: Req,
        timeout: Duration,
    ) -> GovernorResult<Resp> {
        self.submit_with_deadline(request, Instant::now() + timeout)
            .await
    }

    /// Submit a request that fails with [`GovernorError::Timeout`] if it is
    /// still unresolved at `deadline`. Other queued requests are unaffected.
    pub async fn submit_with_deadline(
        &self,
        request: Req,
        deadline: Instant,
    ) -> GovernorResult<Resp> {
        let submitted_at = Instant::now();
        let rx = self.enqueue(request, Some(deadline))?;

        match timeout_at(deadline, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(GovernorError::ShutDown),
            Err(_) => Err(GovernorError::Timeout(
                deadline.saturating_duration_since(submitted_at),
            )),
        }
    }

    fn enqueue(
        &self,
        payload: Req,
        deadline: Option<Instant>,
    ) -> GovernorResult<oneshot::Receiver<GovernorResult<Resp>>> {
        let (completion, rx) = oneshot::channel();
        let pending = PendingRequest {
            payload,
            ticket: Ticket {
                completion,
                retries: 0,
                submitted_at: Instant::now(),
                deadline,
            },
        };
        self.tx
            .send(pending)
            .map_err(|_| GovernorError::ShutDown)?;
        Ok(rx)
    }
}

/// One caller's unit of work while it sits in the governor's queue
struct PendingRequest<Req, Resp> {
    payload: Req,
    ticket: Ticket<Resp>,
}

/// Everything about a pending request except its payload
struct Ticket<Resp> {
    completion: oneshot::Sender<GovernorResult<Resp>>,
    retries: u32,
    submitted_at: Instant,
    deadline: Option<Instant>,
}

impl<Resp> Ticket<Resp> {
    fn finish(self, result: GovernorResult<Resp>) {
        // The caller may have given up; nothing left to deliver to
        let _ = self.completion.send(result);
    }

    fn expired(&self, now: Instant) -> bool {
        self.deadline.is_some_and(|deadline| now >= deadline)
    }
}

enum BatchOutcome {
    Completed,
    RateLimited { delay: Duration },
}

struct Worker<Req, Resp, D> {
    name: Arc<str>,
    config: GovernorConfig,
    policy: BackoffPolicy,
    window: RateWindow,
    queue: VecDeque<PendingRequest<Req, Resp>>,
    dispatcher: D,
    batches: u64,
}

impl<Req, Resp, D> Worker<Req, Resp, D>
where
    Req: Send + Sync + 'static,
    Resp: Send + 'static,
    D: BatchDispatcher<Req, Resp>,
{
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<PendingRequest<Req, Resp>>) {
        debug!(governor = %self.name, "governor worker started");

        loop {
            if self.queue.is_empty() {
                match rx.recv().await {
                    Some(pending) => self.queue.push_back(pending),
                    None => break,
                }
            }
            while let Ok(pending) = rx.try_recv() {
                self.queue.push_back(pending);
            }

            self.discard_abandoned();
            if self.queue.is_empty() {
                continue;
            }

            let size = self.config.batch_size.min(self.queue.len());
            let now = Instant::now();
            if !self.window.admit_at(now, size as u32) {
                let wait = self.window.time_until_available(now, size as u32);
                debug!(
                    governor = %self.name,
                    wait_ms = wait.as_millis() as u64,
                    "rate window full"
                );
                sleep(wait).await;
                continue;
            }

            let batch: Vec<_> = self.queue.drain(..size).collect();
            match self.dispatch(batch).await {
                BatchOutcome::Completed => sleep(self.config.batch_interval).await,
                BatchOutcome::RateLimited { delay } => sleep(delay).await,
            }
        }

        debug!(governor = %self.name, "governor worker stopped");
    }

    /// Drop requests whose caller stopped waiting or whose deadline passed
    fn discard_abandoned(&mut self) {
        let now = Instant::now();
        let mut kept = VecDeque::with_capacity(self.queue.len());

        for pending in self.queue.drain(..) {
            if pending.ticket.completion.is_closed() {
                continue;
            }
            if pending.ticket.expired(now) {
                let waited = now.saturating_duration_since(pending.ticket.submitted_at);
                pending.ticket.finish(Err(GovernorError::Timeout(waited)));
                continue;
            }
            kept.push_back(pending);
        }
        self.queue = kept;
    }

    async fn dispatch(&mut self, batch: Vec<PendingRequest<Req, Resp>>) -> BatchOutcome {
        self.batches += 1;
        let (payloads, tickets): (Vec<Req>, Vec<Ticket<Resp>>) =
            batch.into_iter().map(|p| (p.payload, p.ticket)).unzip();

        debug!(
            governor = %self.name,
            batch = self.batches,
            size = payloads.len(),
            "dispatching batch"
        );

        let results = match self.dispatcher.dispatch(&payloads).await {
            Ok(results) => results,
            Err(DispatchError::Transport(message)) => {
                warn!(governor = %self.name, error = %message, "batch transport failure");
                for ticket in tickets {
                    ticket.finish(Err(GovernorError::Transport(message.clone())));
                }
                return BatchOutcome::Completed;
            }
            Err(DispatchError::Remote(error)) => match self.policy.classify(&error) {
                // Rate limiting the envelope rate-limits every item in it
                Classification::RateLimited => (0..payloads.len())
                    .map(|_| Err(DispatchError::Remote(error.clone())))
                    .collect(),
                Classification::Fatal => {
                    for ticket in tickets {
                        ticket.finish(Err(GovernorError::Rejected(error.clone())));
                    }
                    return BatchOutcome::Completed;
                }
            },
        };

        if results.len() != payloads.len() {
            warn!(
                governor = %self.name,
                expected = payloads.len(),
                received = results.len(),
                "reply size does not match batch"
            );
        }

        let mut results = results.into_iter();
        let mut retry = Vec::new();
        let mut fewest_retries: Option<u32> = None;

        for (payload, mut ticket) in payloads.into_iter().zip(tickets) {
            match results.next() {
                Some(Ok(response)) => ticket.finish(Ok(response)),
                Some(Err(DispatchError::Transport(message))) => {
                    ticket.finish(Err(GovernorError::Transport(message)))
                }
                Some(Err(DispatchError::Remote(error))) => match self.policy.classify(&error) {
                    Classification::RateLimited => {
                        if ticket.retries < self.config.max_retries {
                            fewest_retries = Some(
                                fewest_retries.map_or(ticket.retries, |r| r.min(ticket.retries)),
                            );
                            ticket.retries += 1;
                            retry.push(PendingRequest { payload, ticket });
                        } else {
                            let retries = ticket.retries;
                            ticket.finish(Err(GovernorError::MaxRetriesExceeded {
                                retries,
                                last: error.message,
                            }));
                        }
                    }
                    Classification::Fatal => ticket.finish(Err(GovernorError::Rejected(error))),
                },
                None => ticket.finish(Err(GovernorError::Transport(
                    "reply is missing a result for this request".to_string(),
                ))),
            }
        }

        let Some(fewest_retries) = fewest_retries else {
            return BatchOutcome::Completed;
        };

        // Retried work goes ahead of newer submissions, in its batch order
        let retried = retry.len();
        for pending in retry.into_iter().rev() {
            self.queue.push_front(pending);
        }

        let delay = self.policy.delay_for(fewest_retries);
        warn!(
            governor = %self.name,
            retried,
            delay_ms = delay.as_millis() as u64,
            "rate limited, backing off"
        );
        BatchOutcome::RateLimited { delay }
    }
}
