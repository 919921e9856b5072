//! The push job: one payload, its callback, and the retry decision.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use pushgate_core::{Payload, PushResult};
use pushgate_queue::{Job, JobOutcome};

use crate::api::ProviderApi;
use crate::cid::CidClient;
use crate::context::RequestContext;
use crate::error::PushError;

/// Receives the terminal outcome of a push. Called exactly once.
pub type PushCallback = Box<dyn FnOnce(Result<PushResult, PushError>) + Send + 'static>;

/// How a failed attempt is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Disposition {
    RetryNow,
    RetryAfter(Duration),
    Terminal,
}

/// Rate limits and unreachable providers are retried; everything else is
/// reported.
pub(crate) fn disposition(error: &PushError) -> Disposition {
    match error {
        PushError::Provider(e) if e.is_rate_limited() => match e.retry_after() {
            Some(delay) => Disposition::RetryAfter(delay),
            None => Disposition::RetryNow,
        },
        PushError::Transport(e) if e.is_transient() => Disposition::RetryNow,
        _ => Disposition::Terminal,
    }
}

/// A queued push.
///
/// The CID is fetched on the first attempt when the payload has none, and
/// kept in the payload for every retry.
pub struct PushJob {
    api: ProviderApi,
    cids: Arc<CidClient>,
    ctx: RequestContext,
    payload: Payload,
    callback: Option<PushCallback>,
    attempts: u32,
    max_attempts: Option<u32>,
}

impl PushJob {
    pub fn new(
        api: ProviderApi,
        cids: Arc<CidClient>,
        ctx: RequestContext,
        payload: Payload,
        callback: PushCallback,
    ) -> Self {
        Self {
            api,
            cids,
            ctx,
            payload,
            callback: Some(callback),
            attempts: 0,
            max_attempts: None,
        }
    }

    /// Give up with [`PushError::RetriesExhausted`] once `max_attempts`
    /// attempts have failed retryably. Zero is treated as one.
    pub fn with_max_attempts(mut self, max_attempts: Option<u32>) -> Self {
        self.max_attempts = max_attempts.map(|n| n.max(1));
        self
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    fn attempt(&mut self) -> Result<PushResult, PushError> {
        if self.payload.cid().is_none() {
            let cid = self.cids.push_id(&self.ctx)?;
            self.payload.set_cid(cid);
        }
        self.api.push(&self.ctx, &self.payload)
    }

    fn report(&mut self, result: Result<PushResult, PushError>) -> JobOutcome {
        if let Some(callback) = self.callback.take() {
            callback(result);
        }
        JobOutcome::Completed
    }
}

impl Job for PushJob {
    fn run(&mut self) -> JobOutcome {
        if self.callback.is_none() {
            return JobOutcome::Completed;
        }

        self.attempts += 1;
        let error = match self.attempt() {
            Ok(result) => {
                debug!(
                    attempt = self.attempts,
                    msg_id = %result.msg_id,
                    "push delivered"
                );
                return self.report(Ok(result));
            }
            Err(error) => error,
        };

        let retry = match disposition(&error) {
            Disposition::Terminal => {
                warn!(attempt = self.attempts, error = %error, "push failed");
                return self.report(Err(error));
            }
            Disposition::RetryNow => JobOutcome::RetryNow,
            Disposition::RetryAfter(delay) => JobOutcome::RetryAfter(delay),
        };

        if self.max_attempts.is_some_and(|max| self.attempts >= max) {
            warn!(attempt = self.attempts, error = %error, "push retries exhausted");
            return self.report(Err(PushError::RetriesExhausted {
                attempts: self.attempts,
                last: Box::new(error),
            }));
        }

        warn!(
            attempt = self.attempts,
            status = ?error.status(),
            error = %error,
            "push will be retried"
        );
        retry
    }

    fn name(&self) -> &str {
        "push"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use pushgate_core::ProviderError;
    use serde_json::json;

    use crate::cid::DEFAULT_CID_VALIDITY;
    use crate::error::TransportError;
    use crate::transport::RawResponse;
    use crate::transport::classify::HEADER_RATE_LIMIT_RESET;
    use crate::transport::mock::ScriptedTransport;

    type Outcomes = Arc<Mutex<Vec<Result<PushResult, PushError>>>>;

    fn job(
        script: Vec<Result<RawResponse, TransportError>>,
        payload: Payload,
    ) -> (PushJob, Arc<ScriptedTransport>, Outcomes) {
        let transport = Arc::new(ScriptedTransport::new(script));
        let api = ProviderApi::new(transport.clone());
        let cids = Arc::new(CidClient::new(
            Arc::new(api.clone()),
            2,
            DEFAULT_CID_VALIDITY,
        ));
        let outcomes: Outcomes = Arc::default();
        let sink = outcomes.clone();
        let job = PushJob::new(
            api,
            cids,
            RequestContext::background(),
            payload,
            Box::new(move |result| sink.lock().unwrap().push(result)),
        );
        (job, transport, outcomes)
    }

    fn with_cid() -> Payload {
        Payload::new().with_field("cid", json!("preset"))
    }

    fn ok() -> Result<RawResponse, TransportError> {
        Ok(RawResponse::new(200, r#"{"sendno":"0","msg_id":"42"}"#))
    }

    fn rate_limited(reset: &str) -> Result<RawResponse, TransportError> {
        Ok(RawResponse::new(429, "").with_header(HEADER_RATE_LIMIT_RESET, reset))
    }

    #[test]
    fn disposition_follows_error_class() {
        let limited = ProviderError::new(429);
        assert_eq!(disposition(&limited.into()), Disposition::RetryNow);

        let err: PushError = TransportError::Connect("refused".into()).into();
        assert_eq!(disposition(&err), Disposition::RetryNow);

        let err: PushError = TransportError::Timeout.into();
        assert_eq!(disposition(&err), Disposition::Terminal);

        let err: PushError = ProviderError::new(400).into();
        assert_eq!(disposition(&err), Disposition::Terminal);
        assert_eq!(disposition(&PushError::NoCid), Disposition::Terminal);
    }

    #[test]
    fn success_reports_once() {
        let (mut job, _, outcomes) = job(vec![ok()], with_cid());

        assert_eq!(job.run(), JobOutcome::Completed);
        assert_eq!(job.run(), JobOutcome::Completed);

        let outcomes = outcomes.lock().unwrap();
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].as_ref().unwrap().msg_id, "42");
    }

    #[test]
    fn rate_limit_with_reset_waits_without_callback() {
        let (mut job, _, outcomes) = job(vec![rate_limited("3"), ok()], with_cid());

        assert_eq!(job.run(), JobOutcome::RetryAfter(Duration::from_secs(3)));
        assert!(outcomes.lock().unwrap().is_empty());

        assert_eq!(job.run(), JobOutcome::Completed);
        assert_eq!(job.attempts(), 2);
        assert!(outcomes.lock().unwrap()[0].is_ok());
    }

    #[test]
    fn rate_limit_without_reset_retries_now() {
        let (mut job, _, _) = job(vec![rate_limited("0")], with_cid());
        assert_eq!(job.run(), JobOutcome::RetryNow);
    }

    #[test]
    fn terminal_error_is_reported() {
        let (mut job, _, outcomes) = job(
            vec![Ok(RawResponse::new(
                401,
                r#"{"error":{"code":1004,"message":"appkey and master secret mismatch"}}"#,
            ))],
            with_cid(),
        );

        assert_eq!(job.run(), JobOutcome::Completed);
        let outcomes = outcomes.lock().unwrap();
        let err = outcomes[0].as_ref().unwrap_err();
        assert_eq!(err.status(), Some(401));
    }

    #[test]
    fn cid_is_fetched_once_and_kept_across_retries() {
        let (mut job, transport, _) = job(
            vec![
                Ok(RawResponse::new(200, r#"{"cidlist":["c1","c2"]}"#)),
                Err(TransportError::Connect("refused".into())),
                ok(),
            ],
            Payload::new(),
        );

        assert_eq!(job.run(), JobOutcome::RetryNow);
        assert_eq!(job.payload().cid(), Some("c1"));
        assert_eq!(job.run(), JobOutcome::Completed);

        let paths: Vec<String> = transport.requests().into_iter().map(|r| r.path).collect();
        assert_eq!(paths, vec!["/push/cid", "/push", "/push"]);
    }

    #[test]
    fn cid_fetch_failure_goes_through_the_classifier() {
        let (mut job, _, outcomes) = job(
            vec![Ok(RawResponse::new(200, r#"{"cidlist":[]}"#))],
            Payload::new(),
        );

        assert_eq!(job.run(), JobOutcome::Completed);
        assert!(matches!(
            outcomes.lock().unwrap()[0],
            Err(PushError::NoCid)
        ));
    }

    #[test]
    fn absurd_reset_hint_retries_now() {
        let (mut job, _, outcomes) = job(
            vec![rate_limited("18446744073709551615"), ok()],
            with_cid(),
        );

        assert_eq!(job.run(), JobOutcome::RetryNow);
        assert!(outcomes.lock().unwrap().is_empty());
        assert_eq!(job.run(), JobOutcome::Completed);
    }

    #[test]
    fn unreachable_cid_endpoint_retries_without_callback() {
        let (mut job, transport, outcomes) = job(
            vec![
                Err(TransportError::Connect("connection refused".into())),
                Ok(RawResponse::new(200, r#"{"cidlist":["c1"]}"#)),
                ok(),
            ],
            Payload::new(),
        );

        assert_eq!(job.run(), JobOutcome::RetryNow);
        assert!(outcomes.lock().unwrap().is_empty());
        assert_eq!(job.payload().cid(), None);

        assert_eq!(job.run(), JobOutcome::Completed);
        assert_eq!(job.payload().cid(), Some("c1"));
        assert!(outcomes.lock().unwrap()[0].is_ok());

        let paths: Vec<String> = transport.requests().into_iter().map(|r| r.path).collect();
        assert_eq!(paths, vec!["/push/cid", "/push/cid", "/push"]);
    }

    #[test]
    fn throttled_cid_endpoint_waits_for_reset() {
        let (mut job, _, outcomes) = job(vec![rate_limited("2")], Payload::new());

        assert_eq!(job.run(), JobOutcome::RetryAfter(Duration::from_secs(2)));
        assert!(outcomes.lock().unwrap().is_empty());
        assert_eq!(job.payload().cid(), None);
    }

    #[test]
    fn bounded_retries_give_up() {
        let (job, _, outcomes) = job(vec![rate_limited("0")], with_cid());
        let mut job = job.with_max_attempts(Some(3));

        assert_eq!(job.run(), JobOutcome::RetryNow);
        assert_eq!(job.run(), JobOutcome::RetryNow);
        assert_eq!(job.run(), JobOutcome::Completed);

        let outcomes = outcomes.lock().unwrap();
        match &outcomes[0] {
            Err(PushError::RetriesExhausted { attempts, last }) => {
                assert_eq!(*attempts, 3);
                assert_eq!(last.status(), Some(429));
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn cancelled_context_is_terminal() {
        let (mut job, transport, outcomes) = job(vec![ok()], with_cid());
        job.ctx.cancel();

        assert_eq!(job.run(), JobOutcome::Completed);
        assert!(transport.requests().is_empty());
        assert!(matches!(
            outcomes.lock().unwrap()[0],
            Err(PushError::Transport(TransportError::Cancelled))
        ));
    }
}
