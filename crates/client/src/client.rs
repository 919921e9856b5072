//! Public entry point: a push client with its own queue.

use std::sync::Arc;

use tracing::info;

use pushgate_core::{Payload, PushResult};
use pushgate_queue::{JobId, Queue, QueueConfig, QueueStats};

use crate::api::ProviderApi;
use crate::cid::CidClient;
use crate::config::ClientConfig;
use crate::context::RequestContext;
use crate::error::{ClientError, PushError};
use crate::job::PushJob;
use crate::transport::{HttpTransport, Transport};

const QUEUE_NAME: &str = "push";

/// Push client.
///
/// Owns a started queue sized by `config.workers`. Pushes return as soon as
/// the job is queued; the outcome arrives through the callback. Dropping the
/// client waits for every queued push, like [`PushClient::terminate`].
pub struct PushClient {
    config: ClientConfig,
    api: ProviderApi,
    cids: Arc<CidClient>,
    queue: Queue,
}

impl PushClient {
    /// Build a client talking HTTP to `config.host`.
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        config.validate()?;
        let transport = HttpTransport::from_config(&config)?;
        Self::with_transport(config, Arc::new(transport))
    }

    /// Build a client over any transport.
    pub fn with_transport(
        config: ClientConfig,
        transport: Arc<dyn Transport>,
    ) -> Result<Self, ClientError> {
        config.validate()?;

        let api = ProviderApi::new(transport);
        let cids = Arc::new(CidClient::new(
            Arc::new(api.clone()),
            config.cid_batch_size,
            config.cid_validity,
        ));
        let queue = Queue::new(
            QueueConfig::default()
                .with_name(QUEUE_NAME)
                .with_workers(config.workers),
        );
        queue.start()?;

        info!(
            host = %config.host,
            workers = config.workers,
            max_attempts = ?config.max_attempts,
            "push client ready"
        );

        Ok(Self {
            config,
            api,
            cids,
            queue,
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Queue a push. `callback` runs once with the final outcome.
    ///
    /// Fails only when the client no longer accepts work; the callback is
    /// then dropped without being called.
    pub fn push<F>(
        &self,
        ctx: RequestContext,
        payload: Payload,
        callback: F,
    ) -> Result<JobId, PushError>
    where
        F: FnOnce(Result<PushResult, PushError>) + Send + 'static,
    {
        let job = PushJob::new(
            self.api.clone(),
            self.cids.clone(),
            ctx,
            payload,
            Box::new(callback),
        )
        .with_max_attempts(self.config.max_attempts);

        Ok(self.queue.push(job)?)
    }

    /// Run `POST /push/validate` synchronously, then queue the push.
    ///
    /// A payload the provider rejects is never queued and its callback never
    /// runs.
    pub fn push_validate<F>(
        &self,
        ctx: RequestContext,
        payload: Payload,
        callback: F,
    ) -> Result<JobId, PushError>
    where
        F: FnOnce(Result<PushResult, PushError>) + Send + 'static,
    {
        self.api.validate(&ctx, &payload)?;
        self.push(ctx, payload, callback)
    }

    /// A CID for an immediate push.
    pub fn push_id(&self, ctx: &RequestContext) -> Result<String, PushError> {
        self.cids.push_id(ctx)
    }

    /// A CID for a scheduled push.
    pub fn schedule_id(&self, ctx: &RequestContext) -> Result<String, PushError> {
        self.cids.schedule_id(ctx)
    }

    pub fn stats(&self) -> QueueStats {
        self.queue.stats()
    }

    /// Stop accepting pushes and wait until every queued push has reported.
    pub fn terminate(&self) {
        self.queue.stop();
    }
}

impl std::fmt::Debug for PushClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PushClient")
            .field("config", &self.config)
            .field("queue", &self.queue)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::time::Duration;

    use serde_json::json;

    use crate::config::ConfigError;
    use crate::transport::RawResponse;
    use crate::transport::mock::ScriptedTransport;

    fn config() -> ClientConfig {
        ClientConfig::new("key", "secret").with_workers(2)
    }

    #[test]
    fn invalid_config_is_rejected() {
        let transport = Arc::new(ScriptedTransport::new(vec![]));
        let err = PushClient::with_transport(ClientConfig::new("", "secret"), transport)
            .unwrap_err();
        assert!(matches!(
            err,
            ClientError::Config(ConfigError::Missing("app_key"))
        ));
    }

    #[test]
    fn push_reports_through_callback() {
        let transport = Arc::new(ScriptedTransport::new(vec![Ok(RawResponse::new(
            200,
            r#"{"sendno":"5","msg_id":"77"}"#,
        ))]));
        let client = PushClient::with_transport(config(), transport).unwrap();
        let (tx, rx) = mpsc::channel();

        client
            .push(
                RequestContext::background(),
                Payload::new().with_field("cid", json!("c")),
                move |result| tx.send(result).unwrap(),
            )
            .unwrap();

        let result = rx.recv_timeout(Duration::from_secs(5)).unwrap().unwrap();
        assert_eq!(result.msg_id, "77");
        client.terminate();
        assert_eq!(client.stats().completed, 1);
    }

    #[test]
    fn push_after_terminate_is_refused() {
        let transport = Arc::new(ScriptedTransport::new(vec![]));
        let client = PushClient::with_transport(config(), transport.clone()).unwrap();
        client.terminate();

        let err = client
            .push(RequestContext::background(), Payload::new(), |_| {
                panic!("callback of a refused push ran")
            })
            .unwrap_err();
        assert!(matches!(
            err,
            PushError::Queue(pushgate_queue::QueueError::Closed)
        ));
        assert!(transport.requests().is_empty());
        assert_eq!(client.stats().outstanding, 0);
    }

    #[test]
    fn cid_accessors_use_separate_classes() {
        let transport = Arc::new(ScriptedTransport::new(vec![Ok(RawResponse::new(
            200,
            r#"{"cidlist":["x"]}"#,
        ))]));
        let client = PushClient::with_transport(config(), transport.clone()).unwrap();

        assert_eq!(client.push_id(&RequestContext::background()).unwrap(), "x");
        assert_eq!(client.schedule_id(&RequestContext::background()).unwrap(), "x");

        let kinds: Vec<String> = transport
            .requests()
            .into_iter()
            .map(|r| r.query[0].1.clone())
            .collect();
        assert_eq!(kinds, vec!["push", "schedule"]);
    }
}
