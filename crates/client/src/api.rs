//! Typed calls to the provider endpoints.

use std::sync::Arc;

use serde::Deserialize;
use serde::de::DeserializeOwned;

use pushgate_core::{CidKind, Payload, PushResult};

use crate::context::RequestContext;
use crate::error::PushError;
use crate::transport::{ProviderRequest, RawResponse, Transport, classify};

pub const PUSH_PATH: &str = "/push";
pub const VALIDATE_PATH: &str = "/push/validate";
pub const CID_PATH: &str = "/push/cid";

#[derive(Deserialize)]
struct CidList {
    #[serde(rename = "cidlist", default)]
    cids: Vec<String>,
}

/// Provider REST API over a [`Transport`].
///
/// Every call is a single attempt; retrying is the caller's business.
#[derive(Clone)]
pub struct ProviderApi {
    transport: Arc<dyn Transport>,
}

impl ProviderApi {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    /// `POST /push`
    pub fn push(&self, ctx: &RequestContext, payload: &Payload) -> Result<PushResult, PushError> {
        let raw = self.call(ctx, ProviderRequest::post_json(PUSH_PATH, encode(payload)?))?;
        decode(&raw)
    }

    /// `POST /push/validate`: same checks as a push, nothing is sent.
    pub fn validate(&self, ctx: &RequestContext, payload: &Payload) -> Result<(), PushError> {
        self.call(ctx, ProviderRequest::post_json(VALIDATE_PATH, encode(payload)?))?;
        Ok(())
    }

    /// `GET /push/cid?type=..&count=..`
    pub fn fetch_cids(
        &self,
        ctx: &RequestContext,
        kind: CidKind,
        count: usize,
    ) -> Result<Vec<String>, PushError> {
        let request = ProviderRequest::get(CID_PATH)
            .with_query("type", kind.as_query())
            .with_query("count", count);
        let raw = self.call(ctx, request)?;
        Ok(decode::<CidList>(&raw)?.cids)
    }

    fn call(&self, ctx: &RequestContext, request: ProviderRequest) -> Result<RawResponse, PushError> {
        let raw = self.transport.send(ctx, &request)?;
        Ok(classify(raw)?)
    }
}

fn encode(payload: &Payload) -> Result<Vec<u8>, PushError> {
    payload.to_json().map_err(|e| PushError::Encode(e.to_string()))
}

fn decode<T: DeserializeOwned>(raw: &RawResponse) -> Result<T, PushError> {
    serde_json::from_slice(&raw.body).map_err(|e| PushError::Decode(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportError;
    use crate::transport::Method;
    use crate::transport::mock::ScriptedTransport;
    use serde_json::json;

    fn api(script: Vec<Result<RawResponse, TransportError>>) -> (ProviderApi, Arc<ScriptedTransport>) {
        let transport = Arc::new(ScriptedTransport::new(script));
        (ProviderApi::new(transport.clone()), transport)
    }

    #[test]
    fn push_decodes_result() {
        let (api, transport) = api(vec![Ok(RawResponse::new(
            200,
            r#"{"sendno":"7","msg_id":"99"}"#,
        ))]);
        let payload = Payload::new().with_field("platform", json!("all"));

        let result = api.push(&RequestContext::background(), &payload).unwrap();
        assert_eq!(result.send_no, "7");
        assert_eq!(result.msg_id, "99");

        let sent = transport.requests();
        assert_eq!(sent[0].method, Method::Post);
        assert_eq!(sent[0].path, PUSH_PATH);
        assert_eq!(sent[0].body.as_deref(), Some(br#"{"platform":"all"}"#.as_slice()));
    }

    #[test]
    fn push_with_garbage_success_body_is_a_decode_error() {
        let (api, _) = api(vec![Ok(RawResponse::new(200, "not json"))]);
        let err = api
            .push(&RequestContext::background(), &Payload::new())
            .unwrap_err();
        assert!(matches!(err, PushError::Decode(_)));
    }

    #[test]
    fn fetch_cids_sends_kind_and_count() {
        let (api, transport) = api(vec![Ok(RawResponse::new(
            200,
            r#"{"cidlist":["a","b"]}"#,
        ))]);

        let cids = api
            .fetch_cids(&RequestContext::background(), CidKind::Scheduled, 2)
            .unwrap();
        assert_eq!(cids, vec!["a", "b"]);

        let sent = transport.requests();
        assert_eq!(sent[0].path, CID_PATH);
        assert_eq!(
            sent[0].query,
            vec![
                ("type".to_string(), "schedule".to_string()),
                ("count".to_string(), "2".to_string()),
            ]
        );
    }

    #[test]
    fn validate_surfaces_provider_errors() {
        let (api, transport) = api(vec![Ok(RawResponse::new(
            400,
            r#"{"error":{"code":1011,"message":"cannot find user by this audience"}}"#,
        ))]);

        let err = api
            .validate(&RequestContext::background(), &Payload::new())
            .unwrap_err();
        assert_eq!(err.status(), Some(400));
        assert_eq!(transport.requests()[0].path, VALIDATE_PATH);
    }
}
