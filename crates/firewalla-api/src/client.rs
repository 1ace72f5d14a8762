// MSP API HTTP client
//
// Wraps `reqwest::Client` with URL construction, status mapping, list
// envelope unwrapping, retry, and per-endpoint in-flight guards. Endpoint
// methods live in sibling modules (boxes, devices, rules, alarms) as
// inherent impls.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::{Mutex, OnceCell};
use tracing::{debug, warn};
use url::Url;

use crate::error::Error;
use crate::models::BoxInfo;
use crate::retry::{RetryPolicy, with_retry};
use crate::transport::TransportConfig;
use secrecy::SecretString;

/// Read endpoints guarded against concurrent duplicate fetches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub(crate) enum Endpoint {
    Boxes,
    Devices,
    Rules,
    Alarms,
}

/// One lock per read endpoint. A second fetch of the same endpoint waits
/// for the first to finish instead of racing it.
#[derive(Debug, Default)]
struct InFlightSlots {
    boxes: Mutex<()>,
    devices: Mutex<()>,
    rules: Mutex<()>,
    alarms: Mutex<()>,
}

impl InFlightSlots {
    fn slot(&self, endpoint: Endpoint) -> &Mutex<()> {
        match endpoint {
            Endpoint::Boxes => &self.boxes,
            Endpoint::Devices => &self.devices,
            Endpoint::Rules => &self.rules,
            Endpoint::Alarms => &self.alarms,
        }
    }
}

/// Async client for the Firewalla MSP API.
///
/// Cheap to clone; clones share the connection pool and the in-flight
/// guards. Every request carries `Authorization: Token <key>`.
#[derive(Debug, Clone)]
pub struct FirewallaClient {
    http: reqwest::Client,
    base_url: Url,
    box_gid: Option<String>,
    /// First visible box, when no gid is configured. Resolved once.
    resolved_gid: Arc<OnceCell<String>>,
    retry: RetryPolicy,
    slots: Arc<InFlightSlots>,
}

impl FirewallaClient {
    /// Create a client for the MSP domain at `base_url`.
    ///
    /// A bare host such as `mydomain.firewalla.net` is treated as `https://`.
    pub fn new(
        base_url: &str,
        token: &SecretString,
        transport: &TransportConfig,
    ) -> Result<Self, Error> {
        let http = transport.build_client(token)?;
        Self::from_reqwest(base_url, http)
    }

    /// Create a client with a pre-built `reqwest::Client`.
    ///
    /// The caller is responsible for the auth header. Used by tests and by
    /// callers that share a client.
    pub fn from_reqwest(base_url: &str, http: reqwest::Client) -> Result<Self, Error> {
        Ok(Self {
            http,
            base_url: normalize_base_url(base_url)?,
            box_gid: None,
            resolved_gid: Arc::new(OnceCell::new()),
            retry: RetryPolicy::default(),
            slots: Arc::new(InFlightSlots::default()),
        })
    }

    /// Scope list endpoints to one box and select it in `fetch_box_status`.
    pub fn with_box_gid(mut self, gid: impl Into<String>) -> Self {
        self.box_gid = Some(gid.into());
        self
    }

    /// Replace the retry policy.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn box_gid(&self) -> Option<&str> {
        self.box_gid.as_deref()
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    // ── URL builders ─────────────────────────────────────────────────

    /// `{base}v2/{path}`
    pub(crate) fn api_url(&self, path: &str) -> Result<Url, Error> {
        Ok(self.base_url.join(&format!("v2/{path}"))?)
    }

    /// `{base}v2/{path}?gid={gid}` for the tracked box.
    pub(crate) async fn scoped_url(&self, path: &str) -> Result<Url, Error> {
        let gid = self.tracked_gid().await?;
        let mut url = self.api_url(path)?;
        url.query_pairs_mut().append_pair("gid", &gid);
        Ok(url)
    }

    /// The configured gid, else the first box the token can see.
    ///
    /// The first-box choice is made once per client (and its clones), so
    /// every list stays scoped to the same box.
    pub(crate) async fn tracked_gid(&self) -> Result<String, Error> {
        if let Some(gid) = &self.box_gid {
            return Ok(gid.clone());
        }
        let gid = self
            .resolved_gid
            .get_or_try_init(|| async {
                let boxes = self.list_boxes().await?;
                first_box_gid(&boxes)
            })
            .await?;
        Ok(gid.clone())
    }

    /// Like [`tracked_gid`](Self::tracked_gid), resolving from an already
    /// fetched box list.
    pub(crate) async fn tracked_gid_from(&self, boxes: &[BoxInfo]) -> Result<String, Error> {
        if let Some(gid) = &self.box_gid {
            return Ok(gid.clone());
        }
        let gid = self
            .resolved_gid
            .get_or_try_init(|| async { first_box_gid(boxes) })
            .await?;
        Ok(gid.clone())
    }

    // ── Request helpers ──────────────────────────────────────────────

    /// GET a list endpoint, unwrap its envelope, decode each element.
    pub(crate) async fn get_list<T: DeserializeOwned>(
        &self,
        endpoint: Endpoint,
        url: Url,
    ) -> Result<Vec<T>, Error> {
        let _guard = self.slots.slot(endpoint).lock().await;
        let body = with_retry(&self.retry, &format!("GET {endpoint}"), || {
            self.get_once(url.clone())
        })
        .await?;
        let value: Value = parse_json(&body)?;
        let items = unwrap_list(value)?;
        serde_json::from_value(Value::Array(items)).map_err(|e| Error::Deserialization {
            message: e.to_string(),
            body,
        })
    }

    /// POST with no body. Any 2xx is success; the response body is ignored.
    pub(crate) async fn post_action(&self, url: Url, operation: &str) -> Result<(), Error> {
        with_retry(&self.retry, operation, || self.post_once(url.clone())).await
    }

    async fn get_once(&self, url: Url) -> Result<String, Error> {
        debug!("GET {}", url);
        let resp = self.http.get(url.clone()).send().await?;
        let resp = check_status(resp, &url).await?;
        Ok(resp.text().await?)
    }

    async fn post_once(&self, url: Url) -> Result<(), Error> {
        debug!("POST {}", url);
        let resp = self.http.post(url.clone()).send().await?;
        check_status(resp, &url).await?;
        Ok(())
    }
}

fn first_box_gid(boxes: &[BoxInfo]) -> Result<String, Error> {
    let first = boxes
        .first()
        .ok_or_else(|| Error::UnexpectedPayload("no boxes visible to this token".into()))?;
    if boxes.len() > 1 {
        warn!(
            count = boxes.len(),
            gid = %first.gid,
            "several boxes visible, tracking the first; set box_gid to pick another"
        );
    }
    Ok(first.gid.clone())
}

/// Map a non-success status to the error taxonomy.
async fn check_status(resp: reqwest::Response, url: &Url) -> Result<reqwest::Response, Error> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }

    let code = status.as_u16();
    match code {
        401 | 403 => Err(Error::Authentication { status: code }),
        404 => Err(Error::NotFound {
            resource: url.path().to_owned(),
        }),
        429 => {
            let retry_after_secs = resp
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.trim().parse().ok());
            Err(Error::RateLimited { retry_after_secs })
        }
        _ => {
            let message = error_message(resp).await;
            if status.is_server_error() {
                Err(Error::Server {
                    status: code,
                    message,
                })
            } else {
                Err(Error::UnexpectedStatus {
                    status: code,
                    message,
                })
            }
        }
    }
}

/// Best-effort message from an error body: `{"message": ...}`, `{"error": ...}`,
/// or the raw text.
async fn error_message(resp: reqwest::Response) -> String {
    let text = resp.text().await.unwrap_or_default();
    serde_json::from_str::<Value>(&text)
        .ok()
        .and_then(|v| {
            ["message", "error", "msg"]
                .iter()
                .find_map(|k| v.get(*k).and_then(Value::as_str).map(str::to_owned))
        })
        .unwrap_or(text)
}

fn parse_json(body: &str) -> Result<Value, Error> {
    serde_json::from_str(body).map_err(|e| Error::Deserialization {
        message: e.to_string(),
        body: body.to_owned(),
    })
}

/// Keys checked, in order, when a list endpoint answers with an object.
const LIST_KEYS: [&str; 4] = ["results", "rules", "data", "items"];

/// Accept a bare array, a known envelope key, or the single array-of-objects
/// value in an object.
pub(crate) fn unwrap_list(value: Value) -> Result<Vec<Value>, Error> {
    match value {
        Value::Array(items) => Ok(items),
        Value::Object(mut map) => {
            for key in LIST_KEYS {
                if let Some(Value::Array(items)) = map.remove(key) {
                    return Ok(items);
                }
            }

            let mut candidates = map.into_iter().filter_map(|(_, v)| match v {
                Value::Array(items) if items.iter().all(Value::is_object) => Some(items),
                _ => None,
            });
            match (candidates.next(), candidates.next()) {
                (Some(items), None) => Ok(items),
                (None, _) => Err(Error::UnexpectedPayload(
                    "object contains no list of records".into(),
                )),
                (Some(_), Some(_)) => Err(Error::UnexpectedPayload(
                    "object contains more than one list of records".into(),
                )),
            }
        }
        other => Err(Error::UnexpectedPayload(format!(
            "expected a list of records, got {}",
            json_type(&other)
        ))),
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Parse the configured base, defaulting to `https://`, and ensure a trailing
/// slash so `Url::join` appends instead of replacing the last segment.
fn normalize_base_url(raw: &str) -> Result<Url, Error> {
    let trimmed = raw.trim();
    let with_scheme = if trimmed.contains("://") {
        trimmed.to_owned()
    } else {
        format!("https://{trimmed}")
    };
    let mut url = Url::parse(&with_scheme)?;
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}
