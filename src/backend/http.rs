//! JSON POST helper shared by the HTTP backends.

use crate::config::ApiOptions;
use crate::error::PicDescError;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, error};

/// A configured client for one endpoint.
///
/// Headers and timeout are fixed at construction; an invalid header name or
/// value fails construction instead of the first request.
pub(crate) struct RemoteClient {
    client: reqwest::Client,
    url: String,
    timeout_secs: u64,
}

impl RemoteClient {
    pub(crate) fn new(api: &ApiOptions) -> Result<Self, PicDescError> {
        let mut headers = HeaderMap::new();
        for (name, value) in &api.headers {
            let name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| {
                PicDescError::InvalidConfig(format!("invalid header name '{name}': {e}"))
            })?;
            let value = HeaderValue::from_str(value).map_err(|e| {
                PicDescError::InvalidConfig(format!("invalid value for header '{name}': {e}"))
            })?;
            headers.insert(name, value);
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(api.timeout_secs))
            .default_headers(headers)
            .build()
            .map_err(|e| PicDescError::Internal(format!("HTTP client: {e}")))?;

        Ok(Self {
            client,
            url: api.url.clone(),
            timeout_secs: api.timeout_secs,
        })
    }

    pub(crate) fn url(&self) -> &str {
        &self.url
    }

    /// POST `payload` and parse a 2xx body as `T`.
    ///
    /// Non-success statuses are logged with their body and returned as
    /// [`PicDescError::ApiStatus`]; there is no retry.
    pub(crate) async fn post_json<T: DeserializeOwned>(
        &self,
        payload: &serde_json::Value,
    ) -> Result<T, PicDescError> {
        let response = self
            .client
            .post(&self.url)
            .json(payload)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        let body = response.text().await.map_err(|e| self.transport_error(e))?;

        if !status.is_success() {
            error!("Error calling the API. Response was {}", body);
            return Err(PicDescError::ApiStatus {
                status: status.as_u16(),
                body,
            });
        }

        debug!("{} answered {} ({} bytes)", self.url, status, body.len());
        serde_json::from_str(&body).map_err(|e| {
            PicDescError::MalformedResponse(format!("{e}; body: {}", truncate(&body, 200)))
        })
    }

    fn transport_error(&self, e: reqwest::Error) -> PicDescError {
        if e.is_timeout() {
            PicDescError::ApiTimeout {
                url: self.url.clone(),
                secs: self.timeout_secs,
            }
        } else {
            PicDescError::Transport {
                url: self.url.clone(),
                reason: e.to_string(),
            }
        }
    }
}

fn truncate(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}\u{2026}", &s[..idx]),
        None => s.to_string(),
    }
}

/// Merge backend-specific `params` over the base body, last writer wins.
pub(crate) fn with_params(
    mut body: serde_json::Map<String, serde_json::Value>,
    params: &serde_json::Map<String, serde_json::Value>,
) -> serde_json::Value {
    for (k, v) in params {
        body.insert(k.clone(), v.clone());
    }
    serde_json::Value::Object(body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn invalid_header_fails_construction() {
        let api = ApiOptions::default().header("Bad Header", "x");
        let err = RemoteClient::new(&api).err().expect("must fail");
        assert!(matches!(err, PicDescError::InvalidConfig(_)));

        let api = ApiOptions::default().header("X-Key", "line\nbreak");
        assert!(RemoteClient::new(&api).is_err());
    }

    #[test]
    fn params_override_base_fields() {
        let mut base = serde_json::Map::new();
        base.insert("messages".into(), json!([]));
        base.insert("max_tokens".into(), json!(10));
        let mut params = serde_json::Map::new();
        params.insert("max_tokens".into(), json!(200));
        params.insert("model".into(), json!("granite"));

        let body = with_params(base, &params);
        assert_eq!(body["max_tokens"], 200);
        assert_eq!(body["model"], "granite");
        assert!(body["messages"].is_array());
    }

    #[test]
    fn truncate_is_char_safe() {
        assert_eq!(truncate("abc", 5), "abc");
        assert_eq!(truncate("ééééé", 2), "éé\u{2026}");
    }
}
