//! Blocking libcurl request helper shared by the drive client and token refresh.
//!
//! Runs in the current thread; callers wrap it in `spawn_blocking`.

use serde::de::DeserializeOwned;
use std::time::Duration;

use super::RemoteError;

/// Transport timeouts applied to every request.
#[derive(Debug, Clone, Copy)]
pub struct HttpOptions {
    pub connect_timeout: Duration,
    /// Hard wall-clock limit per request; expiry surfaces as a curl timeout.
    pub request_timeout: Duration,
}

impl Default for HttpOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(30),
            request_timeout: Duration::from_secs(600),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Method {
    Get,
    Post,
    Put,
}

#[derive(Debug)]
pub(crate) struct HttpResponse {
    pub status: u32,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T, RemoteError> {
        serde_json::from_slice(&self.body).map_err(|e| {
            RemoteError::Malformed(format!("{} (HTTP {}): {}", e, self.status, self.text()))
        })
    }

    /// Error for a status the caller did not expect.
    pub fn into_error(self) -> RemoteError {
        RemoteError::Http {
            status: self.status,
            body: self.text(),
        }
    }
}

/// Perform one request. `headers` are full `Name: value` lines.
pub(crate) fn request(
    method: Method,
    url: &str,
    headers: &[String],
    body: Option<&[u8]>,
    opts: &HttpOptions,
) -> Result<HttpResponse, RemoteError> {
    let mut easy = curl::easy::Easy::new();
    easy.url(url)?;
    easy.connect_timeout(opts.connect_timeout)?;
    easy.timeout(opts.request_timeout)?;

    match method {
        Method::Get => easy.get(true)?,
        Method::Post => {
            easy.post(true)?;
            easy.post_fields_copy(body.unwrap_or_default())?;
        }
        Method::Put => {
            easy.custom_request("PUT")?;
            easy.post_fields_copy(body.unwrap_or_default())?;
        }
    }

    let mut list = curl::easy::List::new();
    for h in headers {
        list.append(h)?;
    }
    // No 100-continue round trip before chunk bodies.
    list.append("Expect:")?;
    easy.http_headers(list)?;

    let mut out = Vec::new();
    {
        let mut transfer = easy.transfer();
        transfer.write_function(|data| {
            out.extend_from_slice(data);
            Ok(data.len())
        })?;
        transfer.perform()?;
    }

    let status = easy.response_code()?;
    Ok(HttpResponse { status, body: out })
}

pub(crate) fn bearer(token: &str) -> String {
    format!("Authorization: bearer {}", token)
}
