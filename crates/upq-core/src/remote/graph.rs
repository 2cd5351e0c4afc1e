//! Drive API client over libcurl.
//!
//! Paths are addressed as `{base}drive/root:{remote_path}:/{action}`. Each
//! request runs on a blocking task so the worker's runtime stays responsive.

use async_trait::async_trait;
use url::Url;

use super::http::{self, bearer, HttpOptions, HttpResponse, Method};
use super::{ChunkAck, CreateOutcome, RemoteError, RemoteStore, SessionStatus, SmallUpload};
use crate::ranges::ByteRange;
use crate::session::UploadSession;

const CONFLICT_FAIL: &str = "@microsoft.graph.conflictBehavior=fail";

#[derive(Debug, Clone)]
pub struct GraphRemote {
    api_base: Url,
    http: HttpOptions,
}

impl GraphRemote {
    pub fn new(api_base_url: &str, http: HttpOptions) -> Result<Self, url::ParseError> {
        Ok(Self {
            api_base: Url::parse(api_base_url)?,
            http,
        })
    }

    /// `{base}drive/root:/a/b/name:/{action}` with every path segment percent-encoded.
    fn item_url(&self, remote_path: &str, action: &str) -> Result<Url, RemoteError> {
        let parts: Vec<&str> = remote_path.split('/').filter(|s| !s.is_empty()).collect();
        let Some((name, dirs)) = parts.split_last() else {
            return Err(RemoteError::Protocol(format!(
                "remote path {:?} has no file name",
                remote_path
            )));
        };
        let mut url = self.api_base.clone();
        {
            let mut segs = url
                .path_segments_mut()
                .map_err(|_| RemoteError::Protocol("api base URL cannot be a base".into()))?;
            segs.pop_if_empty();
            segs.push("drive");
            segs.push("root:");
            for d in dirs {
                segs.push(d);
            }
            segs.push(&format!("{}:", name));
            segs.push(action);
        }
        Ok(url)
    }

    async fn run<F>(&self, f: F) -> Result<HttpResponse, RemoteError>
    where
        F: FnOnce(HttpOptions) -> Result<HttpResponse, RemoteError> + Send + 'static,
    {
        let opts = self.http;
        tokio::task::spawn_blocking(move || f(opts))
            .await
            .map_err(|e| RemoteError::Task(e.to_string()))?
    }
}

fn file_name(remote_path: &str) -> &str {
    remote_path
        .rsplit('/')
        .find(|s| !s.is_empty())
        .unwrap_or(remote_path)
}

#[async_trait]
impl RemoteStore for GraphRemote {
    async fn create_session(
        &self,
        token: &str,
        remote_path: &str,
    ) -> Result<CreateOutcome, RemoteError> {
        let url = self.item_url(remote_path, "upload.createSession")?;
        let body = serde_json::json!({
            "item": {
                "@name.conflictBehavior": "fail",
                "name": file_name(remote_path),
            }
        })
        .to_string();
        let headers = vec![bearer(token), "Content-Type: application/json".to_string()];
        tracing::debug!(%url, "create upload session");

        let resp = self
            .run(move |opts| {
                http::request(Method::Post, url.as_str(), &headers, Some(body.as_bytes()), &opts)
            })
            .await?;
        match resp.status {
            200 | 201 => Ok(CreateOutcome::Created(resp.json::<UploadSession>()?)),
            409 => Ok(CreateOutcome::AlreadyExists),
            _ => Err(resp.into_error()),
        }
    }

    async fn session_status(&self, upload_url: &str) -> Result<SessionStatus, RemoteError> {
        let url = upload_url.to_string();
        let resp = self
            .run(move |opts| http::request(Method::Get, &url, &[], None, &opts))
            .await?;
        match resp.status {
            200 => resp.json(),
            _ => Err(resp.into_error()),
        }
    }

    async fn put_chunk(
        &self,
        token: &str,
        upload_url: &str,
        range: ByteRange,
        total: u64,
        body: Vec<u8>,
    ) -> Result<ChunkAck, RemoteError> {
        if body.len() as u64 != range.len() {
            return Err(RemoteError::Protocol(format!(
                "chunk body is {} bytes, range {} needs {}",
                body.len(),
                range,
                range.len()
            )));
        }
        let url = upload_url.to_string();
        let headers = vec![
            bearer(token),
            format!("Content-Range: {}", range.content_range(total)),
            "Content-Type: application/octet-stream".to_string(),
        ];
        let resp = self
            .run(move |opts| http::request(Method::Put, &url, &headers, Some(body.as_slice()), &opts))
            .await?;
        match resp.status {
            202 => {
                if resp.body.iter().all(u8::is_ascii_whitespace) {
                    Ok(ChunkAck::Accepted(SessionStatus::default()))
                } else {
                    Ok(ChunkAck::Accepted(resp.json()?))
                }
            }
            200 | 201 => Ok(ChunkAck::Completed),
            _ => Err(resp.into_error()),
        }
    }

    async fn upload_empty(&self, token: &str, remote_path: &str) -> Result<SmallUpload, RemoteError> {
        let mut url = self.item_url(remote_path, "content")?;
        url.set_query(Some(CONFLICT_FAIL));
        let headers = vec![bearer(token), "Content-Type: application/octet-stream".to_string()];
        let resp = self
            .run(move |opts| http::request(Method::Put, url.as_str(), &headers, Some(&[][..]), &opts))
            .await?;
        match resp.status {
            200 | 201 => Ok(SmallUpload::Created),
            409 => Ok(SmallUpload::AlreadyExists),
            _ => Err(resp.into_error()),
        }
    }
}
