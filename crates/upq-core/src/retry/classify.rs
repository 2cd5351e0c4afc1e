//! Classify HTTP status and curl errors into retry policy error kinds.

use crate::remote::RemoteError;
use crate::retry::policy::ErrorKind;

pub fn classify_http_status(code: u32) -> ErrorKind {
    match code {
        429 | 503 => ErrorKind::Throttled,
        500..=599 => ErrorKind::Http5xx(code as u16),
        _ => ErrorKind::Other,
    }
}

pub fn classify_curl_error(e: &curl::Error) -> ErrorKind {
    if e.is_operation_timedout() {
        return ErrorKind::Timeout;
    }
    if e.is_couldnt_connect()
        || e.is_couldnt_resolve_host()
        || e.is_couldnt_resolve_proxy()
        || e.is_read_error()
        || e.is_recv_error()
        || e.is_send_error()
        || e.is_got_nothing()
    {
        return ErrorKind::Connection;
    }
    ErrorKind::Other
}

pub fn classify(e: &RemoteError) -> ErrorKind {
    match e {
        RemoteError::Curl(ce) => classify_curl_error(ce),
        RemoteError::Http { status, .. } => classify_http_status(*status),
        RemoteError::Malformed(_) | RemoteError::Protocol(_) | RemoteError::Task(_) => {
            ErrorKind::Other
        }
    }
}
