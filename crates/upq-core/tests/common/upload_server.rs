//! Minimal HTTP/1.1 drive server for integration tests.
//!
//! Supports create-session POSTs, session status GETs, chunk PUTs with
//! `Content-Range`, and single-request PUTs of empty files. Objects are kept
//! in memory keyed by their remote path as it appears in the URL.

use std::collections::HashMap;
use std::io::{BufRead, BufReader, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

const EXPIRES: &str = "2099-01-01T00:00:00Z";

#[derive(Debug)]
struct Session {
    remote_path: String,
    data: Vec<u8>,
}

#[derive(Debug, Default)]
struct State {
    next_id: u64,
    sessions: HashMap<u64, Session>,
    objects: HashMap<String, Vec<u8>>,
    put_ranges: Vec<(u64, u64)>,
    creates: Vec<String>,
    /// Chunk PUTs whose range starts here get 500.
    fail_put_at: Option<u64>,
}

#[derive(Clone)]
pub struct UploadServer {
    base: String,
    state: Arc<Mutex<State>>,
}

impl UploadServer {
    /// API base URL, e.g. `http://127.0.0.1:12345/v1.0/me/`.
    pub fn api_base(&self) -> String {
        format!("{}v1.0/me/", self.base)
    }

    pub fn object(&self, remote_path: &str) -> Option<Vec<u8>> {
        self.state.lock().unwrap().objects.get(remote_path).cloned()
    }

    pub fn seed_object(&self, remote_path: &str, data: &[u8]) {
        self.state
            .lock()
            .unwrap()
            .objects
            .insert(remote_path.to_string(), data.to_vec());
    }

    /// Inclusive ranges of every chunk PUT received, in arrival order.
    pub fn put_ranges(&self) -> Vec<(u64, u64)> {
        self.state.lock().unwrap().put_ranges.clone()
    }

    pub fn fail_puts_at(&self, offset: Option<u64>) {
        self.state.lock().unwrap().fail_put_at = offset;
    }

    pub fn creates(&self) -> Vec<String> {
        self.state.lock().unwrap().creates.clone()
    }
}

/// Starts the server on a background thread; it runs until the process exits.
pub fn start() -> UploadServer {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let port = listener.local_addr().unwrap().port();
    let base = format!("http://127.0.0.1:{}/", port);
    let state = Arc::new(Mutex::new(State::default()));
    let server = UploadServer {
        base: base.clone(),
        state: Arc::clone(&state),
    };
    thread::spawn(move || {
        for stream in listener.incoming().flatten() {
            let state = Arc::clone(&state);
            let base = base.clone();
            thread::spawn(move || handle(stream, &base, &state));
        }
    });
    server
}

struct Request {
    method: String,
    target: String,
    content_range: Option<(u64, u64, u64)>,
    body: Vec<u8>,
}

fn read_request(stream: &mut TcpStream) -> Option<Request> {
    let mut reader = BufReader::new(stream);
    let mut line = String::new();
    reader.read_line(&mut line).ok()?;
    let mut parts = line.split_whitespace();
    let method = parts.next()?.to_string();
    let target = parts.next()?.to_string();

    let mut content_length = 0usize;
    let mut content_range = None;
    loop {
        let mut h = String::new();
        if reader.read_line(&mut h).ok()? == 0 {
            break;
        }
        let h = h.trim();
        if h.is_empty() {
            break;
        }
        if let Some((name, value)) = h.split_once(':') {
            let value = value.trim();
            if name.eq_ignore_ascii_case("content-length") {
                content_length = value.parse().unwrap_or(0);
            } else if name.eq_ignore_ascii_case("content-range") {
                content_range = parse_content_range(value);
            }
        }
    }
    let mut body = vec![0u8; content_length];
    reader.read_exact(&mut body).ok()?;
    Some(Request {
        method,
        target,
        content_range,
        body,
    })
}

/// `bytes s-e/total`
fn parse_content_range(v: &str) -> Option<(u64, u64, u64)> {
    let rest = v.strip_prefix("bytes ")?;
    let (range, total) = rest.split_once('/')?;
    let (s, e) = range.split_once('-')?;
    Some((s.parse().ok()?, e.parse().ok()?, total.parse().ok()?))
}

fn respond(stream: &mut TcpStream, status: &str, body: &str) {
    let response = format!(
        "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        body.len(),
        body
    );
    let _ = stream.write_all(response.as_bytes());
}

fn status_json(next: u64) -> String {
    format!(
        r#"{{"expirationDateTime":"{}","nextExpectedRanges":["{}-"]}}"#,
        EXPIRES, next
    )
}

/// Remote path from `/v1.0/me/drive/root:{path}:/{action}`.
fn item_path(target: &str) -> Option<(String, String)> {
    let rest = target.split_once("/drive/root:")?.1;
    let (path, action) = rest.rsplit_once(":/")?;
    let action = action.split('?').next().unwrap_or(action);
    Some((path.to_string(), action.to_string()))
}

fn handle(mut stream: TcpStream, base: &str, state: &Mutex<State>) {
    let _ = stream.set_read_timeout(Some(Duration::from_secs(5)));
    let _ = stream.set_write_timeout(Some(Duration::from_secs(5)));
    let Some(req) = read_request(&mut stream) else {
        return;
    };
    let mut st = state.lock().unwrap();

    if let Some(id) = req.target.strip_prefix("/up/").and_then(|s| s.parse::<u64>().ok()) {
        match req.method.as_str() {
            "GET" => match st.sessions.get(&id) {
                Some(s) => respond(&mut stream, "200 OK", &status_json(s.data.len() as u64)),
                None => respond(&mut stream, "404 Not Found", r#"{"error":"itemNotFound"}"#),
            },
            "PUT" => {
                let Some((start, end, total)) = req.content_range else {
                    respond(&mut stream, "400 Bad Request", r#"{"error":"missing range"}"#);
                    return;
                };
                st.put_ranges.push((start, end));
                if st.fail_put_at == Some(start) {
                    respond(&mut stream, "500 Internal Server Error", r#"{"error":"boom"}"#);
                    return;
                }
                let Some(session) = st.sessions.get_mut(&id) else {
                    respond(&mut stream, "404 Not Found", r#"{"error":"itemNotFound"}"#);
                    return;
                };
                if start != session.data.len() as u64 || req.body.len() as u64 != end - start + 1 {
                    respond(&mut stream, "416 Range Not Satisfiable", r#"{"error":"range"}"#);
                    return;
                }
                session.data.extend_from_slice(&req.body);
                if end + 1 == total {
                    let Some(done) = st.sessions.remove(&id) else {
                        return;
                    };
                    st.objects.insert(done.remote_path, done.data);
                    respond(&mut stream, "201 Created", r#"{"id":"item"}"#);
                } else {
                    respond(&mut stream, "202 Accepted", &status_json(end + 1));
                }
            }
            _ => respond(&mut stream, "405 Method Not Allowed", "{}"),
        }
        return;
    }

    match (req.method.as_str(), item_path(&req.target)) {
        ("POST", Some((path, action))) if action == "upload.createSession" => {
            st.creates.push(path.clone());
            if st.objects.contains_key(&path) {
                respond(&mut stream, "409 Conflict", r#"{"error":"nameAlreadyExists"}"#);
                return;
            }
            st.next_id += 1;
            let id = st.next_id;
            st.sessions.insert(
                id,
                Session {
                    remote_path: path,
                    data: Vec::new(),
                },
            );
            let body = format!(
                r#"{{"uploadUrl":"{}up/{}","expirationDateTime":"{}","nextExpectedRanges":["0-"]}}"#,
                base, id, EXPIRES
            );
            respond(&mut stream, "200 OK", &body);
        }
        ("PUT", Some((path, action))) if action == "content" => {
            if st.objects.contains_key(&path) {
                respond(&mut stream, "409 Conflict", r#"{"error":"nameAlreadyExists"}"#);
            } else {
                st.objects.insert(path, req.body);
                respond(&mut stream, "201 Created", r#"{"id":"item"}"#);
            }
        }
        _ => respond(&mut stream, "404 Not Found", "{}"),
    }
}
