//! In-memory mailbox, canned HTTP server and mail senders for tests.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, OnceLock};

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

use mailbot::email::{EmailError, FetchItem, MailSession, RawMessage};
use mailbot::unsubscribe::ExecutionError;
use mailbot::{CancelFlag, MailSender, MailtoRequest};

/// Mailbox held in memory. UIDs are assigned per folder from 1 upwards.
#[derive(Default)]
pub struct MemoryMailSession {
    folders: BTreeMap<String, Vec<RawMessage>>,
    hang_on_list: bool,
    pub fetch_calls: usize,
}

impl MemoryMailSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_folder(mut self, folder: &str) -> Self {
        self.folders.entry(folder.to_string()).or_default();
        self
    }

    /// Folder listing never answers, like a stalled server.
    pub fn hanging_list(mut self) -> Self {
        self.hang_on_list = true;
        self
    }

    pub fn add(&mut self, folder: &str, bytes: Vec<u8>) -> u32 {
        let messages = self.folders.entry(folder.to_string()).or_default();
        let uid = messages.len() as u32 + 1;
        messages.push(RawMessage { uid, bytes });
        uid
    }
}

#[async_trait]
impl MailSession for MemoryMailSession {
    async fn list_folders(&mut self) -> Result<Vec<String>, EmailError> {
        if self.hang_on_list {
            std::future::pending::<()>().await;
        }
        Ok(self.folders.keys().cloned().collect())
    }

    async fn message_uids(&mut self, folder: &str) -> Result<Vec<u32>, EmailError> {
        self.folders
            .get(folder)
            .map(|messages| messages.iter().map(|m| m.uid).collect())
            .ok_or_else(|| EmailError::FolderNotFound(folder.to_string()))
    }

    async fn fetch_headers(
        &mut self,
        folder: &str,
        uids: &[u32],
    ) -> Result<Vec<FetchItem>, EmailError> {
        self.fetch_calls += 1;
        let messages = self
            .folders
            .get(folder)
            .ok_or_else(|| EmailError::FolderNotFound(folder.to_string()))?;
        Ok(uids
            .iter()
            .map(|uid| match messages.iter().find(|m| m.uid == *uid) {
                Some(raw) => FetchItem::Fetched(raw.clone()),
                None => FetchItem::Failed {
                    uid: *uid,
                    reason: "no such message".to_string(),
                },
            })
            .collect())
    }
}

/// A request as seen by [`CannedServer`].
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    /// Path plus query string.
    pub target: String,
    /// Header names are lowercased.
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl RecordedRequest {
    pub fn path(&self) -> &str {
        self.target.split('?').next().unwrap_or_default()
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        let name = name.to_ascii_lowercase();
        self.headers
            .iter()
            .find(|(k, _)| *k == name)
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct CannedResponse {
    pub status: u16,
    pub content_type: &'static str,
    pub body: String,
    pub location: Option<String>,
}

impl CannedResponse {
    pub fn text(status: u16, body: &str) -> Self {
        Self {
            status,
            content_type: "text/plain",
            body: body.to_string(),
            location: None,
        }
    }

    pub fn html(status: u16, body: &str) -> Self {
        Self {
            content_type: "text/html; charset=utf-8",
            ..Self::text(status, body)
        }
    }

    pub fn redirect(location: &str) -> Self {
        Self {
            location: Some(location.to_string()),
            ..Self::text(302, "")
        }
    }
}

type Routes = Arc<Mutex<HashMap<(String, String), CannedResponse>>>;

/// HTTP/1.1 server on a loopback port answering from a route table.
///
/// Unknown routes get a 404. Every connection serves one request.
pub struct CannedServer {
    addr: SocketAddr,
    routes: Routes,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
    handle: JoinHandle<()>,
}

impl CannedServer {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind test server");
        let addr = listener.local_addr().expect("Failed to read server address");
        let routes: Routes = Arc::new(Mutex::new(HashMap::new()));
        let requests = Arc::new(Mutex::new(Vec::new()));

        let (r, q) = (routes.clone(), requests.clone());
        let handle = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let (r, q) = (r.clone(), q.clone());
                tokio::spawn(async move {
                    let _ = serve(stream, r, q).await;
                });
            }
        });

        Self {
            addr,
            routes,
            requests,
            handle,
        }
    }

    pub fn route(&self, method: &str, path: &str, response: CannedResponse) {
        self.routes
            .lock()
            .unwrap()
            .insert((method.to_string(), path.to_string()), response);
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn requests_to(&self, path: &str) -> Vec<RecordedRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.path() == path)
            .collect()
    }
}

impl Drop for CannedServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn serve(
    mut stream: TcpStream,
    routes: Routes,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
) -> std::io::Result<()> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];

    let head_end = loop {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Ok(());
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let head = String::from_utf8_lossy(&buf[..head_end]).into_owned();
    let mut lines = head.split("\r\n");
    let mut request_line = lines.next().unwrap_or_default().split_whitespace();
    let method = request_line.next().unwrap_or_default().to_string();
    let target = request_line.next().unwrap_or_default().to_string();
    let headers: Vec<(String, String)> = lines
        .filter_map(|l| l.split_once(':'))
        .map(|(k, v)| (k.trim().to_ascii_lowercase(), v.trim().to_string()))
        .collect();

    let content_length = headers
        .iter()
        .find(|(k, _)| k == "content-length")
        .and_then(|(_, v)| v.parse::<usize>().ok())
        .unwrap_or(0);
    while buf.len() < head_end + content_length {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
    }
    let body_end = (head_end + content_length).min(buf.len());
    let body = String::from_utf8_lossy(&buf[head_end..body_end]).into_owned();

    let request = RecordedRequest {
        method,
        target,
        headers,
        body,
    };
    let response = routes
        .lock()
        .unwrap()
        .get(&(request.method.clone(), request.path().to_string()))
        .cloned()
        .unwrap_or_else(|| CannedResponse::text(404, "not found"));
    requests.lock().unwrap().push(request);

    let reason = match response.status {
        200 => "OK",
        302 => "Found",
        404 => "Not Found",
        503 => "Service Unavailable",
        _ => "Status",
    };
    let mut out = format!(
        "HTTP/1.1 {} {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n",
        response.status,
        reason,
        response.content_type,
        response.body.len()
    );
    if let Some(location) = &response.location {
        out.push_str(&format!("Location: {}\r\n", location));
    }
    out.push_str("\r\n");
    out.push_str(&response.body);

    stream.write_all(out.as_bytes()).await?;
    stream.shutdown().await
}

/// A URL on a loopback port nothing listens on.
pub async fn unreachable_url(path: &str) -> String {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind probe listener");
    let addr = listener.local_addr().expect("Failed to read probe address");
    drop(listener);
    format!("http://{}{}", addr, path)
}

/// Records every unsubscribe mail instead of sending it.
#[derive(Default)]
pub struct RecordingMailSender {
    pub sent: Mutex<Vec<MailtoRequest>>,
}

impl RecordingMailSender {
    pub fn sent(&self) -> Vec<MailtoRequest> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl MailSender for RecordingMailSender {
    async fn send(&self, request: &MailtoRequest) -> Result<(), ExecutionError> {
        self.sent.lock().unwrap().push(request.clone());
        Ok(())
    }
}

/// Sends successfully, then raises the armed cancel flag.
#[derive(Default)]
pub struct CancellingMailSender {
    flag: OnceLock<CancelFlag>,
    pub sent: Mutex<Vec<String>>,
}

impl CancellingMailSender {
    pub fn arm(&self, flag: CancelFlag) {
        let _ = self.flag.set(flag);
    }
}

#[async_trait]
impl MailSender for CancellingMailSender {
    async fn send(&self, request: &MailtoRequest) -> Result<(), ExecutionError> {
        self.sent.lock().unwrap().push(request.to.clone());
        if let Some(flag) = self.flag.get() {
            flag.cancel();
        }
        Ok(())
    }
}
