//! Minimal HTTP/1.1 servers answering requests with scripted replies.
//!
//! The body is close-delimited (no Content-Length), written in the scripted
//! chunks with pauses in between, so tests control exactly where read
//! boundaries fall and when the server goes quiet.

#![allow(dead_code)]

use findstream::protocol::StreamEvent;
use findstream::{ClientSettings, SearchStreamClient};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};

pub enum Step {
    Send(Vec<u8>),
    Pause(Duration),
}

pub struct Reply {
    status: u16,
    content_type: &'static str,
    steps: Vec<Step>,
    hold_open: bool,
}

impl Reply {
    pub fn sse() -> Self {
        Self::new(200, "text/event-stream")
    }

    pub fn new(status: u16, content_type: &'static str) -> Self {
        Self {
            status,
            content_type,
            steps: Vec::new(),
            hold_open: false,
        }
    }

    pub fn send(mut self, bytes: impl Into<Vec<u8>>) -> Self {
        self.steps.push(Step::Send(bytes.into()));
        self
    }

    pub fn event(self, event: &StreamEvent) -> Self {
        self.send(event.to_frame().unwrap())
    }

    pub fn pause(mut self, ms: u64) -> Self {
        self.steps.push(Step::Pause(Duration::from_millis(ms)));
        self
    }

    /// Keep the connection open after the last step until the client hangs up.
    pub fn hold_open(mut self) -> Self {
        self.hold_open = true;
        self
    }
}

#[derive(Debug, Default)]
pub struct Captured {
    pub method: String,
    pub path: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
    /// The client closed the connection before the server finished.
    pub client_hung_up: bool,
}

impl Captured {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.body).unwrap()
    }
}

pub struct Stub {
    pub base_url: String,
    handle: JoinHandle<Captured>,
}

impl Stub {
    pub fn client(&self) -> SearchStreamClient {
        self.client_with(|settings| settings)
    }

    pub fn client_with(
        &self,
        adjust: impl FnOnce(ClientSettings) -> ClientSettings,
    ) -> SearchStreamClient {
        let settings = ClientSettings::new(self.base_url.clone()).with_system_proxy(false);
        SearchStreamClient::new(adjust(settings)).unwrap()
    }

    pub async fn captured(self) -> Captured {
        timeout(Duration::from_secs(10), self.handle)
            .await
            .expect("stub server did not finish")
            .unwrap()
    }

    /// `None` if no request was handled within `wait`.
    pub async fn captured_within(self, wait: Duration) -> Option<Captured> {
        match timeout(wait, self.handle).await {
            Ok(joined) => Some(joined.unwrap()),
            Err(_) => None,
        }
    }
}

/// Server for several concurrent requests. Each connection gets the reply of
/// the first route whose key occurs in its request body.
pub struct Routed {
    pub base_url: String,
    handle: JoinHandle<Vec<Captured>>,
}

impl Routed {
    pub fn client(&self) -> SearchStreamClient {
        let settings = ClientSettings::new(self.base_url.clone()).with_system_proxy(false);
        SearchStreamClient::new(settings).unwrap()
    }

    /// Requests in the order their replies finished.
    pub async fn captured(self) -> Vec<Captured> {
        timeout(Duration::from_secs(10), self.handle)
            .await
            .expect("stub server did not finish")
            .unwrap()
    }
}

pub async fn serve_routes(routes: Vec<(&'static str, Reply)>) -> Routed {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let handle = tokio::spawn(async move {
        let mut routes: Vec<(&'static str, Option<Reply>)> =
            routes.into_iter().map(|(key, reply)| (key, Some(reply))).collect();
        let mut sessions = Vec::new();

        for _ in 0..routes.len() {
            let (mut socket, _) = listener.accept().await.unwrap();
            let captured = read_request(&mut socket).await;
            let body = String::from_utf8_lossy(&captured.body).to_string();
            let reply = routes
                .iter_mut()
                .find(|(key, reply)| reply.is_some() && body.contains(key))
                .and_then(|(_, reply)| reply.take())
                .expect("no route for request");
            sessions.push(tokio::spawn(respond(socket, captured, reply)));
        }

        let mut all = Vec::new();
        for session in sessions {
            all.push(session.await.unwrap());
        }
        all
    });

    Routed {
        base_url: format!("http://{}", addr),
        handle,
    }
}

pub async fn serve(reply: Reply) -> Stub {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let handle = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let captured = read_request(&mut socket).await;
        respond(socket, captured, reply).await
    });

    Stub {
        base_url: format!("http://{}", addr),
        handle,
    }
}

async fn respond(mut socket: TcpStream, mut captured: Captured, reply: Reply) -> Captured {
    let head = format!(
        "HTTP/1.1 {} {}\r\nContent-Type: {}\r\nConnection: close\r\n\r\n",
        reply.status,
        reason(reply.status),
        reply.content_type
    );
    if socket.write_all(head.as_bytes()).await.is_err() {
        captured.client_hung_up = true;
        return captured;
    }

    for step in reply.steps {
        match step {
            Step::Send(bytes) => {
                let written = socket.write_all(&bytes).await.and(socket.flush().await);
                if written.is_err() {
                    captured.client_hung_up = true;
                    return captured;
                }
            }
            Step::Pause(duration) => sleep(duration).await,
        }
    }

    if reply.hold_open {
        let mut buf = [0u8; 256];
        captured.client_hung_up = loop {
            match timeout(Duration::from_secs(5), socket.read(&mut buf)).await {
                Ok(Ok(0)) | Ok(Err(_)) => break true,
                Ok(Ok(_)) => continue,
                Err(_) => break false,
            }
        };
    }
    captured
}

/// Address nothing listens on.
pub async fn closed_port_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{}", addr)
}

async fn read_request(socket: &mut TcpStream) -> Captured {
    let mut data = Vec::new();
    let mut buf = [0u8; 4096];

    let header_end = loop {
        if let Some(pos) = data.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos;
        }
        let n = socket.read(&mut buf).await.unwrap();
        assert!(n > 0, "client closed before sending a request");
        data.extend_from_slice(&buf[..n]);
    };

    let head = String::from_utf8_lossy(&data[..header_end]).to_string();
    let mut lines = head.split("\r\n");
    let request_line = lines.next().unwrap_or_default();
    let mut parts = request_line.split_whitespace();
    let method = parts.next().unwrap_or_default().to_string();
    let path = parts.next().unwrap_or_default().to_string();

    let headers: Vec<(String, String)> = lines
        .filter_map(|line| line.split_once(':'))
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .collect();

    let content_length = headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case("content-length"))
        .and_then(|(_, v)| v.parse::<usize>().ok())
        .unwrap_or(0);

    let mut body = data[header_end + 4..].to_vec();
    while body.len() < content_length {
        let n = socket.read(&mut buf).await.unwrap();
        if n == 0 {
            break;
        }
        body.extend_from_slice(&buf[..n]);
    }

    Captured {
        method,
        path,
        headers,
        body,
        client_hung_up: false,
    }
}

fn reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        400 => "Bad Request",
        401 => "Unauthorized",
        500 => "Internal Server Error",
        502 => "Bad Gateway",
        _ => "Unknown",
    }
}
