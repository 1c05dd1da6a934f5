#![allow(dead_code)]

use std::collections::VecDeque;
use std::io::Read;
use std::net::{SocketAddr, TcpListener};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use lambda_bootstrap::routes::{DEADLINE_HEADER, REQUEST_ID_HEADER};
use tiny_http::{Header, Request, Response, Server};

pub const NEXT_PATH: &str = "/2018-06-01/runtime/invocation/next";
pub const PING_PATH: &str = "/2018-06-01/ping";

/// What the fake control plane answers to the next `/next` poll.
#[derive(Debug, Clone)]
pub enum NextStep {
    Invocation {
        request_id: String,
        payload: Vec<u8>,
        headers: Vec<(String, String)>,
    },
    MissingRequestId {
        payload: Vec<u8>,
    },
    Status(u16),
}

impl NextStep {
    pub fn invocation(request_id: &str, payload: &[u8]) -> Self {
        Self::Invocation {
            request_id: request_id.to_string(),
            payload: payload.to_vec(),
            headers: vec![(DEADLINE_HEADER.to_string(), far_deadline_ms().to_string())],
        }
    }

    pub fn with_header(self, name: &str, value: &str) -> Self {
        match self {
            Self::Invocation {
                request_id,
                payload,
                mut headers,
            } => {
                headers.retain(|(existing, _)| !existing.eq_ignore_ascii_case(name));
                headers.push((name.to_string(), value.to_string()));
                Self::Invocation {
                    request_id,
                    payload,
                    headers,
                }
            }
            other => other,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl RecordedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(field, _)| field.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn is_post(&self) -> bool {
        self.method == "POST"
    }
}

struct Shared {
    script: Mutex<VecDeque<NextStep>>,
    requests: Mutex<Vec<RecordedRequest>>,
    report_status: u16,
}

/// Scripted Runtime API on a loopback port. An exhausted script answers
/// `/next` with 500; reports are answered with `report_status`.
pub struct FakeRuntimeApi {
    addr: SocketAddr,
    shared: Arc<Shared>,
    stop: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl FakeRuntimeApi {
    pub fn start(script: Vec<NextStep>) -> Self {
        Self::start_with_report_status(script, 202)
    }

    pub fn start_with_report_status(script: Vec<NextStep>, report_status: u16) -> Self {
        let server = Server::http("127.0.0.1:0").expect("fake runtime api should bind");
        let addr = server
            .server_addr()
            .to_ip()
            .expect("fake runtime api should listen on tcp");
        let shared = Arc::new(Shared {
            script: Mutex::new(script.into()),
            requests: Mutex::new(Vec::new()),
            report_status,
        });
        let stop = Arc::new(AtomicBool::new(false));

        let worker = {
            let shared = Arc::clone(&shared);
            let stop = Arc::clone(&stop);
            std::thread::spawn(move || {
                while !stop.load(Ordering::SeqCst) {
                    match server.recv_timeout(Duration::from_millis(50)) {
                        Ok(Some(request)) => handle(&shared, request),
                        Ok(None) => {}
                        Err(_) => break,
                    }
                }
            })
        };

        Self {
            addr,
            shared,
            stop,
            worker: Some(worker),
        }
    }

    /// Endpoint in the `host:port` form of `AWS_LAMBDA_RUNTIME_API`.
    pub fn endpoint(&self) -> String {
        self.addr.to_string()
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.shared.requests.lock().expect("lock").clone()
    }

    pub fn posts(&self) -> Vec<RecordedRequest> {
        self.requests()
            .into_iter()
            .filter(RecordedRequest::is_post)
            .collect()
    }

    pub fn next_polls(&self) -> usize {
        self.requests()
            .iter()
            .filter(|request| request.path == NEXT_PATH)
            .count()
    }
}

impl Drop for FakeRuntimeApi {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

fn handle(shared: &Shared, mut request: Request) {
    let mut body = Vec::new();
    let _ = request.as_reader().read_to_end(&mut body);
    let recorded = RecordedRequest {
        method: request.method().to_string(),
        path: request.url().to_string(),
        headers: request
            .headers()
            .iter()
            .map(|header| (header.field.to_string(), header.value.to_string()))
            .collect(),
        body,
    };
    shared.requests.lock().expect("lock").push(recorded.clone());

    let response = match (recorded.method.as_str(), recorded.path.as_str()) {
        ("GET", NEXT_PATH) => next_response(shared),
        ("GET", PING_PATH) => Response::from_data(b"pong".to_vec()),
        ("POST", _) => Response::from_data(Vec::new()).with_status_code(shared.report_status),
        _ => Response::from_data(b"not found".to_vec()).with_status_code(404),
    };
    let _ = request.respond(response);
}

fn next_response(shared: &Shared) -> Response<std::io::Cursor<Vec<u8>>> {
    let step = shared.script.lock().expect("lock").pop_front();
    match step {
        Some(NextStep::Invocation {
            request_id,
            payload,
            headers,
        }) => {
            let mut response =
                Response::from_data(payload).with_header(header(REQUEST_ID_HEADER, &request_id));
            for (name, value) in &headers {
                response = response.with_header(header(name, value));
            }
            response
        }
        Some(NextStep::MissingRequestId { payload }) => Response::from_data(payload),
        Some(NextStep::Status(status)) => {
            Response::from_data(b"scripted failure".to_vec()).with_status_code(status)
        }
        None => Response::from_data(b"script exhausted".to_vec()).with_status_code(500),
    }
}

fn header(name: &str, value: &str) -> Header {
    Header::from_bytes(name.as_bytes(), value.as_bytes()).expect("valid test header")
}

/// A deadline comfortably in the future, in epoch milliseconds.
pub fn far_deadline_ms() -> i64 {
    chrono::Utc::now().timestamp_millis() + 60_000
}

/// A loopback endpoint nothing listens on.
pub fn refused_endpoint() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").expect("ephemeral port");
    let addr = listener.local_addr().expect("local addr");
    drop(listener);
    addr.to_string()
}
