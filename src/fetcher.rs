use std::time::{Duration, Instant};

use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::{debug, warn};

const USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/119.0.0.0 Safari/537.36";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(&'static str, String)>,
    pub json: Option<serde_json::Value>,
}

impl Request {
    pub fn get(url: impl Into<String>) -> Self {
        Request {
            method: Method::Get,
            url: url.into(),
            headers: Vec::new(),
            json: None,
        }
    }

    pub fn post_json(url: impl Into<String>, body: serde_json::Value) -> Self {
        Request {
            method: Method::Post,
            url: url.into(),
            headers: Vec::new(),
            json: Some(body),
        }
    }

    pub fn header(mut self, name: &'static str, value: impl Into<String>) -> Self {
        self.headers.push((name, value.into()));
        self
    }
}

#[derive(Debug, Clone)]
pub struct Response {
    pub status: u16,
    pub body: String,
}

/// Connection-level failure (timeout, reset, DNS). Always transient.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct TransportError {
    pub message: String,
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        let message = if e.is_timeout() {
            format!("timeout: {}", e)
        } else if e.is_connect() {
            format!("connection error: {}", e)
        } else {
            e.to_string()
        };
        TransportError { message }
    }
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("not found (404): {url}")]
    NotFound { url: String },
    #[error("unexpected HTTP {status} from {url}")]
    Status { url: String, status: u16 },
    #[error("gave up on {url} after {attempts} attempts: {last}")]
    Exhausted {
        url: String,
        attempts: u32,
        last: String,
    },
    #[error("malformed response from {url}: {reason}")]
    Malformed { url: String, reason: String },
}

pub trait Transport {
    fn send(&self, request: &Request) -> Result<Response, TransportError>;
}

pub trait Clock {
    fn now(&self) -> Instant;
    fn sleep(&self, duration: Duration);
}

impl<T: Transport + ?Sized> Transport for &T {
    fn send(&self, request: &Request) -> Result<Response, TransportError> {
        (**self).send(request)
    }
}

impl<C: Clock + ?Sized> Clock for &C {
    fn now(&self) -> Instant {
        (**self).now()
    }

    fn sleep(&self, duration: Duration) {
        (**self).sleep(duration)
    }
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration)
    }
}

/// Blocking reqwest client shared by every request of the run.
pub struct HttpTransport {
    client: reqwest::blocking::Client,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()?;
        Ok(HttpTransport { client })
    }
}

impl Transport for HttpTransport {
    fn send(&self, request: &Request) -> Result<Response, TransportError> {
        let mut builder = match request.method {
            Method::Get => self.client.get(&request.url),
            Method::Post => self.client.post(&request.url),
        };
        for (name, value) in &request.headers {
            builder = builder.header(*name, value);
        }
        if let Some(body) = &request.json {
            builder = builder.json(body);
        }
        let response = builder.send()?;
        let status = response.status().as_u16();
        let body = response.text()?;
        Ok(Response { status, body })
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Minimum gap between two calls, and the base of the backoff.
    pub delay: Duration,
    pub max_retries: u32,
}

impl RetryPolicy {
    /// Saturates at `Duration::MAX` instead of overflowing.
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.delay
            .checked_mul(2u32.saturating_pow(attempt))
            .unwrap_or(Duration::MAX)
    }
}

/// Sequential HTTP fetcher: one request at a time, a minimum gap between
/// calls (measured from the end of the previous call), exponential backoff
/// on 429 / 5xx / transport errors.
pub struct Fetcher<T: Transport, C: Clock = SystemClock> {
    transport: T,
    clock: C,
    policy: RetryPolicy,
    last_finished: Option<Instant>,
}

impl<T: Transport> Fetcher<T, SystemClock> {
    pub fn new(transport: T, policy: RetryPolicy) -> Self {
        Fetcher::with_clock(transport, SystemClock, policy)
    }
}

impl<T: Transport, C: Clock> Fetcher<T, C> {
    pub fn with_clock(transport: T, clock: C, policy: RetryPolicy) -> Self {
        Fetcher {
            transport,
            clock,
            policy,
            last_finished: None,
        }
    }

    pub fn fetch(&mut self, request: &Request) -> Result<String, FetchError> {
        self.wait_for_slot();
        let result = self.send_with_retry(request);
        self.last_finished = Some(self.clock.now());
        result
    }

    pub fn fetch_json<D: DeserializeOwned>(&mut self, request: &Request) -> Result<D, FetchError> {
        let body = self.fetch(request)?;
        serde_json::from_str(&body).map_err(|e| FetchError::Malformed {
            url: request.url.clone(),
            reason: e.to_string(),
        })
    }

    fn wait_for_slot(&self) {
        let Some(last) = self.last_finished else {
            return;
        };
        let elapsed = self.clock.now().saturating_duration_since(last);
        if elapsed < self.policy.delay {
            let wait = self.policy.delay - elapsed;
            debug!("Rate limiting: sleeping {:.2}s", wait.as_secs_f64());
            self.clock.sleep(wait);
        }
    }

    fn send_with_retry(&self, request: &Request) -> Result<String, FetchError> {
        let max = self.policy.max_retries;
        let mut last = String::new();

        for attempt in 0..=max {
            debug!("Request attempt {}/{}: {}", attempt + 1, max + 1, request.url);
            match self.transport.send(request) {
                Ok(resp) if (200..300).contains(&resp.status) => return Ok(resp.body),
                Ok(resp) if resp.status == 404 => {
                    return Err(FetchError::NotFound {
                        url: request.url.clone(),
                    })
                }
                Ok(resp) if resp.status == 429 || resp.status >= 500 => {
                    last = format!("HTTP {}", resp.status);
                }
                Ok(resp) => {
                    return Err(FetchError::Status {
                        url: request.url.clone(),
                        status: resp.status,
                    })
                }
                Err(e) => last = e.message,
            }

            if attempt == max {
                break;
            }
            let backoff = self.policy.backoff(attempt);
            warn!(
                "{} on {} (attempt {}/{}), backing off {:.1}s",
                last,
                request.url,
                attempt + 1,
                max + 1,
                backoff.as_secs_f64()
            );
            self.clock.sleep(backoff);
        }

        Err(FetchError::Exhausted {
            url: request.url.clone(),
            attempts: max + 1,
            last,
        })
    }
}

// ── Tests ──

#[cfg(test)]
pub(crate) mod testing {
    use std::cell::{Cell, RefCell};
    use std::collections::VecDeque;

    use super::*;

    /// Replays a scripted sequence of responses and records every request.
    #[derive(Default)]
    pub struct ScriptedTransport {
        replies: RefCell<VecDeque<Result<Response, TransportError>>>,
        pub seen: RefCell<Vec<Request>>,
    }

    impl ScriptedTransport {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn reply(self, status: u16, body: &str) -> Self {
            self.replies.borrow_mut().push_back(Ok(Response {
                status,
                body: body.to_string(),
            }));
            self
        }

        pub fn fail(self, message: &str) -> Self {
            self.replies.borrow_mut().push_back(Err(TransportError {
                message: message.to_string(),
            }));
            self
        }
    }

    impl Transport for ScriptedTransport {
        fn send(&self, request: &Request) -> Result<Response, TransportError> {
            self.seen.borrow_mut().push(request.clone());
            self.replies
                .borrow_mut()
                .pop_front()
                .unwrap_or_else(|| panic!("no scripted reply left for {}", request.url))
        }
    }

    /// Clock whose sleeps advance virtual time and are recorded.
    pub struct FakeClock {
        start: Instant,
        offset: Cell<Duration>,
        pub sleeps: RefCell<Vec<Duration>>,
    }

    impl FakeClock {
        pub fn new() -> Self {
            FakeClock {
                start: Instant::now(),
                offset: Cell::new(Duration::ZERO),
                sleeps: RefCell::new(Vec::new()),
            }
        }

        pub fn advance(&self, d: Duration) {
            self.offset.set(self.offset.get() + d);
        }
    }

    impl Clock for FakeClock {
        fn now(&self) -> Instant {
            self.start + self.offset.get()
        }

        fn sleep(&self, duration: Duration) {
            self.sleeps.borrow_mut().push(duration);
            self.advance(duration);
        }
    }
}
