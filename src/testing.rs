//! Scripted collaborators for unit tests

use crate::connection::{ConnectivityConfig, ConnectivityManager};
use crate::hal::{Gpio, LinkCredentials, LinkProvider, LocationProvider, Pin};
use crate::transport::{TransportClient, TransportConnector, TransportStream};
use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::io;
use std::pin::Pin as StdPin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tracker_shared::{timing, Fix, Report, RequestDecoder};

pub const TEST_HOST: &str = "tracker.example.net";

const OK_RESPONSE: &[u8] = b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\nConnection: close\r\n\r\nOK";

/// How the next connection behaves
#[derive(Debug, Clone, PartialEq)]
pub enum MockBehavior {
    /// Connect fails outright
    RefuseConnect,
    /// Writing the request fails
    FailSend,
    /// First read returns part of the response, the next one fails
    FailRecv,
    /// The very first read fails
    ResetOnRecv,
    /// Reads never complete
    Hang,
    /// Exchange succeeds but closing the stream fails
    FailClose,
}

#[derive(Default)]
struct MockLog {
    requests: Mutex<Vec<Vec<u8>>>,
    closes: AtomicUsize,
}

/// Connector handing out scripted in-memory streams
///
/// Unscripted connections answer with `200 OK` and close.
#[derive(Default)]
pub struct MockConnector {
    script: Mutex<VecDeque<MockBehavior>>,
    hosts: Mutex<Vec<String>>,
    log: Arc<MockLog>,
}

impl MockConnector {
    pub fn script(&self, behaviors: impl IntoIterator<Item = MockBehavior>) {
        self.script.lock().unwrap().extend(behaviors);
    }

    /// Raw bytes written on each completed connection
    pub fn requests(&self) -> Vec<Vec<u8>> {
        self.log.requests.lock().unwrap().clone()
    }

    /// `(path, report)` for every decoded report request
    pub fn reports(&self) -> Vec<(String, Report)> {
        self.requests()
            .iter()
            .map(|raw| {
                let mut decoder = RequestDecoder::new();
                decoder.extend(raw);
                let request = decoder.decode_next().unwrap().expect("incomplete request");
                let report = Report::from_request(&request).unwrap();
                (request.path, report)
            })
            .collect()
    }

    /// Form bodies of every request, in order
    pub fn bodies(&self) -> Vec<String> {
        self.requests()
            .iter()
            .map(|raw| {
                let mut decoder = RequestDecoder::new();
                decoder.extend(raw);
                let request = decoder.decode_next().unwrap().expect("incomplete request");
                request.body_str().unwrap().to_string()
            })
            .collect()
    }

    pub fn hosts(&self) -> Vec<String> {
        self.hosts.lock().unwrap().clone()
    }

    pub fn connects(&self) -> usize {
        self.hosts.lock().unwrap().len()
    }

    pub fn closes(&self) -> usize {
        self.log.closes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TransportConnector for MockConnector {
    type Stream = MockStream;

    async fn connect(&self, host: &str, _port: u16) -> Result<MockStream> {
        self.hosts.lock().unwrap().push(host.to_string());
        let behavior = self.script.lock().unwrap().pop_front();

        match behavior {
            Some(MockBehavior::RefuseConnect) => bail!("connection refused"),
            other => Ok(MockStream {
                behavior: other,
                response: OK_RESPONSE,
                pos: 0,
                written: Vec::new(),
                log: self.log.clone(),
            }),
        }
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

pub struct MockStream {
    behavior: Option<MockBehavior>,
    response: &'static [u8],
    pos: usize,
    written: Vec<u8>,
    log: Arc<MockLog>,
}

impl AsyncRead for MockStream {
    fn poll_read(
        self: StdPin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        let limit = match this.behavior {
            Some(MockBehavior::Hang) => return Poll::Pending,
            Some(MockBehavior::ResetOnRecv) => {
                return Poll::Ready(Err(io::Error::new(
                    io::ErrorKind::ConnectionReset,
                    "connection reset by peer",
                )));
            }
            Some(MockBehavior::FailRecv) if this.pos > 0 => {
                return Poll::Ready(Err(io::Error::new(
                    io::ErrorKind::ConnectionReset,
                    "connection reset by peer",
                )));
            }
            Some(MockBehavior::FailRecv) => 8,
            _ => this.response.len(),
        };

        let end = limit.min(this.pos + buf.remaining());
        buf.put_slice(&this.response[this.pos..end]);
        this.pos = end;
        Poll::Ready(Ok(()))
    }
}

impl AsyncWrite for MockStream {
    fn poll_write(
        self: StdPin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        if this.behavior == Some(MockBehavior::FailSend) {
            return Poll::Ready(Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "broken pipe",
            )));
        }
        this.written.extend_from_slice(buf);
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: StdPin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: StdPin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

#[async_trait]
impl TransportStream for MockStream {
    async fn close(&mut self) -> Result<()> {
        self.log.closes.fetch_add(1, Ordering::SeqCst);
        if self.behavior == Some(MockBehavior::FailClose) {
            bail!("close failed");
        }
        Ok(())
    }
}

impl Drop for MockStream {
    fn drop(&mut self) {
        if !self.written.is_empty() {
            if let Ok(mut requests) = self.log.requests.lock() {
                requests.push(std::mem::take(&mut self.written));
            }
        }
    }
}

/// Link provider counting attach requests
#[derive(Default)]
pub struct MockLink {
    attaches: AtomicUsize,
    fail: AtomicBool,
}

impl MockLink {
    pub fn attach_count(&self) -> usize {
        self.attaches.load(Ordering::SeqCst)
    }

    pub fn fail_attaches(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl LinkProvider for MockLink {
    async fn attach(&self, _credentials: &LinkCredentials) -> Result<()> {
        self.attaches.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            bail!("modem rejected attach");
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

/// Receiver replaying queued readings, then a default
#[derive(Default)]
pub struct MockGnss {
    readings: Mutex<VecDeque<Result<Option<Fix>, String>>>,
    fallback: Mutex<Option<Fix>>,
    enabled: AtomicBool,
    reads: AtomicUsize,
}

impl MockGnss {
    pub fn with_fix(fix: Fix) -> Self {
        let gnss = Self::default();
        gnss.set_fallback(Some(fix));
        gnss
    }

    pub fn set_fallback(&self, fix: Option<Fix>) {
        *self.fallback.lock().unwrap() = fix;
    }

    pub fn push_reading(&self, reading: Option<Fix>) {
        self.readings.lock().unwrap().push_back(Ok(reading));
    }

    pub fn push_error(&self, message: &str) {
        self.readings.lock().unwrap().push_back(Err(message.to_string()));
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LocationProvider for MockGnss {
    async fn enable(&self) -> Result<()> {
        self.enabled.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn read_fix(&self) -> Result<Option<Fix>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        match self.readings.lock().unwrap().pop_front() {
            Some(Ok(reading)) => Ok(reading),
            Some(Err(message)) => Err(anyhow!(message)),
            None => Ok(*self.fallback.lock().unwrap()),
        }
    }

    async fn visible_satellite_count(&self) -> Result<u32> {
        Ok(7)
    }
}

/// GPIO recording every write; the button reads released unless pressed
#[derive(Default)]
pub struct MockGpio {
    button_levels: Mutex<VecDeque<bool>>,
    writes: Mutex<Vec<(Pin, bool)>>,
    fail_writes: AtomicBool,
}

impl MockGpio {
    /// The next button read returns low (pressed)
    pub fn press_button(&self) {
        self.button_levels.lock().unwrap().push_back(false);
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn writes(&self, pin: Pin) -> Vec<bool> {
        self.writes
            .lock()
            .unwrap()
            .iter()
            .filter(|(p, _)| *p == pin)
            .map(|(_, level)| *level)
            .collect()
    }

    /// Number of times `pin` was driven high
    pub fn pulses(&self, pin: Pin) -> usize {
        self.writes(pin).into_iter().filter(|level| *level).count()
    }

    pub fn level(&self, pin: Pin) -> Option<bool> {
        self.writes(pin).last().copied()
    }
}

impl Gpio for MockGpio {
    fn read(&self, _pin: Pin) -> Result<bool> {
        Ok(self.button_levels.lock().unwrap().pop_front().unwrap_or(true))
    }

    fn write(&self, pin: Pin, high: bool) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            bail!("gpio write failed");
        }
        self.writes.lock().unwrap().push((pin, high));
        Ok(())
    }
}

/// Mock link and connector wired into a connectivity manager
pub struct TestNetwork {
    pub connector: Arc<MockConnector>,
    pub link: Arc<MockLink>,
    pub connectivity: Arc<ConnectivityManager<MockConnector>>,
}

impl TestNetwork {
    pub fn client(&self) -> TransportClient<MockConnector> {
        TransportClient::new(
            self.connector.clone(),
            self.connectivity.clone(),
            TEST_HOST,
            80,
            Duration::from_millis(timing::SEND_TIMEOUT_MS),
        )
    }
}

pub fn network() -> TestNetwork {
    let connector = Arc::new(MockConnector::default());
    let link = Arc::new(MockLink::default());
    let config = ConnectivityConfig {
        probe_host: TEST_HOST.into(),
        ..Default::default()
    };
    let connectivity = Arc::new(ConnectivityManager::new(
        config,
        link.clone(),
        connector.clone(),
    ));

    TestNetwork {
        connector,
        link,
        connectivity,
    }
}

/// In-memory sink for formatted log lines
#[derive(Clone, Default)]
pub struct LogCapture {
    buf: Arc<Mutex<Vec<u8>>>,
}

impl LogCapture {
    /// Route this thread's events into a fresh capture until the guard drops
    pub fn install() -> (Self, tracing::subscriber::DefaultGuard) {
        let capture = Self::default();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(capture.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::TRACE)
            .finish();
        let guard = tracing::subscriber::set_default(subscriber);
        (capture, guard)
    }

    /// Captured lines containing `needle`
    pub fn lines_with(&self, needle: &str) -> Vec<String> {
        String::from_utf8_lossy(&self.buf.lock().unwrap())
            .lines()
            .filter(|line| line.contains(needle))
            .map(str::to_string)
            .collect()
    }
}

impl io::Write for LogCapture {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.buf.lock().unwrap().extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for LogCapture {
    type Writer = LogCapture;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}
