//! HTTP transport: posts the begin-session command and reads the response body
//! as a stream of newline-delimited JSON (or server-sent) frame events.

use std::{
    io::{self, BufReader, Read},
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    thread,
    time::Duration,
};

use reqwest::{
    blocking::{Client, Response},
    header::{ACCEPT, CONTENT_TYPE},
};
use tracing::{debug, info, trace, warn};

use crate::{
    transport::{InboundSender, Transport},
    types::{Generation, Inbound, TransportError},
    wire::{StartStream, decode_event},
};

const CHUNK_SIZE: usize = 16 * 1024;
/// A single event line larger than this is treated as a broken stream.
const MAX_LINE_BYTES: usize = 4 * 1024 * 1024;
const START_PATH: &str = "start_stream";

#[derive(Clone, Debug)]
pub struct HttpTransportConfig {
    /// Backend root, e.g. `http://localhost:8000`.
    pub base_url: String,
    pub connect_timeout: Duration,
    /// Bounds the wait for response headers and each body read. A body read
    /// that times out only re-checks whether the session was superseded.
    pub read_timeout: Duration,
}

impl HttpTransportConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            connect_timeout: Duration::from_secs(5),
            read_timeout: Duration::from_secs(5),
        }
    }

    fn start_url(&self) -> String {
        format!("{}/{START_PATH}", self.base_url.trim_end_matches('/'))
    }
}

pub struct HttpTransport {
    config: HttpTransportConfig,
    client: Client,
    sink: InboundSender,
    latest: Arc<AtomicU64>,
}

impl HttpTransport {
    pub fn new(config: HttpTransportConfig, sink: InboundSender) -> Result<Self, TransportError> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.read_timeout)
            .build()
            .map_err(|err| TransportError::Other(err.into()))?;
        Ok(Self {
            config,
            client,
            sink,
            latest: Arc::new(AtomicU64::new(0)),
        })
    }
}

impl Transport for HttpTransport {
    fn begin_session(
        &mut self,
        generation: Generation,
        command: &StartStream,
    ) -> Result<(), TransportError> {
        let body = serde_json::to_vec(command)?;
        let url = self.config.start_url();
        let client = self.client.clone();
        let sink = self.sink.clone();
        let latest = self.latest.clone();

        latest.store(generation, Ordering::SeqCst);
        thread::Builder::new()
            .name(format!("stream-reader-{generation}"))
            .spawn(move || run_session_reader(client, url, body, generation, sink, latest))
            .map_err(TransportError::Spawn)?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "http"
    }
}

fn run_session_reader(
    client: Client,
    url: String,
    body: Vec<u8>,
    generation: Generation,
    sink: InboundSender,
    latest: Arc<AtomicU64>,
) {
    let response = match client
        .post(&url)
        .header(CONTENT_TYPE, "application/json")
        .header(ACCEPT, "application/x-ndjson, text/event-stream")
        .body(body)
        .send()
    {
        Ok(response) => response,
        Err(err) => {
            warn!("Failed to start stream at {url}: {err}");
            let _ = sink.send(Inbound::Refused {
                generation,
                reason: format!("request error: {err}"),
            });
            return;
        }
    };

    stream_from_http(response, &url, generation, &sink, &latest);
}

fn stream_from_http(
    response: Response,
    url: &str,
    generation: Generation,
    sink: &InboundSender,
    latest: &AtomicU64,
) {
    if !response.status().is_success() {
        warn!("Stream {url} responded with status {}", response.status());
        let _ = sink.send(Inbound::Refused {
            generation,
            reason: format!("backend responded with {}", response.status()),
        });
        return;
    }

    info!(generation, "Connected to frame stream {url}");
    if sink.send(Inbound::Accepted { generation }).is_err() {
        return;
    }
    let reader = BufReader::new(response);
    stream_from_reader(reader, generation, sink, latest);
}

/// Read events until the body ends, the stream breaks, or a newer session
/// supersedes this one.
pub(crate) fn stream_from_reader<R: Read>(
    mut reader: R,
    generation: Generation,
    sink: &InboundSender,
    latest: &AtomicU64,
) {
    let mut buffer = Vec::with_capacity(CHUNK_SIZE * 2);
    let mut chunk = [0u8; CHUNK_SIZE];

    loop {
        if latest.load(Ordering::SeqCst) != generation {
            debug!(generation, "Session superseded, closing stream reader");
            return;
        }

        match reader.read(&mut chunk) {
            Ok(0) => {
                if !buffer.is_empty() {
                    let tail = std::mem::take(&mut buffer);
                    if !forward_line(&tail, generation, sink) {
                        return;
                    }
                }
                info!(generation, "Frame stream ended");
                let _ = sink.send(Inbound::Ended { generation });
                return;
            }
            Ok(n) => {
                trace!("stream read {n} bytes");
                buffer.extend_from_slice(&chunk[..n]);
                while let Some(line) = extract_line(&mut buffer) {
                    if !forward_line(&line, generation, sink) {
                        return;
                    }
                }
                if buffer.len() > MAX_LINE_BYTES {
                    warn!(generation, "Frame event exceeded {MAX_LINE_BYTES} bytes");
                    let _ = sink.send(Inbound::Disconnected {
                        generation,
                        reason: "oversized frame event".into(),
                    });
                    return;
                }
            }
            Err(err) if is_read_timeout(&err) => {
                trace!(generation, "stream idle");
            }
            Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
            Err(err) => {
                warn!(generation, "Frame stream read error: {err}");
                let _ = sink.send(Inbound::Disconnected {
                    generation,
                    reason: format!("read error: {err}"),
                });
                return;
            }
        }
    }
}

fn is_read_timeout(err: &io::Error) -> bool {
    matches!(err.kind(), io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock)
        || err
            .get_ref()
            .and_then(|inner| inner.downcast_ref::<reqwest::Error>())
            .is_some_and(reqwest::Error::is_timeout)
}

/// Decode and forward one line. Returns `false` when the viewer is gone.
fn forward_line(line: &[u8], generation: Generation, sink: &InboundSender) -> bool {
    let text = String::from_utf8_lossy(line);
    match decode_event(&text) {
        Ok(Some(event)) => sink
            .send(Inbound::Frame {
                generation,
                frame: event.into_frame(),
            })
            .is_ok(),
        Ok(None) => true,
        Err(err) => {
            warn!(generation, "Skipping undecodable frame event: {err}");
            true
        }
    }
}

fn extract_line(buffer: &mut Vec<u8>) -> Option<Vec<u8>> {
    let end = buffer.iter().position(|byte| *byte == b'\n')?;
    let mut line: Vec<u8> = buffer.drain(..=end).collect();
    line.pop();
    if line.last() == Some(&b'\r') {
        line.pop();
    }
    Some(line)
}
