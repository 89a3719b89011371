// Message bus variants
//
// NatsBus speaks the NATS text protocol directly over a tokio TcpStream: enough
// for PUB, SUB, MSG and keepalive PING/PONG. LoopbackBus delivers in-process and
// stands in when no broker is reachable.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::errors::BusError;
use super::traits::{BusMessage, MessageBus};

/// Per-subscription buffer. Deliveries beyond it are dropped, never awaited.
pub const SUBSCRIPTION_BUFFER: usize = 64;

/// Largest MSG payload accepted from the server (the NATS default `max_payload`)
pub const MAX_PAYLOAD: usize = 1024 * 1024;

const DEFAULT_NATS_PORT: u16 = 4222;

/// Turn `nats://host:port` (scheme and port optional) into a socket address string
pub fn parse_bus_address(url: &str) -> Result<String, BusError> {
    let rest = url.strip_prefix("nats://").unwrap_or(url);
    let rest = rest.trim_end_matches('/');
    let host_port = rest.rsplit('@').next().unwrap_or(rest);
    if host_port.is_empty() {
        return Err(BusError::Protocol {
            message: format!("invalid bus url '{url}'"),
        });
    }
    match host_port.rsplit_once(':') {
        Some((host, port)) => {
            let port: u16 = port.parse().map_err(|_| BusError::Protocol {
                message: format!("invalid port in bus url '{url}'"),
            })?;
            Ok(format!("{host}:{port}"))
        }
        None => Ok(format!("{host_port}:{DEFAULT_NATS_PORT}")),
    }
}

/// One control line received from a NATS server
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ServerOp {
    Info,
    Msg { subject: String, sid: u64, len: usize },
    Ping,
    Pong,
    Ok,
    Err(String),
}

pub(crate) fn parse_server_line(line: &str) -> Result<ServerOp, BusError> {
    let line = line.trim_end_matches(['\r', '\n']);
    let mut parts = line.split_whitespace();
    let op = parts.next().unwrap_or_default().to_ascii_uppercase();
    match op.as_str() {
        "INFO" => Ok(ServerOp::Info),
        "PING" => Ok(ServerOp::Ping),
        "PONG" => Ok(ServerOp::Pong),
        "+OK" => Ok(ServerOp::Ok),
        "-ERR" => Ok(ServerOp::Err(
            line.get(4..).unwrap_or_default().trim().trim_matches('\'').to_string(),
        )),
        "MSG" => {
            let args: Vec<&str> = parts.collect();
            // MSG <subject> <sid> [reply-to] <#bytes>
            if !(args.len() == 3 || args.len() == 4) {
                return Err(BusError::Protocol {
                    message: format!("bad MSG line '{line}'"),
                });
            }
            let bad = || BusError::Protocol {
                message: format!("bad MSG line '{line}'"),
            };
            let sid = args[1].parse().map_err(|_| bad())?;
            let len = args[args.len() - 1].parse().map_err(|_| bad())?;
            Ok(ServerOp::Msg {
                subject: args[0].to_string(),
                sid,
                len,
            })
        }
        _ => Err(BusError::Protocol {
            message: format!("unexpected server op '{line}'"),
        }),
    }
}

type Subscriptions = Arc<Mutex<HashMap<u64, mpsc::Sender<BusMessage>>>>;

/// NATS client over a single TCP connection
pub struct NatsBus {
    address: String,
    writer: Arc<tokio::sync::Mutex<OwnedWriteHalf>>,
    subscriptions: Subscriptions,
    next_sid: AtomicU64,
    connected: Arc<AtomicBool>,
    reader: Mutex<Option<JoinHandle<()>>>,
}

impl NatsBus {
    pub async fn connect(url: &str, timeout: Duration) -> Result<Self, BusError> {
        let address = parse_bus_address(url)?;
        let timeout_ms = timeout.as_millis() as u64;

        let stream = tokio::time::timeout(timeout, TcpStream::connect(&address))
            .await
            .map_err(|_| BusError::Timeout { timeout_ms })?
            .map_err(|e| BusError::NotConnected {
                address: format!("{address} ({e})"),
            })?;
        let (read_half, mut write_half) = stream.into_split();
        let mut reader = BufReader::new(read_half);

        // The server greets with INFO before anything else
        let mut greeting = String::new();
        tokio::time::timeout(timeout, reader.read_line(&mut greeting))
            .await
            .map_err(|_| BusError::Timeout { timeout_ms })??;
        if parse_server_line(&greeting)? != ServerOp::Info {
            return Err(BusError::Protocol {
                message: format!("expected INFO, got '{}'", greeting.trim_end()),
            });
        }

        let connect = format!(
            "CONNECT {{\"verbose\":false,\"pedantic\":false,\"name\":\"gem-swarm\",\"lang\":\"rust\",\"version\":\"{}\"}}\r\nPING\r\n",
            env!("CARGO_PKG_VERSION")
        );
        write_half.write_all(connect.as_bytes()).await?;
        write_half.flush().await?;

        let writer = Arc::new(tokio::sync::Mutex::new(write_half));
        let subscriptions: Subscriptions = Arc::new(Mutex::new(HashMap::new()));
        let connected = Arc::new(AtomicBool::new(true));

        let handle = tokio::spawn(read_loop(
            reader,
            writer.clone(),
            subscriptions.clone(),
            connected.clone(),
        ));

        info!(address = %address, "Connected to NATS");
        Ok(Self {
            address,
            writer,
            subscriptions,
            next_sid: AtomicU64::new(1),
            connected,
            reader: Mutex::new(Some(handle)),
        })
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    async fn write_frame(&self, frame: &[u8]) -> Result<(), BusError> {
        if !self.is_connected() {
            return Err(BusError::NotConnected {
                address: self.address.clone(),
            });
        }
        let mut writer = self.writer.lock().await;
        let result = async {
            writer.write_all(frame).await?;
            writer.flush().await
        }
        .await;
        if let Err(e) = result {
            self.connected.store(false, Ordering::SeqCst);
            return Err(e.into());
        }
        Ok(())
    }
}

/// Clears the connected flag however the reader task ends
struct DisconnectOnDrop(Arc<AtomicBool>);

impl Drop for DisconnectOnDrop {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

async fn read_loop(
    mut reader: BufReader<OwnedReadHalf>,
    writer: Arc<tokio::sync::Mutex<OwnedWriteHalf>>,
    subscriptions: Subscriptions,
    connected: Arc<AtomicBool>,
) {
    let _guard = DisconnectOnDrop(connected);
    let mut line = String::new();
    loop {
        line.clear();
        match reader.read_line(&mut line).await {
            Ok(0) => {
                warn!("NATS connection closed by server");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                warn!("NATS read failed: {}", e);
                break;
            }
        }

        match parse_server_line(&line) {
            Ok(ServerOp::Msg { subject, sid, len }) => {
                // Payload plus trailing CRLF
                let frame_len = match len.checked_add(2) {
                    Some(frame_len) if len <= MAX_PAYLOAD => frame_len,
                    _ => {
                        warn!(
                            sid,
                            len,
                            max = MAX_PAYLOAD,
                            "NATS payload too large, dropping connection"
                        );
                        break;
                    }
                };
                let mut payload = vec![0u8; frame_len];
                if let Err(e) = reader.read_exact(&mut payload).await {
                    warn!("NATS payload read failed: {}", e);
                    break;
                }
                payload.truncate(len);
                deliver(&subscriptions, sid, BusMessage { topic: subject, payload });
            }
            Ok(ServerOp::Ping) => {
                let mut w = writer.lock().await;
                if w.write_all(b"PONG\r\n").await.is_err() {
                    break;
                }
            }
            Ok(ServerOp::Err(message)) => warn!(error = %message, "NATS server error"),
            Ok(_) => {}
            Err(e) => debug!("Ignoring NATS line: {}", e),
        }
    }
}

fn deliver(subscriptions: &Subscriptions, sid: u64, message: BusMessage) {
    let sender = match subscriptions.lock() {
        Ok(subs) => subs.get(&sid).cloned(),
        Err(_) => None,
    };
    match sender {
        Some(sender) => {
            if sender.try_send(message).is_err() {
                warn!(sid, "Subscriber lagging or gone, message dropped");
            }
        }
        None => debug!(sid, "Message for unknown subscription"),
    }
}

#[async_trait]
impl MessageBus for NatsBus {
    fn name(&self) -> &'static str {
        "nats"
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn publish(&self, topic: &str, payload: &[u8]) -> Result<(), BusError> {
        let mut frame = format!("PUB {} {}\r\n", topic, payload.len()).into_bytes();
        frame.extend_from_slice(payload);
        frame.extend_from_slice(b"\r\n");
        self.write_frame(&frame).await
    }

    async fn subscribe(&self, topic: &str) -> Result<mpsc::Receiver<BusMessage>, BusError> {
        let sid = self.next_sid.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = mpsc::channel(SUBSCRIPTION_BUFFER);
        if let Ok(mut subs) = self.subscriptions.lock() {
            subs.insert(sid, tx);
        }
        if let Err(e) = self
            .write_frame(format!("SUB {topic} {sid}\r\n").as_bytes())
            .await
        {
            if let Ok(mut subs) = self.subscriptions.lock() {
                subs.remove(&sid);
            }
            return Err(e);
        }
        debug!(topic, sid, "Subscribed");
        Ok(rx)
    }

    async fn close(&self) -> Result<(), BusError> {
        self.connected.store(false, Ordering::SeqCst);
        if let Ok(mut reader) = self.reader.lock() {
            if let Some(handle) = reader.take() {
                handle.abort();
            }
        }
        if let Ok(mut subs) = self.subscriptions.lock() {
            subs.clear();
        }
        let mut writer = self.writer.lock().await;
        if let Err(e) = writer.shutdown().await {
            debug!("NATS socket shutdown: {}", e);
        }
        info!(address = %self.address, "NATS connection closed");
        Ok(())
    }
}

/// In-process bus: delivers to subscribers of the exact topic
#[derive(Default)]
pub struct LoopbackBus {
    subscriptions: Mutex<HashMap<String, Vec<mpsc::Sender<BusMessage>>>>,
    closed: AtomicBool,
}

impl LoopbackBus {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MessageBus for LoopbackBus {
    fn name(&self) -> &'static str {
        "loopback"
    }

    fn is_connected(&self) -> bool {
        !self.closed.load(Ordering::SeqCst)
    }

    async fn publish(&self, topic: &str, payload: &[u8]) -> Result<(), BusError> {
        if !self.is_connected() {
            return Err(BusError::NotConnected {
                address: "loopback".to_string(),
            });
        }
        let mut subs = self.subscriptions.lock().map_err(|_| BusError::Protocol {
            message: "loopback subscription table poisoned".to_string(),
        })?;
        if let Some(senders) = subs.get_mut(topic) {
            senders.retain(|sender| !sender.is_closed());
            for sender in senders.iter() {
                let message = BusMessage {
                    topic: topic.to_string(),
                    payload: payload.to_vec(),
                };
                if sender.try_send(message).is_err() {
                    debug!(topic, "Loopback subscriber full, message dropped");
                }
            }
        }
        Ok(())
    }

    async fn subscribe(&self, topic: &str) -> Result<mpsc::Receiver<BusMessage>, BusError> {
        let (tx, rx) = mpsc::channel(SUBSCRIPTION_BUFFER);
        let mut subs = self.subscriptions.lock().map_err(|_| BusError::Protocol {
            message: "loopback subscription table poisoned".to_string(),
        })?;
        subs.entry(topic.to_string()).or_default().push(tx);
        Ok(rx)
    }

    async fn close(&self) -> Result<(), BusError> {
        self.closed.store(true, Ordering::SeqCst);
        if let Ok(mut subs) = self.subscriptions.lock() {
            subs.clear();
        }
        Ok(())
    }
}

/// Connect to the broker at `url`, falling back to a [`LoopbackBus`] when it is unreachable
pub async fn connect_bus(url: &str, timeout: Duration) -> Arc<dyn MessageBus> {
    match NatsBus::connect(url, timeout).await {
        Ok(bus) => Arc::new(bus),
        Err(e) => {
            warn!(url, error = %e, "Message bus unreachable, running on loopback bus");
            Arc::new(LoopbackBus::new())
        }
    }
}
