//! Push channels over a Phoenix-style websocket.
//!
//! Frames are JSON arrays `[join_ref, ref, topic, event, payload]`. A channel
//! connects with the access token in the query string, sends `phx_join` for
//! its topic and waits for an `ok` reply before handing back the receiver.
//! After that a reader task forwards matching pushes, sends heartbeats, and
//! reconnects with exponential backoff when the socket drops.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use secrecy::ExposeSecret;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::marker::PhantomData;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, trace, warn};

use super::session::StxSession;
use crate::error::SdkError;
use crate::types::{ActiveOrders, ActiveTrades, MarketChannelData, Portfolio};
use crate::venue::EventChannel;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

const PROTOCOL_VERSION: &str = "2.0.0";
const JOIN_REF: &str = "1";
const JOIN_TIMEOUT: Duration = Duration::from_secs(10);
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);
const INITIAL_RECONNECT_DELAY: Duration = Duration::from_secs(1);
const MAX_RECONNECT_DELAY: Duration = Duration::from_secs(60);
const CHANNEL_CAPACITY: usize = 256;

// ---------------------------------------------------------------------------
// Topics and frames
// ---------------------------------------------------------------------------

/// The four subscriptions the venue offers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Topic {
    MarketInfo,
    ActiveOrders,
    ActiveTrades,
    Portfolio,
}

impl Topic {
    pub fn name(&self) -> &'static str {
        match self {
            Topic::MarketInfo => "market",
            Topic::ActiveOrders => "orders",
            Topic::ActiveTrades => "trades",
            Topic::Portfolio => "portfolio",
        }
    }

    /// Event name carried by pushes on this topic.
    pub fn event(&self) -> &'static str {
        match self {
            Topic::MarketInfo => "market_info",
            Topic::ActiveOrders => "active_orders",
            Topic::ActiveTrades => "active_trades",
            Topic::Portfolio => "portfolio",
        }
    }

    /// Full topic string. Account topics are scoped to the user.
    pub fn topic(&self, user_id: &str) -> String {
        match self {
            Topic::MarketInfo => "market_info".to_string(),
            Topic::ActiveOrders => format!("active_orders:{user_id}"),
            Topic::ActiveTrades => format!("active_trades:{user_id}"),
            Topic::Portfolio => format!("portfolio:{user_id}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Frame {
    pub join_ref: Option<String>,
    pub reference: Option<String>,
    pub topic: String,
    pub event: String,
    pub payload: Value,
}

impl Frame {
    pub(crate) fn parse(text: &str) -> Result<Self, SdkError> {
        let (join_ref, reference, topic, event, payload): (
            Option<String>,
            Option<String>,
            String,
            String,
            Value,
        ) = serde_json::from_str(text).map_err(|e| SdkError::Decode(format!("bad frame: {e}")))?;
        Ok(Self {
            join_ref,
            reference,
            topic,
            event,
            payload,
        })
    }

    pub(crate) fn encode(&self) -> String {
        serde_json::json!([
            self.join_ref,
            self.reference,
            self.topic,
            self.event,
            self.payload
        ])
        .to_string()
    }

    fn join(topic: &str) -> Self {
        Self {
            join_ref: Some(JOIN_REF.to_string()),
            reference: Some(JOIN_REF.to_string()),
            topic: topic.to_string(),
            event: "phx_join".to_string(),
            payload: serde_json::json!({}),
        }
    }

    fn heartbeat(reference: u64) -> Self {
        Self {
            join_ref: None,
            reference: Some(reference.to_string()),
            topic: "phoenix".to_string(),
            event: "heartbeat".to_string(),
            payload: serde_json::json!({}),
        }
    }

    /// `Some(Ok)` for an ok reply to `reference`, `Some(Err)` for any other
    /// reply to it, `None` if this frame is not that reply.
    fn reply_status(&self, reference: &str) -> Option<Result<(), String>> {
        if self.event != "phx_reply" || self.reference.as_deref() != Some(reference) {
            return None;
        }
        match self.payload.get("status").and_then(Value::as_str) {
            Some("ok") => Some(Ok(())),
            _ => Some(Err(self
                .payload
                .get("response")
                .map(Value::to_string)
                .unwrap_or_else(|| self.payload.to_string()))),
        }
    }
}

pub(crate) fn socket_url(base: &str, token: &str) -> String {
    let sep = if base.contains('?') { '&' } else { '?' };
    format!(
        "{base}{sep}token={}&vsn={PROTOCOL_VERSION}",
        urlencoding::encode(token)
    )
}

// ---------------------------------------------------------------------------
// Channel
// ---------------------------------------------------------------------------

/// One venue subscription delivering `T`.
pub struct StxChannel<T> {
    uri: String,
    session: StxSession,
    topic: Topic,
    _payload: PhantomData<fn() -> T>,
}

impl<T> StxChannel<T> {
    fn with_topic(uri: &str, session: StxSession, topic: Topic) -> Self {
        Self {
            uri: uri.to_string(),
            session,
            topic,
            _payload: PhantomData,
        }
    }
}

impl StxChannel<MarketChannelData> {
    pub fn market(uri: &str, session: StxSession) -> Self {
        Self::with_topic(uri, session, Topic::MarketInfo)
    }
}

impl StxChannel<ActiveOrders> {
    pub fn orders(uri: &str, session: StxSession) -> Self {
        Self::with_topic(uri, session, Topic::ActiveOrders)
    }
}

impl StxChannel<Option<ActiveTrades>> {
    pub fn trades(uri: &str, session: StxSession) -> Self {
        Self::with_topic(uri, session, Topic::ActiveTrades)
    }
}

impl StxChannel<Option<Portfolio>> {
    pub fn portfolio(uri: &str, session: StxSession) -> Self {
        Self::with_topic(uri, session, Topic::Portfolio)
    }
}

#[async_trait]
impl<T> EventChannel<T> for StxChannel<T>
where
    T: DeserializeOwned + Send + 'static,
{
    fn name(&self) -> &'static str {
        self.topic.name()
    }

    async fn subscribe(&self) -> Result<mpsc::Receiver<T>, SdkError> {
        let reader = Reader {
            uri: self.uri.clone(),
            session: self.session.clone(),
            topic: self.topic,
        };
        let ws = reader.connect().await?;
        info!(channel = self.topic.name(), "Channel joined");

        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        tokio::spawn(reader.run(ws, tx));
        Ok(rx)
    }
}

// ---------------------------------------------------------------------------
// Reader task
// ---------------------------------------------------------------------------

struct Reader {
    uri: String,
    session: StxSession,
    topic: Topic,
}

impl Reader {
    /// Open the socket and join the topic.
    async fn connect(&self) -> Result<WsStream, SdkError> {
        let token = self.session.require_token()?;
        let user_id = self.session.user_id().unwrap_or_default();
        let topic = self.topic.topic(&user_id);
        let url = socket_url(&self.uri, token.expose_secret());

        let join = async {
            let (mut ws, _) = connect_async(url.as_str()).await?;
            ws.send(Message::Text(Frame::join(&topic).encode().into()))
                .await?;

            while let Some(msg) = ws.next().await {
                let Message::Text(text) = msg? else {
                    continue;
                };
                let Ok(frame) = Frame::parse(&text) else {
                    continue;
                };
                match frame.reply_status(JOIN_REF) {
                    Some(Ok(())) => return Ok(ws),
                    Some(Err(reason)) => {
                        return Err(SdkError::Connection(format!(
                            "join {topic} rejected: {reason}"
                        )))
                    }
                    None => continue,
                }
            }
            Err::<WsStream, SdkError>(SdkError::Connection(format!(
                "socket closed while joining {topic}"
            )))
        };

        tokio::time::timeout(JOIN_TIMEOUT, join)
            .await
            .map_err(|_| SdkError::Connection(format!("timed out joining {topic}")))?
    }

    async fn run<T: DeserializeOwned + Send + 'static>(self, ws: WsStream, tx: mpsc::Sender<T>) {
        let mut ws = Some(ws);
        let mut delay = INITIAL_RECONNECT_DELAY;

        loop {
            if let Some(stream) = ws.take() {
                match self.pump(stream, &tx).await {
                    Ok(()) => {
                        debug!(channel = self.topic.name(), "Receiver dropped, closing channel");
                        return;
                    }
                    Err(e) => {
                        warn!(channel = self.topic.name(), error = %e, "Channel disconnected");
                    }
                }
            }

            if tx.is_closed() {
                return;
            }
            tokio::time::sleep(delay).await;
            match self.connect().await {
                Ok(stream) => {
                    info!(channel = self.topic.name(), "Channel reconnected");
                    delay = INITIAL_RECONNECT_DELAY;
                    ws = Some(stream);
                }
                Err(e) => {
                    warn!(
                        channel = self.topic.name(),
                        error = %e,
                        retry_in = ?delay,
                        "Channel reconnect failed"
                    );
                    delay = (delay * 2).min(MAX_RECONNECT_DELAY);
                }
            }
        }
    }

    /// Forward pushes until the socket fails (`Err`) or the receiver is gone (`Ok`).
    async fn pump<T: DeserializeOwned>(
        &self,
        ws: WsStream,
        tx: &mpsc::Sender<T>,
    ) -> Result<(), SdkError> {
        let event = self.topic.event();
        let (mut write, mut read) = ws.split();
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;
        let mut reference: u64 = 1;

        loop {
            tokio::select! {
                _ = heartbeat.tick() => {
                    reference += 1;
                    write
                        .send(Message::Text(Frame::heartbeat(reference).encode().into()))
                        .await?;
                }
                _ = tx.closed() => return Ok(()),
                msg = read.next() => {
                    let text = match msg {
                        Some(Ok(Message::Text(text))) => text,
                        Some(Ok(Message::Close(_))) | None => {
                            return Err(SdkError::Connection("socket closed".into()));
                        }
                        Some(Ok(_)) => continue,
                        Some(Err(e)) => return Err(e.into()),
                    };
                    let frame = match Frame::parse(&text) {
                        Ok(f) => f,
                        Err(e) => {
                            warn!(channel = self.topic.name(), error = %e, "Skipping frame");
                            continue;
                        }
                    };
                    match frame.event.as_str() {
                        "phx_error" | "phx_close" => {
                            return Err(SdkError::Connection(format!(
                                "{} on {}",
                                frame.event, frame.topic
                            )));
                        }
                        e if e == event => match serde_json::from_value::<T>(frame.payload) {
                            Ok(payload) => {
                                if tx.send(payload).await.is_err() {
                                    return Ok(());
                                }
                            }
                            Err(e) => {
                                warn!(channel = self.topic.name(), error = %e, "Undecodable push");
                            }
                        },
                        _ => trace!(channel = self.topic.name(), event = %frame.event, "Ignoring frame"),
                    }
                }
            }
        }
    }
}
