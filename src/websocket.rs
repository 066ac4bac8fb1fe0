//! # WebSocket Transport Layer
//!
//! Bridges actix WebSocket actors to the protocol layer.
//!
//! ## Connections:
//! - **`/upload`** — media-exchange clients. Each connection gets its own
//!   [`MediaExchangeSocket`] actor plus one spawned coordinator task. The
//!   actor forwards inbound frames into a channel ([`ChannelSource`]) and
//!   writes outbound frames on behalf of the task ([`ActorSink`]), so the
//!   coordinator stays a plain sequential state machine with a suspension
//!   point at every receive.
//! - **`/ws/events`** — passive observers. An [`ObserverSocket`] joins the
//!   broadcast hub on start, streams replayed-then-live events out as JSON
//!   text frames, and leaves the hub on stop.
//!
//! Transaction reception is concurrent across connections; only collaborator
//! invocation serializes (see the processing pipeline gate).

use crate::broadcast::{BroadcastEvent, ObserverHandle};
use crate::error::ExchangeError;
use crate::protocol::{
    FrameSink, FrameSource, InboundFrame, RecvEvent, SessionCoordinator,
};
use crate::state::AppState;
use actix::prelude::*;
use actix_web::{web, HttpRequest, HttpResponse, Result as ActixResult};
use actix_web_actors::ws;
use async_trait::async_trait;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{debug, error, info, warn};

/// How often the server pings idle sockets.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Drop a connection that hasn't answered for this long.
const CLIENT_TIMEOUT: Duration = Duration::from_secs(60);

/// Outbound frame written by the coordinator task through the actor.
#[derive(Message)]
#[rtype(result = "()")]
enum OutboundFrame {
    Text(String),
    Binary(Vec<u8>),
}

/// Asks the actor to close the socket once the transaction is over.
#[derive(Message)]
#[rtype(result = "()")]
struct CloseConnection;

/// Inbound side of the bridge: channel receiver with per-call timeout.
pub struct ChannelSource {
    rx: mpsc::UnboundedReceiver<InboundFrame>,
}

impl ChannelSource {
    pub fn new(rx: mpsc::UnboundedReceiver<InboundFrame>) -> Self {
        Self { rx }
    }
}

#[async_trait]
impl FrameSource for ChannelSource {
    async fn recv(&mut self, timeout: Duration) -> RecvEvent {
        match tokio::time::timeout(timeout, self.rx.recv()).await {
            Ok(Some(frame)) => RecvEvent::Got(frame),
            Ok(None) => RecvEvent::Closed,
            Err(_) => RecvEvent::TimedOut,
        }
    }
}

/// Outbound side of the bridge: writes through the actor's mailbox. A
/// stopped actor (closed connection) surfaces as a transmit error.
pub struct ActorSink {
    addr: Addr<MediaExchangeSocket>,
}

#[async_trait]
impl FrameSink for ActorSink {
    async fn send_text(&self, text: String) -> Result<(), ExchangeError> {
        self.addr
            .send(OutboundFrame::Text(text))
            .await
            .map_err(|_| ExchangeError::Transmit("connection closed".to_string()))
    }

    async fn send_binary(&self, data: Vec<u8>) -> Result<(), ExchangeError> {
        self.addr
            .send(OutboundFrame::Binary(data))
            .await
            .map_err(|_| ExchangeError::Transmit("connection closed".to_string()))
    }
}

/// Actor for one media-exchange client connection.
pub struct MediaExchangeSocket {
    state: web::Data<AppState>,
    frames: Option<mpsc::UnboundedSender<InboundFrame>>,
    last_heartbeat: Instant,
}

impl MediaExchangeSocket {
    pub fn new(state: web::Data<AppState>) -> Self {
        Self {
            state,
            frames: None,
            last_heartbeat: Instant::now(),
        }
    }

    fn forward(&self, frame: InboundFrame) {
        if let Some(tx) = &self.frames {
            // A failed send means the transaction already finished; frames
            // arriving after that are dropped.
            if tx.send(frame).is_err() {
                debug!("frame after transaction end, dropping");
            }
        }
    }

    fn start_heartbeat(&self, ctx: &mut ws::WebsocketContext<Self>) {
        ctx.run_interval(HEARTBEAT_INTERVAL, |act, ctx| {
            if Instant::now().duration_since(act.last_heartbeat) > CLIENT_TIMEOUT {
                warn!("heartbeat timeout, closing connection");
                ctx.stop();
            } else {
                ctx.ping(b"");
            }
        });
    }
}

impl Actor for MediaExchangeSocket {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        self.state.connection_opened();
        self.start_heartbeat(ctx);

        let (tx, rx) = mpsc::unbounded_channel();
        self.frames = Some(tx);

        let config = self.state.get_config();
        let coordinator = SessionCoordinator::new(
            config.transfer,
            self.state.store.clone(),
            self.state.pipeline.clone(),
            self.state.hub.clone(),
            self.state.chat.clone(),
        );

        let addr = ctx.address();
        let state = self.state.clone();
        tokio::spawn(async move {
            let mut source = ChannelSource::new(rx);
            let sink = ActorSink { addr: addr.clone() };
            let outcome = coordinator.run(&mut source, &sink).await;
            state.record_transaction(outcome);
            // One transaction per connection; release it.
            let _ = addr.send(CloseConnection).await;
        });
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        self.frames = None;
        self.state.connection_closed();
        info!("media-exchange connection closed");
    }
}

impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for MediaExchangeSocket {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Text(text)) => {
                self.forward(InboundFrame::Text(text.to_string()));
            }
            Ok(ws::Message::Binary(data)) => {
                self.forward(InboundFrame::Binary(data.to_vec()));
            }
            Ok(ws::Message::Ping(data)) => {
                ctx.pong(&data);
                self.last_heartbeat = Instant::now();
            }
            Ok(ws::Message::Pong(_)) => {
                self.last_heartbeat = Instant::now();
            }
            Ok(ws::Message::Close(reason)) => {
                debug!("client closed: {:?}", reason);
                // Dropping the sender signals Closed to the coordinator.
                self.frames = None;
                ctx.close(reason);
                ctx.stop();
            }
            Ok(ws::Message::Continuation(_)) => {
                warn!("unexpected continuation frame");
            }
            Ok(ws::Message::Nop) => {}
            Err(err) => {
                error!("websocket protocol error: {}", err);
                self.frames = None;
                ctx.stop();
            }
        }
    }
}

impl Handler<OutboundFrame> for MediaExchangeSocket {
    type Result = ();

    fn handle(&mut self, msg: OutboundFrame, ctx: &mut Self::Context) {
        match msg {
            OutboundFrame::Text(text) => ctx.text(text),
            OutboundFrame::Binary(data) => ctx.binary(data),
        }
    }
}

impl Handler<CloseConnection> for MediaExchangeSocket {
    type Result = ();

    fn handle(&mut self, _msg: CloseConnection, ctx: &mut Self::Context) {
        ctx.close(None);
        ctx.stop();
    }
}

/// Actor for one passive observer connection.
pub struct ObserverSocket {
    state: web::Data<AppState>,
    handle: Option<ObserverHandle>,
    last_heartbeat: Instant,
}

impl ObserverSocket {
    pub fn new(state: web::Data<AppState>) -> Self {
        Self {
            state,
            handle: None,
            last_heartbeat: Instant::now(),
        }
    }
}

impl Actor for ObserverSocket {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        let (handle, rx) = self.state.hub.join();
        self.handle = Some(handle);
        ctx.add_stream(UnboundedReceiverStream::new(rx));

        ctx.run_interval(HEARTBEAT_INTERVAL, |act, ctx| {
            if Instant::now().duration_since(act.last_heartbeat) > CLIENT_TIMEOUT {
                warn!("observer heartbeat timeout, closing");
                ctx.stop();
            } else {
                ctx.ping(b"");
            }
        });
        info!("observer joined");
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        if let Some(handle) = self.handle.take() {
            self.state.hub.leave(handle);
        }
        info!("observer left");
    }
}

/// Hub events flowing out to this observer.
impl StreamHandler<BroadcastEvent> for ObserverSocket {
    fn handle(&mut self, event: BroadcastEvent, ctx: &mut Self::Context) {
        match serde_json::to_string(&event) {
            Ok(json) => ctx.text(json),
            Err(err) => warn!("failed to serialize broadcast event: {}", err),
        }
    }
}

/// Control frames from the observer; observers don't submit media.
impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for ObserverSocket {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Ping(data)) => {
                ctx.pong(&data);
                self.last_heartbeat = Instant::now();
            }
            Ok(ws::Message::Pong(_)) => {
                self.last_heartbeat = Instant::now();
            }
            Ok(ws::Message::Close(reason)) => {
                ctx.close(reason);
                ctx.stop();
            }
            Ok(ws::Message::Text(_)) | Ok(ws::Message::Binary(_)) => {
                debug!("ignoring message from passive observer");
            }
            Ok(_) => {}
            Err(err) => {
                error!("observer protocol error: {}", err);
                ctx.stop();
            }
        }
    }
}

/// HTTP → WebSocket upgrade for media-exchange clients.
pub async fn media_exchange(
    req: HttpRequest,
    stream: web::Payload,
    state: web::Data<AppState>,
) -> ActixResult<HttpResponse> {
    info!(
        "media-exchange connection from {:?}",
        req.connection_info().peer_addr()
    );
    ws::start(MediaExchangeSocket::new(state), &req, stream)
}

/// HTTP → WebSocket upgrade for observers.
pub async fn event_stream(
    req: HttpRequest,
    stream: web::Payload,
    state: web::Data<AppState>,
) -> ActixResult<HttpResponse> {
    info!(
        "observer connection from {:?}",
        req.connection_info().peer_addr()
    );
    ws::start(ObserverSocket::new(state), &req, stream)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_channel_source_maps_events() {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut source = ChannelSource::new(rx);

        tx.send(InboundFrame::Text("0,1024".to_string())).unwrap();
        assert_eq!(
            source.recv(Duration::from_millis(50)).await,
            RecvEvent::Got(InboundFrame::Text("0,1024".to_string()))
        );

        // Nothing queued: the timeout elapses
        assert_eq!(
            source.recv(Duration::from_millis(10)).await,
            RecvEvent::TimedOut
        );

        // Sender dropped: closure, not timeout
        drop(tx);
        assert_eq!(
            source.recv(Duration::from_millis(10)).await,
            RecvEvent::Closed
        );
    }
}
