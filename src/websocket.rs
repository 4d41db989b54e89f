//! # WebSocket Subscriber Handler
//!
//! Every client connected to `/ws` is a subscriber: it receives every broadcast
//! message and may publish messages of its own.
//!
//! ## WebSocket Protocol:
//! 1. **Connection**: the actor registers itself with the connection registry
//! 2. **Publishing**: each text frame is a JSON candidate message and is published
//! 3. **Broadcasts**: published messages arrive as JSON text frames (always `"text"`)
//! 4. **Errors**: a rejected publish is answered with an error frame, to the sender only
//! 5. **Limits**: a frame over `websocket.max_frame_bytes` is answered with a
//!    `payload_too_large` error frame, then the connection is closed
//! 6. **Disconnect**: close, protocol error, heartbeat timeout, or a full mailbox
//!    unregisters the actor
//!
//! ## Actor Model:
//! The actor never waits on a publish. Each publish is spawned as its own task and
//! reports failures back through the actor's address, so a slow transcription does
//! not stall the connection's receive loop.
//!
//! The mailbox is bounded by `websocket.mailbox_capacity`. A subscriber whose
//! mailbox is full when a broadcast arrives is dropped from the registry and closed
//! once it has drained what is already queued.

use crate::error::AppError;
use crate::message::Message;
use crate::registry::{DeliveryFailure, Subscriber, SubscriberId};
use crate::state::AppState;

use actix::dev::ToEnvelope;
use actix::prelude::SendError;
use actix::{Actor, ActorContext, Addr, AsyncContext, Handler, Recipient, StreamHandler};
use actix_web::{web, HttpRequest, HttpResponse, Result as ActixResult};
use actix_web_actors::ws;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Outbound frame for a connection actor.
#[derive(actix::Message, Debug, Clone)]
#[rtype(result = "()")]
pub struct Deliver(pub String);

/// The connection fell behind and has been dropped from the registry.
#[derive(actix::Message, Debug)]
#[rtype(result = "()")]
pub struct Evict;

/// Registry handle for a connection actor. Both recipients share one mailbox.
pub struct ActorSubscriber {
    frames: Recipient<Deliver>,
    evict: Recipient<Evict>,
}

impl ActorSubscriber {
    pub fn new<A>(addr: Addr<A>) -> Self
    where
        A: Actor + Handler<Deliver> + Handler<Evict>,
        A::Context: ToEnvelope<A, Deliver> + ToEnvelope<A, Evict>,
    {
        Self {
            frames: addr.clone().recipient(),
            evict: addr.recipient(),
        }
    }
}

impl Subscriber for ActorSubscriber {
    fn deliver(&self, payload: &str) -> Result<(), DeliveryFailure> {
        match self.frames.try_send(Deliver(payload.to_string())) {
            Ok(()) => Ok(()),
            Err(SendError::Full(_)) => {
                // Queued behind the pending frames, so the client still gets those.
                self.evict.do_send(Evict);
                Err(DeliveryFailure("mailbox full, subscriber too slow".to_string()))
            }
            Err(SendError::Closed(_)) => Err(DeliveryFailure("connection closed".to_string())),
        }
    }
}

/// WebSocket actor for one subscriber connection.
pub struct HubWebSocket {
    /// Registry id, set once the actor has started
    subscriber_id: Option<SubscriberId>,

    state: AppState,

    /// Last time the client showed any sign of life
    last_heartbeat: Instant,

    heartbeat_interval: Duration,
    client_timeout: Duration,
}

impl HubWebSocket {
    pub fn new(state: AppState) -> Self {
        let heartbeat_interval = state.config.websocket.heartbeat_interval();
        let client_timeout = state.config.websocket.client_timeout();

        Self {
            subscriber_id: None,
            state,
            last_heartbeat: Instant::now(),
            heartbeat_interval,
            client_timeout,
        }
    }

    /// Parse a text frame and publish it in the background.
    fn handle_publish(&mut self, text: &str, ctx: &mut ws::WebsocketContext<Self>) {
        let candidate = match Message::from_json(text) {
            Ok(candidate) => candidate,
            Err(err) => {
                self.send_error(ctx, &err);
                return;
            }
        };

        let publisher = Arc::clone(&self.state.publisher);
        let addr = ctx.address();
        let subscriber_id = self.subscriber_id;

        tokio::spawn(async move {
            match publisher.publish(candidate).await {
                Ok(published) => {
                    debug!(
                        subscriber_id = ?subscriber_id,
                        n_publishers = published.n_publishers,
                        "Published message from subscriber"
                    );
                }
                Err(err) => {
                    addr.do_send(Deliver(err.to_json().to_string()));
                }
            }
        });
    }

    /// Send an error frame to this client only.
    fn send_error(&self, ctx: &mut ws::WebsocketContext<Self>, err: &AppError) {
        warn!(subscriber_id = ?self.subscriber_id, error = %err, "Rejected message from subscriber");
        ctx.text(err.to_json().to_string());
    }
}

impl Actor for HubWebSocket {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        ctx.set_mailbox_capacity(self.state.config.websocket.mailbox_capacity);
        let id = self.state.registry.register(ActorSubscriber::new(ctx.address()));
        self.subscriber_id = Some(id);
        info!(subscriber_id = %id, "WebSocket subscriber connected");

        ctx.run_interval(self.heartbeat_interval, |act, ctx| {
            if Instant::now().duration_since(act.last_heartbeat) > act.client_timeout {
                warn!(subscriber_id = ?act.subscriber_id, "WebSocket heartbeat timeout, closing connection");
                ctx.stop();
                return;
            }
            ctx.ping(b"");
        });
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        if let Some(id) = self.subscriber_id.take() {
            self.state.registry.unregister(id);
            info!(subscriber_id = %id, "WebSocket subscriber disconnected");
        }
    }
}

impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for HubWebSocket {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Text(text)) => {
                self.last_heartbeat = Instant::now();
                self.handle_publish(&text, ctx);
            }
            Ok(ws::Message::Binary(_)) => {
                self.last_heartbeat = Instant::now();
                let err = AppError::MalformedMessage(
                    "binary frames are not supported, send JSON text frames".to_string(),
                );
                self.send_error(ctx, &err);
            }
            Ok(ws::Message::Ping(data)) => {
                self.last_heartbeat = Instant::now();
                ctx.pong(&data);
            }
            Ok(ws::Message::Pong(_)) => {
                self.last_heartbeat = Instant::now();
            }
            Ok(ws::Message::Close(reason)) => {
                info!(subscriber_id = ?self.subscriber_id, "WebSocket closed: {:?}", reason);
                ctx.close(reason);
                ctx.stop();
            }
            Ok(ws::Message::Continuation(_)) => {
                warn!("Received unexpected continuation frame");
                ctx.stop();
            }
            Ok(ws::Message::Nop) => {}
            Err(ws::ProtocolError::Overflow) => {
                let err = AppError::PayloadTooLarge(self.state.config.websocket.max_frame_bytes);
                self.send_error(ctx, &err);
                ctx.close(Some(ws::CloseCode::Size.into()));
                ctx.stop();
            }
            Err(err) => {
                error!(subscriber_id = ?self.subscriber_id, "WebSocket protocol error: {}", err);
                ctx.stop();
            }
        }
    }
}

/// Broadcast frames from the registry.
impl Handler<Deliver> for HubWebSocket {
    type Result = ();

    fn handle(&mut self, msg: Deliver, ctx: &mut Self::Context) {
        ctx.text(msg.0);
    }
}

impl Handler<Evict> for HubWebSocket {
    type Result = ();

    fn handle(&mut self, _msg: Evict, ctx: &mut Self::Context) {
        warn!(subscriber_id = ?self.subscriber_id, "Subscriber fell behind, closing connection");
        ctx.close(Some(ws::CloseReason {
            code: ws::CloseCode::Again,
            description: Some("subscriber too slow".to_string()),
        }));
        ctx.stop();
    }
}

/// `GET /ws`: upgrade to a WebSocket and attach as a subscriber.
pub async fn subscribe(
    req: HttpRequest,
    stream: web::Payload,
    state: web::Data<AppState>,
) -> ActixResult<HttpResponse> {
    info!("New WebSocket connection request from: {:?}", req.connection_info().peer_addr());
    let max_frame_bytes = state.config.websocket.max_frame_bytes;
    ws::WsResponseBuilder::new(HubWebSocket::new(state.get_ref().clone()), &req, stream)
        .frame_size(max_frame_bytes)
        .start()
}
