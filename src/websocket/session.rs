//! One connected WebSocket client.

use std::time::{Duration, Instant};

use actix::{fut, Actor, ActorContext, ActorFutureExt, Addr, AsyncContext, ContextFutureSpawner, Handler, Running, StreamHandler, WrapFuture};
use actix_web_actors::ws;
use tracing::{debug, info, warn};

use crate::websocket::server::{Connect, Disconnect, MonitorHub, WsMessage};

/// Client session actor: registers with the hub, relays broadcast envelopes,
/// and drops the connection when heartbeats go unanswered.
pub struct WsSession {
    id: usize,
    hub: Addr<MonitorHub>,
    last_heartbeat: Instant,
    ping_interval: Duration,
    client_timeout: Duration,
}

impl WsSession {
    pub fn new(hub: Addr<MonitorHub>, ping_interval_secs: u64, client_timeout_secs: u64) -> Self {
        Self {
            id: 0,
            hub,
            last_heartbeat: Instant::now(),
            ping_interval: Duration::from_secs(ping_interval_secs.max(1)),
            client_timeout: Duration::from_secs(client_timeout_secs.max(1)),
        }
    }

    fn heartbeat(&self, ctx: &mut ws::WebsocketContext<Self>) {
        ctx.run_interval(self.ping_interval, |act, ctx| {
            if Instant::now().duration_since(act.last_heartbeat) > act.client_timeout {
                info!("websocket client timed out, disconnecting");
                ctx.stop();
                return;
            }
            ctx.ping(b"");
        });
    }
}

impl Actor for WsSession {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        self.heartbeat(ctx);
        let addr = ctx.address();
        self.hub
            .send(Connect {
                addr: addr.recipient(),
            })
            .into_actor(self)
            .then(|res, act, ctx| {
                match res {
                    Ok(id) => act.id = id,
                    // Hub is gone; nothing to relay.
                    Err(_) => ctx.stop(),
                }
                fut::ready(())
            })
            .wait(ctx);
    }

    fn stopping(&mut self, _: &mut Self::Context) -> Running {
        self.hub.do_send(Disconnect { id: self.id });
        Running::Stop
    }
}

impl Handler<WsMessage> for WsSession {
    type Result = ();

    fn handle(&mut self, msg: WsMessage, ctx: &mut Self::Context) {
        ctx.text(msg.0);
    }
}

impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for WsSession {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Ping(payload)) => {
                self.last_heartbeat = Instant::now();
                ctx.pong(&payload);
            }
            Ok(ws::Message::Pong(_)) => self.last_heartbeat = Instant::now(),
            // Clients may send keep-alive text; there is no inbound protocol.
            Ok(ws::Message::Text(_)) => self.last_heartbeat = Instant::now(),
            Ok(ws::Message::Binary(_)) => warn!("unexpected binary websocket frame"),
            Ok(ws::Message::Close(reason)) => {
                debug!(?reason, "websocket client closed");
                ctx.close(reason);
                ctx.stop();
            }
            Ok(ws::Message::Continuation(_)) => ctx.stop(),
            Ok(ws::Message::Nop) => {}
            Err(err) => {
                warn!(error = %err, "websocket protocol error");
                ctx.stop();
            }
        }
    }
}
