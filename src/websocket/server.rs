//! Central WebSocket hub: tracks connected clients and broadcasts envelopes.

use std::collections::HashMap;

use actix::{Actor, Context, Handler, Message, Recipient};
use actix_web::{web, HttpRequest, HttpResponse, Resource};
use actix_web_actors::ws;
use tracing::{debug, info};

use crate::api::AppState;
use crate::websocket::connection_established_message;
use crate::websocket::session::WsSession;

// ===== Hub Messages =====

/// A serialized envelope pushed to one client session.
#[derive(Message, Clone)]
#[rtype(result = "()")]
pub struct WsMessage(pub String);

#[derive(Message)]
#[rtype(result = "usize")]
pub struct Connect {
    pub addr: Recipient<WsMessage>,
}

#[derive(Message)]
#[rtype(result = "()")]
pub struct Disconnect {
    pub id: usize,
}

#[derive(Message)]
#[rtype(result = "()")]
pub struct Broadcast {
    pub payload: String,
}

#[derive(Message)]
#[rtype(result = "usize")]
pub struct ClientCount;

// ===== Hub Actor =====

pub struct MonitorHub {
    clients: HashMap<usize, Recipient<WsMessage>>,
    next_id: usize,
    mode: String,
}

impl MonitorHub {
    pub fn new(mode: impl Into<String>) -> Self {
        Self {
            clients: HashMap::new(),
            next_id: 0,
            mode: mode.into(),
        }
    }
}

impl Actor for MonitorHub {
    type Context = Context<Self>;
}

impl Handler<Connect> for MonitorHub {
    type Result = usize;

    fn handle(&mut self, msg: Connect, _: &mut Context<Self>) -> Self::Result {
        let id = self.next_id;
        self.next_id += 1;
        msg.addr.do_send(WsMessage(connection_established_message(&self.mode)));
        self.clients.insert(id, msg.addr);
        info!(total = self.clients.len(), "websocket client connected");
        id
    }
}

impl Handler<Disconnect> for MonitorHub {
    type Result = ();

    fn handle(&mut self, msg: Disconnect, _: &mut Context<Self>) {
        if self.clients.remove(&msg.id).is_some() {
            info!(total = self.clients.len(), "websocket client disconnected");
        }
    }
}

impl Handler<Broadcast> for MonitorHub {
    type Result = ();

    fn handle(&mut self, msg: Broadcast, _: &mut Context<Self>) {
        debug!(clients = self.clients.len(), "broadcasting envelope");
        for client in self.clients.values() {
            client.do_send(WsMessage(msg.payload.clone()));
        }
    }
}

impl Handler<ClientCount> for MonitorHub {
    type Result = usize;

    fn handle(&mut self, _: ClientCount, _: &mut Context<Self>) -> Self::Result {
        self.clients.len()
    }
}

// ===== Route =====

pub fn websocket_route() -> Resource {
    web::resource("/ws").route(web::get().to(ws_index))
}

async fn ws_index(
    req: HttpRequest,
    stream: web::Payload,
    state: web::Data<AppState>,
) -> Result<HttpResponse, actix_web::Error> {
    ws::start(
        WsSession::new(
            state.hub.clone(),
            state.config.websocket.ping_interval_secs,
            state.config.websocket.client_timeout_secs,
        ),
        &req,
        stream,
    )
}
