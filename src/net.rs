use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Mutex};
use tokio_tungstenite::accept_async;
use tracing::{debug, info, warn};
use tungstenite::Message;
use uuid::Uuid;

use crate::simulation::Command;
use crate::state::{ServerMessage, SharedGameState};

/// Everything a client may send, tagged by `type`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ClientMessage {
    Input {
        #[serde(default)]
        gas: bool,
        #[serde(default)]
        brake: bool,
        #[serde(default)]
        steer: f32,
    },
    Start,
    Restart,
    Ping,
}

impl ClientMessage {
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Simulation command, or None for transport-level messages.
    pub fn command(&self) -> Option<Command> {
        match *self {
            ClientMessage::Input { gas, brake, steer } => Some(Command::Input { gas, brake, steer }),
            ClientMessage::Start => Some(Command::Start),
            ClientMessage::Restart => Some(Command::Restart),
            ClientMessage::Ping => None,
        }
    }
}

pub async fn start_websocket_server(state: Arc<Mutex<SharedGameState>>, bind: String) -> std::io::Result<()> {
    let listener = TcpListener::bind(&bind).await?;
    info!(%bind, "websocket listening");

    loop {
        let (raw, peer) = match listener.accept().await {
            Ok(conn) => conn,
            Err(e) => {
                warn!(error = %e, "accept failed");
                continue;
            }
        };
        debug!(%peer, "tcp connection");
        tokio::spawn(handle_connection(Arc::clone(&state), raw));
    }
}

async fn handle_connection(state: Arc<Mutex<SharedGameState>>, raw: TcpStream) {
    let ws = match accept_async(raw).await {
        Ok(ws) => ws,
        Err(e) => {
            warn!(error = %e, "websocket handshake failed");
            return;
        }
    };
    let (mut write, mut read) = ws.split();

    // -------------------------------
    // 1) Outgoing channel + send loop
    // -------------------------------
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();

    tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if write.send(Message::Text(msg)).await.is_err() {
                break;
            }
        }
    });

    // -------------------------------
    // 2) One run per connection
    // -------------------------------
    let player_id = Uuid::new_v4().to_string();
    state.lock().await.open_session(&player_id, tx.clone());
    info!(%player_id, "player connected");

    if let Some(welcome) = (ServerMessage::Welcome { player_id: player_id.clone() }).to_json() {
        let _ = tx.send(welcome);
    }

    // -------------------------------
    // 3) Receive loop
    // -------------------------------
    while let Some(msg) = read.next().await {
        let msg = match msg {
            Ok(m) => m,
            Err(e) => {
                debug!(%player_id, error = %e, "read failed");
                break;
            }
        };

        let text = match msg {
            Message::Text(t) => t,
            Message::Close(_) => break,
            _ => continue,
        };

        let parsed = match ClientMessage::parse(&text) {
            Ok(m) => m,
            Err(e) => {
                warn!(%player_id, error = %e, "malformed client message");
                continue;
            }
        };

        match parsed.command() {
            Some(command) => {
                let mut game = state.lock().await;
                if let Some(session) = game.session_mut(&player_id) {
                    session.sim.apply(command);
                }
            }
            None => {
                if let Some(pong) = ServerMessage::Pong.to_json() {
                    let _ = tx.send(pong);
                }
            }
        }
    }

    info!(%player_id, "player disconnected");
    state.lock().await.close_session(&player_id);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_every_client_message() {
        assert_eq!(
            ClientMessage::parse(r#"{"type":"input","gas":true,"brake":false,"steer":-0.5}"#).unwrap(),
            ClientMessage::Input { gas: true, brake: false, steer: -0.5 }
        );
        assert_eq!(ClientMessage::parse(r#"{"type":"start"}"#).unwrap(), ClientMessage::Start);
        assert_eq!(ClientMessage::parse(r#"{"type":"restart"}"#).unwrap(), ClientMessage::Restart);
        assert_eq!(ClientMessage::parse(r#"{"type":"ping"}"#).unwrap().command(), None);
    }

    #[test]
    fn missing_input_fields_default_to_released() {
        let msg = ClientMessage::parse(r#"{"type":"input","steer":1.0}"#).unwrap();
        assert_eq!(msg.command(), Some(Command::Input { gas: false, brake: false, steer: 1.0 }));
    }

    #[test]
    fn malformed_messages_are_errors_not_panics() {
        assert!(ClientMessage::parse("not json").is_err());
        assert!(ClientMessage::parse(r#"{"type":"fly"}"#).is_err());
        // boosts come from pickups on the road only
        assert!(ClientMessage::parse(r#"{"type":"boost"}"#).is_err());
        assert!(ClientMessage::parse(r#"{"gas":true}"#).is_err());
    }

    #[test]
    fn server_messages_are_tagged() {
        let json = ServerMessage::Welcome { player_id: "p1".into() }.to_json().unwrap();
        assert_eq!(json, r#"{"type":"welcome","player_id":"p1"}"#);
        assert_eq!(ServerMessage::Pong.to_json().unwrap(), r#"{"type":"pong"}"#);
    }
}
