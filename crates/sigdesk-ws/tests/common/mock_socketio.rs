//! Mock Socket.IO server for integration tests.
//!
//! Speaks just enough Engine.IO v4 over WebSocket to:
//! - Send the open handshake
//! - Acknowledge namespace connects
//! - Play a script of frames after the connect ack
//! - Record received frames

#![allow(dead_code)]

use futures_util::{SinkExt, StreamExt};
use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Mutex};
use tokio_tungstenite::{accept_async, tungstenite::Message};

/// Behaviour of the mock after the namespace connect ack.
#[derive(Debug, Clone, Default)]
pub struct Script {
    /// Frames sent right after the connect ack.
    pub frames: Vec<String>,
    /// Drop the socket once the frames are sent.
    pub close_after: bool,
}

/// A mock Socket.IO server for testing.
pub struct MockSocketIoServer {
    addr: SocketAddr,
    shutdown_tx: mpsc::Sender<()>,
    messages: Arc<Mutex<VecDeque<String>>>,
    connections: Arc<Mutex<u32>>,
}

impl MockSocketIoServer {
    /// Start a new mock server on an available port.
    pub async fn start(script: Script) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let messages: Arc<Mutex<VecDeque<String>>> = Arc::new(Mutex::new(VecDeque::new()));
        let connections: Arc<Mutex<u32>> = Arc::new(Mutex::new(0));
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);

        let messages_clone = messages.clone();
        let connections_clone = connections.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    Ok((stream, _)) = listener.accept() => {
                        let messages = messages_clone.clone();
                        let connections = connections_clone.clone();
                        tokio::spawn(handle_connection(stream, messages, connections, script.clone()));
                    }
                    _ = shutdown_rx.recv() => {
                        break;
                    }
                }
            }
        });

        Self {
            addr,
            shutdown_tx,
            messages,
            connections,
        }
    }

    /// Server URL as a Socket.IO client would be given it.
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub async fn connection_count(&self) -> u32 {
        *self.connections.lock().await
    }

    pub async fn received_messages(&self) -> Vec<String> {
        self.messages.lock().await.iter().cloned().collect()
    }

    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(()).await;
    }
}

async fn handle_connection(
    stream: TcpStream,
    messages: Arc<Mutex<VecDeque<String>>>,
    connections: Arc<Mutex<u32>>,
    script: Script,
) {
    {
        let mut count = connections.lock().await;
        *count += 1;
    }

    let ws_stream = match accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            eprintln!("WebSocket handshake failed: {}", e);
            return;
        }
    };

    let (mut write, mut read) = ws_stream.split();

    let open = r#"0{"sid":"mock-engine","upgrades":[],"pingInterval":25000,"pingTimeout":20000,"maxPayload":1000000}"#;
    if write.send(Message::Text(open.to_string())).await.is_err() {
        return;
    }

    while let Some(msg) = read.next().await {
        match msg {
            Ok(Message::Text(text)) => {
                {
                    let mut msgs = messages.lock().await;
                    msgs.push_back(text.clone());
                }

                if text.starts_with("40") {
                    let namespace = text[2..].trim_end_matches(',');
                    let ack = if namespace.is_empty() {
                        r#"40{"sid":"mock-socket"}"#.to_string()
                    } else {
                        format!(r#"40{namespace},{{"sid":"mock-socket"}}"#)
                    };
                    let _ = write.send(Message::Text(ack)).await;

                    for frame in &script.frames {
                        let _ = write.send(Message::Text(frame.clone())).await;
                    }
                    if script.close_after {
                        let _ = write.close().await;
                        return;
                    }
                }
            }
            Ok(Message::Ping(data)) => {
                let _ = write.send(Message::Pong(data)).await;
            }
            Ok(Message::Close(_)) => break,
            Err(_) => break,
            _ => {}
        }
    }
}
