//! Mock quote server for connection tests.
//!
//! Every accepted connection receives the configured frames. The server then
//! either keeps the socket open (answering pings) or closes it, so both the
//! steady-state and the reconnect paths can be exercised.

use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::{accept_async, tungstenite::Message};

pub struct MockQuoteServer {
    addr: SocketAddr,
    shutdown_tx: mpsc::Sender<()>,
    connections: Arc<AtomicU32>,
}

impl MockQuoteServer {
    /// Start on an ephemeral port.
    pub async fn start(frames: Vec<String>, close_after_frames: bool) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let connections = Arc::new(AtomicU32::new(0));
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);

        let connections_clone = connections.clone();
        let frames = Arc::new(frames);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    Ok((stream, _)) = listener.accept() => {
                        connections_clone.fetch_add(1, Ordering::SeqCst);
                        tokio::spawn(handle_connection(stream, frames.clone(), close_after_frames));
                    }
                    _ = shutdown_rx.recv() => break,
                }
            }
        });

        Self {
            addr,
            shutdown_tx,
            connections,
        }
    }

    /// Base URL to put in `ConnectionConfig::base_url`.
    pub fn base_url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    pub fn connection_count(&self) -> u32 {
        self.connections.load(Ordering::SeqCst)
    }

    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(()).await;
    }
}

async fn handle_connection(stream: TcpStream, frames: Arc<Vec<String>>, close_after_frames: bool) {
    let Ok(ws_stream) = accept_async(stream).await else {
        return;
    };
    let (mut write, mut read) = ws_stream.split();

    for frame in frames.iter() {
        if write.send(Message::Text(frame.clone())).await.is_err() {
            return;
        }
    }

    if close_after_frames {
        let _ = write.send(Message::Close(None)).await;
        return;
    }

    while let Some(msg) = read.next().await {
        match msg {
            Ok(Message::Ping(data)) => {
                let _ = write.send(Message::Pong(data)).await;
            }
            Ok(Message::Close(_)) | Err(_) => break,
            _ => {}
        }
    }
}

pub fn equity_frame(symbol: &str, price: &str) -> String {
    format!(
        r#"{{"data":{{"info":{{"symbolId":"{symbol}","type":"EQUITY"}},"quote":{{"trade":{{"price":{price},"at":"2024-01-02T01:00:00.000Z"}},"total":{{"tradeVolume":100}}}}}}}}"#
    )
}
