//! Live-reload notification channel.
//!
//! A plain websocket endpoint: one thread accepts browser connections,
//! another broadcasts a reload message whenever a task reports freshly
//! written output. The payload names the changed files so a client can
//! refresh selectively; file contents never travel over this channel.

use std::net::{TcpListener, TcpStream};
use std::sync::mpsc::{Receiver, channel};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use camino::Utf8PathBuf;
use tungstenite::WebSocket;

use crate::error::ServeError;
use crate::task::ReloadTx;

/// Keep at most this many open browser connections around.
const MAX_CLIENTS: usize = 10;

pub struct ReloadServer {
    pub port: u16,
    tx: ReloadTx,
}

impl ReloadServer {
    /// Bind the reload port and spawn the accept and broadcast threads.
    /// Both run for the lifetime of the process; they wind down once every
    /// sender clone is dropped.
    pub fn start() -> Result<Self, ServeError> {
        let (listener, port) = reserve_port()?;
        let clients = Arc::new(Mutex::new(Vec::new()));

        let _incoming = new_thread_ws_incoming(listener, clients.clone());
        let (tx, rx) = channel();
        let _broadcast = new_thread_ws_broadcast(rx, clients);

        tracing::debug!(port, "reload channel ready");

        Ok(Self { port, tx })
    }

    /// A channel end tasks can use to announce changed files.
    pub fn sender(&self) -> ReloadTx {
        self.tx.clone()
    }
}

fn reserve_port() -> Result<(TcpListener, u16), ServeError> {
    let listener = match TcpListener::bind("127.0.0.1:1337") {
        Ok(sock) => sock,
        Err(_) => TcpListener::bind("127.0.0.1:0").map_err(ServeError::Bind)?,
    };

    let addr = listener.local_addr().map_err(ServeError::Bind)?;
    Ok((listener, addr.port()))
}

fn new_thread_ws_incoming(
    server: TcpListener,
    clients: Arc<Mutex<Vec<WebSocket<TcpStream>>>>,
) -> JoinHandle<()> {
    std::thread::spawn(move || {
        for stream in server.incoming() {
            let stream = match stream {
                Ok(stream) => stream,
                Err(e) => {
                    tracing::error!("reload connection failed: {e}");
                    continue;
                }
            };
            match tungstenite::accept(stream) {
                Ok(socket) => clients.lock().unwrap().push(socket),
                Err(e) => tracing::error!("websocket handshake failed: {e}"),
            }
        }
    })
}

fn new_thread_ws_broadcast(
    rx: Receiver<Vec<Utf8PathBuf>>,
    clients: Arc<Mutex<Vec<WebSocket<TcpStream>>>>,
) -> JoinHandle<()> {
    std::thread::spawn(move || {
        while let Ok(changed) = rx.recv() {
            let message = payload(&changed);
            let mut clients = clients.lock().unwrap();
            let mut broken = vec![];

            for (i, socket) in clients.iter_mut().enumerate() {
                match socket.send(message.clone().into()) {
                    Ok(_) => {}
                    Err(tungstenite::error::Error::Io(e)) => {
                        if e.kind() == std::io::ErrorKind::BrokenPipe {
                            broken.push(i);
                        }
                    }
                    Err(e) => {
                        tracing::error!("reload broadcast failed: {e:?}");
                    }
                }
            }

            for i in broken.into_iter().rev() {
                clients.remove(i);
            }

            let len = clients.len();
            if len > MAX_CLIENTS {
                for mut socket in clients.drain(0..len - MAX_CLIENTS) {
                    socket.close(None).ok();
                }
            }
        }
    })
}

fn payload(changed: &[Utf8PathBuf]) -> String {
    serde_json::json!({
        "type": "reload",
        "changed": changed,
    })
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_carries_identities_not_contents() {
        let changed = vec![
            Utf8PathBuf::from("assets/styles/a.css"),
            Utf8PathBuf::from("index.html"),
        ];

        let message: serde_json::Value = serde_json::from_str(&payload(&changed)).unwrap();

        assert_eq!(message["type"], "reload");
        assert_eq!(message["changed"][0], "assets/styles/a.css");
        assert_eq!(message["changed"][1], "index.html");
    }
}
