//! TCP front for any [`ReaderDevice`], so a simulated reader can stand in for
//! hardware on the network.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info, warn};

use crate::device::ReaderDevice;
use crate::error::STATUS_COMMUNICATION_ERROR;
use crate::protocol::{dispatch, encode_line, parse_line, ReaderRequest, ReaderResponse};

/// Accept clients forever. Each connection is served on its own task; device
/// calls run on the blocking pool because they may sleep for a scan budget.
pub async fn serve(listener: TcpListener, device: Arc<dyn ReaderDevice>) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!("Reader server listening on {}", addr);
    }

    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                info!("Client connected: {}", addr);
                let device = Arc::clone(&device);
                tokio::spawn(async move {
                    if let Err(e) = handle_client(stream, addr, device).await {
                        warn!("Client {} error: {}", addr, e);
                    }
                    info!("Client {} disconnected", addr);
                });
            }
            Err(e) => {
                error!("Failed to accept connection: {}", e);
            }
        }
    }
}

async fn handle_client(
    stream: TcpStream,
    addr: SocketAddr,
    device: Arc<dyn ReaderDevice>,
) -> std::io::Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut buf_reader = BufReader::new(reader);
    let mut line = String::new();

    loop {
        line.clear();
        if buf_reader.read_line(&mut line).await? == 0 {
            return Ok(());
        }
        if line.trim().is_empty() {
            continue;
        }

        let response = match parse_line::<ReaderRequest>(&line) {
            Ok(request) => {
                debug!(client = %addr, ?request, "Request received");
                let device = Arc::clone(&device);
                tokio::task::spawn_blocking(move || dispatch(device.as_ref(), &request))
                    .await
                    .unwrap_or_else(|e| {
                        error!("Device call panicked: {}", e);
                        ReaderResponse::status(STATUS_COMMUNICATION_ERROR)
                    })
            }
            Err(e) => {
                warn!(client = %addr, "Rejected request: {}", e);
                ReaderResponse::status(e.status())
            }
        };

        let encoded = match encode_line(&response) {
            Ok(encoded) => encoded,
            Err(e) => {
                error!("Failed to encode response: {}", e);
                encode_line(&ReaderResponse::status(e.status()))
                    .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?
            }
        };
        writer.write_all(encoded.as_bytes()).await?;
    }
}
