//! Data socket module to receive image streams via network.
//!
use std::net::SocketAddr;

use anyhow::Result;
use futures::StreamExt;
use tokio::{
    net::{TcpListener, TcpStream},
    task::JoinHandle,
};
use tokio_util::codec::{Framed, LengthDelimitedCodec};

use crate::FrameSender;

/// Bind the data socket and forward every received message to the frame router.
pub async fn spawn_data_socket(
    incoming_tx: FrameSender,
    addr: &str,
) -> Result<JoinHandle<Result<()>>> {
    let socket: SocketAddr = addr.parse()?;
    let listener = TcpListener::bind(socket).await?;
    log::info!("Data socket listening on {}", socket);

    Ok(tokio::spawn(async move {
        loop {
            let (socket, _peer_addr) = listener.accept().await?;
            let incoming_tx = incoming_tx.clone();
            tokio::spawn(async move {
                if let Err(e) = handle_incoming(incoming_tx, socket).await {
                    log::warn!("Data connection failed: {:#}", e);
                }
            });
        }
    }))
}

async fn handle_incoming(incoming_tx: FrameSender, stream: TcpStream) -> Result<()> {
    let addr = stream.peer_addr()?;
    log::info!("{}: New TCP connection", &addr);

    let mut transport = Framed::new(stream, LengthDelimitedCodec::new());

    while let Some(frame) = transport.next().await {
        let frame = frame?;
        log::debug!("{}: Received {} bytes", &addr, frame.len());

        let mut slot = incoming_tx.send_ref().await?;
        slot.clear();
        slot.extend_from_slice(&frame[..]);
    }

    log::info!("{}: Connection closed", &addr);
    Ok(())
}
