//! TCP server and connection handling
//!
//! Accepts incoming connections and answers each request frame with one
//! response frame.

use crate::network::message::{Message, MAGIC, MAX_MESSAGE_SIZE};
use crate::network::node::Node;
use crate::network::peer::PeerError;
use bytes::{Buf, BufMut, BytesMut};
use futures::sink::SinkExt;
use futures::stream::StreamExt;
use std::io::{Error, ErrorKind};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::codec::{Decoder, Encoder, Framed};

/// Frame header: magic (4) + big-endian payload length (4)
const HEADER_LEN: usize = 8;

/// Message codec for length-prefixed framing
#[derive(Debug, Default, Clone, Copy)]
pub struct MessageCodec;

impl Encoder<Message> for MessageCodec {
    type Error = Error;

    fn encode(&mut self, item: Message, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let data = item
            .to_bytes()
            .map_err(|e| Error::new(ErrorKind::InvalidData, e.to_string()))?;

        if data.len() > MAX_MESSAGE_SIZE {
            return Err(Error::new(
                ErrorKind::InvalidData,
                format!("Message too large: {} bytes", data.len()),
            ));
        }

        dst.reserve(HEADER_LEN + data.len());
        dst.put_slice(&MAGIC);
        dst.put_u32(data.len() as u32);
        dst.put_slice(&data);

        Ok(())
    }
}

impl Decoder for MessageCodec {
    type Item = Message;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < HEADER_LEN {
            return Ok(None);
        }

        if src[..4] != MAGIC {
            return Err(Error::new(ErrorKind::InvalidData, "Invalid magic bytes"));
        }

        let len = u32::from_be_bytes([src[4], src[5], src[6], src[7]]) as usize;
        if len > MAX_MESSAGE_SIZE {
            return Err(Error::new(
                ErrorKind::InvalidData,
                format!("Message too large: {} bytes", len),
            ));
        }

        if src.len() < HEADER_LEN + len {
            src.reserve(HEADER_LEN + len - src.len());
            return Ok(None);
        }

        src.advance(HEADER_LEN);
        let data = src.split_to(len);

        let msg = Message::from_bytes(&data)
            .map_err(|e| Error::new(ErrorKind::InvalidData, e.to_string()))?;

        Ok(Some(msg))
    }
}

/// TCP server for accepting connections
#[derive(Debug)]
pub struct Server {
    listener: TcpListener,
}

impl Server {
    /// Bind to `addr` and create the server
    pub async fn bind(addr: &str) -> Result<Self, Error> {
        let listener = TcpListener::bind(addr).await?;
        log::info!("Server listening on {}", addr);

        Ok(Self { listener })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, Error> {
        self.listener.local_addr()
    }

    /// Accept incoming connections
    pub async fn accept(&self) -> Result<(TcpStream, SocketAddr), Error> {
        self.listener.accept().await
    }
}

/// Connect to a peer
pub async fn connect_to_peer(addr: &str) -> Result<TcpStream, PeerError> {
    TcpStream::connect(addr)
        .await
        .map_err(|e| PeerError::ConnectionFailed(format!("{}: {}", addr, e)))
}

/// Serve requests on one inbound connection until the remote hangs up
pub async fn serve_connection(
    stream: TcpStream,
    addr: SocketAddr,
    node: Arc<Node>,
) -> Result<(), PeerError> {
    let mut framed = Framed::new(stream, MessageCodec);

    loop {
        match framed.next().await {
            Some(Ok(request)) => {
                log::debug!("Received {} from {}", request.type_name(), addr);
                let response = node.respond(request).await;
                framed.send(response).await?;
            }
            Some(Err(e)) => {
                log::warn!("Error reading from {}: {}", addr, e);
                return Err(e.into());
            }
            None => {
                log::debug!("Connection from {} closed", addr);
                return Ok(());
            }
        }
    }
}
