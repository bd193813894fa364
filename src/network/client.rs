//! Client side of the node RPC protocol
//!
//! A client holds at most one framed connection to its peer. The
//! connection is opened on first use and reused while it stays healthy.

use crate::core::Transaction;
use crate::network::message::{Message, Version};
use crate::network::peer::PeerError;
use crate::network::server::{connect_to_peer, MessageCodec};
use futures::sink::SinkExt;
use futures::stream::StreamExt;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_util::codec::Framed;

type Connection = Framed<TcpStream, MessageCodec>;

/// RPC client for a single remote node
#[derive(Debug)]
pub struct NodeClient {
    addr: String,
    timeout: Duration,
    conn: Mutex<Option<Connection>>,
}

impl NodeClient {
    /// Create a client for `addr`. No connection is made until the first call.
    pub fn new(addr: impl Into<String>, timeout: Duration) -> Self {
        Self {
            addr: addr.into(),
            timeout,
            conn: Mutex::new(None),
        }
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Exchange versions with the remote node
    pub async fn handshake(&self, version: Version) -> Result<Version, PeerError> {
        match self.call(Message::Handshake(version)).await? {
            Message::Version(version) => Ok(version),
            _ => Err(PeerError::UnexpectedResponse("Version")),
        }
    }

    /// Submit a transaction to the remote node
    pub async fn handle_transaction(&self, tx: Transaction) -> Result<(), PeerError> {
        match self.call(Message::HandleTransaction(tx)).await? {
            Message::Ack => Ok(()),
            _ => Err(PeerError::UnexpectedResponse("Ack")),
        }
    }

    /// Send one request and wait for its response within the call deadline
    async fn call(&self, request: Message) -> Result<Message, PeerError> {
        let mut slot = self.conn.lock().await;
        let pooled = slot.take();

        let exchange = async {
            let reused = pooled.is_some();
            match self.exchange(pooled, request.clone()).await {
                // A pooled connection may have been closed by the remote
                Err(e) if reused && e.is_connection_failure() => {
                    self.exchange(None, request).await
                }
                other => other,
            }
        };

        let (conn, response) = tokio::time::timeout(self.timeout, exchange)
            .await
            .map_err(|_| PeerError::Timeout(self.addr.clone()))??;
        *slot = Some(conn);

        match response {
            Message::Reject(reject) => Err(PeerError::Rejected {
                code: reject.code,
                reason: reject.reason,
            }),
            response => Ok(response),
        }
    }

    async fn exchange(
        &self,
        conn: Option<Connection>,
        request: Message,
    ) -> Result<(Connection, Message), PeerError> {
        let mut conn = match conn {
            Some(conn) => conn,
            None => Framed::new(connect_to_peer(&self.addr).await?, MessageCodec),
        };

        conn.send(request).await?;
        let response = conn.next().await.ok_or(PeerError::Disconnected)??;

        Ok((conn, response))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::TransactionBuilder;
    use crate::crypto::PrivateKey;
    use crate::network::message::{RejectCode, RejectMessage, PROTOCOL_VERSION};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::net::TcpListener;

    /// Answer up to `per_connection` requests on each accepted connection,
    /// then close it. Returns the address and an accepted-connection counter.
    async fn serve(
        per_connection: usize,
        reply: fn(Message) -> Message,
    ) -> (String, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let accepted = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&accepted);
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                counter.fetch_add(1, Ordering::SeqCst);
                tokio::spawn(async move {
                    let mut framed = Framed::new(stream, MessageCodec);
                    for _ in 0..per_connection {
                        let Some(Ok(request)) = framed.next().await else {
                            return;
                        };
                        if framed.send(reply(request)).await.is_err() {
                            return;
                        }
                    }
                });
            }
        });

        (addr, accepted)
    }

    fn echo_version(request: Message) -> Message {
        match request {
            Message::Handshake(version) => Message::Version(version),
            _ => Message::Ack,
        }
    }

    fn version() -> Version {
        Version {
            version: PROTOCOL_VERSION.to_string(),
            height: 3,
            listen_addr: "127.0.0.1:1".to_string(),
            peer_list: vec![],
        }
    }

    fn client(addr: &str) -> NodeClient {
        NodeClient::new(addr, Duration::from_secs(2))
    }

    #[tokio::test]
    async fn test_connection_is_reused() {
        let (addr, accepted) = serve(usize::MAX, echo_version).await;
        let client = client(&addr);

        for _ in 0..3 {
            assert_eq!(client.handshake(version()).await.unwrap(), version());
        }
        assert_eq!(accepted.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_reconnects_after_remote_close() {
        let (addr, accepted) = serve(1, echo_version).await;
        let client = client(&addr);

        client.handshake(version()).await.unwrap();
        // Let the remote close the pooled connection
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(client.handshake(version()).await.unwrap(), version());
        assert_eq!(accepted.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_reject_reply() {
        let (addr, _) = serve(usize::MAX, |_| {
            Message::Reject(RejectMessage::new(RejectCode::Validation, "bad transaction"))
        })
        .await;

        let tx = TransactionBuilder::new()
            .output(PrivateKey::generate().address(), 1)
            .build();

        match client(&addr).handle_transaction(tx).await {
            Err(PeerError::Rejected { code, reason }) => {
                assert_eq!(code, RejectCode::Validation);
                assert_eq!(reason, "bad transaction");
            }
            other => panic!("expected reject, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unexpected_response() {
        let (addr, _) = serve(usize::MAX, |_| Message::Ack).await;

        assert!(matches!(
            client(&addr).handshake(version()).await,
            Err(PeerError::UnexpectedResponse("Version"))
        ));
    }

    #[tokio::test]
    async fn test_silent_peer_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((stream, _)) = listener.accept().await {
                held.push(stream);
            }
        });

        let client = NodeClient::new(addr.clone(), Duration::from_millis(200));
        match client.handshake(version()).await {
            Err(PeerError::Timeout(timed_out)) => assert_eq!(timed_out, addr),
            other => panic!("expected timeout, got {:?}", other),
        }
    }
}
