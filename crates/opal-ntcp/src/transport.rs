//! NTCP Transport
//!
//! Owns what all sessions share: the session map keyed by remote
//! identity hash, the pool of precomputed DH keypairs, the local router
//! keys and the collaborator handles. Sessions are created here, on
//! outbound dial or inbound accept, and remove themselves from the map
//! exactly once when they terminate.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

use opal_core::{I2npMessage, IdentHash, MessageHandler, NetDb, RouterIdentity, RouterKeys};
use opal_crypto::DhKeyPair;

use crate::config::TransportConfig;
use crate::session::{NtcpSession, SessionStats};

/// The NTCP transport
pub struct Transport {
    config: TransportConfig,
    keys: RouterKeys,
    netdb: Arc<dyn NetDb>,
    dispatcher: Arc<dyn MessageHandler>,
    sessions: Mutex<HashMap<IdentHash, Arc<NtcpSession>>>,
    dh_pool: Mutex<Vec<DhKeyPair>>,
}

impl Transport {
    /// Create a transport around the local router keys and its
    /// collaborators
    pub fn new(
        config: TransportConfig,
        keys: RouterKeys,
        netdb: Arc<dyn NetDb>,
        dispatcher: Arc<dyn MessageHandler>,
    ) -> Arc<Self> {
        Arc::new(Self {
            config,
            keys,
            netdb,
            dispatcher,
            sessions: Mutex::new(HashMap::new()),
            dh_pool: Mutex::new(Vec::new()),
        })
    }

    /// Transport configuration
    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    /// Local router keys
    pub fn keys(&self) -> &RouterKeys {
        &self.keys
    }

    /// Netdb collaborator
    pub fn netdb(&self) -> &dyn NetDb {
        self.netdb.as_ref()
    }

    /// I2NP dispatcher collaborator
    pub fn dispatcher(&self) -> &dyn MessageHandler {
        self.dispatcher.as_ref()
    }

    /// Take a DH keypair from the pool, generating one if it is empty
    pub fn next_dh_keypair(&self) -> DhKeyPair {
        if let Some(keypair) = self.dh_pool.lock().unwrap().pop() {
            return keypair;
        }
        debug!("dh pool empty, generating a keypair");
        DhKeyPair::generate()
    }

    /// Return an unused keypair to the pool
    pub fn reuse_dh_keypair(&self, keypair: DhKeyPair) {
        let mut pool = self.dh_pool.lock().unwrap();
        if pool.len() < self.config.dh_pool_size {
            pool.push(keypair);
        }
    }

    /// Precompute keypairs up to the configured pool size
    pub fn warm_dh_pool(&self) {
        loop {
            {
                let pool = self.dh_pool.lock().unwrap();
                if pool.len() >= self.config.dh_pool_size {
                    return;
                }
            }
            // generate outside the lock; it is slow
            let keypair = DhKeyPair::generate();
            self.dh_pool.lock().unwrap().push(keypair);
        }
    }

    /// Route a message to the session for `ident`, if one exists
    pub fn send_message(&self, ident: &IdentHash, msg: I2npMessage) {
        let session = self.sessions.lock().unwrap().get(ident).cloned();
        match session {
            Some(session) => session.send(msg),
            None => warn!("no ntcp session for {}, message dropped", ident),
        }
    }

    /// Register an established session
    pub(crate) fn add_session(&self, session: Arc<NtcpSession>) {
        let Some(hash) = session.remote_hash() else {
            return;
        };
        let previous = self.sessions.lock().unwrap().insert(hash, session);
        if let Some(previous) = previous {
            warn!("replacing ntcp session for {}", hash);
            previous.terminate();
        }
    }

    /// Drop a session from the map, if it is still the registered one
    pub(crate) fn remove_session(&self, session: &NtcpSession) {
        let Some(hash) = session.remote_hash() else {
            return;
        };
        let mut sessions = self.sessions.lock().unwrap();
        if let Some(current) = sessions.get(&hash) {
            if std::ptr::eq(current.as_ref(), session) {
                sessions.remove(&hash);
            }
        }
    }

    /// Session registered for an identity hash
    pub fn get_session(&self, ident: &IdentHash) -> Option<Arc<NtcpSession>> {
        self.sessions.lock().unwrap().get(ident).cloned()
    }

    /// Number of registered sessions
    pub fn session_count(&self) -> usize {
        self.sessions.lock().unwrap().len()
    }

    /// Statistics for every registered session
    pub fn all_stats(&self) -> Vec<SessionStats> {
        self.sessions
            .lock()
            .unwrap()
            .values()
            .map(|session| SessionStats::from(session.as_ref()))
            .collect()
    }

    /// Open an outbound session to a router we know the identity of
    pub async fn connect(
        self: &Arc<Self>,
        addr: SocketAddr,
        remote_identity: RouterIdentity,
    ) -> std::io::Result<Arc<NtcpSession>> {
        info!("connecting to {} at {}", remote_identity.hash(), addr);
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true).ok();

        let session = NtcpSession::new_initiator(Arc::clone(self), remote_identity);
        tokio::spawn(Arc::clone(&session).run(stream));
        Ok(session)
    }

    /// Bind a listener and accept inbound sessions in the background
    pub async fn listen(self: &Arc<Self>, addr: SocketAddr) -> std::io::Result<SocketAddr> {
        // socket2 for the socket options, then hand over to tokio
        let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
        socket.set_reuse_address(true).ok();
        socket.set_nonblocking(true)?;
        socket.bind(&addr.into())?;
        socket.listen(128)?;
        let std_listener: std::net::TcpListener = socket.into();
        let listener = TcpListener::from_std(std_listener)?;
        let local_addr = listener.local_addr()?;
        info!("ntcp listening on {}", local_addr);

        let transport = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((stream, peer)) => {
                        debug!("inbound connection from {}", peer);
                        stream.set_nodelay(true).ok();
                        let session = NtcpSession::new_responder(Arc::clone(&transport));
                        tokio::spawn(session.run(stream));
                    }
                    Err(e) => {
                        warn!("accept error: {}", e);
                    }
                }
            }
        });
        Ok(local_addr)
    }
}


#[cfg(test)]
mod tests {
    use super::mocks::{MockDispatcher, MockNetDb};
    use super::*;
    use crate::session::SessionState;
    use opal_core::RouterKeys;
    use std::time::Duration;

    struct Router {
        transport: Arc<Transport>,
        netdb: Arc<MockNetDb>,
        dispatcher: Arc<MockDispatcher>,
    }

    fn router_with(config: TransportConfig, keys: RouterKeys) -> Router {
        let netdb = Arc::new(MockNetDb::default());
        let dispatcher = Arc::new(MockDispatcher::default());
        let transport = Transport::new(
            config,
            keys,
            Arc::clone(&netdb) as Arc<dyn NetDb>,
            Arc::clone(&dispatcher) as Arc<dyn MessageHandler>,
        );
        Router {
            transport,
            netdb,
            dispatcher,
        }
    }

    fn router_with_config(config: TransportConfig) -> Router {
        router_with(config, RouterKeys::generate())
    }

    fn router() -> Router {
        router_with_config(TransportConfig::default())
    }

    async fn wait_until(mut condition: impl FnMut() -> bool, secs: u64) -> bool {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(secs);
        while tokio::time::Instant::now() < deadline {
            if condition() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
        condition()
    }

    #[test]
    fn test_dh_pool_reuse() {
        let router = router();
        let keypair = DhKeyPair::generate();
        let public = *keypair.public_key();

        router.transport.reuse_dh_keypair(keypair);
        let recovered = router.transport.next_dh_keypair();
        assert_eq!(recovered.public_key(), &public);
    }

    #[test]
    fn test_dh_pool_warming_respects_cap() {
        let router = router_with_config(TransportConfig {
            dh_pool_size: 2,
            ..Default::default()
        });
        router.transport.warm_dh_pool();

        // a third keypair does not fit the pool
        router.transport.reuse_dh_keypair(DhKeyPair::generate());
        let _ = router.transport.next_dh_keypair();
        let _ = router.transport.next_dh_keypair();
    }

    #[tokio::test]
    async fn test_handshake_and_echo() {
        let alice = router();
        let bob = router();

        let addr = bob
            .transport
            .listen("127.0.0.1:0".parse().unwrap())
            .await
            .unwrap();
        let session = alice
            .transport
            .connect(addr, bob.transport.keys().identity().clone())
            .await
            .unwrap();

        // submitted while still connecting: lands in the delay queue
        let payload = vec![0x5Au8; 100];
        session.send(I2npMessage::new(payload.clone()));

        assert!(wait_until(|| session.is_established(), 30).await);
        assert_eq!(session.remote_hash(), Some(bob.transport.keys().hash()));

        // bob sees alice's database store announcement plus the echo
        assert!(
            wait_until(
                || bob.dispatcher.received.lock().unwrap().len() >= 2,
                30
            )
            .await
        );
        let received = bob.dispatcher.received.lock().unwrap();
        assert_eq!(received[0].as_bytes(), b"database-store");
        assert_eq!(received[1].as_bytes(), &payload[..]);
        assert_eq!(received.len(), 2);
        drop(received);

        // alice sees bob's announcement
        assert!(
            wait_until(
                || !alice.dispatcher.received.lock().unwrap().is_empty(),
                30
            )
            .await
        );

        // both transports registered the session
        assert_eq!(alice.transport.session_count(), 1);
        assert!(
            bob.transport
                .get_session(&alice.transport.keys().hash())
                .is_some()
        );
    }

    #[tokio::test]
    async fn test_certificated_identity_uses_continuation_read() {
        // a 40-byte certificate makes alice's phase 3 spill past the
        // 448-byte initial read, so bob must issue a continuation read
        let alice = router_with(
            TransportConfig::default(),
            RouterKeys::generate_with_certificate(vec![0x5C; 40]),
        );
        let bob = router();

        let addr = bob
            .transport
            .listen("127.0.0.1:0".parse().unwrap())
            .await
            .unwrap();
        let session = alice
            .transport
            .connect(addr, bob.transport.keys().identity().clone())
            .await
            .unwrap();

        assert!(wait_until(|| session.is_established(), 30).await);
        // bob learned the certificated identity through phase 3
        assert!(
            wait_until(
                || bob
                    .transport
                    .get_session(&alice.transport.keys().hash())
                    .is_some(),
                30
            )
            .await
        );
    }

    #[tokio::test]
    async fn test_wrong_identity_gets_no_phase2() {
        let alice = router();
        let bob = router();
        let stranger = RouterKeys::generate();

        let addr = bob
            .transport
            .listen("127.0.0.1:0".parse().unwrap())
            .await
            .unwrap();
        // dial bob but expect a different router behind the address
        let session = alice
            .transport
            .connect(addr, stranger.identity().clone())
            .await
            .unwrap();

        assert!(wait_until(|| session.is_terminated(), 30).await);
        assert_eq!(session.state(), SessionState::Terminated);

        // bob rejected phase 1 and never answered, so alice marks the
        // identity she dialed with as unreachable
        let unreachable = alice.netdb.unreachable.lock().unwrap();
        assert_eq!(unreachable.as_slice(), &[(stranger.hash(), true)]);
        assert_eq!(bob.transport.session_count(), 0);
    }

    #[tokio::test]
    async fn test_idle_termination() {
        let config = TransportConfig {
            idle_timeout_secs: 1,
            ..Default::default()
        };
        let alice = router_with_config(config.clone());
        let bob = router_with_config(config);

        let addr = bob
            .transport
            .listen("127.0.0.1:0".parse().unwrap())
            .await
            .unwrap();
        let session = alice
            .transport
            .connect(addr, bob.transport.keys().identity().clone())
            .await
            .unwrap();

        assert!(wait_until(|| session.is_established(), 30).await);
        // no traffic for the timeout plus a second
        assert!(wait_until(|| session.is_terminated(), 10).await);
        assert!(wait_until(|| alice.transport.session_count() == 0, 5).await);
        assert!(wait_until(|| bob.transport.session_count() == 0, 10).await);
    }

    #[tokio::test]
    async fn test_explicit_terminate_closes_both_ends() {
        let alice = router();
        let bob = router();

        let addr = bob
            .transport
            .listen("127.0.0.1:0".parse().unwrap())
            .await
            .unwrap();
        let session = alice
            .transport
            .connect(addr, bob.transport.keys().identity().clone())
            .await
            .unwrap();
        assert!(wait_until(|| session.is_established(), 30).await);

        session.terminate();
        assert!(wait_until(|| session.is_terminated(), 10).await);
        assert!(wait_until(|| alice.transport.session_count() == 0, 5).await);
        // bob observes the socket close and tears down too
        assert!(wait_until(|| bob.transport.session_count() == 0, 10).await);
    }
}
