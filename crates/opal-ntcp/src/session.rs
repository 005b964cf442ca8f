//! NTCP Session
//!
//! One session per TCP connection. The session drives the four-phase
//! handshake, then settles into a single task that multiplexes socket
//! reads, the outbound queue and the idle-termination timer. All mutable
//! session state lives inside that task, so nothing here needs more than
//! the handful of counters and the state flag shared with observers.
//!
//! The outbound channel doubles as the delay queue: messages submitted
//! while the handshake is still running sit in it and drain in FIFO
//! order once the session is established. On termination whatever is
//! still queued goes back to the transport for rerouting, exactly once.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Notify};
use tokio::time::{sleep_until, Instant};
use tracing::{debug, error, info, warn};

use opal_core::{I2npMessage, IdentHash, RouterIdentity};
use opal_crypto::{AesCbcDecryption, AesCbcEncryption, CryptoError};

use crate::constants::{NTCP_BUFFER_SIZE, NTCP_DEFAULT_PHASE3_SIZE, PHASE1_SIZE, PHASE2_SIZE};
use crate::errors::{NtcpError, NtcpResult};
use crate::frame::{FrameReader, FrameWriter};
use crate::handshake::{InitiatorHandshake, Phase3Status, ResponderHandshake};
use crate::transport::Transport;

/// Session lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// TCP connected, handshake not started
    Connecting,
    /// Initiator sent phase 1
    Phase1Sent,
    /// Responder sent phase 2
    Phase2Sent,
    /// Initiator sent phase 3
    Phase3Sent,
    /// Handshake complete, frame engine running
    Established,
    /// Session torn down
    Terminated,
}

/// Which side of the handshake this session drives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Initiator,
    Responder,
}

/// An NTCP session over one TCP connection
pub struct NtcpSession {
    transport: Arc<Transport>,
    role: Role,
    state: Mutex<SessionState>,
    remote_identity: Mutex<Option<RouterIdentity>>,
    queue_tx: mpsc::UnboundedSender<I2npMessage>,
    queue_rx: Mutex<Option<mpsc::UnboundedReceiver<I2npMessage>>>,
    shutdown: Notify,
    terminated: AtomicBool,
    bytes_sent: AtomicU64,
    bytes_received: AtomicU64,
}

impl NtcpSession {
    fn new(
        transport: Arc<Transport>,
        role: Role,
        remote_identity: Option<RouterIdentity>,
    ) -> Arc<Self> {
        let (queue_tx, queue_rx) = mpsc::unbounded_channel();
        Arc::new(Self {
            transport,
            role,
            state: Mutex::new(SessionState::Connecting),
            remote_identity: Mutex::new(remote_identity),
            queue_tx,
            queue_rx: Mutex::new(Some(queue_rx)),
            shutdown: Notify::new(),
            terminated: AtomicBool::new(false),
            bytes_sent: AtomicU64::new(0),
            bytes_received: AtomicU64::new(0),
        })
    }

    /// Outbound session towards a known remote identity
    pub(crate) fn new_initiator(
        transport: Arc<Transport>,
        remote_identity: RouterIdentity,
    ) -> Arc<Self> {
        Self::new(transport, Role::Initiator, Some(remote_identity))
    }

    /// Inbound session; the remote identity is learned in phase 3
    pub(crate) fn new_responder(transport: Arc<Transport>) -> Arc<Self> {
        Self::new(transport, Role::Responder, None)
    }

    /// Current lifecycle state
    pub fn state(&self) -> SessionState {
        *self.state.lock().unwrap()
    }

    fn set_state(&self, state: SessionState) {
        *self.state.lock().unwrap() = state;
    }

    /// Handshake side
    pub fn role(&self) -> Role {
        self.role
    }

    /// Whether the frame engine is running
    pub fn is_established(&self) -> bool {
        self.state() == SessionState::Established
    }

    /// Whether the session has been torn down
    pub fn is_terminated(&self) -> bool {
        self.terminated.load(Ordering::SeqCst)
    }

    /// Remote identity hash, once known
    pub fn remote_hash(&self) -> Option<IdentHash> {
        self.remote_identity
            .lock()
            .unwrap()
            .as_ref()
            .map(|identity| identity.hash())
    }

    /// Bytes written to the socket
    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent.load(Ordering::Relaxed)
    }

    /// Bytes read from the socket
    pub fn bytes_received(&self) -> u64 {
        self.bytes_received.load(Ordering::Relaxed)
    }

    /// Queue a message for this session
    ///
    /// Messages submitted before establishment wait in the delay queue
    /// and drain in submission order once the session comes up.
    pub fn send(&self, msg: I2npMessage) {
        if self.queue_tx.send(msg).is_err() {
            warn!("session terminated, message dropped");
        }
    }

    /// Tear the session down
    ///
    /// Safe to call any number of times; the teardown itself runs once.
    pub fn terminate(&self) {
        self.shutdown.notify_one();
        let rx = self.queue_rx.lock().unwrap().take();
        if let Some(rx) = rx {
            // the run loop never started or is already gone
            self.finish(rx);
        }
    }

    /// Drive the session over its socket until it ends
    pub(crate) async fn run(self: Arc<Self>, stream: TcpStream) {
        let rx = self.queue_rx.lock().unwrap().take();
        let Some(mut rx) = rx else {
            // terminated before the connection came up
            return;
        };
        if let Err(e) = Arc::clone(&self).drive(stream, &mut rx).await {
            error!("ntcp session error: {}", e);
        }
        self.finish(rx);
    }

    async fn drive(
        self: Arc<Self>,
        mut stream: TcpStream,
        rx: &mut mpsc::UnboundedReceiver<I2npMessage>,
    ) -> NtcpResult<()> {
        let (encryption, decryption) = match self.role {
            Role::Initiator => self.initiator_handshake(&mut stream).await?,
            Role::Responder => self.responder_handshake(&mut stream).await?,
        };
        self.set_state(SessionState::Established);
        self.transport.add_session(Arc::clone(&self));
        self.run_established(stream, encryption, decryption, rx).await
    }

    async fn initiator_handshake(
        &self,
        stream: &mut TcpStream,
    ) -> NtcpResult<(AesCbcEncryption, AesCbcDecryption)> {
        let remote = self
            .remote_identity
            .lock()
            .unwrap()
            .clone()
            .ok_or(NtcpError::InvalidState("initiator without remote identity"))?;
        let remote_hash = remote.hash();
        let mut handshake = InitiatorHandshake::new(self.transport.next_dh_keypair(), remote);

        stream.write_all(&handshake.phase1_bytes()).await?;
        self.set_state(SessionState::Phase1Sent);
        debug!("phase 1 sent");

        let mut phase2 = [0u8; PHASE2_SIZE];
        if let Err(e) = stream.read_exact(&mut phase2).await {
            // the descriptor we dialed with is stale
            warn!("phase 2 read error: {}, wrong ident assumed", e);
            self.transport.netdb().set_unreachable(&remote_hash, true);
            if let Some(keypair) = handshake.take_keypair() {
                self.transport.reuse_dh_keypair(keypair);
            }
            return Err(e.into());
        }
        debug!("phase 2 received");
        if let Err(e) = handshake.handle_phase2(&phase2) {
            match &e {
                NtcpError::IncorrectHash => {
                    error!("incorrect hash in phase 2");
                    self.transport.netdb().set_unreachable(&remote_hash, true);
                }
                NtcpError::Crypto(CryptoError::WeakSharedSecret) => {
                    warn!("weak shared secret, session aborted");
                }
                _ => {}
            }
            if let Some(keypair) = handshake.take_keypair() {
                self.transport.reuse_dh_keypair(keypair);
            }
            return Err(e);
        }

        let phase3 = handshake.phase3_bytes(self.transport.keys())?;
        stream.write_all(&phase3).await?;
        self.set_state(SessionState::Phase3Sent);
        debug!("phase 3 sent: {} bytes", phase3.len());

        let mut phase4 = vec![0u8; handshake.phase4_len()];
        if let Err(e) = stream.read_exact(&mut phase4).await {
            // this router doesn't like us
            warn!("phase 4 read error: {}", e);
            self.transport.netdb().set_unreachable(&remote_hash, true);
            return Err(e.into());
        }
        handshake.handle_phase4(&mut phase4, self.transport.keys())?;
        debug!("phase 4 received");
        info!("ntcp session to {} connected", remote_hash);

        handshake.into_ciphers()
    }

    async fn responder_handshake(
        &self,
        stream: &mut TcpStream,
    ) -> NtcpResult<(AesCbcEncryption, AesCbcDecryption)> {
        let local_ident = self.transport.keys().hash();
        let mut handshake = ResponderHandshake::new(self.transport.next_dh_keypair());

        let mut phase1 = [0u8; PHASE1_SIZE];
        stream.read_exact(&mut phase1).await?;
        debug!("phase 1 received");
        // a phase 1 addressed to someone else gets no phase 2
        handshake.handle_phase1(&phase1, &local_ident)?;

        let phase2 = handshake.phase2_bytes()?;
        stream.write_all(&phase2).await?;
        self.set_state(SessionState::Phase2Sent);
        debug!("phase 2 sent");

        let mut chunk = vec![0u8; NTCP_DEFAULT_PHASE3_SIZE];
        stream.read_exact(&mut chunk).await?;
        let mut status = handshake.handle_phase3(&mut chunk, &local_ident)?;
        while let Phase3Status::NeedBytes(more) = status {
            debug!("waiting for {} more phase-3 bytes", more);
            let mut extra = vec![0u8; more];
            stream.read_exact(&mut extra).await?;
            status = handshake.handle_phase3(&mut extra, &local_ident)?;
        }
        debug!("phase 3 verified");

        let phase4 = handshake.phase4_bytes(self.transport.keys())?;
        stream.write_all(&phase4).await?;
        debug!("phase 4 sent");

        let (encryption, decryption, identity) = handshake.into_ciphers()?;
        info!("ntcp session from {} connected", identity.hash());
        *self.remote_identity.lock().unwrap() = Some(identity);
        Ok((encryption, decryption))
    }

    async fn run_established(
        &self,
        stream: TcpStream,
        encryption: AesCbcEncryption,
        decryption: AesCbcDecryption,
        rx: &mut mpsc::UnboundedReceiver<I2npMessage>,
    ) -> NtcpResult<()> {
        let (mut read_half, mut write_half) = stream.into_split();
        let mut writer = FrameWriter::new(encryption);
        let mut reader = FrameReader::new(decryption);

        // tell the peer immediately who we are: a time sync, then our
        // own router info
        let keepalive = writer.frame_keepalive()?;
        write_half.write_all(&keepalive).await?;
        self.bytes_sent
            .fetch_add(keepalive.len() as u64, Ordering::Relaxed);
        let store = self.transport.dispatcher().create_database_store();
        let frame = writer.frame_message(store.as_bytes())?;
        write_half.write_all(&frame).await?;
        self.bytes_sent
            .fetch_add(frame.len() as u64, Ordering::Relaxed);

        let idle = self.transport.config().idle_timeout();
        let mut deadline = Instant::now() + idle;
        let mut buf = vec![0u8; NTCP_BUFFER_SIZE];
        loop {
            tokio::select! {
                read = read_half.read(&mut buf) => {
                    let n = read?;
                    if n == 0 {
                        debug!("peer closed the connection");
                        return Ok(());
                    }
                    self.bytes_received.fetch_add(n as u64, Ordering::Relaxed);
                    for msg in reader.feed(&buf[..n])? {
                        self.transport.dispatcher().handle_message(msg);
                    }
                    deadline = Instant::now() + idle;
                }
                queued = rx.recv() => {
                    let Some(msg) = queued else {
                        return Ok(());
                    };
                    let frame = writer.frame_message(msg.as_bytes())?;
                    write_half.write_all(&frame).await?;
                    self.bytes_sent.fetch_add(frame.len() as u64, Ordering::Relaxed);
                    deadline = Instant::now() + idle;
                }
                _ = self.shutdown.notified() => {
                    debug!("session shutdown requested");
                    return Ok(());
                }
                _ = sleep_until(deadline) => {
                    info!("no activity for {}s", idle.as_secs());
                    return Ok(());
                }
            }
        }
    }

    /// One-shot teardown: mark terminated, hand undelivered messages
    /// back to the transport, leave the session map
    fn finish(&self, mut rx: mpsc::UnboundedReceiver<I2npMessage>) {
        if self.terminated.swap(true, Ordering::SeqCst) {
            return;
        }
        self.set_state(SessionState::Terminated);
        self.transport.remove_session(self);

        rx.close();
        let remote = self.remote_hash();
        let mut resubmitted = 0;
        while let Ok(msg) = rx.try_recv() {
            if let Some(hash) = &remote {
                self.transport.send_message(hash, msg);
                resubmitted += 1;
            }
        }
        if resubmitted > 0 {
            warn!("ntcp session: {} messages returned to transport", resubmitted);
        }
        info!("ntcp session terminated");
    }
}

/// Session statistics snapshot
#[derive(Debug, Clone)]
pub struct SessionStats {
    pub role: Role,
    pub state: SessionState,
    pub remote: Option<IdentHash>,
    pub bytes_sent: u64,
    pub bytes_received: u64,
}

impl From<&NtcpSession> for SessionStats {
    fn from(session: &NtcpSession) -> Self {
        Self {
            role: session.role(),
            state: session.state(),
            remote: session.remote_hash(),
            bytes_sent: session.bytes_sent(),
            bytes_received: session.bytes_received(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TransportConfig;
    use crate::transport::mocks::{MockDispatcher, MockNetDb};
    use opal_core::RouterKeys;

    fn test_transport() -> Arc<Transport> {
        Transport::new(
            TransportConfig::default(),
            RouterKeys::generate(),
            Arc::new(MockNetDb::default()),
            Arc::new(MockDispatcher::default()),
        )
    }

    #[test]
    fn test_new_session_is_connecting() {
        let transport = test_transport();
        let remote = RouterKeys::generate();
        let session = NtcpSession::new_initiator(transport, remote.identity().clone());

        assert_eq!(session.state(), SessionState::Connecting);
        assert_eq!(session.role(), Role::Initiator);
        assert!(!session.is_established());
        assert_eq!(session.remote_hash(), Some(remote.hash()));
        assert_eq!(session.bytes_sent(), 0);
    }

    #[test]
    fn test_responder_has_no_identity_until_phase3() {
        let transport = test_transport();
        let session = NtcpSession::new_responder(transport);
        assert!(session.remote_hash().is_none());
    }

    #[test]
    fn test_terminate_is_idempotent() {
        let transport = test_transport();
        let remote = RouterKeys::generate();
        let session = NtcpSession::new_initiator(transport, remote.identity().clone());
        session.send(I2npMessage::from_slice(b"queued before connect"));

        session.terminate();
        assert!(session.is_terminated());
        assert_eq!(session.state(), SessionState::Terminated);

        // second invocation observes the same state and does nothing
        session.terminate();
        assert!(session.is_terminated());
        assert_eq!(session.state(), SessionState::Terminated);
    }

    #[test]
    fn test_send_after_terminate_drops() {
        let transport = test_transport();
        let remote = RouterKeys::generate();
        let session = NtcpSession::new_initiator(transport, remote.identity().clone());
        session.terminate();

        // must not panic or queue anywhere
        session.send(I2npMessage::from_slice(b"late"));
    }

    #[test]
    fn test_stats_snapshot() {
        let transport = test_transport();
        let remote = RouterKeys::generate();
        let session = NtcpSession::new_initiator(transport, remote.identity().clone());

        let stats = SessionStats::from(session.as_ref());
        assert_eq!(stats.role, Role::Initiator);
        assert_eq!(stats.state, SessionState::Connecting);
        assert_eq!(stats.remote, Some(remote.hash()));
        assert_eq!(stats.bytes_sent, 0);
        assert_eq!(stats.bytes_received, 0);
    }
}
