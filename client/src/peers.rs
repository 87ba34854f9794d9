//! Direct peer links used during a match
//!
//! Opponents connect to each other over plain TCP using the same frame
//! format as the server link. The only traffic is LINES_ADDED: every line
//! cleared locally in rising-tide mode is announced to all peers, and what
//! peers announce is summed into a pending-garbage counter that the next
//! local tick consumes.
//!
//! A failing peer socket only removes that peer; the match goes on with the
//! remaining ones.

use crate::error::{ClientError, Result};
use crate::state::{join_named, lock, spawn_named, StopSignal};
use log::{debug, info, warn};
use shared::{encode_frame, read_frame, Decoded, Message, MessageType};
use std::io::{self, BufReader, Write};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Most lines one LINES_ADDED may carry: a full board.
pub const MAX_LINES_ADDED: u32 = 20;

struct PeerLink {
    id: u64,
    addr: String,
    stream: TcpStream,
    writer: Arc<Mutex<TcpStream>>,
}

#[derive(Default)]
struct PeerSetInner {
    links: Vec<PeerLink>,
    readers: Vec<JoinHandle<()>>,
    next_id: u64,
    registered: usize,
    closed: bool,
}

/// Opponent connections of the current session.
#[derive(Default)]
pub struct PeerSet {
    inner: Mutex<PeerSetInner>,
    changed: Condvar,
    pending_garbage: Mutex<u32>,
}

impl PeerSet {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Connected peers right now.
    pub fn len(&self) -> usize {
        lock(&self.inner).links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Peers ever registered this session, including ones that dropped.
    pub fn registered(&self) -> usize {
        lock(&self.inner).registered
    }

    pub fn is_closed(&self) -> bool {
        lock(&self.inner).closed
    }

    /// Adds a connected peer and starts its reader thread.
    pub fn register(self: &Arc<Self>, stream: TcpStream) -> Result<u64> {
        let addr = stream
            .peer_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| "<unknown>".to_string());
        let peer_err = |source: io::Error| ClientError::PeerSocket {
            addr: addr.clone(),
            source,
        };

        let _ = stream.set_nodelay(true);
        let read_half = stream.try_clone().map_err(peer_err)?;
        let write_half = stream.try_clone().map_err(peer_err)?;

        let id = {
            let mut inner = lock(&self.inner);
            if inner.closed {
                let _ = stream.shutdown(Shutdown::Both);
                return Err(peer_err(io::Error::new(
                    io::ErrorKind::NotConnected,
                    "peer set already closed",
                )));
            }
            let id = inner.next_id;
            inner.next_id += 1;
            inner.registered += 1;
            inner.links.push(PeerLink {
                id,
                addr: addr.clone(),
                stream,
                writer: Arc::new(Mutex::new(write_half)),
            });
            id
        };

        let set = Arc::clone(self);
        let reader_addr = addr.clone();
        match spawn_named("peer-reader", move || reader_loop(set, id, reader_addr, read_half)) {
            Ok(handle) => lock(&self.inner).readers.push(handle),
            Err(e) => {
                self.remove(id);
                return Err(e);
            }
        }

        info!("Peer {} connected ({})", id, addr);
        self.changed.notify_all();
        Ok(id)
    }

    /// Drops one peer. Unknown ids are ignored.
    pub fn remove(&self, id: u64) {
        let removed = {
            let mut inner = lock(&self.inner);
            let pos = inner.links.iter().position(|l| l.id == id);
            pos.map(|pos| inner.links.remove(pos))
        };
        if let Some(link) = removed {
            let _ = link.stream.shutdown(Shutdown::Both);
            info!("Peer {} ({}) left the session", link.id, link.addr);
            self.changed.notify_all();
        }
    }

    /// Sends LINES_ADDED to every peer. Peers that fail are removed.
    /// Returns how many peers got the message.
    pub fn broadcast_lines(&self, lines: u32) -> usize {
        let frame = match encode_frame(&Message::lines_added(lines)) {
            Ok(frame) => frame,
            Err(e) => {
                warn!("Could not encode line broadcast: {}", e);
                return 0;
            }
        };

        let targets: Vec<(u64, String, Arc<Mutex<TcpStream>>)> = lock(&self.inner)
            .links
            .iter()
            .map(|l| (l.id, l.addr.clone(), Arc::clone(&l.writer)))
            .collect();

        let mut reached = 0;
        for (id, addr, writer) in targets {
            let sent = {
                let mut stream = lock(&writer);
                stream.write_all(&frame).and_then(|_| stream.flush())
            };
            match sent {
                Ok(()) => reached += 1,
                Err(source) => {
                    warn!("{}", ClientError::PeerSocket { addr, source });
                    self.remove(id);
                }
            }
        }
        reached
    }

    pub fn add_garbage(&self, lines: u32) {
        let mut pending = lock(&self.pending_garbage);
        *pending = pending.saturating_add(lines);
    }

    /// Takes everything received since the last call.
    pub fn take_pending_garbage(&self) -> u32 {
        std::mem::take(&mut *lock(&self.pending_garbage))
    }

    /// Waits until `count` peers have registered. Gives up when `timeout`
    /// passes, the set is closed, or `cancelled` returns true.
    pub fn wait_for(
        &self,
        count: usize,
        timeout: Option<Duration>,
        cancelled: impl Fn() -> bool,
    ) -> bool {
        const SLICE: Duration = Duration::from_millis(50);
        let deadline = timeout.map(|t| Instant::now() + t);

        let mut inner = lock(&self.inner);
        loop {
            if inner.registered >= count {
                return true;
            }
            if inner.closed {
                return false;
            }

            let mut wait = SLICE;
            if let Some(deadline) = deadline {
                let now = Instant::now();
                if now >= deadline {
                    return false;
                }
                wait = wait.min(deadline - now);
            }

            inner = self
                .changed
                .wait_timeout(inner, wait)
                .unwrap_or_else(PoisonError::into_inner)
                .0;

            if cancelled() {
                return false;
            }
        }
    }

    /// Disconnects every peer and joins their reader threads. Idempotent.
    pub fn close(&self) -> Result<()> {
        let (links, readers) = {
            let mut inner = lock(&self.inner);
            inner.closed = true;
            (
                std::mem::take(&mut inner.links),
                std::mem::take(&mut inner.readers),
            )
        };
        self.changed.notify_all();

        for link in &links {
            let _ = link.stream.shutdown(Shutdown::Both);
        }
        let mut result = Ok(());
        for reader in readers {
            if let Err(e) = join_named("peer-reader", reader) {
                result = Err(e);
            }
        }
        *lock(&self.pending_garbage) = 0;
        result
    }
}

fn reader_loop(set: Arc<PeerSet>, id: u64, addr: String, stream: TcpStream) {
    let mut reader = BufReader::new(stream);
    loop {
        match read_frame(&mut reader) {
            Ok(Decoded::Message(msg)) if msg.kind() == MessageType::LinesAdded => {
                match msg.parse_number::<u32>() {
                    Ok(lines) if lines <= MAX_LINES_ADDED => {
                        debug!("Peer {} sent {} lines", id, lines);
                        set.add_garbage(lines);
                    }
                    Ok(lines) => {
                        warn!("Dropping peer {} ({}): {} lines in one report", id, addr, lines);
                        break;
                    }
                    Err(e) => {
                        warn!("Dropping peer {} ({}): {}", id, addr, e);
                        break;
                    }
                }
            }
            Ok(Decoded::Message(msg)) => {
                debug!("Ignoring {:?} from peer {}", msg.kind(), id);
            }
            Ok(Decoded::Unrecognized(tag)) => {
                debug!("Ignoring unknown tag {} from peer {}", tag, id);
            }
            Err(e) => {
                if !set.is_closed() {
                    warn!("Peer {} ({}) read failed: {}", id, addr, e);
                }
                break;
            }
        }
    }
    set.remove(id);
}

/// Dials a peer, retrying while its listener may not be up yet.
pub fn dial(addr: &str, attempts: u32, delay: Duration, stop: &StopSignal) -> Result<TcpStream> {
    let attempts = attempts.max(1);
    let mut attempt = 1;
    loop {
        match TcpStream::connect(addr) {
            Ok(stream) => return Ok(stream),
            Err(source) if attempt >= attempts || stop.is_stopped() => {
                return Err(ClientError::PeerSocket {
                    addr: addr.to_string(),
                    source,
                })
            }
            Err(e) => {
                debug!("Dial {} failed (attempt {}): {}", addr, attempt, e);
                attempt += 1;
                if stop.wait_timeout(delay) {
                    return Err(ClientError::PeerSocket {
                        addr: addr.to_string(),
                        source: io::Error::new(io::ErrorKind::Interrupted, "dial cancelled"),
                    });
                }
            }
        }
    }
}

/// Accept thread for inbound peers of one session.
pub struct PeerListener {
    local_addr: SocketAddr,
    stop: StopSignal,
    handle: Option<JoinHandle<usize>>,
}

impl PeerListener {
    /// Binds and starts accepting until `expected` peers arrived or
    /// [`PeerListener::stop_and_join`] is called.
    pub fn spawn(
        host: &str,
        port: u16,
        expected: usize,
        peers: Arc<PeerSet>,
        poll_interval: Duration,
    ) -> Result<Self> {
        let bind_addr = format!("{}:{}", host, port);
        let bind_err = |source: io::Error| ClientError::PeerSocket {
            addr: bind_addr.clone(),
            source,
        };
        let listener = TcpListener::bind(&bind_addr).map_err(bind_err)?;
        listener.set_nonblocking(true).map_err(bind_err)?;
        let local_addr = listener.local_addr().map_err(bind_err)?;
        info!("Peer listener on {} waiting for {} peers", local_addr, expected);

        let stop = StopSignal::new();
        let thread_stop = stop.clone();
        let handle = spawn_named("peer-listener", move || {
            accept_loop(listener, expected, peers, thread_stop, poll_interval)
        })?;

        Ok(Self {
            local_addr,
            stop,
            handle: Some(handle),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stops accepting and joins the thread. Returns the number of peers
    /// it accepted; later calls return 0.
    pub fn stop_and_join(&mut self) -> Result<usize> {
        self.stop.stop();
        match self.handle.take() {
            Some(handle) => join_named("peer-listener", handle),
            None => Ok(0),
        }
    }
}

impl Drop for PeerListener {
    fn drop(&mut self) {
        self.stop.stop();
    }
}

fn accept_loop(
    listener: TcpListener,
    expected: usize,
    peers: Arc<PeerSet>,
    stop: StopSignal,
    poll_interval: Duration,
) -> usize {
    let mut accepted = 0;
    while accepted < expected && !stop.is_stopped() {
        match listener.accept() {
            Ok((stream, addr)) => {
                if let Err(e) = stream.set_nonblocking(false) {
                    warn!("Rejecting peer {}: {}", addr, e);
                    continue;
                }
                match peers.register(stream) {
                    Ok(_) => accepted += 1,
                    Err(e) => warn!("Could not register peer {}: {}", addr, e),
                }
            }
            Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => {
                stop.wait_timeout(poll_interval);
            }
            Err(e) => {
                warn!("Peer accept failed: {}", e);
                thread::sleep(poll_interval);
            }
        }
    }
    debug!("Peer listener done after {} peers", accepted);
    accepted
}
