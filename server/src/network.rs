//! Server network layer handling TCP connections, message dispatch and
//! broadcast fan-out

use crate::roster::Roster;
use crate::world::World;
use log::{debug, error, info, warn};
use shared::{FrameBuffer, Message, Position, SPAWN_POINT};
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::io::{AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, RwLock};

const WELCOME_TEXT: &str = "Welcome to blockworld!";

/// Shared mutable server state: the roster and the block map, guarded as
/// one unit behind a single lock so membership snapshots, world mutation
/// and the broadcasts they trigger stay consistent with each other.
pub struct State {
    pub roster: Roster,
    pub world: World,
    day_length: u32,
}

impl State {
    pub fn new(day_length: u32) -> Self {
        Self {
            roster: Roster::new(),
            world: World::new(),
            day_length,
        }
    }

    /// Handshake for a freshly registered session: identity assignment,
    /// world time, a welcome chat line, the arrival announcement to
    /// everyone else, and the positions of every player already present.
    pub fn welcome(&self, id: u32) {
        let session = match self.roster.get(id) {
            Some(session) => session,
            None => return,
        };

        session.send(&Message::you(id, session.position));
        session.send(&Message::Time {
            now: unix_now(),
            day_length: self.day_length,
        });
        session.send(&Message::talk(WELCOME_TEXT));

        self.roster.broadcast(
            &Message::talk(format!("{} joined the game", session.nick)),
            Some(id),
        );

        for other in self.roster.iter() {
            if other.id != id {
                session.send(&Message::player_position(other.id, other.position));
            }
        }
    }

    /// Dispatches one decoded message from `id`. Only `Nick`, `Position`,
    /// `Talk` and `Block` have server-side behavior; the remaining kinds
    /// are reserved protocol slots and are dropped.
    pub fn handle_message(&mut self, id: u32, message: Message) {
        let kind = message.kind();
        match message {
            Message::Nick { name } => self.handle_nick(id, name),
            Message::Position { x, y, z, rx, ry } => {
                self.handle_position(id, Position { x, y, z, rx, ry })
            }
            Message::Talk { text } => self.handle_talk(id, text),
            Message::Block { p, q, x, y, z, w } => self.handle_block(id, p, q, x, y, z, w),
            Message::Authenticate { .. }
            | Message::Chunk { .. }
            | Message::Disconnect { .. }
            | Message::Key { .. }
            | Message::Light { .. }
            | Message::PlayerPosition { .. }
            | Message::Redraw { .. }
            | Message::Sign { .. }
            | Message::Time { .. }
            | Message::Version { .. }
            | Message::You { .. } => {
                debug!("client {}: ignoring '{}' message", id, kind);
            }
        }
    }

    fn handle_nick(&mut self, id: u32, name: String) {
        let old = match self.roster.get_mut(id) {
            Some(session) => std::mem::replace(&mut session.nick, name.clone()),
            None => return,
        };
        info!("client {}: {} renamed to {}", id, old, name);
        self.roster.broadcast(
            &Message::talk(format!("{} is now known as {}", old, name)),
            None,
        );
    }

    fn handle_position(&mut self, id: u32, position: Position) {
        match self.roster.get_mut(id) {
            Some(session) => session.position = position,
            None => return,
        }
        self.roster
            .broadcast(&Message::player_position(id, position), Some(id));
    }

    fn handle_talk(&mut self, id: u32, text: String) {
        if text.starts_with('/') {
            self.handle_command(id, &text);
            return;
        }

        let line = match self.roster.get(id) {
            Some(session) => format!("{}> {}", session.nick, text),
            None => return,
        };
        info!("{}", line);
        self.roster.broadcast(&Message::talk(line), None);
    }

    fn handle_block(&mut self, id: u32, p: i32, q: i32, x: i32, y: i32, z: i32, w: i32) {
        self.world.apply(x, y, z, w);

        if let Some(session) = self.roster.get(id) {
            if w == 0 {
                info!("{} broke block at ({}, {}, {})", session.nick, x, y, z);
            } else {
                info!(
                    "{} placed block type {} at ({}, {}, {})",
                    session.nick, w, x, y, z
                );
            }
        }

        // Everyone gets the mutation, sender included: the echo is the
        // client's confirmation that the placement was accepted.
        self.roster
            .broadcast(&Message::Block { p, q, x, y, z, w }, None);
    }

    /// Slash commands. The command token is matched case-insensitively and
    /// every reply goes to the issuing session only.
    fn handle_command(&mut self, id: u32, text: &str) {
        let mut parts = text.split_whitespace();
        let command = match parts.next() {
            Some(token) => token.to_ascii_lowercase(),
            None => return,
        };

        match command.as_str() {
            "/list" => {
                let players = self.roster.nicknames().join(", ");
                self.reply(id, format!("Players: {}", players));
            }
            "/goto" => match parts.next() {
                Some(target) => self.goto(id, target),
                // No argument reads as an unknown command.
                None => self.reply(id, format!("Unknown command: {}", command)),
            },
            "/spawn" => self.teleport(id, SPAWN_POINT, "Teleported to spawn".to_string()),
            _ => self.reply(id, format!("Unknown command: {}", command)),
        }
    }

    fn goto(&mut self, id: u32, target: &str) {
        match self.roster.find_by_nick(target) {
            Some(session) => {
                let position = session.position;
                self.teleport(id, position, format!("Teleported to {}", target));
            }
            None => self.reply(id, format!("Player '{}' not found", target)),
        }
    }

    /// Repositions the requester and tells only them. The move is not
    /// broadcast, so other clients keep rendering the old position until
    /// the requester's next ordinary position update.
    fn teleport(&mut self, id: u32, position: Position, confirmation: String) {
        let session = match self.roster.get_mut(id) {
            Some(session) => session,
            None => return,
        };
        session.position = position;
        session.send(&Message::player_position(id, position));
        session.send(&Message::talk(confirmation));
    }

    fn reply(&self, id: u32, text: String) {
        if let Some(session) = self.roster.get(id) {
            session.send(&Message::talk(text));
        }
    }
}

/// The listening server: accepts connections and spawns one session
/// handler per client.
pub struct Server {
    listener: TcpListener,
    state: Arc<RwLock<State>>,
}

impl Server {
    /// Binds the listening socket. A bind failure is the only startup-fatal
    /// error; everything past this point is local to a single connection.
    pub async fn bind(addr: &str, day_length: u32) -> io::Result<Server> {
        let listener = TcpListener::bind(addr).await?;
        info!("listening on {}", listener.local_addr()?);

        Ok(Server {
            listener,
            state: Arc::new(RwLock::new(State::new(day_length))),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept loop. Runs until the process exits; a failed accept is
    /// logged and retried, never fatal.
    pub async fn run(self) {
        info!("server started, accepting connections");

        loop {
            match self.listener.accept().await {
                Ok((stream, addr)) => {
                    let state = Arc::clone(&self.state);
                    tokio::spawn(handle_connection(stream, addr, state));
                }
                Err(e) => {
                    error!("accept failed: {}", e);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                }
            }
        }
    }
}

/// Drives one connection: registers the session, runs the handshake, then
/// pumps frames until EOF or a read error. The disconnect sequence at the
/// end runs exactly once no matter which path terminated the read loop:
/// `unregister` yields the session only on the first call.
async fn handle_connection(stream: TcpStream, addr: SocketAddr, state: Arc<RwLock<State>>) {
    let (read_half, write_half) = stream.into_split();
    let (sender, receiver) = mpsc::unbounded_channel();
    tokio::spawn(write_loop(write_half, receiver));

    let id = {
        let mut state = state.write().await;
        let id = state.roster.register(addr, sender);
        state.welcome(id);
        id
    };

    read_loop(read_half, id, &state).await;

    let mut state = state.write().await;
    if let Some(session) = state.roster.unregister(id) {
        state.roster.broadcast(
            &Message::talk(format!("{} left the game", session.nick)),
            None,
        );
    }
}

/// Reads raw bytes, recovers complete frames, decodes and dispatches them.
/// A frame that fails validation is dropped with a warning; the connection
/// stays open and is not otherwise penalized.
async fn read_loop(mut reader: OwnedReadHalf, id: u32, state: &Arc<RwLock<State>>) {
    let mut frames = FrameBuffer::new();
    let mut buf = [0u8; 1024];

    loop {
        match reader.read(&mut buf).await {
            // Peer closed the stream.
            Ok(0) => break,
            Ok(n) => {
                for line in frames.push(&buf[..n]) {
                    if line.is_empty() {
                        continue;
                    }
                    match Message::decode(&line) {
                        Ok(message) => state.write().await.handle_message(id, message),
                        Err(e) => warn!("client {}: dropping bad frame: {}", id, e),
                    }
                }
            }
            Err(e) => {
                debug!("client {}: read error: {}", id, e);
                break;
            }
        }
    }
}

/// Owns a connection's write half. Frames arrive pre-encoded and are
/// written whole, so a client never observes two messages interleaved
/// mid-frame. Exits when the session is unregistered (its channel closes)
/// or the peer stops accepting writes.
async fn write_loop<W: AsyncWrite + Unpin>(
    mut writer: W,
    mut receiver: mpsc::UnboundedReceiver<String>,
) {
    while let Some(frame) = receiver.recv().await {
        if let Err(e) = writer.write_all(frame.as_bytes()).await {
            debug!("write failed: {}", e);
            break;
        }
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::from_secs(0))
        .as_secs()
}
