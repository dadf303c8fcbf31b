//! Session tracking and broadcast fan-out for the multiplayer server
//!
//! This module handles the server-side roster of connected players:
//! - Session lifecycle (register on accept, unregister on disconnect)
//! - Identity assignment with process-unique, monotonically increasing ids
//! - Broadcast enumeration with optional sender exclusion
//! - Nickname lookup for chat commands
//!
//! The roster is the single source of truth for who is connected; a session
//! is visible to broadcasts from the moment its id is assigned until its
//! disconnect has been processed.

use log::{debug, info};
use shared::{Message, Position, SPAWN_POINT};
use std::collections::BTreeMap;
use std::net::SocketAddr;
use tokio::sync::mpsc;

/// One connected player as the server tracks it.
///
/// The connection handle itself lives in the per-connection tasks; the
/// session only holds the sending end of that connection's outgoing
/// channel, so queuing a frame here can never block on a slow peer.
#[derive(Debug)]
pub struct Session {
    /// Server-assigned identity, unique for the process lifetime.
    pub id: u32,
    /// Peer address, kept for log lines.
    pub addr: SocketAddr,
    /// Self-reported nickname; defaults to `guest<id>`.
    pub nick: String,
    /// Last position this client reported.
    pub position: Position,
    sender: mpsc::UnboundedSender<String>,
}

impl Session {
    fn new(id: u32, addr: SocketAddr, sender: mpsc::UnboundedSender<String>) -> Self {
        Self {
            id,
            addr,
            nick: format!("guest{}", id),
            position: SPAWN_POINT,
            sender,
        }
    }

    /// Queues one message for this client. Frames are written to the wire
    /// in queue order, each as a single contiguous write. A send to a
    /// session whose writer has already gone away is logged and dropped;
    /// the reader side will notice the dead connection and disconnect it.
    pub fn send(&self, message: &Message) {
        self.send_frame(message.encode());
    }

    fn send_frame(&self, frame: String) {
        if self.sender.send(frame).is_err() {
            debug!("client {}: send after writer closed, dropping", self.id);
        }
    }
}

/// The live set of sessions, keyed by id.
///
/// Ids start at 1 and only ever increase, so iterating the underlying
/// ordered map visits sessions in join order, and that order is what `/list`
/// prints and what nickname lookup uses to break ties.
#[derive(Debug)]
pub struct Roster {
    sessions: BTreeMap<u32, Session>,
    next_id: u32,
}

impl Default for Roster {
    fn default() -> Self {
        Self::new()
    }
}

impl Roster {
    pub fn new() -> Self {
        Self {
            sessions: BTreeMap::new(),
            next_id: 1,
        }
    }

    /// Admits a new connection: assigns the next id, creates its session
    /// with the spawn position and a `guest<id>` nickname, and makes it
    /// visible to broadcasts. Returns the assigned id.
    pub fn register(&mut self, addr: SocketAddr, sender: mpsc::UnboundedSender<String>) -> u32 {
        let id = self.next_id;
        self.next_id += 1;

        info!("client {} connected from {}", id, addr);
        self.sessions.insert(id, Session::new(id, addr, sender));
        id
    }

    /// Removes a session, returning it if it was still registered. Calling
    /// this twice for the same id yields `None` the second time, which is
    /// what makes the disconnect sequence safe to reach from overlapping
    /// failure paths.
    pub fn unregister(&mut self, id: u32) -> Option<Session> {
        let session = self.sessions.remove(&id);
        if let Some(session) = &session {
            info!("client {} ({}) disconnected", session.id, session.nick);
        }
        session
    }

    pub fn get(&self, id: u32) -> Option<&Session> {
        self.sessions.get(&id)
    }

    pub fn get_mut(&mut self, id: u32) -> Option<&mut Session> {
        self.sessions.get_mut(&id)
    }

    /// Finds a session by nickname. Uniqueness is not enforced; with
    /// duplicates the first match in roster order wins.
    pub fn find_by_nick(&self, nick: &str) -> Option<&Session> {
        self.sessions.values().find(|s| s.nick == nick)
    }

    /// All nicknames in roster order, for `/list`.
    pub fn nicknames(&self) -> Vec<String> {
        self.sessions.values().map(|s| s.nick.clone()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Session> {
        self.sessions.values()
    }

    /// Sends a message to every registered session except `exclude`. The
    /// membership observed is whatever is registered at the moment of the
    /// call; a failed send to one target never aborts delivery to the rest.
    pub fn broadcast(&self, message: &Message, exclude: Option<u32>) {
        let frame = message.encode();
        for session in self.sessions.values() {
            if Some(session.id) == exclude {
                continue;
            }
            session.send_frame(frame.clone());
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_addr() -> SocketAddr {
        "127.0.0.1:4080".parse().unwrap()
    }

    fn register(roster: &mut Roster) -> (u32, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (roster.register(test_addr(), tx), rx)
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<String>) -> Vec<String> {
        let mut frames = Vec::new();
        while let Ok(frame) = rx.try_recv() {
            frames.push(frame);
        }
        frames
    }

    #[test]
    fn test_ids_are_monotonic_from_one() {
        let mut roster = Roster::new();
        let (a, _rx_a) = register(&mut roster);
        let (b, _rx_b) = register(&mut roster);
        assert_eq!(a, 1);
        assert_eq!(b, 2);
        assert_eq!(roster.len(), 2);
    }

    #[test]
    fn test_ids_not_reused_after_unregister() {
        let mut roster = Roster::new();
        let (a, _rx_a) = register(&mut roster);
        roster.unregister(a);
        let (b, _rx_b) = register(&mut roster);
        assert_eq!(b, a + 1);
    }

    #[test]
    fn test_default_nick_and_spawn_position() {
        let mut roster = Roster::new();
        let (id, _rx) = register(&mut roster);
        let session = roster.get(id).unwrap();
        assert_eq!(session.nick, "guest1");
        assert_eq!(session.position, SPAWN_POINT);
    }

    #[test]
    fn test_unregister_twice_returns_none() {
        let mut roster = Roster::new();
        let (id, _rx) = register(&mut roster);
        assert!(roster.unregister(id).is_some());
        assert!(roster.unregister(id).is_none());
        assert!(roster.is_empty());
    }

    #[test]
    fn test_find_by_nick_first_match_wins() {
        let mut roster = Roster::new();
        let (a, _rx_a) = register(&mut roster);
        let (b, _rx_b) = register(&mut roster);
        roster.get_mut(a).unwrap().nick = "Ann".to_string();
        roster.get_mut(b).unwrap().nick = "Ann".to_string();

        let found = roster.find_by_nick("Ann").unwrap();
        assert_eq!(found.id, a);
        assert!(roster.find_by_nick("Bob").is_none());
    }

    #[test]
    fn test_nicknames_in_roster_order() {
        let mut roster = Roster::new();
        let (a, _rx_a) = register(&mut roster);
        let (b, _rx_b) = register(&mut roster);
        roster.get_mut(a).unwrap().nick = "Zed".to_string();
        roster.get_mut(b).unwrap().nick = "Ann".to_string();
        assert_eq!(roster.nicknames(), vec!["Zed", "Ann"]);
    }

    #[test]
    fn test_broadcast_excludes_sender() {
        let mut roster = Roster::new();
        let (a, mut rx_a) = register(&mut roster);
        let (_b, mut rx_b) = register(&mut roster);

        roster.broadcast(&Message::talk("hello"), Some(a));

        assert!(drain(&mut rx_a).is_empty());
        assert_eq!(drain(&mut rx_b), vec!["T,hello\n".to_string()]);
    }

    #[test]
    fn test_broadcast_without_exclusion_reaches_all() {
        let mut roster = Roster::new();
        let (_a, mut rx_a) = register(&mut roster);
        let (_b, mut rx_b) = register(&mut roster);

        roster.broadcast(&Message::talk("hi"), None);

        assert_eq!(drain(&mut rx_a), vec!["T,hi\n".to_string()]);
        assert_eq!(drain(&mut rx_b), vec!["T,hi\n".to_string()]);
    }

    #[test]
    fn test_broadcast_survives_dead_target() {
        let mut roster = Roster::new();
        let (_a, rx_a) = register(&mut roster);
        let (_b, mut rx_b) = register(&mut roster);

        // Simulate a's writer task having exited.
        drop(rx_a);

        roster.broadcast(&Message::talk("still here"), None);
        assert_eq!(drain(&mut rx_b), vec!["T,still here\n".to_string()]);
    }

    #[test]
    fn test_unregistered_session_not_broadcast_to() {
        let mut roster = Roster::new();
        let (a, mut rx_a) = register(&mut roster);
        let (_b, mut rx_b) = register(&mut roster);

        roster.unregister(a);
        roster.broadcast(&Message::talk("bye"), None);

        assert!(drain(&mut rx_a).is_empty());
        assert_eq!(drain(&mut rx_b).len(), 1);
    }
}
