//! # Voxel World Server Library
//!
//! This library provides the authoritative server implementation for the
//! multiplayer voxel world. It tracks every connected player, maintains the
//! shared map of placed and removed blocks, and relays each client's state
//! to every other connected client.
//!
//! ## Core Responsibilities
//!
//! ### State Relay
//! The server is the single authority on who is connected, what they are
//! called, and where they last reported themselves. It never simulates
//! movement or physics (positions are relayed verbatim), but every piece
//! of shared state flows through it.
//!
//! ### Session Management
//! Handles the complete lifecycle of client connections including:
//! - Connection acceptance and identity assignment
//! - The join handshake (identity, world time, welcome, peer positions)
//! - Disconnection handling with a guaranteed single farewell broadcast
//!
//! ### World Bookkeeping
//! Applies block placements and removals to the shared block map and echoes
//! each mutation to every client so all views converge on the same world.
//!
//! ## Architecture Design
//!
//! ### Task-per-Connection
//! Each accepted connection gets a reader task (bytes → frames → dispatch)
//! and a writer task (queued frames → socket). The accept loop itself never
//! blocks on per-client I/O.
//!
//! ### Single Lock Boundary
//! The roster and the block map live in one `State` value behind one lock.
//! Handling a message mutates state and fans out the resulting broadcast
//! under the same guard, so a broadcast can never observe a half-registered
//! or half-removed session.
//!
//! ### Line-Oriented Text Protocol
//! Clients speak comma-separated, newline-terminated UTF-8 text (see the
//! `shared` crate). Frames are validated at decode time; a malformed frame
//! costs only itself, never the connection.
//!
//! ## Module Organization
//!
//! ### Roster Module (`roster`)
//! Session records and the live membership set:
//! - Monotonic id assignment and join-order iteration
//! - Broadcast enumeration with optional sender exclusion
//! - Nickname lookup for chat commands
//!
//! ### World Module (`world`)
//! The shared block map:
//! - Last-write-wins placement
//! - Idempotent removal (block type 0)
//!
//! ### Network Module (`network`)
//! Accept loop, per-connection tasks, message dispatch and the slash
//! command handler.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::network::Server;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Bind the listener; 600 is the in-game day length in seconds
//!     // reported to clients in the time handshake.
//!     let server = Server::bind("0.0.0.0:4080", 600).await?;
//!
//!     // Run the accept loop - this serves clients until the process
//!     // exits, spawning one session handler per connection.
//!     server.run().await;
//!
//!     Ok(())
//! }
//! ```

pub mod network;
pub mod roster;
pub mod world;
