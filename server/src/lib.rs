//! # Crash Game Server Library
//!
//! This library implements the authoritative server for a multiplayer
//! "crash" betting game. Players register over a WebSocket, bet during an
//! open window, watch a multiplier climb and try to cash out before the
//! round crashes at a point drawn when it started.
//!
//! ## Core Responsibilities
//!
//! ### Authoritative Round State
//! The server alone decides the crash point, advances the multiplier and
//! settles balances. Clients only ever see the results.
//!
//! ### Player Management
//! Handles the lifecycle of players on the table:
//! - Registration with unique display names and a starting balance
//! - Bet validation and debiting
//! - Manual and automatic cash-outs
//! - Forfeit of open bets on disconnect
//!
//! ### Event Broadcasting
//! Every phase change and player action is announced to all clients, with
//! confirmations and errors sent only to the client that caused them. A new
//! client receives a full snapshot before any incremental update.
//!
//! ## Architecture Design
//!
//! ### Single Owner Event Loop
//! One task owns the registry, the live round and the history. Connection
//! tasks forward parsed client events to it over a channel, and the phase
//! timer fires inside the same loop, so timers and client actions never
//! race on shared state.
//!
//! ### Round Phases
//! `Idle -> Countdown -> Running -> Crashed -> (Idle | Countdown)`. The first
//! bet starts a 5 second countdown, the multiplier then steps every 100 ms
//! until the crash point, and a 3 second cooldown follows each crash.
//!
//! ## Module Organization
//!
//! - `crash`: crash point draw and multiplier growth
//! - `registry`: player records, bets and cash-outs
//! - `history`: bounded logs of finished rounds
//! - `game`: the round state machine
//! - `scheduler`: the single pending phase timer
//! - `gateway`: per-connection outbound queues
//! - `network`: WebSocket listener and the main event loop
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::config::GameConfig;
//! use server::network::Server;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
//!     let server = Server::new("127.0.0.1:3000", GameConfig::default()).await?;
//!     server.run().await
//! }
//! ```

pub mod config;
pub mod crash;
pub mod error;
pub mod game;
pub mod gateway;
pub mod history;
pub mod network;
pub mod registry;
pub mod scheduler;
pub mod utils;
