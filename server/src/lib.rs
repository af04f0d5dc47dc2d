//! # Lobby Server Library
//!
//! This library implements the rendezvous service that lets game hosts
//! advertise their games and lets prospective clients find them and punch a
//! path through their NATs. It keeps no state across restarts: everything it
//! knows it learned from the datagrams of the last couple of minutes.
//!
//! ## Core Responsibilities
//!
//! ### Game Advertisement
//! Hosts poke the lobby when they open, start, or cancel a game. A hosted
//! poke creates a registry entry and triggers a solicitation for the game's
//! details; the entry is only advertised to searching clients once those
//! details have arrived from the host itself.
//!
//! ### Liveness Without Trust
//! The lobby never believes a single party for long. Entries are refreshed on
//! a timer, refresh replies must echo a per-entry random token back from the
//! same endpoint the query went to, and hosts that fall silent age out on a
//! fixed schedule.
//!
//! ### Join Assistance and NAT Discovery
//! Join requests are relayed to the advertising host together with the
//! client's observed endpoint. A separate echo service reflects a client's
//! external address back at it, twice if the observed port differs from the
//! port the client thinks it is using.
//!
//! ## Architecture Design
//!
//! ### Single-Threaded Event Loop
//! All state lives on one task: sockets, registry, and counters. The loop
//! waits on both sockets with a one-second tick, processes whatever arrives,
//! and then runs the timed sweep. No locks, no shared mutability, and
//! deterministic behavior under load.
//!
//! ### Absorbing Errors
//! Startup failures are the only fatal ones. At runtime every malformed
//! datagram, spoofed reply, failed send, and refused allocation turns into a
//! counter bump, never an abort.
//!
//! ## Module Organization
//!
//! - [`registry`]: the in-memory table of advertised games and the token
//!   lookups that bind replies to prior solicitations.
//! - [`network`]: the socket pair, protocol dispatch, timed sweep, and event
//!   loop.
//! - [`counters`]: monotonic instrumentation with change-suppressed
//!   reporting.

pub mod counters;
pub mod network;
pub mod registry;
