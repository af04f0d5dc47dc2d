//! In-memory registry of currently advertised games.
//!
//! Each advertised game is one [`GameEntry`], created when a host pokes the
//! lobby and destroyed when the host reports the game started or cancelled,
//! or when the timer sweep gives up on it. Lookups bind a datagram to a prior
//! exchange: the host's own token for pokes, the server-issued token for
//! refresh replies. A datagram that matches neither the endpoint nor the
//! token of any entry is treated as spoofed and ignored by the caller.

use bitflags::bitflags;
use log::warn;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use shared::{CreateGameInfo, Guid};
use std::net::SocketAddrV4;
use std::time::Instant;

bitflags! {
    /// Per-entry protocol state.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct EntryFlags: u8 {
        /// Game details have arrived; the entry may be advertised.
        const RECEIVED = 1 << 0;
        /// A refresh query is outstanding.
        const EXPECTED = 1 << 1;
        /// The outstanding refresh query has been retried once.
        const RETRY_SENT = 1 << 2;
    }
}

/// One advertised game.
#[derive(Debug)]
pub struct GameEntry {
    /// The host's observed endpoint, the source of its poke.
    pub addr: SocketAddrV4,
    /// Learned from the host's search reply; `None` until one arrives.
    pub session_identifier: Option<Guid>,
    /// Learned from the host's search reply; `None` until one arrives.
    pub create_game_info: Option<CreateGameInfo>,
    /// Token the host asserted in its poke.
    pub client_rand_value: u32,
    /// Token the lobby issued; the host must echo it in refresh replies.
    pub server_rand_value: u32,
    pub flags: EntryFlags,
    /// Last time this entry made progress (creation or a received update).
    pub time: Instant,
}

/// Ordered collection of [`GameEntry`] records with linear-scan lookups.
///
/// The population is bounded by live hosts and additionally capped to keep a
/// flood of bogus pokes from growing memory without bound.
pub struct GameRegistry {
    entries: Vec<GameEntry>,
    max_entries: usize,
    rng: StdRng,
}

impl GameRegistry {
    /// Creates an empty registry capped at `max_entries` live games.
    pub fn new(max_entries: usize) -> Self {
        GameRegistry {
            entries: Vec::new(),
            max_entries,
            rng: StdRng::from_entropy(),
        }
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when no games are registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates the live entries in registration order.
    pub fn entries(&self) -> impl Iterator<Item = &GameEntry> {
        self.entries.iter()
    }

    /// Entry at `index`, or `None` when out of range.
    pub fn entry(&self, index: usize) -> Option<&GameEntry> {
        self.entries.get(index)
    }

    /// Mutable entry at `index`, or `None` when out of range.
    pub fn entry_mut(&mut self, index: usize) -> Option<&mut GameEntry> {
        self.entries.get_mut(index)
    }

    /// Matches a poke against a known host: exact source endpoint and the
    /// host's own token.
    pub fn find_by_client_token(
        &self,
        addr: SocketAddrV4,
        client_rand_value: u32,
    ) -> Option<usize> {
        self.entries
            .iter()
            .position(|e| e.addr == addr && e.client_rand_value == client_rand_value)
    }

    /// Matches a search reply against a prior solicitation: exact source
    /// endpoint and the token the lobby sent there.
    pub fn find_by_server_token(
        &self,
        addr: SocketAddrV4,
        server_rand_value: u32,
    ) -> Option<usize> {
        self.entries
            .iter()
            .position(|e| e.addr == addr && e.server_rand_value == server_rand_value)
    }

    /// Creates an entry for a newly poking host and returns its index, or
    /// `None` when the registry is full.
    // TODO: evict the oldest idle entry instead of refusing when full.
    pub fn allocate(
        &mut self,
        addr: SocketAddrV4,
        client_rand_value: u32,
        now: Instant,
    ) -> Option<usize> {
        if self.entries.len() >= self.max_entries {
            return None;
        }
        let server_rand_value = self.fresh_server_token();
        self.entries.push(GameEntry {
            addr,
            session_identifier: None,
            create_game_info: None,
            client_rand_value,
            server_rand_value,
            flags: EntryFlags::EXPECTED,
            time: now,
        });
        Some(self.entries.len() - 1)
    }

    /// Re-arms an existing entry for a repeated hosted poke: fresh server
    /// token, refresh outstanding, progress clock reset. Returns the new
    /// token so the caller can re-solicit the game details.
    pub fn rearm(&mut self, index: usize, now: Instant) -> u32 {
        let token = self.fresh_server_token();
        let entry = &mut self.entries[index];
        entry.server_rand_value = token;
        entry.flags.insert(EntryFlags::EXPECTED);
        entry.flags.remove(EntryFlags::RETRY_SENT);
        entry.time = now;
        token
    }

    /// Removes the entry at `index`. An out-of-range index is an internal
    /// error: it is logged and nothing changes.
    pub fn free(&mut self, index: usize) {
        if index >= self.entries.len() {
            warn!("Internal error: tried to free a nonexistent game record (index {index})");
            return;
        }
        self.entries.remove(index);
    }

    /// Unpredictable, nonzero token distinct from every live entry's.
    fn fresh_server_token(&mut self) -> u32 {
        loop {
            let value: u32 = self.rng.gen();
            if value != 0 && !self.entries.iter().any(|e| e.server_rand_value == value) {
                return value;
            }
        }
    }
}
