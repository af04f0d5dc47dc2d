//! Server network layer: the UDP socket pair, protocol dispatch, and the
//! timed refresh sweep that keeps the registry honest.
//!
//! Everything here runs on one task. The event loop waits on both sockets and
//! a one-second tick, handles whatever arrives, and then runs the timed sweep
//! so a burst of inbound traffic can never starve expiry and refresh work.

use crate::counters::GameServerCounters;
use crate::registry::{EntryFlags, GameRegistry};
use log::{debug, info, warn};
use shared::{
    decode, EchoExternalAddress, FrameError, GameServerPoke, HostedGameSearchQuery,
    HostedGameSearchReply, JoinHelpRequest, JoinRequest, Message, NetEndpoint, Packet,
    PacketHeader, PokeStatus, RequestExternalAddress, GAME_IDENTIFIER, MAX_DATAGRAM_LEN,
};
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::net::UdpSocket;
use tokio::time::interval;

/// How long a poked host gets to answer the first solicitation.
const INITIAL_REPLY_TIME: Duration = Duration::from_secs(4);
/// Silence after which a known game is re-queried.
const UPDATE_TIME: Duration = Duration::from_secs(60);
/// Silence after which the outstanding re-query is retried once.
const RETRY_TIME: Duration = Duration::from_secs(64);
/// Silence after which a known game is given up on.
const GIVE_UP_TIME: Duration = Duration::from_secs(68);

/// Fatal conditions while bringing the socket pair up. Everything after a
/// successful bind is absorbed into counters instead.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("primary port {port} leaves no room for the secondary port")]
    PortRange { port: u16 },
    #[error("failed to bind UDP port {port}")]
    Bind {
        port: u16,
        #[source]
        source: std::io::Error,
    },
}

enum Inbound {
    Primary(std::io::Result<(usize, SocketAddr)>),
    Secondary(std::io::Result<(usize, SocketAddr)>),
    Tick,
}

/// The lobby server: socket pair, game registry, and counters, owned by a
/// single event-loop task.
///
/// The secondary socket exists only so clients can aim traffic one port above
/// the advertised one during NAT probing; both sockets feed the same
/// handlers, and every reply leaves through the primary.
pub struct GameServer {
    primary: UdpSocket,
    secondary: UdpSocket,
    registry: GameRegistry,
    counters: GameServerCounters,
    reported: GameServerCounters,
}

impl GameServer {
    /// Binds the primary socket on `port` and the secondary on `port + 1`,
    /// both on all interfaces. Either bind failing is fatal.
    pub async fn bind(port: u16, max_games: usize) -> Result<GameServer, StartupError> {
        let secondary_port = port.checked_add(1).ok_or(StartupError::PortRange { port })?;
        let primary = Self::bind_socket(port).await?;
        let secondary = Self::bind_socket(secondary_port).await?;
        info!("Lobby listening on ports {port} (primary) and {secondary_port} (secondary)");

        Ok(GameServer {
            primary,
            secondary,
            registry: GameRegistry::new(max_games),
            counters: GameServerCounters::default(),
            reported: GameServerCounters::default(),
        })
    }

    async fn bind_socket(port: u16) -> Result<UdpSocket, StartupError> {
        UdpSocket::bind(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port))
            .await
            .map_err(|source| StartupError::Bind { port, source })
    }

    /// Runs the event loop forever: wait for a datagram on either socket or a
    /// one-second tick, handle it, then run the timed sweep.
    pub async fn run(&mut self) {
        let mut primary_buf = [0u8; MAX_DATAGRAM_LEN];
        let mut secondary_buf = [0u8; MAX_DATAGRAM_LEN];
        let mut tick = interval(Duration::from_secs(1));

        loop {
            let event = tokio::select! {
                result = self.primary.recv_from(&mut primary_buf) => Inbound::Primary(result),
                result = self.secondary.recv_from(&mut secondary_buf) => Inbound::Secondary(result),
                _ = tick.tick() => Inbound::Tick,
            };

            match event {
                Inbound::Primary(Ok((len, from))) => {
                    self.handle_datagram(&primary_buf[..len], from).await;
                }
                Inbound::Secondary(Ok((len, from))) => {
                    self.handle_datagram(&secondary_buf[..len], from).await;
                }
                Inbound::Primary(Err(error)) | Inbound::Secondary(Err(error)) => {
                    debug!("Socket receive error: {error}");
                }
                Inbound::Tick => {
                    self.counters.report(&mut self.reported);
                }
            }

            self.do_timed_updates(Instant::now()).await;
        }
    }

    /// Validates one datagram and dispatches it. Malformed frames bump their
    /// counter and vanish; sound frames with bodies the lobby does not handle
    /// vanish silently.
    async fn handle_datagram(&mut self, datagram: &[u8], from: SocketAddr) {
        let SocketAddr::V4(from) = from else {
            return; // IPv4 only
        };

        let packet = match decode(datagram) {
            Ok(Some(packet)) => packet,
            Ok(None) => {
                self.counters.num_packets_received += 1;
                self.counters.num_bytes_received += datagram.len() as u64;
                return;
            }
            Err(error) => {
                match error {
                    FrameError::MinSize => self.counters.num_min_size_errors += 1,
                    FrameError::SizeField => self.counters.num_size_field_errors += 1,
                    FrameError::TypeField => self.counters.num_type_field_errors += 1,
                    FrameError::Checksum => self.counters.num_checksum_field_errors += 1,
                }
                debug!("Dropping malformed datagram from {from}: {error:?}");
                return;
            }
        };
        self.counters.num_packets_received += 1;
        self.counters.num_bytes_received += datagram.len() as u64;

        let header = packet.header;
        match packet.message {
            Message::JoinRequest(request) => {
                self.handle_join_request(&header, &request, from).await;
            }
            Message::HostedGameSearchQuery(query) => {
                self.handle_search_query(&header, &query, from).await;
            }
            Message::HostedGameSearchReply(reply) => self.handle_search_reply(&reply, from),
            Message::GameServerPoke(poke) => self.handle_poke(&poke, from).await,
            Message::RequestExternalAddress(request) => {
                self.handle_external_address_request(&header, &request, from)
                    .await;
            }
            // Server-to-client messages; nothing to do if one comes back.
            Message::JoinHelpRequest(_) | Message::EchoExternalAddress(_) => {}
        }
    }

    /// Forwards a join request to every host advertising the requested
    /// session, stamping in the client's observed endpoint. The client gets
    /// no reply; the host is expected to contact it directly.
    async fn handle_join_request(
        &mut self,
        header: &PacketHeader,
        request: &JoinRequest,
        from: SocketAddrV4,
    ) {
        info!("Game join request from {from}");

        let help = Packet::with_ids(
            header.source_player_net_id,
            header.dest_player_net_id,
            Message::JoinHelpRequest(JoinHelpRequest {
                session_identifier: request.session_identifier,
                client_addr: NetEndpoint::from(from),
                return_port: request.return_port,
                password: request.password,
            }),
        );

        let hosts: Vec<SocketAddrV4> = self
            .registry
            .entries()
            .filter(|entry| entry.session_identifier == Some(request.session_identifier))
            .map(|entry| entry.addr)
            .collect();
        for addr in hosts {
            self.send_packet(&help, addr).await;
        }
    }

    /// Answers a client search with one reply per game whose details have
    /// actually arrived. An empty registry answers with silence.
    async fn handle_search_query(
        &mut self,
        header: &PacketHeader,
        query: &HostedGameSearchQuery,
        from: SocketAddrV4,
    ) {
        if query.game_identifier != GAME_IDENTIFIER {
            debug!("Search query for a different game from {from}");
            return;
        }
        info!("Game search query from {from}");

        let replies: Vec<Packet> = self
            .registry
            .entries()
            .filter(|entry| entry.flags.contains(EntryFlags::RECEIVED))
            .filter_map(|entry| {
                let session_identifier = entry.session_identifier?;
                let create_game_info = entry.create_game_info?;
                info!("  Game creator: {}", create_game_info.creator_name());
                Some(Packet::with_ids(
                    header.source_player_net_id,
                    header.dest_player_net_id,
                    Message::HostedGameSearchReply(HostedGameSearchReply {
                        session_identifier,
                        create_game_info,
                        host_address: NetEndpoint::from(entry.addr),
                        time_stamp: 0,
                    }),
                ))
            })
            .collect();
        for reply in replies {
            self.send_packet(&reply, from).await;
        }
    }

    /// Accepts a host's answer to a refresh query, but only when the source
    /// endpoint and echoed token match a solicitation we actually sent.
    fn handle_search_reply(&mut self, reply: &HostedGameSearchReply, from: SocketAddrV4) {
        let Some(index) = self.registry.find_by_server_token(from, reply.time_stamp) else {
            // Not requested, or a stale or forged token.
            debug!("Unsolicited search reply from {from}");
            return;
        };

        info!("Received host info from {from}");
        let Some(entry) = self.registry.entry_mut(index) else {
            return;
        };
        entry.addr = from;
        entry.session_identifier = Some(reply.session_identifier);
        entry.create_game_info = Some(reply.create_game_info);
        entry.flags = EntryFlags::RECEIVED;
        entry.time = Instant::now();
    }

    /// Host lifecycle pokes: hosted registers (or re-arms) an entry and
    /// solicits details; started and cancelled retire it.
    async fn handle_poke(&mut self, poke: &GameServerPoke, from: SocketAddrV4) {
        match PokeStatus::from_status_code(poke.status_code) {
            Some(PokeStatus::Hosted) => {
                let now = Instant::now();
                let token = match self.registry.find_by_client_token(from, poke.rand_value) {
                    Some(index) => self.registry.rearm(index, now),
                    None => {
                        self.counters.num_new_host += 1;
                        let index = match self.registry.allocate(from, poke.rand_value, now) {
                            Some(index) => index,
                            None => {
                                self.counters.num_failed_game_info_allocs += 1;
                                return;
                            }
                        };
                        let Some(entry) = self.registry.entry(index) else {
                            return;
                        };
                        entry.server_rand_value
                    }
                };

                info!("Game hosted from {from}");
                self.send_refresh_query(from, token).await;
                self.counters.num_games_hosted += 1;
            }
            Some(PokeStatus::Started) => {
                if let Some(index) = self.registry.find_by_client_token(from, poke.rand_value) {
                    info!("Game started: {from}");
                    self.registry.free(index);
                    self.counters.num_games_started += 1;
                }
            }
            Some(PokeStatus::Cancelled) => {
                if let Some(index) = self.registry.find_by_client_token(from, poke.rand_value) {
                    info!("Game cancelled: {from}");
                    self.registry.free(index);
                    self.counters.num_games_cancelled += 1;
                }
            }
            None => debug!("Poke with unknown status {} from {from}", poke.status_code),
        }
    }

    /// Echoes the observed endpoint back to the requester. When the client's
    /// own idea of its port differs from what we observed, a second echo is
    /// aimed at that internal port so the client can tell whether its NAT
    /// remaps ports.
    async fn handle_external_address_request(
        &mut self,
        header: &PacketHeader,
        request: &RequestExternalAddress,
        from: SocketAddrV4,
    ) {
        debug!("External address request from {from}");
        let observed = NetEndpoint::from(from);

        let first = Packet::with_ids(
            header.source_player_net_id,
            header.dest_player_net_id,
            Message::EchoExternalAddress(EchoExternalAddress {
                addr: observed,
                reply_port: from.port(),
            }),
        );
        self.send_packet(&first, from).await;

        if request.internal_port != from.port() {
            let second = Packet::with_ids(
                header.source_player_net_id,
                header.dest_player_net_id,
                Message::EchoExternalAddress(EchoExternalAddress {
                    addr: observed,
                    reply_port: request.internal_port,
                }),
            );
            let to = SocketAddrV4::new(*from.ip(), request.internal_port);
            self.send_packet(&second, to).await;
        }
    }

    /// Walks the registry, oldest business first, applying the expiry and
    /// refresh rules. Iterates in reverse so removals leave pending indices
    /// untouched.
    async fn do_timed_updates(&mut self, now: Instant) {
        for index in (0..self.registry.len()).rev() {
            let Some(entry) = self.registry.entry(index) else {
                continue;
            };
            let (addr, flags, server_rand_value, idle) = (
                entry.addr,
                entry.flags,
                entry.server_rand_value,
                now.saturating_duration_since(entry.time),
            );

            if idle >= INITIAL_REPLY_TIME && !flags.contains(EntryFlags::RECEIVED) {
                info!("Dropping game: no initial host info from {addr}");
                self.registry.free(index);
                self.counters.num_dropped_hosted_pokes += 1;
            } else if flags.contains(EntryFlags::RECEIVED) && idle >= UPDATE_TIME {
                if idle >= GIVE_UP_TIME {
                    info!("Dropping game: lost contact with host {addr}");
                    self.registry.free(index);
                    self.counters.num_games_dropped += 1;
                } else if !flags.contains(EntryFlags::EXPECTED) {
                    info!("Requesting game info update (periodic) from {addr}");
                    self.send_refresh_query(addr, server_rand_value).await;
                    if let Some(entry) = self.registry.entry_mut(index) {
                        entry.flags.insert(EntryFlags::EXPECTED);
                    }
                    self.counters.num_update_request_sent += 1;
                } else if idle >= RETRY_TIME && !flags.contains(EntryFlags::RETRY_SENT) {
                    info!("Requesting game info update (retry) from {addr}");
                    self.send_refresh_query(addr, server_rand_value).await;
                    if let Some(entry) = self.registry.entry_mut(index) {
                        entry.flags.insert(EntryFlags::RETRY_SENT);
                    }
                    self.counters.num_retry_sent += 1;
                }
            }
        }
    }

    /// Solicits current game details from a host, carrying our token in the
    /// `time_stamp` field so the reply can be tied back to this query.
    async fn send_refresh_query(&mut self, to: SocketAddrV4, server_rand_value: u32) {
        let query = Packet::new(Message::HostedGameSearchQuery(HostedGameSearchQuery {
            game_identifier: GAME_IDENTIFIER,
            time_stamp: server_rand_value,
            password: [0; 12],
        }));
        self.send_packet(&query, to).await;
    }

    /// All outbound traffic leaves through the primary socket. Send failures
    /// are counted and forgotten.
    async fn send_packet(&mut self, packet: &Packet, to: SocketAddrV4) {
        let bytes = match packet.encode() {
            Ok(bytes) => bytes,
            Err(error) => {
                warn!("Failed to encode outbound packet: {error}");
                return;
            }
        };

        match self.primary.send_to(&bytes, SocketAddr::V4(to)).await {
            Ok(sent) => {
                self.counters.num_packets_sent += 1;
                self.counters.num_bytes_sent += sent as u64;
            }
            Err(error) => {
                self.counters.num_send_errors += 1;
                debug!("Send to {to} failed: {error}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;
    use shared::{CreateGameInfo, Guid};

    async fn test_server_with_capacity(max_games: usize) -> GameServer {
        for _ in 0..50 {
            let port = rand::thread_rng().gen_range(20_000u16..60_000);
            if let Ok(server) = GameServer::bind(port, max_games).await {
                return server;
            }
        }
        panic!("no free port pair available for the test server");
    }

    async fn test_server() -> GameServer {
        test_server_with_capacity(16).await
    }

    fn host_endpoint() -> SocketAddrV4 {
        SocketAddrV4::new(Ipv4Addr::new(127, 0, 0, 1), 45999)
    }

    #[tokio::test]
    async fn pending_entry_dropped_after_initial_reply_window() {
        let mut server = test_server().await;
        let now = Instant::now();
        server.registry.allocate(host_endpoint(), 0xAAAA, now).unwrap();

        server.do_timed_updates(now + Duration::from_secs(3)).await;
        assert_eq!(server.registry.len(), 1);

        server.do_timed_updates(now + INITIAL_REPLY_TIME).await;
        assert!(server.registry.is_empty());
        assert_eq!(server.counters.num_dropped_hosted_pokes, 1);
    }

    #[tokio::test]
    async fn received_entry_walks_update_retry_give_up() {
        let mut server = test_server().await;
        let now = Instant::now();
        let index = server.registry.allocate(host_endpoint(), 1, now).unwrap();
        server.registry.entry_mut(index).unwrap().flags = EntryFlags::RECEIVED;

        server.do_timed_updates(now + UPDATE_TIME).await;
        assert!(server
            .registry
            .entry(0)
            .unwrap()
            .flags
            .contains(EntryFlags::EXPECTED));
        assert_eq!(server.counters.num_update_request_sent, 1);

        // Still inside the retry window: nothing further is sent.
        server
            .do_timed_updates(now + UPDATE_TIME + Duration::from_secs(1))
            .await;
        assert_eq!(server.counters.num_update_request_sent, 1);
        assert_eq!(server.counters.num_retry_sent, 0);

        server.do_timed_updates(now + RETRY_TIME).await;
        assert!(server
            .registry
            .entry(0)
            .unwrap()
            .flags
            .contains(EntryFlags::RETRY_SENT));
        assert_eq!(server.counters.num_retry_sent, 1);

        server.do_timed_updates(now + GIVE_UP_TIME).await;
        assert!(server.registry.is_empty());
        assert_eq!(server.counters.num_games_dropped, 1);
    }

    #[tokio::test]
    async fn refresh_reply_resets_the_expiry_clock() {
        let mut server = test_server().await;
        let now = Instant::now();
        let index = server.registry.allocate(host_endpoint(), 1, now).unwrap();
        let token = server.registry.entry(index).unwrap().server_rand_value;

        let reply = HostedGameSearchReply {
            session_identifier: Guid([3; 16]),
            create_game_info: CreateGameInfo::new("alice", 4, 0),
            host_address: NetEndpoint::from(host_endpoint()),
            time_stamp: token,
        };
        server.handle_search_reply(&reply, host_endpoint());

        // The entry made progress just now, so even a long-idle sweep keeps it.
        server.do_timed_updates(now + Duration::from_secs(30)).await;
        assert_eq!(server.registry.len(), 1);
        assert_eq!(server.registry.entry(0).unwrap().flags, EntryFlags::RECEIVED);
    }

    #[tokio::test]
    async fn search_reply_from_wrong_endpoint_is_spoofing() {
        let mut server = test_server().await;
        let now = Instant::now();
        let index = server.registry.allocate(host_endpoint(), 1, now).unwrap();
        let token = server.registry.entry(index).unwrap().server_rand_value;

        let reply = HostedGameSearchReply {
            session_identifier: Guid([3; 16]),
            create_game_info: CreateGameInfo::new("mallory", 4, 0),
            host_address: NetEndpoint::from(host_endpoint()),
            time_stamp: token,
        };

        let attacker = SocketAddrV4::new(Ipv4Addr::new(9, 9, 9, 9), 1234);
        server.handle_search_reply(&reply, attacker);
        assert!(server.registry.entry(0).unwrap().session_identifier.is_none());

        // Wrong token from the right endpoint is just as dead.
        let stale = HostedGameSearchReply {
            time_stamp: token.wrapping_add(1),
            ..reply
        };
        server.handle_search_reply(&stale, host_endpoint());
        assert!(server.registry.entry(0).unwrap().session_identifier.is_none());
    }

    #[tokio::test]
    async fn duplicate_hosted_poke_keeps_one_entry() {
        let mut server = test_server().await;
        let poke = GameServerPoke {
            status_code: 0,
            rand_value: 0xAAAA,
        };
        server.handle_poke(&poke, host_endpoint()).await;
        let first_token = server.registry.entry(0).unwrap().server_rand_value;
        server.handle_poke(&poke, host_endpoint()).await;

        assert_eq!(server.registry.len(), 1);
        assert_eq!(server.counters.num_new_host, 1);
        assert_eq!(server.counters.num_games_hosted, 2);
        // The repeat poke re-armed the entry with a fresh token.
        assert_ne!(server.registry.entry(0).unwrap().server_rand_value, first_token);
    }

    #[tokio::test]
    async fn started_poke_frees_matching_entry_only() {
        let mut server = test_server().await;
        server
            .handle_poke(
                &GameServerPoke {
                    status_code: 0,
                    rand_value: 7,
                },
                host_endpoint(),
            )
            .await;

        // Wrong token: not our host, nothing happens.
        server
            .handle_poke(
                &GameServerPoke {
                    status_code: 1,
                    rand_value: 8,
                },
                host_endpoint(),
            )
            .await;
        assert_eq!(server.registry.len(), 1);
        assert_eq!(server.counters.num_games_started, 0);

        server
            .handle_poke(
                &GameServerPoke {
                    status_code: 1,
                    rand_value: 7,
                },
                host_endpoint(),
            )
            .await;
        assert!(server.registry.is_empty());
        assert_eq!(server.counters.num_games_started, 1);
    }

    #[tokio::test]
    async fn full_registry_counts_failed_allocations() {
        let mut server = test_server_with_capacity(1).await;
        server
            .handle_poke(
                &GameServerPoke {
                    status_code: 0,
                    rand_value: 1,
                },
                host_endpoint(),
            )
            .await;
        server
            .handle_poke(
                &GameServerPoke {
                    status_code: 0,
                    rand_value: 2,
                },
                SocketAddrV4::new(Ipv4Addr::new(127, 0, 0, 1), 46000),
            )
            .await;

        assert_eq!(server.registry.len(), 1);
        assert_eq!(server.counters.num_new_host, 2);
        assert_eq!(server.counters.num_failed_game_info_allocs, 1);
        assert_eq!(server.counters.num_games_hosted, 1);
    }

    #[tokio::test]
    async fn malformed_datagrams_hit_distinct_counters() {
        let mut server = test_server().await;
        let from = SocketAddr::V4(host_endpoint());

        server.handle_datagram(&[0u8; 4], from).await;
        assert_eq!(server.counters.num_min_size_errors, 1);

        let good = Packet::new(Message::GameServerPoke(GameServerPoke {
            status_code: 0,
            rand_value: 1,
        }))
        .encode()
        .unwrap();

        let mut trailing = good.clone();
        trailing.push(0);
        server.handle_datagram(&trailing, from).await;
        assert_eq!(server.counters.num_size_field_errors, 1);

        let mut wrong_kind = good.clone();
        wrong_kind[9] = 2;
        let sum = shared::checksum(&wrong_kind);
        wrong_kind[10..14].copy_from_slice(&sum.to_le_bytes());
        server.handle_datagram(&wrong_kind, from).await;
        assert_eq!(server.counters.num_type_field_errors, 1);

        let mut corrupt = good;
        corrupt[20] ^= 0xFF;
        server.handle_datagram(&corrupt, from).await;
        assert_eq!(server.counters.num_checksum_field_errors, 1);

        // None of the rejects counted as received traffic.
        assert_eq!(server.counters.num_packets_received, 0);
        assert!(server.registry.is_empty());
    }
}
