//! # Lobby Wire Protocol
//!
//! This crate defines the datagram format spoken between game hosts, game
//! clients, and the rendezvous server. It is shared so that the server, the
//! manual test client, and the integration tests all agree on the exact bytes
//! that travel over UDP.
//!
//! ## Frame layout
//!
//! Every datagram is a fixed 14-byte header immediately followed by a
//! command-tagged message body:
//!
//! ```text
//! offset  size  field
//!      0     4  source_player_net_id   (unused by the lobby, preserved)
//!      4     4  dest_player_net_id     (unused by the lobby, preserved)
//!      8     1  size_of_payload        (byte count of the body)
//!      9     1  kind                   (always 1 for game traffic)
//!     10     4  checksum               (additive, little-endian)
//!     14     4  command tag            (first field of the body)
//!     18     -  command-specific fields
//! ```
//!
//! Integers are little-endian. The embedded endpoint substructures are raw
//! sockaddr images and therefore keep their port and address bytes in network
//! order; see [`NetEndpoint`].
//!
//! ## Checksum
//!
//! The checksum is the wrapping 32-bit sum of every byte of the datagram with
//! the four checksum bytes counted as zero. [`Packet::encode`] always stamps a
//! fresh checksum and payload length, so any packet this crate produces passes
//! the same validation it applies to inbound datagrams.
//!
//! ## Reliability
//!
//! UDP gives no delivery guarantee and none is layered on here. The lobby
//! protocol is self-healing instead: hosts re-poke, the server re-queries, and
//! stale registry entries age out. Anti-spoofing relies on the 32-bit random
//! tokens carried in [`GameServerPoke`] and echoed through the `time_stamp`
//! field of [`HostedGameSearchReply`].

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{Ipv4Addr, SocketAddrV4};

/// Default UDP port of the rendezvous server. The secondary socket always
/// listens on the next port up.
pub const DEFAULT_GAME_SERVER_PORT: u16 = 47800;

/// Receive buffer size. Comfortably larger than any valid frame.
pub const MAX_DATAGRAM_LEN: usize = 2048;

/// Serialized size of [`PacketHeader`].
pub const HEADER_LEN: usize = 14;

/// Size of the command tag that opens every message body.
pub const TL_HEADER_LEN: usize = 4;

/// Smallest datagram worth looking at: header plus command tag.
pub const MIN_DATAGRAM_LEN: usize = HEADER_LEN + TL_HEADER_LEN;

/// Value of the header `kind` byte for game traffic.
pub const GAME_PACKET_KIND: u8 = 1;

const SIZE_OF_PAYLOAD_OFFSET: usize = 8;
const CHECKSUM_OFFSET: usize = 10;

/// Well-known identifier of the game this lobby serves, as a GUID byte image.
/// Search queries carrying any other identifier are ignored.
pub const GAME_IDENTIFIER: Guid = Guid([
    0x11, 0xCF, 0x55, 0x5A, 0x41, 0xB8, 0xCE, 0x11, 0x92, 0x10, 0x00, 0xAA, 0x00, 0x6C, 0x49,
    0x72,
]);

/// 16-byte GUID in Windows byte order: Data1..Data3 little-endian, Data4
/// verbatim. Session identifiers and the game identifier both use this shape.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct Guid(pub [u8; 16]);

impl fmt::Display for Guid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = &self.0;
        let data1 = u32::from_le_bytes([b[0], b[1], b[2], b[3]]);
        let data2 = u16::from_le_bytes([b[4], b[5]]);
        let data3 = u16::from_le_bytes([b[6], b[7]]);
        write!(
            f,
            "{{{:08X}-{:04X}-{:04X}-{:02X}{:02X}-{:02X}{:02X}{:02X}{:02X}{:02X}{:02X}}}",
            data1, data2, data3, b[8], b[9], b[10], b[11], b[12], b[13], b[14], b[15]
        )
    }
}

/// 16-byte sockaddr_in image embedded in relayed messages.
///
/// The `family` field is little-endian and always forced to 2 (IPv4) on
/// encode, because the legacy peer parses the raw structure. Port and address
/// stay in network byte order, exactly as a kernel sockaddr carries them.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct NetEndpoint {
    pub family: u16,
    pub port: [u8; 2],
    pub addr: [u8; 4],
    pub zero: [u8; 8],
}

impl NetEndpoint {
    pub const AF_INET: u16 = 2;

    pub fn port(&self) -> u16 {
        u16::from_be_bytes(self.port)
    }

    pub fn ip(&self) -> Ipv4Addr {
        Ipv4Addr::from(self.addr)
    }

    pub fn to_socket_addr(&self) -> SocketAddrV4 {
        SocketAddrV4::new(self.ip(), self.port())
    }
}

impl From<SocketAddrV4> for NetEndpoint {
    fn from(addr: SocketAddrV4) -> Self {
        NetEndpoint {
            family: Self::AF_INET,
            port: addr.port().to_be_bytes(),
            addr: addr.ip().octets(),
            zero: [0; 8],
        }
    }
}

impl fmt::Display for NetEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.ip(), self.port())
    }
}

/// Host-provided description of an advertised game. The lobby stores and
/// echoes it verbatim; only the creator name is interpreted, for logging.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct CreateGameInfo {
    pub game_creator_name: [u8; 13],
    pub max_players: u8,
    pub game_type: u16,
}

impl CreateGameInfo {
    pub fn new(creator: &str, max_players: u8, game_type: u16) -> Self {
        let mut game_creator_name = [0u8; 13];
        let bytes = creator.as_bytes();
        let len = bytes.len().min(game_creator_name.len());
        game_creator_name[..len].copy_from_slice(&bytes[..len]);
        CreateGameInfo {
            game_creator_name,
            max_players,
            game_type,
        }
    }

    /// Creator name with trailing NUL padding stripped.
    pub fn creator_name(&self) -> String {
        let end = self
            .game_creator_name
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(self.game_creator_name.len());
        String::from_utf8_lossy(&self.game_creator_name[..end]).into_owned()
    }
}

/// Fixed packet header preceding every message body.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    pub source_player_net_id: u32,
    pub dest_player_net_id: u32,
    pub size_of_payload: u8,
    pub kind: u8,
    pub checksum: u32,
}

/// Command tags. Tags 1 through 6 belong to the in-game session protocol and
/// never reach the lobby, so they are not modeled here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum CommandType {
    JoinRequest = 0,
    HostedGameSearchQuery = 7,
    HostedGameSearchReply = 8,
    GameServerPoke = 9,
    JoinHelpRequest = 10,
    RequestExternalAddress = 11,
    EchoExternalAddress = 12,
}

impl CommandType {
    pub fn from_u32(value: u32) -> Option<CommandType> {
        match value {
            0 => Some(CommandType::JoinRequest),
            7 => Some(CommandType::HostedGameSearchQuery),
            8 => Some(CommandType::HostedGameSearchReply),
            9 => Some(CommandType::GameServerPoke),
            10 => Some(CommandType::JoinHelpRequest),
            11 => Some(CommandType::RequestExternalAddress),
            12 => Some(CommandType::EchoExternalAddress),
            _ => None,
        }
    }
}

/// Status codes carried by [`GameServerPoke`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PokeStatus {
    Hosted,
    Started,
    Cancelled,
}

impl PokeStatus {
    pub fn from_status_code(code: u32) -> Option<PokeStatus> {
        match code {
            0 => Some(PokeStatus::Hosted),
            1 => Some(PokeStatus::Started),
            2 => Some(PokeStatus::Cancelled),
            _ => None,
        }
    }

    pub fn status_code(self) -> u32 {
        match self {
            PokeStatus::Hosted => 0,
            PokeStatus::Started => 1,
            PokeStatus::Cancelled => 2,
        }
    }
}

/// Client asks the lobby to introduce it to the host of a session.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct JoinRequest {
    pub session_identifier: Guid,
    pub return_port: u16,
    pub password: [u8; 12],
}

impl JoinRequest {
    pub const PAYLOAD_LEN: usize = TL_HEADER_LEN + 30;
}

/// Lobby relays a join request to the host, adding the prospective client's
/// observed endpoint so the host can open a path back through its NAT.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct JoinHelpRequest {
    pub session_identifier: Guid,
    pub client_addr: NetEndpoint,
    pub return_port: u16,
    pub password: [u8; 12],
}

impl JoinHelpRequest {
    pub const PAYLOAD_LEN: usize = TL_HEADER_LEN + 46;
}

/// Sent by clients looking for games, and by the lobby itself to solicit
/// details from a known host. In the lobby-issued form, `time_stamp` carries
/// the server's random token and the password is zeroed.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct HostedGameSearchQuery {
    pub game_identifier: Guid,
    pub time_stamp: u32,
    pub password: [u8; 12],
}

impl HostedGameSearchQuery {
    pub const PAYLOAD_LEN: usize = TL_HEADER_LEN + 32;
}

/// One advertised game. Hosts answer the lobby's refresh query with this,
/// echoing the solicited token in `time_stamp`; the lobby answers client
/// searches with one reply per known game.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct HostedGameSearchReply {
    pub session_identifier: Guid,
    pub create_game_info: CreateGameInfo,
    pub host_address: NetEndpoint,
    pub time_stamp: u32,
}

impl HostedGameSearchReply {
    pub const PAYLOAD_LEN: usize = TL_HEADER_LEN + 52;
}

/// Unsolicited host-to-lobby announcement: hosted, started, or cancelled.
/// `rand_value` is the host's own anti-spoofing token and must repeat in every
/// poke about the same game.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct GameServerPoke {
    pub status_code: u32,
    pub rand_value: u32,
}

impl GameServerPoke {
    pub const PAYLOAD_LEN: usize = TL_HEADER_LEN + 8;
}

/// Client asks what its endpoint looks like from the outside. `internal_port`
/// is the port the client bound locally, in host byte order.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct RequestExternalAddress {
    pub internal_port: u16,
}

impl RequestExternalAddress {
    pub const PAYLOAD_LEN: usize = TL_HEADER_LEN + 2;
}

/// Lobby's answer to [`RequestExternalAddress`]: the observed source endpoint
/// and the destination port this echo was aimed at.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct EchoExternalAddress {
    pub addr: NetEndpoint,
    pub reply_port: u16,
}

impl EchoExternalAddress {
    pub const PAYLOAD_LEN: usize = TL_HEADER_LEN + 18;
}

/// A parsed message body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Message {
    JoinRequest(JoinRequest),
    JoinHelpRequest(JoinHelpRequest),
    HostedGameSearchQuery(HostedGameSearchQuery),
    HostedGameSearchReply(HostedGameSearchReply),
    GameServerPoke(GameServerPoke),
    RequestExternalAddress(RequestExternalAddress),
    EchoExternalAddress(EchoExternalAddress),
}

impl Message {
    pub fn command(&self) -> CommandType {
        match self {
            Message::JoinRequest(_) => CommandType::JoinRequest,
            Message::JoinHelpRequest(_) => CommandType::JoinHelpRequest,
            Message::HostedGameSearchQuery(_) => CommandType::HostedGameSearchQuery,
            Message::HostedGameSearchReply(_) => CommandType::HostedGameSearchReply,
            Message::GameServerPoke(_) => CommandType::GameServerPoke,
            Message::RequestExternalAddress(_) => CommandType::RequestExternalAddress,
            Message::EchoExternalAddress(_) => CommandType::EchoExternalAddress,
        }
    }
}

/// A complete frame: header plus message. Header IDs are preserved across
/// relays and replies; `size_of_payload` and `checksum` are recomputed on
/// every encode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Packet {
    pub header: PacketHeader,
    pub message: Message,
}

impl Packet {
    /// Packet with zeroed player IDs, for server-initiated traffic.
    pub fn new(message: Message) -> Packet {
        Packet::with_ids(0, 0, message)
    }

    /// Packet carrying forward the player IDs of the datagram it answers.
    pub fn with_ids(
        source_player_net_id: u32,
        dest_player_net_id: u32,
        message: Message,
    ) -> Packet {
        Packet {
            header: PacketHeader {
                source_player_net_id,
                dest_player_net_id,
                size_of_payload: 0,
                kind: GAME_PACKET_KIND,
                checksum: 0,
            },
            message,
        }
    }

    /// Serializes the frame, stamping the payload length and checksum.
    pub fn encode(&self) -> bincode::Result<Vec<u8>> {
        let mut header = self.header;
        header.checksum = 0;

        let mut out = bincode::serialize(&header)?;
        out.extend_from_slice(&(self.message.command() as u32).to_le_bytes());
        match &self.message {
            Message::JoinRequest(body) => out.extend(bincode::serialize(body)?),
            Message::JoinHelpRequest(body) => out.extend(bincode::serialize(body)?),
            Message::HostedGameSearchQuery(body) => out.extend(bincode::serialize(body)?),
            Message::HostedGameSearchReply(body) => out.extend(bincode::serialize(body)?),
            Message::GameServerPoke(body) => out.extend(bincode::serialize(body)?),
            Message::RequestExternalAddress(body) => out.extend(bincode::serialize(body)?),
            Message::EchoExternalAddress(body) => out.extend(bincode::serialize(body)?),
        }

        out[SIZE_OF_PAYLOAD_OFFSET] = (out.len() - HEADER_LEN) as u8;
        let sum = checksum(&out);
        out[CHECKSUM_OFFSET..CHECKSUM_OFFSET + 4].copy_from_slice(&sum.to_le_bytes());
        Ok(out)
    }
}

/// Frame-level validation failures, in the order they are checked. Each maps
/// to a distinct receive-error counter on the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameError {
    /// Shorter than header plus command tag.
    MinSize,
    /// `size_of_payload` disagrees with the datagram length.
    SizeField,
    /// Header `kind` is not game traffic.
    TypeField,
    /// Stored checksum does not match the recomputed one.
    Checksum,
}

/// Additive checksum over a full datagram, with the checksum field bytes
/// counted as zero.
pub fn checksum(datagram: &[u8]) -> u32 {
    datagram
        .iter()
        .enumerate()
        .filter(|(i, _)| !(CHECKSUM_OFFSET..CHECKSUM_OFFSET + 4).contains(i))
        .fold(0u32, |sum, (_, &byte)| sum.wrapping_add(u32::from(byte)))
}

/// Validates and parses one datagram.
///
/// `Err` means the frame itself is bad (dropped with a counter). `Ok(None)`
/// means the frame is sound but the body is not for us: an unknown command
/// tag, or a known tag with the wrong payload length. Both are dropped
/// without ceremony, matching how the original service shrugs off traffic it
/// does not understand.
pub fn decode(datagram: &[u8]) -> Result<Option<Packet>, FrameError> {
    if datagram.len() < MIN_DATAGRAM_LEN {
        return Err(FrameError::MinSize);
    }

    let header: PacketHeader =
        bincode::deserialize(&datagram[..HEADER_LEN]).map_err(|_| FrameError::MinSize)?;

    if usize::from(header.size_of_payload) + HEADER_LEN != datagram.len() {
        return Err(FrameError::SizeField);
    }
    if header.kind != GAME_PACKET_KIND {
        return Err(FrameError::TypeField);
    }
    if checksum(datagram) != header.checksum {
        return Err(FrameError::Checksum);
    }

    let body = &datagram[HEADER_LEN..];
    let tag = u32::from_le_bytes([body[0], body[1], body[2], body[3]]);
    let message = match CommandType::from_u32(tag) {
        Some(CommandType::JoinRequest) => {
            decode_body(body, JoinRequest::PAYLOAD_LEN).map(Message::JoinRequest)
        }
        Some(CommandType::JoinHelpRequest) => {
            decode_body(body, JoinHelpRequest::PAYLOAD_LEN).map(Message::JoinHelpRequest)
        }
        Some(CommandType::HostedGameSearchQuery) => {
            decode_body(body, HostedGameSearchQuery::PAYLOAD_LEN)
                .map(Message::HostedGameSearchQuery)
        }
        Some(CommandType::HostedGameSearchReply) => {
            decode_body(body, HostedGameSearchReply::PAYLOAD_LEN)
                .map(Message::HostedGameSearchReply)
        }
        Some(CommandType::GameServerPoke) => {
            decode_body(body, GameServerPoke::PAYLOAD_LEN).map(Message::GameServerPoke)
        }
        Some(CommandType::RequestExternalAddress) => {
            decode_body(body, RequestExternalAddress::PAYLOAD_LEN)
                .map(Message::RequestExternalAddress)
        }
        Some(CommandType::EchoExternalAddress) => {
            decode_body(body, EchoExternalAddress::PAYLOAD_LEN).map(Message::EchoExternalAddress)
        }
        None => None,
    };

    Ok(message.map(|message| Packet { header, message }))
}

fn decode_body<T: serde::de::DeserializeOwned>(body: &[u8], payload_len: usize) -> Option<T> {
    if body.len() != payload_len {
        return None;
    }
    bincode::deserialize(&body[TL_HEADER_LEN..]).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_endpoint() -> SocketAddrV4 {
        SocketAddrV4::new(Ipv4Addr::new(1, 2, 3, 4), 47800)
    }

    fn sample_session() -> Guid {
        Guid([7; 16])
    }

    fn sample_messages() -> Vec<Message> {
        vec![
            Message::JoinRequest(JoinRequest {
                session_identifier: sample_session(),
                return_port: 47800,
                password: *b"secret\0\0\0\0\0\0",
            }),
            Message::JoinHelpRequest(JoinHelpRequest {
                session_identifier: sample_session(),
                client_addr: NetEndpoint::from(sample_endpoint()),
                return_port: 47800,
                password: [0; 12],
            }),
            Message::HostedGameSearchQuery(HostedGameSearchQuery {
                game_identifier: GAME_IDENTIFIER,
                time_stamp: 0xDEADBEEF,
                password: [0; 12],
            }),
            Message::HostedGameSearchReply(HostedGameSearchReply {
                session_identifier: sample_session(),
                create_game_info: CreateGameInfo::new("alice", 4, 1),
                host_address: NetEndpoint::from(sample_endpoint()),
                time_stamp: 0xDEADBEEF,
            }),
            Message::GameServerPoke(GameServerPoke {
                status_code: PokeStatus::Hosted.status_code(),
                rand_value: 0xAAAA,
            }),
            Message::RequestExternalAddress(RequestExternalAddress {
                internal_port: 47800,
            }),
            Message::EchoExternalAddress(EchoExternalAddress {
                addr: NetEndpoint::from(sample_endpoint()),
                reply_port: 50001,
            }),
        ]
    }

    #[test]
    fn payload_length_constants_match_serialized_sizes() {
        for message in sample_messages() {
            let encoded = Packet::new(message).encode().unwrap();
            let expected = match message {
                Message::JoinRequest(_) => JoinRequest::PAYLOAD_LEN,
                Message::JoinHelpRequest(_) => JoinHelpRequest::PAYLOAD_LEN,
                Message::HostedGameSearchQuery(_) => HostedGameSearchQuery::PAYLOAD_LEN,
                Message::HostedGameSearchReply(_) => HostedGameSearchReply::PAYLOAD_LEN,
                Message::GameServerPoke(_) => GameServerPoke::PAYLOAD_LEN,
                Message::RequestExternalAddress(_) => RequestExternalAddress::PAYLOAD_LEN,
                Message::EchoExternalAddress(_) => EchoExternalAddress::PAYLOAD_LEN,
            };
            assert_eq!(encoded.len(), HEADER_LEN + expected);
            assert_eq!(usize::from(encoded[SIZE_OF_PAYLOAD_OFFSET]), expected);
        }
    }

    #[test]
    fn encode_then_decode_round_trips() {
        for message in sample_messages() {
            let packet = Packet::with_ids(3, 9, message);
            let bytes = packet.encode().unwrap();
            let decoded = decode(&bytes).unwrap().expect("known command");
            assert_eq!(decoded.message, message);
            assert_eq!(decoded.header.source_player_net_id, 3);
            assert_eq!(decoded.header.dest_player_net_id, 9);
            // Re-encoding the decoded packet reproduces the original bytes.
            assert_eq!(decoded.encode().unwrap(), bytes);
        }
    }

    #[test]
    fn poke_wire_image() {
        let packet = Packet::new(Message::GameServerPoke(GameServerPoke {
            status_code: 0,
            rand_value: 0xAAAA,
        }));
        let bytes = packet.encode().unwrap();

        assert_eq!(bytes.len(), HEADER_LEN + GameServerPoke::PAYLOAD_LEN);
        assert_eq!(bytes[8], GameServerPoke::PAYLOAD_LEN as u8);
        assert_eq!(bytes[9], GAME_PACKET_KIND);
        // Command tag, status code, rand value, all little-endian.
        assert_eq!(&bytes[14..18], &9u32.to_le_bytes());
        assert_eq!(&bytes[18..22], &0u32.to_le_bytes());
        assert_eq!(&bytes[22..26], &0xAAAAu32.to_le_bytes());
        // Stored checksum matches an independent recomputation.
        let stored = u32::from_le_bytes([bytes[10], bytes[11], bytes[12], bytes[13]]);
        assert_eq!(stored, checksum(&bytes));
    }

    #[test]
    fn checksum_ignores_its_own_field() {
        let packet = Packet::new(Message::RequestExternalAddress(RequestExternalAddress {
            internal_port: 1,
        }));
        let mut bytes = packet.encode().unwrap();
        let before = checksum(&bytes);
        bytes[CHECKSUM_OFFSET] ^= 0xFF;
        assert_eq!(checksum(&bytes), before);
    }

    #[test]
    fn rejects_short_datagram() {
        assert_eq!(
            decode(&[0u8; MIN_DATAGRAM_LEN - 1]),
            Err(FrameError::MinSize)
        );
    }

    #[test]
    fn rejects_bad_size_field() {
        let packet = Packet::new(Message::GameServerPoke(GameServerPoke {
            status_code: 0,
            rand_value: 1,
        }));
        let mut bytes = packet.encode().unwrap();
        bytes.push(0);
        assert_eq!(decode(&bytes), Err(FrameError::SizeField));
    }

    #[test]
    fn rejects_bad_type_field() {
        let packet = Packet::new(Message::GameServerPoke(GameServerPoke {
            status_code: 0,
            rand_value: 1,
        }));
        let mut bytes = packet.encode().unwrap();
        bytes[9] = 2;
        // Keep the checksum consistent so only the type check can fail.
        let sum = checksum(&bytes);
        bytes[CHECKSUM_OFFSET..CHECKSUM_OFFSET + 4].copy_from_slice(&sum.to_le_bytes());
        assert_eq!(decode(&bytes), Err(FrameError::TypeField));
    }

    #[test]
    fn rejects_bad_checksum() {
        let packet = Packet::new(Message::GameServerPoke(GameServerPoke {
            status_code: 0,
            rand_value: 1,
        }));
        let mut bytes = packet.encode().unwrap();
        bytes[CHECKSUM_OFFSET] ^= 0x5A;
        assert_eq!(decode(&bytes), Err(FrameError::Checksum));
    }

    #[test]
    fn unknown_command_is_ignored_not_an_error() {
        let packet = Packet::new(Message::GameServerPoke(GameServerPoke {
            status_code: 0,
            rand_value: 1,
        }));
        let mut bytes = packet.encode().unwrap();
        // Rewrite the tag to a session-protocol command the lobby never handles.
        bytes[14..18].copy_from_slice(&3u32.to_le_bytes());
        let sum = checksum(&bytes);
        bytes[CHECKSUM_OFFSET..CHECKSUM_OFFSET + 4].copy_from_slice(&sum.to_le_bytes());
        assert_eq!(decode(&bytes), Ok(None));
    }

    #[test]
    fn known_command_with_wrong_payload_length_is_ignored() {
        let reply = Packet::new(Message::HostedGameSearchReply(HostedGameSearchReply {
            session_identifier: sample_session(),
            create_game_info: CreateGameInfo::new("bob", 2, 0),
            host_address: NetEndpoint::from(sample_endpoint()),
            time_stamp: 5,
        }));
        let mut bytes = reply.encode().unwrap();
        // Claim the body is a poke while keeping the frame itself valid.
        bytes[14..18].copy_from_slice(&9u32.to_le_bytes());
        let sum = checksum(&bytes);
        bytes[CHECKSUM_OFFSET..CHECKSUM_OFFSET + 4].copy_from_slice(&sum.to_le_bytes());
        assert_eq!(decode(&bytes), Ok(None));
    }

    #[test]
    fn endpoint_round_trip_and_family() {
        let addr = SocketAddrV4::new(Ipv4Addr::new(5, 6, 7, 8), 12345);
        let endpoint = NetEndpoint::from(addr);
        assert_eq!(endpoint.family, NetEndpoint::AF_INET);
        assert_eq!(endpoint.port, 12345u16.to_be_bytes());
        assert_eq!(endpoint.addr, [5, 6, 7, 8]);
        assert_eq!(endpoint.to_socket_addr(), addr);
    }

    #[test]
    fn game_identifier_renders_as_guid() {
        assert_eq!(
            GAME_IDENTIFIER.to_string(),
            "{5A55CF11-B841-11CE-9210-00AA006C4972}"
        );
    }

    #[test]
    fn creator_name_strips_padding() {
        let info = CreateGameInfo::new("alice", 6, 0);
        assert_eq!(info.creator_name(), "alice");
        // Over-long names are truncated to the field width.
        let info = CreateGameInfo::new("a-very-long-creator-name", 6, 0);
        assert_eq!(info.creator_name().len(), 13);
    }
}
