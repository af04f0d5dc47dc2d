//! Manual smoke-test client: hosts a fake game against a running lobby,
//! answers the lobby's solicitation, searches for it, and checks the
//! external-address echo. Run with the server address as the only argument,
//! defaulting to 127.0.0.1:47800.

use shared::{
    decode, CreateGameInfo, GameServerPoke, Guid, HostedGameSearchQuery, HostedGameSearchReply,
    Message, NetEndpoint, Packet, PokeStatus, RequestExternalAddress, DEFAULT_GAME_SERVER_PORT,
    GAME_IDENTIFIER, MAX_DATAGRAM_LEN,
};
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::timeout;

async fn send(
    socket: &UdpSocket,
    message: Message,
    to: SocketAddr,
) -> Result<(), Box<dyn std::error::Error>> {
    let bytes = Packet::new(message).encode()?;
    socket.send_to(&bytes, to).await?;
    Ok(())
}

async fn recv(socket: &UdpSocket, buf: &mut [u8]) -> Option<Packet> {
    match timeout(Duration::from_secs(2), socket.recv_from(buf)).await {
        Ok(Ok((len, _))) => decode(&buf[..len]).ok().flatten(),
        Ok(Err(e)) => {
            println!("Receive error: {}", e);
            None
        }
        Err(_) => None,
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let server_addr: SocketAddr = std::env::args()
        .nth(1)
        .unwrap_or_else(|| format!("127.0.0.1:{}", DEFAULT_GAME_SERVER_PORT))
        .parse()?;

    let socket = UdpSocket::bind("0.0.0.0:0").await?;
    let local_port = socket.local_addr()?.port();
    println!("Client socket bound to {}", socket.local_addr()?);

    let mut buf = [0u8; MAX_DATAGRAM_LEN];
    let rand_value: u32 = rand::random();
    let session = Guid(rand::random::<[u8; 16]>());

    // Announce a hosted game
    println!("Poking {} as a game host", server_addr);
    send(
        &socket,
        Message::GameServerPoke(GameServerPoke {
            status_code: PokeStatus::Hosted.status_code(),
            rand_value,
        }),
        server_addr,
    )
    .await?;

    // The lobby should come back asking for game details
    let token = match recv(&socket, &mut buf).await {
        Some(Packet {
            message: Message::HostedGameSearchQuery(query),
            ..
        }) => {
            println!("Lobby solicited game details (token {:#010X})", query.time_stamp);
            query.time_stamp
        }
        other => {
            println!("Expected a search query but got: {:?}", other);
            return Ok(());
        }
    };

    // Answer with our game description
    send(
        &socket,
        Message::HostedGameSearchReply(HostedGameSearchReply {
            session_identifier: session,
            create_game_info: CreateGameInfo::new("test client", 4, 0),
            host_address: NetEndpoint::from(SocketAddrV4::new(
                Ipv4Addr::new(127, 0, 0, 1),
                local_port,
            )),
            time_stamp: token,
        }),
        server_addr,
    )
    .await?;
    println!("Sent game details for session {}", session);

    // Now search like a client would and expect to see our own game
    send(
        &socket,
        Message::HostedGameSearchQuery(HostedGameSearchQuery {
            game_identifier: GAME_IDENTIFIER,
            time_stamp: 0,
            password: [0; 12],
        }),
        server_addr,
    )
    .await?;

    let mut listed = 0;
    while let Some(packet) = recv(&socket, &mut buf).await {
        if let Message::HostedGameSearchReply(reply) = packet.message {
            listed += 1;
            println!(
                "Game {}: session {} creator '{}' at {}",
                listed,
                reply.session_identifier,
                reply.create_game_info.creator_name(),
                reply.host_address
            );
        }
    }
    println!("Search returned {} game(s)", listed);

    // Ask what we look like from the outside
    send(
        &socket,
        Message::RequestExternalAddress(RequestExternalAddress {
            internal_port: local_port,
        }),
        server_addr,
    )
    .await?;

    match recv(&socket, &mut buf).await {
        Some(Packet {
            message: Message::EchoExternalAddress(echo),
            ..
        }) => println!("External address: {} (reply port {})", echo.addr, echo.reply_port),
        other => println!("Expected an address echo but got: {:?}", other),
    }

    // Tidy up so the lobby does not advertise a dead game for a minute
    send(
        &socket,
        Message::GameServerPoke(GameServerPoke {
            status_code: PokeStatus::Cancelled.status_code(),
            rand_value,
        }),
        server_addr,
    )
    .await?;
    println!("Cancelled the hosted game, done");

    Ok(())
}
