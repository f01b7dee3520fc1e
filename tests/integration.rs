//! End-to-end transfer scenarios, driven against a real loopback
//! `UdpSocket` standing in for the remote server — in the spirit of
//! `tftp-rs`'s own `tests/integration.rs`, just playing the client's role
//! from the other side of the wire.

use std::net::SocketAddr;

use std::time::Duration;

use tftp_client::bootstrap::{self, Request};
use tftp_client::codec::Packet;
use tftp_client::engine;
use tftp_client::session::Direction;
use tokio::net::UdpSocket;

/// Binds a fake server socket on loopback and returns its address.
async fn fake_server() -> UdpSocket {
    UdpSocket::bind("127.0.0.1:0").await.unwrap()
}

async fn bootstrap_client(
    server_addr: SocketAddr,
    direction: Direction,
    remote_file: &str,
    local_file: &std::path::Path,
) -> tftp_client::session::Session {
    let req = Request {
        host: "127.0.0.1",
        port: server_addr.port(),
        direction,
        remote_file,
        local_file,
        mode: "octet",
        verbose: false,
    };
    bootstrap::bootstrap(&req).await.unwrap()
}

async fn send_to(server: &UdpSocket, pkt: &Packet, to: SocketAddr) {
    let bytes = pkt.encode().unwrap();
    server.send_to(&bytes, to).await.unwrap();
}

async fn recv_from(server: &UdpSocket) -> (Packet, SocketAddr) {
    let mut buf = vec![0u8; 516];
    let (n, from) = tokio::time::timeout(Duration::from_secs(5), server.recv_from(&mut buf))
        .await
        .unwrap()
        .unwrap();
    (Packet::decode(&buf[..n]).unwrap(), from)
}

#[tokio::test]
async fn download_single_block() {
    let server = fake_server().await;
    let server_addr = server.local_addr().unwrap();
    let dir = tempfile::tempdir().unwrap();
    let local_file = dir.path().join("small");

    let client_task = tokio::spawn({
        let mut session = bootstrap_client(server_addr, Direction::Read, "small", &local_file).await;
        async move { engine::run(&mut session).await }
    });

    // Receive the RRQ, answer with a short final block.
    let (pkt, peer) = recv_from(&server).await;
    assert!(matches!(pkt, Packet::RRQ { .. }));

    let payload = vec![0xAAu8; 100];
    send_to(
        &server,
        &Packet::DATA {
            block_num: 1,
            data: payload.clone(),
        },
        peer,
    )
    .await;

    let (ack, _) = recv_from(&server).await;
    assert_eq!(ack, Packet::ACK { block_num: 1 });

    client_task.await.unwrap().unwrap();

    let written = tokio::fs::read(&local_file).await.unwrap();
    assert_eq!(written, payload);
}

#[tokio::test]
async fn download_two_blocks() {
    let server = fake_server().await;
    let server_addr = server.local_addr().unwrap();
    let dir = tempfile::tempdir().unwrap();
    let local_file = dir.path().join("big");

    let client_task = tokio::spawn({
        let mut session = bootstrap_client(server_addr, Direction::Read, "big", &local_file).await;
        async move { engine::run(&mut session).await }
    });

    let (pkt, peer) = recv_from(&server).await;
    assert!(matches!(pkt, Packet::RRQ { .. }));

    let first_block = vec![0x01u8; 512];
    send_to(
        &server,
        &Packet::DATA {
            block_num: 1,
            data: first_block.clone(),
        },
        peer,
    )
    .await;

    let (ack, _) = recv_from(&server).await;
    assert_eq!(ack, Packet::ACK { block_num: 1 });

    send_to(
        &server,
        &Packet::DATA {
            block_num: 2,
            data: vec![],
        },
        peer,
    )
    .await;

    let (ack, _) = recv_from(&server).await;
    assert_eq!(ack, Packet::ACK { block_num: 2 });

    client_task.await.unwrap().unwrap();

    let written = tokio::fs::read(&local_file).await.unwrap();
    assert_eq!(written, first_block);
}

#[tokio::test]
async fn upload_two_blocks() {
    let server = fake_server().await;
    let server_addr = server.local_addr().unwrap();
    let dir = tempfile::tempdir().unwrap();
    let local_file = dir.path().join("upload.bin");

    let mut content = vec![0x02u8; 512];
    content.extend(std::iter::repeat_n(0x03u8, 88));
    tokio::fs::write(&local_file, &content).await.unwrap();

    let client_task = tokio::spawn({
        let mut session =
            bootstrap_client(server_addr, Direction::Write, "upload.bin", &local_file).await;
        async move { engine::run(&mut session).await }
    });

    let (pkt, peer) = recv_from(&server).await;
    assert!(matches!(pkt, Packet::WRQ { .. }));
    send_to(&server, &Packet::ACK { block_num: 0 }, peer).await;

    let (pkt, _) = recv_from(&server).await;
    match pkt {
        Packet::DATA { block_num, data } => {
            assert_eq!(block_num, 1);
            assert_eq!(data, vec![0x02u8; 512]);
        }
        other => panic!("expected DATA 1, got {other:?}"),
    }
    send_to(&server, &Packet::ACK { block_num: 1 }, peer).await;

    let (pkt, _) = recv_from(&server).await;
    match pkt {
        Packet::DATA { block_num, data } => {
            assert_eq!(block_num, 2);
            assert_eq!(data, vec![0x03u8; 88]);
        }
        other => panic!("expected DATA 2, got {other:?}"),
    }
    send_to(&server, &Packet::ACK { block_num: 2 }, peer).await;

    client_task.await.unwrap().unwrap();
}

#[tokio::test]
async fn retransmission_after_dropped_requests() {
    let server = fake_server().await;
    let server_addr = server.local_addr().unwrap();
    let dir = tempfile::tempdir().unwrap();
    let local_file = dir.path().join("small");

    let client_task = tokio::spawn({
        let mut session = bootstrap_client(server_addr, Direction::Read, "small", &local_file).await;
        async move { engine::run(&mut session).await }
    });

    // Drop the first two RRQ copies, answer the third.
    let mut peer = None;
    for _ in 0..2 {
        let (pkt, from) = recv_from(&server).await;
        assert!(matches!(pkt, Packet::RRQ { .. }));
        peer = Some(from);
    }
    let (pkt, from) = recv_from(&server).await;
    assert!(matches!(pkt, Packet::RRQ { .. }));
    peer = Some(from);

    let payload = vec![7u8; 10];
    send_to(
        &server,
        &Packet::DATA {
            block_num: 1,
            data: payload.clone(),
        },
        peer.unwrap(),
    )
    .await;

    let (ack, _) = recv_from(&server).await;
    assert_eq!(ack, Packet::ACK { block_num: 1 });

    client_task.await.unwrap().unwrap();

    let written = tokio::fs::read(&local_file).await.unwrap();
    assert_eq!(written, payload);
}

#[tokio::test]
async fn server_error_aborts_the_transfer() {
    let server = fake_server().await;
    let server_addr = server.local_addr().unwrap();
    let dir = tempfile::tempdir().unwrap();
    let local_file = dir.path().join("absent");

    let client_task = tokio::spawn({
        let mut session =
            bootstrap_client(server_addr, Direction::Read, "absent", &local_file).await;
        async move { engine::run(&mut session).await }
    });

    let (pkt, peer) = recv_from(&server).await;
    assert!(matches!(pkt, Packet::RRQ { .. }));

    send_to(
        &server,
        &Packet::ERROR {
            code: 1,
            msg: "File not found".to_string(),
        },
        peer,
    )
    .await;

    let result = client_task.await.unwrap();
    assert!(result.is_err());
}

#[tokio::test]
async fn duplicate_ack_during_upload_is_ignored() {
    let server = fake_server().await;
    let server_addr = server.local_addr().unwrap();
    let dir = tempfile::tempdir().unwrap();
    let local_file = dir.path().join("upload.bin");

    let mut content = vec![0x02u8; 512];
    content.extend(std::iter::repeat_n(0x03u8, 20));
    tokio::fs::write(&local_file, &content).await.unwrap();

    let client_task = tokio::spawn({
        let mut session =
            bootstrap_client(server_addr, Direction::Write, "upload.bin", &local_file).await;
        async move { engine::run(&mut session).await }
    });

    let (_, peer) = recv_from(&server).await; // WRQ
    send_to(&server, &Packet::ACK { block_num: 0 }, peer).await;

    let (pkt, _) = recv_from(&server).await; // DATA 1
    assert!(matches!(pkt, Packet::DATA { block_num: 1, .. }));
    send_to(&server, &Packet::ACK { block_num: 1 }, peer).await;

    let (pkt, _) = recv_from(&server).await; // DATA 2 (final, < 512 bytes)
    assert!(matches!(pkt, Packet::DATA { block_num: 2, .. }));

    // Stale ACK(1) must be ignored; the client should still be waiting for
    // ACK(2), so send it last.
    send_to(&server, &Packet::ACK { block_num: 1 }, peer).await;
    send_to(&server, &Packet::ACK { block_num: 2 }, peer).await;

    client_task.await.unwrap().unwrap();
}
