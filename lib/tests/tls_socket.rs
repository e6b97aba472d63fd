use std::fs::File;
use std::io::{Cursor, Write};
use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use byteorder::{BigEndian, ReadBytesExt};
use pretty_assertions::assert_eq;
use rustls::{Certificate, PrivateKey, ServerConfig};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::task;
use tokio_rustls::TlsAcceptor;

use pushq_lib::delivery::PushClient;
use pushq_lib::message::Message;
use pushq_lib::network::packet::{
    decode_packet, Packet, ResponseFrame, PACKET_HEADER_SIZE, RESPONSE_COMMAND, STATUS_OK,
};
use pushq_lib::settings::{Environment, Shared};

/// Read one full notification packet from the fake gateway's stream.
async fn read_packet<S: AsyncReadExt + Unpin>(stream: &mut S) -> Packet {
    let mut bytes = vec![0; PACKET_HEADER_SIZE];
    stream.read_exact(&mut bytes).await.unwrap();

    let mut length = Cursor::new(&bytes[PACKET_HEADER_SIZE - 2..]);
    let payload_length = ReadBytesExt::read_u16::<BigEndian>(&mut length).unwrap() as usize;

    let mut payload = vec![0; payload_length];
    stream.read_exact(&mut payload).await.unwrap();
    bytes.extend_from_slice(&payload);

    decode_packet(&bytes).unwrap()
}

fn write_pem(path: &Path, blob: &str) -> Result<()> {
    let mut file = File::create(path)?;
    file.write_all(blob.as_bytes())?;
    Ok(())
}

#[tokio::test]
/// This tests whether the client can talk to a gateway via real TLS
/// sockets: stub certificates are generated on the fly, the fake gateway
/// acknowledges the packet with an explicit success frame.
async fn test_tls_socket() -> Result<()> {
    let tempdir = tempfile::tempdir()?;

    // The gateway's certificate doubles as the CA the client trusts.
    let gateway_identity = rcgen::generate_simple_self_signed(vec!["localhost".to_string()])?;
    let ca_path = tempdir.path().join("gateway_ca.cert");
    write_pem(&ca_path, &gateway_identity.serialize_pem()?)?;

    // A separate client identity, as the real gateway would require.
    let client_identity = rcgen::generate_simple_self_signed(vec!["pushq-client".to_string()])?;
    let cert_path = tempdir.path().join("push.cert");
    let key_path = tempdir.path().join("push.key");
    write_pem(&cert_path, &client_identity.serialize_pem()?)?;
    write_pem(&key_path, &client_identity.serialize_private_key_pem())?;

    // A fake gateway with a proper TLS layer on top of a local socket.
    let server_config = ServerConfig::builder()
        .with_safe_default_cipher_suites()
        .with_safe_default_kx_groups()
        .with_safe_default_protocol_versions()?
        .with_no_client_auth()
        .with_single_cert(
            vec![Certificate(gateway_identity.serialize_der()?)],
            PrivateKey(gateway_identity.serialize_private_key_der()),
        )?;
    let acceptor = TlsAcceptor::from(Arc::new(server_config));
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let port = listener.local_addr()?.port();

    let gateway = task::spawn(async move {
        let (tcp_stream, _) = listener.accept().await.unwrap();
        let mut stream = acceptor.accept(tcp_stream).await.unwrap();

        let packet = read_packet(&mut stream).await;
        let frame = ResponseFrame {
            command: RESPONSE_COMMAND,
            status: STATUS_OK,
            correlation_id: packet.correlation_id,
        };
        stream.write_all(&frame.encode()).await.unwrap();

        packet
    });

    let shared = Shared {
        environment: Environment::Sandbox,
        host: Some("localhost".to_string()),
        port: Some(port),
        certificate: Some(cert_path),
        private_key: Some(key_path),
        gateway_ca: Some(ca_path),
        response_wait_ms: 100,
        max_attempts: 3,
    };

    let mut message = Message::new("hi");
    let token = "42".repeat(32);
    message.add_recipient(&token)?;

    let mut client = PushClient::with_settings(&shared);
    client.connect().await?;
    let summary = client.send_all(&[message], shared.max_attempts).await?;
    client.disconnect().await;

    assert_eq!(summary.queued_messages, 1);
    assert_eq!(summary.total_notifications, 1);
    assert_eq!(summary.sent_notifications, 1);
    assert_eq!(summary.failed_notifications, 0);
    assert!(client.report().is_empty());

    // The packet that arrived at the gateway matches what was queued.
    let packet = gateway.await?;
    assert_eq!(packet.token, token);
    assert_eq!(packet.payload, br#"{"aps":{"alert":"hi"}}"#.to_vec());
    assert!(packet.expires_at > 0);

    Ok(())
}
