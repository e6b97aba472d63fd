use std::io::{Cursor, Read};

use byteorder::{BigEndian, ReadBytesExt};
use log::debug;
use serde_derive::{Deserialize, Serialize};
use tokio::io::AsyncReadExt;

use crate::error::Error;
use crate::network::socket::GenericStream;

/// One stale-token entry of the feedback service's report.
#[derive(PartialEq, Eq, Clone, Debug, Deserialize, Serialize)]
pub struct FeedbackEntry {
    /// Unix timestamp of when the gateway last failed to deliver to this
    /// device.
    pub timestamp: u32,
    /// The device token, hex-encoded.
    pub token: String,
}

/// Read the full stale-token report from the feedback service.
///
/// The service is read-only: right after the handshake it writes
/// `[timestamp:u32][token_length:u16][token]` tuples (big-endian) and closes
/// the connection. A report that ends in the middle of a tuple is treated as
/// a connection failure.
pub async fn read_feedback(stream: &mut GenericStream) -> Result<Vec<FeedbackEntry>, Error> {
    let mut raw = Vec::new();
    stream
        .read_to_end(&mut raw)
        .await
        .map_err(|err| Error::IoError("reading feedback report".to_string(), err))?;
    debug!("Received {} bytes of feedback data", raw.len());

    let mut entries = Vec::new();
    let mut cursor = Cursor::new(raw.as_slice());
    while (cursor.position() as usize) < raw.len() {
        let timestamp = ReadBytesExt::read_u32::<BigEndian>(&mut cursor)
            .map_err(|_| truncated_report())?;
        let token_length = ReadBytesExt::read_u16::<BigEndian>(&mut cursor)
            .map_err(|_| truncated_report())? as usize;

        let mut token = vec![0; token_length];
        Read::read_exact(&mut cursor, &mut token).map_err(|_| truncated_report())?;

        entries.push(FeedbackEntry {
            timestamp,
            token: hex::encode(token),
        });
    }

    Ok(entries)
}

fn truncated_report() -> Error {
    Error::Connection("The feedback report ended in the middle of a tuple.".into())
}

#[cfg(test)]
mod test {
    use byteorder::WriteBytesExt;
    use pretty_assertions::assert_eq;
    use tokio::io::AsyncWriteExt;

    use super::*;

    fn tuple(timestamp: u32, token: &[u8]) -> Vec<u8> {
        let mut bytes = Vec::new();
        WriteBytesExt::write_u32::<BigEndian>(&mut bytes, timestamp).unwrap();
        WriteBytesExt::write_u16::<BigEndian>(&mut bytes, token.len() as u16).unwrap();
        bytes.extend_from_slice(token);
        bytes
    }

    #[tokio::test]
    async fn parses_a_full_report() {
        let (client, mut service) = tokio::io::duplex(1024);
        let mut stream: GenericStream = Box::new(client);

        let first_token = [0xab; 32];
        let second_token = [0x01; 32];
        service.write_all(&tuple(1_600_000_000, &first_token)).await.unwrap();
        service.write_all(&tuple(1_600_000_060, &second_token)).await.unwrap();
        drop(service);

        let entries = read_feedback(&mut stream).await.unwrap();
        assert_eq!(
            entries,
            vec![
                FeedbackEntry {
                    timestamp: 1_600_000_000,
                    token: "ab".repeat(32),
                },
                FeedbackEntry {
                    timestamp: 1_600_000_060,
                    token: "01".repeat(32),
                },
            ]
        );
    }

    #[tokio::test]
    async fn empty_report_is_fine() {
        let (client, service) = tokio::io::duplex(1024);
        let mut stream: GenericStream = Box::new(client);
        drop(service);

        let entries = read_feedback(&mut stream).await.unwrap();
        assert!(entries.is_empty());
    }

    #[tokio::test]
    async fn truncated_report_is_an_error() {
        let (client, mut service) = tokio::io::duplex(1024);
        let mut stream: GenericStream = Box::new(client);

        let mut bytes = tuple(1_600_000_000, &[0xab; 32]);
        bytes.truncate(bytes.len() - 5);
        service.write_all(&bytes).await.unwrap();
        drop(service);

        let result = read_feedback(&mut stream).await;
        assert!(matches!(result, Err(Error::Connection(_))));
    }
}
