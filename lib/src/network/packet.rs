use std::io::{Cursor, Read, Write};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use chrono::Utc;
use strum_macros::Display;

use crate::error::Error;
use crate::message::PAYLOAD_MAX_SIZE;

/// Command byte of an outgoing notification packet ("enhanced" format).
pub const PUSH_COMMAND: u8 = 1;
/// Command byte of the gateway's error-response frame.
pub const RESPONSE_COMMAND: u8 = 8;
/// Binary size of a decoded recipient token.
pub const TOKEN_BINARY_SIZE: usize = 32;
/// Size of everything before the payload:
/// command, correlation id, expiry, token length, token and payload length.
pub const PACKET_HEADER_SIZE: usize = 1 + 4 + 4 + 2 + TOKEN_BINARY_SIZE + 2;
/// A response frame is always exactly six bytes.
pub const RESPONSE_FRAME_SIZE: usize = 6;
/// The status code the gateway uses for explicit acknowledgements.
pub const STATUS_OK: u8 = 0;

/// Compute the absolute unix timestamp a packet expires at.
/// 0 stays 0, which tells the gateway not to store the notification for
/// redelivery at all.
pub fn expires_at(expiry_seconds: u32) -> u32 {
    if expiry_seconds == 0 {
        return 0;
    }
    let now = Utc::now().timestamp().max(0) as u32;
    now.saturating_add(expiry_seconds)
}

/// Encode the binary packet for a single (message, recipient) pair.
///
/// All multi-byte fields are big-endian:
/// `[command:u8=1][correlation_id:u32][expiry:u32][token_length:u16=32]`
/// `[token:32 bytes][payload_length:u16][payload]`
pub fn encode_packet(
    token: &str,
    payload: &[u8],
    correlation_id: u32,
    expires_at: u32,
) -> Result<Vec<u8>, Error> {
    let token_bytes =
        hex::decode(token).map_err(|_| Error::InvalidRecipient(token.to_string()))?;
    if token_bytes.len() != TOKEN_BINARY_SIZE {
        return Err(Error::InvalidRecipient(token.to_string()));
    }
    if payload.len() > PAYLOAD_MAX_SIZE {
        return Err(Error::PayloadTooLarge {
            size: payload.len(),
        });
    }

    // Writing into a Vec cannot fail.
    let mut packet = Vec::with_capacity(PACKET_HEADER_SIZE + payload.len());
    packet.write_u8(PUSH_COMMAND).unwrap();
    packet.write_u32::<BigEndian>(correlation_id).unwrap();
    packet.write_u32::<BigEndian>(expires_at).unwrap();
    packet
        .write_u16::<BigEndian>(TOKEN_BINARY_SIZE as u16)
        .unwrap();
    packet.write_all(&token_bytes).unwrap();
    packet.write_u16::<BigEndian>(payload.len() as u16).unwrap();
    packet.write_all(payload).unwrap();

    Ok(packet)
}

/// A decoded notification packet.
/// The counterpart of [encode_packet], mainly used to inspect packets in
/// tests and fake gateways.
#[derive(PartialEq, Eq, Clone, Debug)]
pub struct Packet {
    pub correlation_id: u32,
    pub expires_at: u32,
    /// The recipient token, hex-encoded again.
    pub token: String,
    pub payload: Vec<u8>,
}

pub fn decode_packet(bytes: &[u8]) -> Result<Packet, Error> {
    let mut cursor = Cursor::new(bytes);

    let command = cursor.read_u8()?;
    if command != PUSH_COMMAND {
        return Err(Error::Generic(format!(
            "Unexpected packet command: {command}"
        )));
    }
    let correlation_id = cursor.read_u32::<BigEndian>()?;
    let expires_at = cursor.read_u32::<BigEndian>()?;

    let token_length = cursor.read_u16::<BigEndian>()? as usize;
    if token_length != TOKEN_BINARY_SIZE {
        return Err(Error::Generic(format!(
            "Unexpected token length: {token_length}"
        )));
    }
    let mut token = vec![0; token_length];
    cursor.read_exact(&mut token)?;

    let payload_length = cursor.read_u16::<BigEndian>()? as usize;
    let mut payload = vec![0; payload_length];
    cursor.read_exact(&mut payload)?;

    Ok(Packet {
        correlation_id,
        expires_at,
        token: hex::encode(token),
        payload,
    })
}

/// The six byte frame the gateway sends before closing the connection when
/// it rejects a packet: `[command:u8][status:u8][correlation_id:u32]`.
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub struct ResponseFrame {
    pub command: u8,
    pub status: u8,
    pub correlation_id: u32,
}

impl ResponseFrame {
    pub fn decode(bytes: [u8; RESPONSE_FRAME_SIZE]) -> Self {
        let mut correlation = Cursor::new(&bytes[2..]);
        ResponseFrame {
            command: bytes[0],
            status: bytes[1],
            // Four bytes out of a six byte array are always there.
            correlation_id: correlation.read_u32::<BigEndian>().unwrap(),
        }
    }

    pub fn encode(&self) -> [u8; RESPONSE_FRAME_SIZE] {
        let mut bytes = [0; RESPONSE_FRAME_SIZE];
        bytes[0] = self.command;
        bytes[1] = self.status;
        let mut correlation = Cursor::new(&mut bytes[2..]);
        correlation.write_u32::<BigEndian>(self.correlation_id).unwrap();

        bytes
    }
}

/// The gateway's fixed status code table.
#[derive(PartialEq, Eq, Clone, Copy, Debug, Display)]
pub enum GatewayStatus {
    #[strum(to_string = "No errors encountered")]
    NoErrors,
    #[strum(to_string = "Processing error")]
    ProcessingError,
    #[strum(to_string = "Missing device token")]
    MissingDeviceToken,
    #[strum(to_string = "Missing topic")]
    MissingTopic,
    #[strum(to_string = "Missing payload")]
    MissingPayload,
    #[strum(to_string = "Invalid token size")]
    InvalidTokenSize,
    #[strum(to_string = "Invalid topic size")]
    InvalidTopicSize,
    #[strum(to_string = "Invalid payload size")]
    InvalidPayloadSize,
    #[strum(to_string = "Invalid token")]
    InvalidToken,
    #[strum(to_string = "None (unknown)")]
    Unknown,
}

impl From<u8> for GatewayStatus {
    fn from(status: u8) -> Self {
        match status {
            0 => GatewayStatus::NoErrors,
            1 => GatewayStatus::ProcessingError,
            2 => GatewayStatus::MissingDeviceToken,
            3 => GatewayStatus::MissingTopic,
            4 => GatewayStatus::MissingPayload,
            5 => GatewayStatus::InvalidTokenSize,
            6 => GatewayStatus::InvalidTopicSize,
            7 => GatewayStatus::InvalidPayloadSize,
            8 => GatewayStatus::InvalidToken,
            _ => GatewayStatus::Unknown,
        }
    }
}

/// The human readable description for a gateway status code.
/// Codes outside the table map to the generic unknown description.
pub fn status_description(status: u8) -> String {
    GatewayStatus::from(status).to_string()
}
