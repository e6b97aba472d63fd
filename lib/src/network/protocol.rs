use std::time::Duration;

use log::debug;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::time::timeout;

use crate::error::Error;
use crate::network::packet::{ResponseFrame, RESPONSE_FRAME_SIZE};

// Reexport all stream/socket related stuff for convenience purposes
pub use super::socket::*;

/// Write a single notification packet to the gateway.
/// This is the whole send protocol. Packets aren't length-prefixed on the
/// outside, the fixed header plus the embedded payload length delimit them.
pub async fn send_packet(packet: &[u8], stream: &mut GenericStream) -> Result<(), Error> {
    stream
        .write_all(packet)
        .await
        .map_err(|err| Error::IoError("sending notification packet".to_string(), err))?;
    stream
        .flush()
        .await
        .map_err(|err| Error::IoError("flushing notification packet".to_string(), err))?;

    Ok(())
}

/// What a bounded wait on the response channel turned up.
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub enum ProbeOutcome {
    /// The gateway stayed silent for the whole wait window.
    /// The wire protocol only speaks up to reject a packet, so silence is
    /// the success path.
    Silent,
    /// The gateway sent a response frame.
    Frame(ResponseFrame),
}

/// Probe the response channel for up to `wait`.
///
/// Responses are asynchronous and usually absent: the gateway only writes a
/// frame (and then closes the connection) when it rejects a packet. An I/O
/// error while reading an available frame is returned as an error and is
/// recoverable from the delivery engine's point of view.
pub async fn probe_response(
    stream: &mut GenericStream,
    wait: Duration,
) -> Result<ProbeOutcome, Error> {
    let mut bytes = [0; RESPONSE_FRAME_SIZE];
    match timeout(wait, stream.read_exact(&mut bytes)).await {
        // No data within the wait window.
        Err(_) => Ok(ProbeOutcome::Silent),
        Ok(Ok(_)) => {
            let frame = ResponseFrame::decode(bytes);
            debug!("Received response frame: {frame:?}");
            Ok(ProbeOutcome::Frame(frame))
        }
        Ok(Err(err)) => Err(Error::IoError("reading response frame".to_string(), err)),
    }
}
