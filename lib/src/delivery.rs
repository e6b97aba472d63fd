use std::time::Duration;

use log::{debug, error, info, warn};
use tokio::io::AsyncWriteExt;

use crate::error::Error;
use crate::message::{build_payload, Message};
use crate::network::packet::{encode_packet, expires_at, STATUS_OK};
use crate::network::protocol::{probe_response, send_packet, ProbeOutcome};
use crate::network::socket::{Connector, GatewayConnector, GenericStream};
use crate::report::{AttemptError, DeliveryReport, Summary};
use crate::settings::Shared;

/// The delivery engine.
///
/// It owns a single connection to the push gateway and pushes queued
/// messages through it, one packet at a time: write, then probe the
/// response channel for a bounded wait, then retry or advance. Messages and
/// their recipients are processed strictly in insertion order. The wire
/// format would tolerate pipelining, but one packet in flight at a time
/// keeps response correlation trivial.
///
/// Rejections and probe hiccups are recoverable: they're recorded in the
/// [DeliveryReport] and the affected (message, recipient) pair is retried
/// up to the attempt cap. Transport failures abort the whole run, leaving
/// the remaining queue untouched.
pub struct PushClient {
    connector: Box<dyn Connector>,
    stream: Option<GenericStream>,
    /// How long a probe waits for an error response after each packet.
    /// Silence for this long counts as success.
    response_wait: Duration,
    report: DeliveryReport,
    summary: Summary,
    /// Correlation ids are assigned per attempt, not per message, so
    /// rejection frames distinguish retries of the same recipient.
    correlation_id: u32,
}

impl PushClient {
    pub fn new(connector: Box<dyn Connector>, response_wait: Duration) -> Self {
        PushClient {
            connector,
            stream: None,
            response_wait,
            report: DeliveryReport::default(),
            summary: Summary::default(),
            correlation_id: 0,
        }
    }

    /// Build a client for the configured gateway with a TLS connector.
    pub fn with_settings(settings: &Shared) -> Self {
        Self::new(
            Box::new(GatewayConnector::push(settings)),
            Duration::from_millis(settings.response_wait_ms),
        )
    }

    /// Establish the connection to the gateway.
    /// Calling this on an already connected client is a caller error.
    pub async fn connect(&mut self) -> Result<(), Error> {
        if self.stream.is_some() {
            return Err(Error::InvalidConfiguration(
                "This client is already connected to the gateway.".into(),
            ));
        }

        info!("Connecting to the push gateway");
        let stream = self.connector.connect().await?;
        self.stream = Some(stream);

        Ok(())
    }

    /// Close the connection. Safe to call any number of times.
    pub async fn disconnect(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            // The gateway closes its side after error frames, a failing
            // shutdown is expected here.
            if let Err(err) = stream.shutdown().await {
                debug!("Error while closing the gateway stream: {err}");
            }
            info!("Connection closed");
        }
    }

    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    /// Send all queued messages, one packet per recipient.
    ///
    /// Returns the run's [Summary]. Per-recipient failure detail is
    /// collected in [report](Self::report). When the run aborts with an
    /// error, [summary](Self::summary) and the report still cover
    /// everything that was attempted up to that point.
    pub async fn send_all(
        &mut self,
        messages: &[Message],
        max_attempts: u32,
    ) -> Result<Summary, Error> {
        if max_attempts == 0 {
            return Err(Error::InvalidConfiguration(
                "max_attempts must be at least 1.".into(),
            ));
        }

        // Every run starts with a fresh report and summary.
        self.report = DeliveryReport::default();
        self.summary = Summary {
            queued_messages: messages.len(),
            ..Default::default()
        };
        info!("{} messages to send", messages.len());

        for message in messages {
            // The payload is built once per message and shared by all of
            // its recipients. Content errors fail the run right here.
            let payload = build_payload(message)?;
            if let Some(alert) = &payload.trimmed_alert {
                warn!(
                    "Alert text of message {} was trimmed to fit the payload limit: {alert:?}",
                    message.id()
                );
            }

            for recipient in message.recipients() {
                self.summary.total_notifications += 1;
                match self.deliver(message, recipient, &payload.bytes, max_attempts).await {
                    Ok(true) => self.summary.sent_notifications += 1,
                    Ok(false) => self.summary.failed_notifications += 1,
                    Err(err) => {
                        self.summary.failed_notifications += 1;
                        error!("Aborting the run: {err}");
                        return Err(err);
                    }
                }
            }
        }

        info!(
            "{} of {} notifications sent",
            self.summary.sent_notifications, self.summary.total_notifications
        );

        Ok(self.summary.clone())
    }

    /// The summary of the current (or last) run.
    pub fn summary(&self) -> &Summary {
        &self.summary
    }

    /// The error report of the current (or last) run.
    pub fn report(&self) -> &DeliveryReport {
        &self.report
    }

    /// Deliver one notification to one recipient, retrying up to the
    /// attempt cap.
    ///
    /// `Ok(true)` means the notification counts as sent, `Ok(false)` means
    /// all attempts were used up. An `Err` is a transport failure that has
    /// to abort the whole run.
    async fn deliver(
        &mut self,
        message: &Message,
        recipient: &str,
        payload: &[u8],
        max_attempts: u32,
    ) -> Result<bool, Error> {
        while self.report.attempts(message.id(), recipient) < max_attempts {
            let correlation_id = self.next_correlation_id();

            // Transparently resume a connection a previous failure dropped.
            if self.stream.is_none() {
                info!("Gateway connection is down, reconnecting");
                if let Err(err) = self.connect().await {
                    self.report.record_failure(
                        message.id(),
                        recipient,
                        AttemptError::transport(
                            format!("Reconnecting to the gateway failed: {err}"),
                            correlation_id,
                        ),
                    );
                    return Err(err);
                }
            }

            let packet = encode_packet(
                recipient,
                payload,
                correlation_id,
                expires_at(message.expiry_seconds()),
            )?;

            debug!(
                "Sending packet for message {} to {recipient} (correlation id {correlation_id})",
                message.id()
            );
            if let Err(err) = self.write_packet(&packet).await {
                // A broken pipe is not retried within the same run. The
                // caller has to re-invoke after fixing the transport.
                self.disconnect().await;
                self.report.record_failure(
                    message.id(),
                    recipient,
                    AttemptError::transport(
                        format!("Writing to the gateway failed: {err}"),
                        correlation_id,
                    ),
                );
                return Err(err);
            }

            match self.probe().await {
                // The gateway had nothing to complain about.
                Ok(ProbeOutcome::Silent) => {
                    debug!("Message sent successfully");
                    return Ok(true);
                }
                Ok(ProbeOutcome::Frame(frame)) if frame.status == STATUS_OK => {
                    debug!(
                        "Message sent successfully to correlation id {}",
                        frame.correlation_id
                    );
                    return Ok(true);
                }
                Ok(ProbeOutcome::Frame(frame)) => {
                    warn!(
                        "Gateway rejected correlation id {} with status {}",
                        frame.correlation_id, frame.status
                    );
                    // The gateway closes the connection after an error
                    // frame. The next attempt reconnects.
                    self.disconnect().await;
                    self.report.record_failure(
                        message.id(),
                        recipient,
                        AttemptError::rejection(frame.status, frame.correlation_id),
                    );
                }
                Err(err) => {
                    warn!("Probing for a response failed: {err}");
                    // The stream state is unknown at this point, start the
                    // next attempt on a fresh connection.
                    self.disconnect().await;
                    self.report.record_failure(
                        message.id(),
                        recipient,
                        AttemptError::transport(
                            format!("Probing for a response failed: {err}"),
                            correlation_id,
                        ),
                    );
                }
            }
        }

        warn!(
            "Giving up on recipient {recipient} of message {} after {max_attempts} attempts",
            message.id()
        );
        Ok(false)
    }

    async fn write_packet(&mut self, packet: &[u8]) -> Result<(), Error> {
        match self.stream.as_mut() {
            Some(stream) => send_packet(packet, stream).await,
            None => Err(Error::Connection("Not connected to the gateway.".into())),
        }
    }

    async fn probe(&mut self) -> Result<ProbeOutcome, Error> {
        match self.stream.as_mut() {
            Some(stream) => probe_response(stream, self.response_wait).await,
            None => Err(Error::Connection("Not connected to the gateway.".into())),
        }
    }

    fn next_correlation_id(&mut self) -> u32 {
        self.correlation_id = self.correlation_id.wrapping_add(1);
        self.correlation_id
    }
}
