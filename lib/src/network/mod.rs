/// Client for the feedback service's stale-token report.
pub mod feedback;
/// The binary packet and response frame layout.
pub mod packet;
/// Wire helpers used by the delivery engine.
pub mod protocol;
/// Generic stream abstractions and the TLS connector.
pub mod socket;
/// Everything about TLS client setup and certificate loading.
pub mod tls;
