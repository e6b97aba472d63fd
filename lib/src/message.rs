use std::collections::BTreeMap;

use serde_json::{Map, Value};

use crate::error::Error;

/// The top-level payload key reserved by the gateway.
/// Custom properties must never use it.
pub const RESERVED_NAMESPACE: &str = "aps";
/// The maximum size of a serialized payload in bytes.
pub const PAYLOAD_MAX_SIZE: usize = 256;
/// Sound that's played when a message doesn't specify anything else.
/// The gateway falls back to it on its own, which is why the payload
/// only carries a `sound` key for non-default sounds.
pub const DEFAULT_SOUND: &str = "default";
/// Messages are kept for redelivery for 7 days, unless configured otherwise.
pub const DEFAULT_EXPIRY_SECONDS: u32 = 604_800;

/// A logical notification with one or more recipients.
///
/// Don't confuse a message with a payload or a packet.
/// The payload is generated once per message at sending time, the binary
/// packets are generated once per recipient and attempt.
#[derive(PartialEq, Clone, Debug)]
pub struct Message {
    id: u64,
    recipients: Vec<String>,
    alert: String,
    sound: String,
    badge: u32,
    custom: BTreeMap<String, Value>,
    auto_trim: bool,
    expiry_seconds: u32,
}

impl Message {
    /// Create a new message with the given alert text.
    /// The id is only used to correlate retry and error state in the
    /// delivery report. It's never put on the wire.
    pub fn new<T: ToString>(alert: T) -> Self {
        Message {
            id: rand::random(),
            recipients: Vec::new(),
            alert: alert.to_string(),
            sound: DEFAULT_SOUND.to_string(),
            badge: 0,
            custom: BTreeMap::new(),
            auto_trim: true,
            expiry_seconds: DEFAULT_EXPIRY_SECONDS,
        }
    }

    /// Add a new recipient for this message.
    /// Duplicates are allowed and recipients keep their insertion order.
    pub fn add_recipient(&mut self, token: &str) -> Result<(), Error> {
        if !valid_token(token) {
            return Err(Error::InvalidRecipient(token.to_string()));
        }
        self.recipients.push(token.to_string());

        Ok(())
    }

    /// Attach a custom property that's merged into the top level of the
    /// payload. The reserved namespace key is rejected instead of being
    /// silently overwritten.
    pub fn set_custom_property(&mut self, key: &str, value: Value) -> Result<(), Error> {
        if key == RESERVED_NAMESPACE {
            return Err(Error::InvalidConfiguration(format!(
                "The '{RESERVED_NAMESPACE}' payload key is reserved by the gateway."
            )));
        }
        self.custom.insert(key.to_string(), value);

        Ok(())
    }

    /// Set the number to badge the application icon with. 0 unsets it.
    pub fn set_badge(&mut self, badge: u32) {
        self.badge = badge;
    }

    /// Set the sound to play when the notification arrives.
    pub fn set_sound<T: ToString>(&mut self, sound: T) {
        self.sound = sound.to_string();
    }

    /// If enabled, an oversized payload is recovered by shortening the alert
    /// text. Otherwise building the payload fails.
    pub fn set_auto_trim(&mut self, auto_trim: bool) {
        self.auto_trim = auto_trim;
    }

    /// The message expires after this many seconds if it couldn't be
    /// delivered. 0 means the gateway won't store it for redelivery at all.
    pub fn set_expiry(&mut self, expiry_seconds: u32) {
        self.expiry_seconds = expiry_seconds;
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn recipients(&self) -> &[String] {
        &self.recipients
    }

    pub fn alert(&self) -> &str {
        &self.alert
    }

    pub fn expiry_seconds(&self) -> u32 {
        self.expiry_seconds
    }
}

/// Recipient tokens are the 64 character hex representation of a 32 byte
/// device identifier.
pub fn valid_token(token: &str) -> bool {
    token.len() == 64 && token.bytes().all(|byte| byte.is_ascii_hexdigit())
}

/// The serialized payload for a message, shared by all of its recipients.
#[derive(PartialEq, Eq, Clone, Debug)]
pub struct Payload {
    pub bytes: Vec<u8>,
    /// Set if auto-trim had to shorten the alert text to make the payload
    /// fit. The message itself is left untouched.
    pub trimmed_alert: Option<String>,
}

/// Build the JSON payload for a message.
///
/// The alert, badge and sound all live under the reserved namespace key,
/// custom properties are merged at the top level. If the serialized form
/// exceeds [PAYLOAD_MAX_SIZE] and auto-trim is enabled, the alert text is
/// shortened character by character until the payload fits.
pub fn build_payload(message: &Message) -> Result<Payload, Error> {
    let bytes = serialize_payload(message, &message.alert);
    if bytes.len() <= PAYLOAD_MAX_SIZE {
        return Ok(Payload {
            bytes,
            trimmed_alert: None,
        });
    }

    if !message.auto_trim {
        return Err(Error::PayloadTooLarge { size: bytes.len() });
    }

    // Trimming can only recover the overflow if the alert text itself is
    // longer than the excess. Otherwise even an empty alert wouldn't fit.
    let excess = bytes.len() - PAYLOAD_MAX_SIZE;
    if message.alert.len() <= excess {
        return Err(Error::PayloadTooLarge { size: bytes.len() });
    }

    let mut alert = message.alert.clone();
    let mut bytes = bytes;
    while bytes.len() > PAYLOAD_MAX_SIZE {
        // Popping whole chars never splits an encoded code point.
        if alert.pop().is_none() {
            return Err(Error::PayloadTooLarge { size: bytes.len() });
        }
        bytes = serialize_payload(message, &alert);
    }

    Ok(Payload {
        bytes,
        trimmed_alert: Some(alert),
    })
}

fn serialize_payload(message: &Message, alert: &str) -> Vec<u8> {
    let mut reserved = Map::new();
    reserved.insert("alert".to_string(), Value::String(alert.to_string()));
    if message.badge > 0 {
        reserved.insert("badge".to_string(), Value::from(message.badge));
    }
    if message.sound != DEFAULT_SOUND {
        reserved.insert("sound".to_string(), Value::String(message.sound.clone()));
    }

    let mut payload = Map::new();
    payload.insert(RESERVED_NAMESPACE.to_string(), Value::Object(reserved));
    for (key, value) in &message.custom {
        payload.insert(key.clone(), value.clone());
    }

    // Serializing a Map of Values cannot fail.
    serde_json::to_vec(&Value::Object(payload)).expect("Failed to serialize a JSON map.")
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    fn test_token() -> String {
        "ab".repeat(32)
    }

    #[test]
    fn accepts_valid_tokens() {
        let mut message = Message::new("hello");
        message.add_recipient(&test_token()).unwrap();
        message.add_recipient(&"0123456789ABCDEF".repeat(4)).unwrap();
        // Duplicates are fine and order is preserved.
        message.add_recipient(&test_token()).unwrap();

        assert_eq!(message.recipients().len(), 3);
        assert_eq!(message.recipients()[0], message.recipients()[2]);
    }

    #[test]
    fn rejects_invalid_tokens() {
        let mut message = Message::new("hello");
        let too_short = "a".repeat(63);
        let too_long = "a".repeat(65);
        let non_hex = format!("{}g", "a".repeat(63));
        let padded = format!("{} ", "a".repeat(63));
        for token in [
            "",
            "abc",
            too_short.as_str(),
            too_long.as_str(),
            non_hex.as_str(),
            padded.as_str(),
        ] {
            let result = message.add_recipient(token);
            assert!(
                matches!(result, Err(Error::InvalidRecipient(_))),
                "Token {token:?} should have been rejected"
            );
        }
        assert!(message.recipients().is_empty());
    }

    #[test]
    fn minimal_payload_shape() {
        let message = Message::new("hi");
        let payload = build_payload(&message).unwrap();

        // Badge 0 and the default sound are omitted.
        assert_eq!(payload.bytes, br#"{"aps":{"alert":"hi"}}"#.to_vec());
        assert_eq!(payload.trimmed_alert, None);
    }

    #[test]
    fn full_payload_shape() {
        let mut message = Message::new("hi");
        message.set_badge(3);
        message.set_sound("horn");
        message
            .set_custom_property("article_id", json!(1234))
            .unwrap();
        let payload = build_payload(&message).unwrap();

        let expected = json!({
            "aps": {"alert": "hi", "badge": 3, "sound": "horn"},
            "article_id": 1234,
        });
        let actual: Value = serde_json::from_slice(&payload.bytes).unwrap();
        assert_eq!(actual, expected);
    }

    #[test]
    fn payload_encoding_is_deterministic() {
        let mut message = Message::new("hi");
        message.set_badge(1);
        message.set_custom_property("b", json!("two")).unwrap();
        message.set_custom_property("a", json!("one")).unwrap();

        let first = build_payload(&message).unwrap();
        let second = build_payload(&message).unwrap();
        assert_eq!(first.bytes, second.bytes);
    }

    #[test]
    fn reserved_namespace_key_is_guarded() {
        let mut message = Message::new("hi");
        let result = message.set_custom_property(RESERVED_NAMESPACE, json!({"alert": "spoofed"}));
        assert!(matches!(result, Err(Error::InvalidConfiguration(_))));
    }

    #[test]
    fn oversized_payload_fails_without_auto_trim() {
        let mut message = Message::new("a".repeat(300));
        message.set_auto_trim(false);

        let result = build_payload(&message);
        assert!(matches!(
            result,
            Err(Error::PayloadTooLarge { size }) if size > PAYLOAD_MAX_SIZE
        ));
    }

    #[test]
    fn auto_trim_shortens_the_alert() {
        let message = Message::new("a".repeat(300));
        let payload = build_payload(&message).unwrap();

        assert!(payload.bytes.len() <= PAYLOAD_MAX_SIZE);
        let trimmed = payload.trimmed_alert.expect("Alert should have been trimmed");
        assert!(trimmed.len() < 300);
        assert!(trimmed.bytes().all(|byte| byte == b'a'));
        // The message itself stays untouched.
        assert_eq!(message.alert().len(), 300);
    }

    #[test]
    fn auto_trim_respects_char_boundaries() {
        let message = Message::new("ü".repeat(200));
        let payload = build_payload(&message).unwrap();

        assert!(payload.bytes.len() <= PAYLOAD_MAX_SIZE);
        // Re-parsing proves no code point was split in half.
        let value: Value = serde_json::from_slice(&payload.bytes).unwrap();
        let alert = value["aps"]["alert"].as_str().unwrap();
        assert!(alert.chars().all(|char| char == 'ü'));
    }

    #[test]
    fn auto_trim_gives_up_when_custom_properties_overflow() {
        let mut message = Message::new("short");
        message
            .set_custom_property("blob", json!("x".repeat(300)))
            .unwrap();

        // Even dropping the whole alert cannot save this payload.
        let result = build_payload(&message);
        assert!(matches!(result, Err(Error::PayloadTooLarge { .. })));
    }
}
