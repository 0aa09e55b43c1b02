// Payload signing for outbound webhook deliveries
//
// Signatures are HMAC-SHA256 over the canonical JSON form of the payload.
// The canonical bytes are also what goes on the wire, so a receiver can
// verify against the raw request body.

use hmac::{Hmac, Mac};
use serde_json::Value;
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the signature, formatted as `sha256=<hex>`
pub const SIGNATURE_HEADER: &str = "X-Hub-Signature";

/// Header carrying the event type
pub const EVENT_TYPE_HEADER: &str = "X-Event-Type";

const SIGNATURE_PREFIX: &str = "sha256=";

/// Serialize a payload into its canonical JSON form
///
/// Object keys are sorted at every depth and no whitespace is emitted, so two
/// payloads that compare equal always produce identical bytes regardless of
/// how the map was built.
pub fn canonical_json(payload: &Value) -> Vec<u8> {
    let mut out = Vec::with_capacity(64);
    write_canonical(payload, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut Vec<u8>) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push(b'{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                write_scalar(&Value::String(key.clone()), out);
                out.push(b':');
                write_canonical(&map[key], out);
            }
            out.push(b'}');
        }
        Value::Array(items) => {
            out.push(b'[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                write_canonical(item, out);
            }
            out.push(b']');
        }
        scalar => write_scalar(scalar, out),
    }
}

fn write_scalar(value: &Value, out: &mut Vec<u8>) {
    // Serializing a scalar Value into a Vec cannot fail
    if serde_json::to_writer(&mut *out, value).is_err() {
        out.extend_from_slice(b"null");
    }
}

/// Compute the hex-encoded HMAC-SHA256 of raw bytes
pub fn sign_bytes(body: &[u8], secret: &str) -> String {
    let mut mac = new_mac(secret);
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

/// Sign a payload with the subscription secret
///
/// Deterministic for identical `(payload, secret)` pairs.
pub fn sign(payload: &Value, secret: &str) -> String {
    sign_bytes(&canonical_json(payload), secret)
}

/// Format a hex digest as the signature header value
pub fn signature_header_value(hex_digest: &str) -> String {
    format!("{}{}", SIGNATURE_PREFIX, hex_digest)
}

/// Verify a `sha256=<hex>` header against a raw body
///
/// The comparison runs through the MAC verifier, which is constant-time.
pub fn verify(body: &[u8], secret: &str, header_value: &str) -> bool {
    let Some(hex_digest) = header_value.trim().strip_prefix(SIGNATURE_PREFIX) else {
        return false;
    };
    let Ok(expected) = hex::decode(hex_digest) else {
        return false;
    };

    let mut mac = new_mac(secret);
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}

fn new_mac(secret: &str) -> HmacSha256 {
    HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size")
}
