//! # Payment Callback Signatures
//!
//! Keyed HMAC-SHA256 over a canonical string. The canonical string joins
//! `field=value` pairs with commas, in the order the fields are named:
//!
//! ```text
//! m_payment_id=7f3c…,payment_status=COMPLETE,amount_gross=80.00
//! ```
//!
//! The signature is the lowercase hex digest. Verification compares in
//! constant time. The same scheme signs outbound checkout forms.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// Form field carrying the payment correlation id.
pub const CORRELATION_FIELD: &str = "m_payment_id";
/// Form field carrying the processor's status.
pub const STATUS_FIELD: &str = "payment_status";
/// Form field carrying the hex signature.
pub const SIGNATURE_FIELD: &str = "signature";
/// Optional form field listing the signed field names, comma separated.
pub const SIGNED_FIELDS_FIELD: &str = "signed_fields";

/// Reasons a callback fails authentication.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SignatureError {
    /// A field named in `signed_fields` is absent from the payload.
    #[error("signed field {0} missing from payload")]
    MissingField(String),
    /// The signature does not cover a field the engine relies on.
    #[error("signature does not cover {0}")]
    UncoveredField(&'static str),
    /// Digest mismatch.
    #[error("signature mismatch")]
    Mismatch,
}

/// Build the canonical `a=1,b=2` string from ordered pairs.
pub fn canonical_string<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> String {
    pairs
        .into_iter()
        .map(|(name, value)| format!("{name}={value}"))
        .collect::<Vec<_>>()
        .join(",")
}

/// Encode bytes as lowercase hex string.
fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// HMAC signer holding the shared processor secret.
#[derive(Clone)]
pub struct CallbackSigner {
    secret: Vec<u8>,
}

impl std::fmt::Debug for CallbackSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackSigner")
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

impl CallbackSigner {
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    /// Hex HMAC-SHA256 of `canonical`.
    pub fn sign(&self, canonical: &str) -> String {
        // HMAC accepts keys of any length.
        let mut mac = match HmacSha256::new_from_slice(&self.secret) {
            Ok(mac) => mac,
            Err(_) => return String::new(),
        };
        mac.update(canonical.as_bytes());
        to_hex(&mac.finalize().into_bytes())
    }

    /// Sign ordered pairs with the canonical scheme.
    pub fn sign_pairs<'a>(&self, pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> String {
        self.sign(&canonical_string(pairs))
    }

    /// Verify a callback's signature over its declared signed fields.
    ///
    /// The signed fields must include the correlation id and the status so
    /// a valid signature cannot be replayed against another payment.
    pub fn verify(&self, callback: &PaymentCallback) -> Result<(), SignatureError> {
        for required in [CORRELATION_FIELD, STATUS_FIELD] {
            if !callback.signed_fields.iter().any(|f| f == required) {
                return Err(SignatureError::UncoveredField(required));
            }
        }
        let mut pairs = Vec::with_capacity(callback.signed_fields.len());
        for name in &callback.signed_fields {
            let value = callback
                .field(name)
                .ok_or_else(|| SignatureError::MissingField(name.clone()))?;
            pairs.push((name.as_str(), value));
        }
        let expected = self.sign_pairs(pairs);
        let provided = callback.signature.trim().to_ascii_lowercase();
        if expected.is_empty() || !bool::from(expected.as_bytes().ct_eq(provided.as_bytes())) {
            return Err(SignatureError::Mismatch);
        }
        Ok(())
    }
}

/// An inbound payment-processor callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentCallback {
    /// Correlation id of the payment (`m_payment_id`).
    pub correlation_id: String,
    /// Processor status (`payment_status`), e.g. `COMPLETE`.
    pub external_status: String,
    /// Names of the fields covered by `signature`, in signing order.
    pub signed_fields: Vec<String>,
    /// Hex signature as received.
    pub signature: String,
    /// Every field of the payload, in received order.
    pub fields: Vec<(String, String)>,
}

impl PaymentCallback {
    /// Parse a form-encoded callback body already split into pairs.
    ///
    /// When `signed_fields` is absent the signature is taken to cover every
    /// field except `signature` itself, in received order.
    pub fn from_fields(fields: Vec<(String, String)>) -> Result<Self, CallbackError> {
        let lookup = |name: &str| {
            fields
                .iter()
                .find(|(k, _)| k == name)
                .map(|(_, v)| v.clone())
        };
        let correlation_id = lookup(CORRELATION_FIELD)
            .filter(|v| !v.trim().is_empty())
            .ok_or(CallbackError::MissingField(CORRELATION_FIELD))?;
        let external_status =
            lookup(STATUS_FIELD).ok_or(CallbackError::MissingField(STATUS_FIELD))?;
        let signature =
            lookup(SIGNATURE_FIELD).ok_or(CallbackError::MissingField(SIGNATURE_FIELD))?;
        let signed_fields = match lookup(SIGNED_FIELDS_FIELD) {
            Some(list) => list
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect(),
            None => fields
                .iter()
                .map(|(k, _)| k.clone())
                .filter(|k| k != SIGNATURE_FIELD)
                .collect(),
        };
        Ok(Self {
            correlation_id,
            external_status,
            signed_fields,
            signature,
            fields,
        })
    }

    /// Value of a payload field.
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Whether the processor reported a completed capture.
    pub fn is_complete(&self) -> bool {
        self.external_status.trim().eq_ignore_ascii_case("complete")
    }

    /// The payload as a JSON object for audit storage, signature omitted.
    pub fn audit_payload(&self) -> serde_json::Value {
        let map = self
            .fields
            .iter()
            .filter(|(k, _)| k != SIGNATURE_FIELD)
            .map(|(k, v)| (k.clone(), serde_json::Value::String(v.clone())))
            .collect::<serde_json::Map<_, _>>();
        serde_json::Value::Object(map)
    }
}

/// A callback body that lacks a required field.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CallbackError {
    #[error("callback missing field {0}")]
    MissingField(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pairs(items: &[(&str, &str)]) -> Vec<(String, String)> {
        items
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn signed_callback(signer: &CallbackSigner, extra: &[(&str, &str)]) -> PaymentCallback {
        let mut fields = vec![
            ("m_payment_id", "corr-1"),
            ("payment_status", "COMPLETE"),
            ("amount_gross", "80.00"),
        ];
        fields.extend_from_slice(extra);
        let signature = signer.sign_pairs(fields.iter().copied());
        let mut all = pairs(&fields);
        all.push(("signature".into(), signature));
        PaymentCallback::from_fields(all).unwrap()
    }

    #[test]
    fn canonical_joins_in_order() {
        assert_eq!(
            canonical_string([("b", "2"), ("a", "1")]),
            "b=2,a=1"
        );
    }

    #[test]
    fn known_vector() {
        // RFC 4231 test case 2.
        let signer = CallbackSigner::new("Jefe");
        assert_eq!(
            signer.sign("what do ya want for nothing?"),
            "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"
        );
    }

    #[test]
    fn valid_signature_verifies() {
        let signer = CallbackSigner::new("s3cret");
        let callback = signed_callback(&signer, &[]);
        assert_eq!(callback.correlation_id, "corr-1");
        assert!(callback.is_complete());
        assert!(signer.verify(&callback).is_ok());
    }

    #[test]
    fn uppercase_hex_is_accepted() {
        let signer = CallbackSigner::new("s3cret");
        let mut callback = signed_callback(&signer, &[]);
        callback.signature = callback.signature.to_uppercase();
        assert!(signer.verify(&callback).is_ok());
    }

    #[test]
    fn tampered_value_fails() {
        let signer = CallbackSigner::new("s3cret");
        let mut callback = signed_callback(&signer, &[]);
        callback.fields[2].1 = "1.00".into();
        assert_eq!(signer.verify(&callback), Err(SignatureError::Mismatch));
    }

    #[test]
    fn wrong_secret_fails() {
        let callback = signed_callback(&CallbackSigner::new("a"), &[]);
        assert_eq!(
            CallbackSigner::new("b").verify(&callback),
            Err(SignatureError::Mismatch)
        );
    }

    #[test]
    fn explicit_signed_fields_must_cover_correlation() {
        let signer = CallbackSigner::new("s3cret");
        let signature = signer.sign_pairs([("payment_status", "COMPLETE")]);
        let callback = PaymentCallback::from_fields(pairs(&[
            ("m_payment_id", "corr-2"),
            ("payment_status", "COMPLETE"),
            ("signed_fields", "payment_status"),
            ("signature", signature.as_str()),
        ]))
        .unwrap();
        assert_eq!(
            signer.verify(&callback),
            Err(SignatureError::UncoveredField(CORRELATION_FIELD))
        );
    }

    #[test]
    fn explicit_signed_fields_define_order() {
        let signer = CallbackSigner::new("s3cret");
        let signature =
            signer.sign_pairs([("payment_status", "COMPLETE"), ("m_payment_id", "corr-3")]);
        let callback = PaymentCallback::from_fields(pairs(&[
            ("m_payment_id", "corr-3"),
            ("payment_status", "COMPLETE"),
            ("signed_fields", "payment_status,m_payment_id"),
            ("signature", signature.as_str()),
        ]))
        .unwrap();
        assert!(signer.verify(&callback).is_ok());
    }

    #[test]
    fn missing_signed_field_fails() {
        let signer = CallbackSigner::new("s3cret");
        let callback = PaymentCallback::from_fields(pairs(&[
            ("m_payment_id", "corr-4"),
            ("payment_status", "COMPLETE"),
            ("signed_fields", "m_payment_id,payment_status,amount_gross"),
            ("signature", "00"),
        ]))
        .unwrap();
        assert_eq!(
            signer.verify(&callback),
            Err(SignatureError::MissingField("amount_gross".into()))
        );
    }

    #[test]
    fn parse_requires_core_fields() {
        assert_eq!(
            PaymentCallback::from_fields(pairs(&[("payment_status", "COMPLETE")])),
            Err(CallbackError::MissingField(CORRELATION_FIELD))
        );
    }

    #[test]
    fn audit_payload_omits_signature() {
        let signer = CallbackSigner::new("s3cret");
        let callback = signed_callback(&signer, &[]);
        let payload = callback.audit_payload();
        assert_eq!(payload["amount_gross"], "80.00");
        assert!(payload.get("signature").is_none());
    }

    #[test]
    fn debug_redacts_secret() {
        let dbg = format!("{:?}", CallbackSigner::new("hunter2"));
        assert!(!dbg.contains("hunter2"));
    }

    proptest::proptest! {
        #[test]
        fn signed_callbacks_verify_and_edits_do_not(
            correlation in "[a-z0-9-]{1,36}",
            amount in "[0-9]{1,6}\\.[0-9]{2}",
            forged in "[0-9]{1,6}\\.[0-9]{2}",
        ) {
            let signer = CallbackSigner::new("s3cret");
            let fields = [
                (CORRELATION_FIELD, correlation.as_str()),
                (STATUS_FIELD, "COMPLETE"),
                ("amount_gross", amount.as_str()),
            ];
            let signature = signer.sign_pairs(fields.iter().copied());
            let mut all = pairs(&fields);
            all.push((SIGNATURE_FIELD.into(), signature));
            let mut callback = PaymentCallback::from_fields(all).unwrap();
            proptest::prop_assert!(signer.verify(&callback).is_ok());

            proptest::prop_assume!(forged != amount);
            callback.fields[2].1 = forged;
            proptest::prop_assert_eq!(signer.verify(&callback), Err(SignatureError::Mismatch));
        }
    }
}
