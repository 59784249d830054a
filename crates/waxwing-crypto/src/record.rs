//! Tagged key records.
//!
//! [`KeyRecord`] is the closed set of persisted key variants. The CBOR
//! encoding is a map with a `typ` discriminant next to the variant's fields.

use serde::{Deserialize, Serialize};

use crate::{AesKey, AnonKey, EccKeyPair, EccPubKey, Friendship, KeyError, KeyPair, PubKey};

/// Every persisted key variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "typ")]
pub enum KeyRecord {
    /// Symmetric key
    #[serde(rename = "aes")]
    Aes(AesKey),
    /// P-256 public identity
    #[serde(rename = "pubk")]
    PubKey(PubKey),
    /// P-256 key pair
    #[serde(rename = "kp")]
    KeyPair(KeyPair),
    /// Curve25519 public identity
    #[serde(rename = "eccPubk")]
    EccPubKey(EccPubKey),
    /// Curve25519 key pair
    #[serde(rename = "ecckp")]
    EccKeyPair(EccKeyPair),
    /// Anonymous principal group
    #[serde(rename = "anon")]
    Anon(AnonKey),
    /// Completed KAP result
    #[serde(rename = "fr")]
    Friendship(Friendship),
}

/// Registered discriminants.
const TAGS: [&str; 7] = ["aes", "pubk", "kp", "eccPubk", "ecckp", "anon", "fr"];

impl KeyRecord {
    /// Discriminant of this variant.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Aes(_) => AesKey::TAG,
            Self::PubKey(_) => PubKey::TAG,
            Self::KeyPair(_) => KeyPair::TAG,
            Self::EccPubKey(_) => EccPubKey::TAG,
            Self::EccKeyPair(_) => EccKeyPair::TAG,
            Self::Anon(_) => AnonKey::TAG,
            Self::Friendship(_) => Friendship::TAG,
        }
    }

    /// Encode as a tagged CBOR map.
    pub fn encode(&self) -> Result<Vec<u8>, KeyError> {
        let mut buf = Vec::new();
        ciborium::into_writer(self, &mut buf).map_err(|e| KeyError::Encoding(e.to_string()))?;
        Ok(buf)
    }

    /// Decode a tagged CBOR map.
    ///
    /// # Errors
    ///
    /// - `UnknownTag`: the `typ` discriminant is not registered
    /// - `Encoding`: malformed CBOR or invalid variant fields
    pub fn decode(bytes: &[u8]) -> Result<Self, KeyError> {
        let probe: TagProbe =
            ciborium::from_reader(bytes).map_err(|e| KeyError::Encoding(e.to_string()))?;
        if !TAGS.contains(&probe.typ.as_str()) {
            return Err(KeyError::UnknownTag(probe.typ));
        }

        ciborium::from_reader(bytes).map_err(|e| KeyError::Encoding(e.to_string()))
    }

    /// Extract a specific variant.
    pub fn into_typed<K: TypedKey>(self) -> Result<K, KeyError> {
        K::from_record(self)
    }
}

#[derive(Deserialize)]
struct TagProbe {
    typ: String,
}

/// A key type with a registered record variant.
pub trait TypedKey: Sized {
    /// Discriminant stored in the `typ` field.
    const TAG: &'static str;

    /// Wrap in the matching record variant.
    fn into_record(self) -> KeyRecord;

    /// Unwrap the matching record variant.
    ///
    /// # Errors
    ///
    /// - `TypeMismatch`: `record` is a different variant
    fn from_record(record: KeyRecord) -> Result<Self, KeyError>;
}

macro_rules! typed_key {
    ($ty:ty, $variant:ident, $tag:literal) => {
        impl TypedKey for $ty {
            const TAG: &'static str = $tag;

            fn into_record(self) -> KeyRecord {
                KeyRecord::$variant(self)
            }

            fn from_record(record: KeyRecord) -> Result<Self, KeyError> {
                match record {
                    KeyRecord::$variant(key) => Ok(key),
                    other => Err(KeyError::TypeMismatch { expected: Self::TAG, found: other.tag() }),
                }
            }
        }
    };
}

typed_key!(AesKey, Aes, "aes");
typed_key!(PubKey, PubKey, "pubk");
typed_key!(KeyPair, KeyPair, "kp");
typed_key!(EccPubKey, EccPubKey, "eccPubk");
typed_key!(EccKeyPair, EccKeyPair, "ecckp");
typed_key!(AnonKey, Anon, "anon");
typed_key!(Friendship, Friendship, "fr");

/// `{pub: hex}`
#[derive(Serialize, Deserialize)]
pub(crate) struct PublicPoint {
    #[serde(rename = "pub")]
    pub(crate) public: String,
}

/// `{priv: hex}`
#[derive(Serialize, Deserialize)]
pub(crate) struct SecretScalar {
    #[serde(rename = "priv")]
    pub(crate) secret: String,
}

/// Stored public identity: `{sign: {pub}, encrypt: {pub}, valid}`.
#[derive(Serialize, Deserialize)]
pub(crate) struct PublicKeyRecord {
    pub(crate) sign: PublicPoint,
    pub(crate) encrypt: PublicPoint,
    #[serde(default = "default_valid")]
    pub(crate) valid: bool,
}

impl PublicKeyRecord {
    pub(crate) fn new(sign: String, encrypt: String, valid: bool) -> Self {
        Self { sign: PublicPoint { public: sign }, encrypt: PublicPoint { public: encrypt }, valid }
    }
}

/// Stored key pair: private halves only, publics are recomputed.
#[derive(Serialize, Deserialize)]
pub(crate) struct KeyPairRecord {
    pub(crate) sign: SecretScalar,
    pub(crate) encrypt: SecretScalar,
}

impl KeyPairRecord {
    pub(crate) fn new(sign: String, encrypt: String) -> Self {
        Self { sign: SecretScalar { secret: sign }, encrypt: SecretScalar { secret: encrypt } }
    }
}

fn default_valid() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use ciborium::Value;

    use super::*;

    fn encode_value(value: &Value) -> Vec<u8> {
        let mut buf = Vec::new();
        ciborium::into_writer(value, &mut buf).unwrap();
        buf
    }

    #[test]
    fn unknown_tag_is_rejected() {
        let bytes = encode_value(&Value::Map(vec![(
            Value::Text("typ".into()),
            Value::Text("rsa".into()),
        )]));
        assert_eq!(KeyRecord::decode(&bytes), Err(KeyError::UnknownTag("rsa".into())));
    }

    #[test]
    fn missing_tag_is_encoding_error() {
        let bytes = encode_value(&Value::Map(vec![]));
        assert!(matches!(KeyRecord::decode(&bytes), Err(KeyError::Encoding(_))));
    }

    #[test]
    fn wrong_variant_is_type_mismatch() {
        let record = AesKey::from_bytes([1; 32]).into_record();
        let result = record.into_typed::<Friendship>();
        assert_eq!(result.unwrap_err(), KeyError::TypeMismatch { expected: "fr", found: "aes" });
    }

    #[test]
    fn aes_record_carries_tag_and_fields() {
        let mut key = AesKey::from_bytes([2; 32]);
        key.add_principal("alice");
        let bytes = key.clone().into_record().encode().unwrap();

        let value: Value = ciborium::from_reader(bytes.as_slice()).unwrap();
        let Value::Map(entries) = value else { panic!("record must be a map") };
        let field = |name: &str| {
            entries.iter().find(|(k, _)| k.as_text() == Some(name)).map(|(_, v)| v.clone())
        };
        assert_eq!(field("typ"), Some(Value::Text("aes".into())));
        assert_eq!(field("key"), Some(Value::Text(key.to_base64())));
        assert!(field("principals").is_some());
    }

    #[test]
    fn invalid_material_fails_decode() {
        let bytes = encode_value(&Value::Map(vec![
            (Value::Text("typ".into()), Value::Text("aes".into())),
            (Value::Text("key".into()), Value::Text("AAAA".into())),
        ]));
        assert!(matches!(KeyRecord::decode(&bytes), Err(KeyError::Encoding(_))));
    }
}
