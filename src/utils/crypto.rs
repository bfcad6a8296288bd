//! Cryptographic primitives for the transaction engine.
//!
//! Fixed-width byte newtypes (hashes, transaction ids, keys, signatures)
//! with hex serde encodings, plus secp256k1 ECDSA signing over SHA-256
//! digests. Signature checks happen in CheckTx against the account's owner
//! public key.

use secp256k1::{
    ecdsa::Signature as EcdsaSignature, Message, PublicKey as SecpPublicKey, Secp256k1, SecretKey,
};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::fmt;

use crate::error::{Error, Result};
use crate::utils::constants::{HASH_LENGTH, PUBKEY_LENGTH, SIGNATURE_LENGTH, TXID_LENGTH};

thread_local! {
    static SECP: Secp256k1<secp256k1::All> = Secp256k1::new();
}

fn with_secp<F, R>(f: F) -> R
where
    F: FnOnce(&Secp256k1<secp256k1::All>) -> R,
{
    SECP.with(|secp| f(secp))
}

// ═══════════════════════════════════════════════════════════════════════════════
// FIXED-WIDTH BYTE NEWTYPES
// ═══════════════════════════════════════════════════════════════════════════════

macro_rules! bytes_newtype {
    ($name:ident, $len:expr, $label:expr) => {
        impl $name {
            /// Wrap raw bytes
            pub const fn new(bytes: [u8; $len]) -> Self {
                Self(bytes)
            }

            /// Build from a slice of exactly the expected length
            pub fn from_slice(slice: &[u8]) -> Result<Self> {
                if slice.len() != $len {
                    return Err(Error::Deserialization(format!(
                        "{}: expected {} bytes, got {}",
                        $label,
                        $len,
                        slice.len()
                    )));
                }
                let mut bytes = [0u8; $len];
                bytes.copy_from_slice(slice);
                Ok(Self(bytes))
            }

            /// Borrow the raw bytes
            pub fn as_bytes(&self) -> &[u8; $len] {
                &self.0
            }

            /// Hex rendering
            pub fn to_hex(&self) -> String {
                hex::encode(self.0)
            }

            /// Parse from hex
            pub fn from_hex(s: &str) -> Result<Self> {
                let bytes =
                    hex::decode(s).map_err(|e| Error::Deserialization(e.to_string()))?;
                Self::from_slice(&bytes)
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
                if serializer.is_human_readable() {
                    serializer.serialize_str(&self.to_hex())
                } else {
                    serializer.serialize_bytes(&self.0)
                }
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(
                deserializer: D,
            ) -> std::result::Result<Self, D::Error> {
                if deserializer.is_human_readable() {
                    let s = String::deserialize(deserializer)?;
                    Self::from_hex(&s).map_err(serde::de::Error::custom)
                } else {
                    let bytes = Vec::<u8>::deserialize(deserializer)?;
                    Self::from_slice(&bytes).map_err(serde::de::Error::custom)
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.to_hex())
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                let hex = self.to_hex();
                write!(f, "{}({}..)", stringify!($name), &hex[..16.min(hex.len())])
            }
        }
    };
}

// ═══════════════════════════════════════════════════════════════════════════════
// HASH
// ═══════════════════════════════════════════════════════════════════════════════

/// A 32-byte SHA-256 digest
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Hash([u8; HASH_LENGTH]);

bytes_newtype!(Hash, HASH_LENGTH, "hash");

impl Hash {
    /// SHA-256 of arbitrary data
    pub fn sha256(data: &[u8]) -> Self {
        let digest = Sha256::digest(data);
        let mut bytes = [0u8; HASH_LENGTH];
        bytes.copy_from_slice(&digest);
        Self(bytes)
    }

    /// The all-zero hash
    pub fn zero() -> Self {
        Self([0u8; HASH_LENGTH])
    }

    /// Whether this is the all-zero hash
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; HASH_LENGTH]
    }

    fn to_message(self) -> Message {
        Message::from_digest(self.0)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TRANSACTION ID
// ═══════════════════════════════════════════════════════════════════════════════

/// Unique transaction identifier: the SHA-256 of the full signed encoding.
///
/// CDP records are keyed by the id of their creating transaction.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct TxId([u8; TXID_LENGTH]);

bytes_newtype!(TxId, TXID_LENGTH, "txid");

impl TxId {
    /// The all-zero id, used as the "no prior CDP" sentinel on the wire
    pub fn zero() -> Self {
        Self([0u8; TXID_LENGTH])
    }

    /// Whether this is the zero sentinel
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; TXID_LENGTH]
    }

    /// Abbreviated form for log lines
    pub fn short(&self) -> String {
        let hex = self.to_hex();
        format!("{}..{}", &hex[..8], &hex[hex.len() - 8..])
    }
}

impl From<Hash> for TxId {
    fn from(hash: Hash) -> Self {
        Self(*hash.as_bytes())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// PUBLIC KEY
// ═══════════════════════════════════════════════════════════════════════════════

/// A compressed secp256k1 public key (33 bytes).
///
/// Doubles as the account identifier throughout the ledger.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PublicKey([u8; PUBKEY_LENGTH]);

bytes_newtype!(PublicKey, PUBKEY_LENGTH, "public key");

impl PublicKey {
    /// Verify a signature over a message digest
    pub fn verify(&self, message: &Hash, signature: &Signature) -> bool {
        let pk = match SecpPublicKey::from_slice(&self.0) {
            Ok(pk) => pk,
            Err(_) => return false,
        };
        let sig = match EcdsaSignature::from_compact(&signature.0) {
            Ok(sig) => sig,
            Err(_) => return false,
        };
        with_secp(|secp| secp.verify_ecdsa(&message.to_message(), &sig, &pk).is_ok())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// SIGNATURE
// ═══════════════════════════════════════════════════════════════════════════════

/// A compact ECDSA signature (64 bytes)
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Signature([u8; SIGNATURE_LENGTH]);

bytes_newtype!(Signature, SIGNATURE_LENGTH, "signature");

impl Default for Signature {
    fn default() -> Self {
        Self([0u8; SIGNATURE_LENGTH])
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// PRIVATE KEY / KEY PAIR
// ═══════════════════════════════════════════════════════════════════════════════

/// A secp256k1 private key
#[derive(Clone)]
pub struct PrivateKey {
    inner: SecretKey,
}

impl PrivateKey {
    /// Generate a fresh random private key
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();
        Self {
            inner: SecretKey::new(&mut rng),
        }
    }

    /// Build from raw bytes
    pub fn from_slice(slice: &[u8]) -> Result<Self> {
        let inner =
            SecretKey::from_slice(slice).map_err(|e| Error::Deserialization(e.to_string()))?;
        Ok(Self { inner })
    }

    /// Derive the corresponding public key
    pub fn public_key(&self) -> PublicKey {
        with_secp(|secp| {
            let pk = SecpPublicKey::from_secret_key(secp, &self.inner);
            PublicKey::new(pk.serialize())
        })
    }

    /// Sign a message digest
    pub fn sign(&self, message: &Hash) -> Signature {
        with_secp(|secp| {
            let sig = secp.sign_ecdsa(&message.to_message(), &self.inner);
            Signature::new(sig.serialize_compact())
        })
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PrivateKey([REDACTED])")
    }
}

/// A private/public key pair
#[derive(Clone, Debug)]
pub struct KeyPair {
    private: PrivateKey,
    public: PublicKey,
}

impl KeyPair {
    /// Generate a fresh random key pair
    pub fn generate() -> Self {
        let private = PrivateKey::generate();
        let public = private.public_key();
        Self { private, public }
    }

    /// The public half
    pub fn public_key(&self) -> &PublicKey {
        &self.public
    }

    /// Sign a message digest
    pub fn sign(&self, message: &Hash) -> Signature {
        self.private.sign(message)
    }
}
