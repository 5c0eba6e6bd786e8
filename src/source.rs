//! Source handle resolution
//!
//! Read requests name their data through an opaque handle: a [`SourceAny`]
//! envelope holding a type URL and an encoded payload. The only payload
//! kind is [`ReadSource`], which carries the organization and bucket.
//!
//! Decoding fails closed. An unknown type URL, undecodable bytes or a zero
//! identifier all yield a [`DecodeError`] and never a partial result.
//!
//! # Wire Format
//!
//! ```protobuf
//! message SourceAny {
//!   string type_url = 1;
//!   bytes value = 2;
//! }
//!
//! message ReadSource {
//!   uint64 bucket_id = 1;
//!   uint64 organization_id = 2;
//! }
//! ```

use crate::error::DecodeError;
use crate::types::Id;
use bytes::Bytes;
use prost::Message;

/// Type URL of an encoded [`ReadSource`]
pub const READ_SOURCE_TYPE_URL: &str = "type.googleapis.com/readSource";

/// Message name of [`ReadSource`], the last segment of its type URL
pub const READ_SOURCE_MESSAGE: &str = "readSource";

/// Self-describing envelope for a source handle
#[derive(Clone, PartialEq, Message)]
pub struct SourceAny {
    /// Identifies the payload schema
    #[prost(string, tag = "1")]
    pub type_url: String,
    /// Encoded payload
    #[prost(bytes = "bytes", tag = "2")]
    pub value: Bytes,
}

/// Payload naming an organization's bucket
#[derive(Clone, PartialEq, Message)]
pub struct ReadSource {
    /// Bucket identifier
    #[prost(uint64, tag = "1")]
    pub bucket_id: u64,
    /// Organization identifier
    #[prost(uint64, tag = "2")]
    pub organization_id: u64,
}

/// Payload kinds this service can decode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    /// [`ReadSource`] payload
    ReadSource,
}

impl SourceKind {
    /// Look up the kind declared by a type URL
    ///
    /// Only the message name after the last `/` is compared, so any host
    /// prefix is accepted. A URL without a `/` names no message.
    pub fn from_type_url(type_url: &str) -> Option<Self> {
        let (_, name) = type_url.rsplit_once('/')?;
        match name {
            READ_SOURCE_MESSAGE => Some(SourceKind::ReadSource),
            _ => None,
        }
    }

    /// Type URL written for this kind
    pub fn type_url(&self) -> &'static str {
        match self {
            SourceKind::ReadSource => READ_SOURCE_TYPE_URL,
        }
    }
}

/// Tenant identity a handle resolves to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResolvedSource {
    /// Owning organization
    pub org_id: Id,
    /// Bucket within the organization
    pub bucket_id: Id,
}

/// Build the handle for an organization's bucket
pub fn encode_source(org_id: Id, bucket_id: Id) -> SourceAny {
    let payload = ReadSource {
        bucket_id: bucket_id.0,
        organization_id: org_id.0,
    };
    SourceAny {
        type_url: SourceKind::ReadSource.type_url().to_string(),
        value: Bytes::from(payload.encode_to_vec()),
    }
}

/// Decode a handle into its organization and bucket
pub fn resolve(any: &SourceAny) -> Result<ResolvedSource, DecodeError> {
    let kind = SourceKind::from_type_url(&any.type_url)
        .ok_or_else(|| DecodeError::UnknownType(any.type_url.clone()))?;

    match kind {
        SourceKind::ReadSource => {
            let payload = ReadSource::decode(any.value.clone())?;
            let org_id = Id(payload.organization_id);
            let bucket_id = Id(payload.bucket_id);
            if !org_id.is_valid() {
                return Err(DecodeError::InvalidId {
                    field: "organization",
                });
            }
            if !bucket_id.is_valid() {
                return Err(DecodeError::InvalidId { field: "bucket" });
            }
            Ok(ResolvedSource { org_id, bucket_id })
        }
    }
}

/// Decode a handle from its serialized envelope
pub fn resolve_bytes(bytes: &[u8]) -> Result<ResolvedSource, DecodeError> {
    let any = SourceAny::decode(bytes)?;
    resolve(&any)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_resolve_encoded_source() {
        let any = encode_source(Id(0x1111), Id(0x2222));
        let resolved = resolve(&any).unwrap();
        assert_eq!(resolved.org_id, Id(0x1111));
        assert_eq!(resolved.bucket_id, Id(0x2222));
    }

    #[test]
    fn test_resolve_rejects_unknown_type() {
        let mut any = encode_source(Id(1), Id(2));
        any.type_url = "type.googleapis.com/somethingElse".to_string();
        assert!(matches!(resolve(&any), Err(DecodeError::UnknownType(_))));
    }

    #[test]
    fn test_type_url_matches_on_message_name() {
        let mut any = encode_source(Id(1), Id(2));
        any.type_url = "example.com/registry/readSource".to_string();
        assert_eq!(resolve(&any).unwrap().bucket_id, Id(2));

        for url in ["readSource", "type.googleapis.com/readSourceV2", "readSource/", ""] {
            any.type_url = url.to_string();
            assert!(
                matches!(resolve(&any), Err(DecodeError::UnknownType(_))),
                "{url}"
            );
        }
    }

    #[test]
    fn test_resolve_rejects_corrupt_payload() {
        let any = SourceAny {
            type_url: READ_SOURCE_TYPE_URL.to_string(),
            // Field 1 declared as varint but truncated
            value: Bytes::from_static(&[0x08, 0xff]),
        };
        assert!(matches!(resolve(&any), Err(DecodeError::Malformed(_))));
    }

    #[test]
    fn test_resolve_rejects_zero_ids() {
        let any = SourceAny {
            type_url: READ_SOURCE_TYPE_URL.to_string(),
            value: Bytes::new(),
        };
        assert!(matches!(
            resolve(&any),
            Err(DecodeError::InvalidId {
                field: "organization"
            })
        ));

        let any = encode_source(Id(5), Id(0));
        assert!(matches!(
            resolve(&any),
            Err(DecodeError::InvalidId { field: "bucket" })
        ));
    }

    #[test]
    fn test_resolve_bytes_rejects_garbage_envelope() {
        assert!(resolve_bytes(&[0x0a, 0x10, b'x']).is_err());
    }

    proptest! {
        #[test]
        fn prop_resolve_returns_encoded_pair(org in 1u64.., bucket in 1u64..) {
            let bytes = encode_source(Id(org), Id(bucket)).encode_to_vec();
            let resolved = resolve_bytes(&bytes).unwrap();
            prop_assert_eq!(resolved.org_id, Id(org));
            prop_assert_eq!(resolved.bucket_id, Id(bucket));
        }
    }
}
