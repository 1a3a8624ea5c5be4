//! Binary codec for rings and builders.
//!
//! Each blob is a 4-byte magic followed by a postcard payload. The magic
//! keeps a ring from ever being loaded as a builder and vice versa.

use ringleader_types::RingVersion;

use crate::builder::RingBuilder;
use crate::error::RingError;
use crate::ring::Ring;

/// Magic prefix of a serialized [`Ring`].
pub const RING_MAGIC: [u8; 4] = *b"RNG1";

/// Magic prefix of a serialized [`RingBuilder`].
pub const BUILDER_MAGIC: [u8; 4] = *b"BLD1";

/// A builder rendered to its distributable pair of blobs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rendered {
    pub version: RingVersion,
    pub ring: Vec<u8>,
    pub builder: Vec<u8>,
}

/// Converts between the membership model and versioned byte blobs.
///
/// The control plane only goes through this trait; it never inspects blob
/// contents itself.
pub trait RingCodec: Send + Sync {
    /// Render `builder` into a (ring, builder) blob pair at the builder's version.
    fn render(&self, builder: &RingBuilder) -> Result<Rendered, RingError>;

    fn load_ring(&self, bytes: &[u8]) -> Result<Ring, RingError>;

    fn load_builder(&self, bytes: &[u8]) -> Result<RingBuilder, RingError>;
}

/// Default codec: magic-prefixed postcard.
#[derive(Debug, Clone, Copy, Default)]
pub struct PostcardCodec;

impl RingCodec for PostcardCodec {
    fn render(&self, builder: &RingBuilder) -> Result<Rendered, RingError> {
        let ring = builder.render();
        Ok(Rendered {
            version: builder.version(),
            ring: encode(RING_MAGIC, &ring)?,
            builder: encode(BUILDER_MAGIC, builder)?,
        })
    }

    fn load_ring(&self, bytes: &[u8]) -> Result<Ring, RingError> {
        let mut ring: Ring = postcard::from_bytes(strip_magic(RING_MAGIC, bytes)?)?;
        ring.place_vnodes();
        Ok(ring)
    }

    fn load_builder(&self, bytes: &[u8]) -> Result<RingBuilder, RingError> {
        Ok(postcard::from_bytes(strip_magic(BUILDER_MAGIC, bytes)?)?)
    }
}

fn encode<T: serde::Serialize>(magic: [u8; 4], value: &T) -> Result<Vec<u8>, RingError> {
    let mut out = magic.to_vec();
    out.extend_from_slice(&postcard::to_allocvec(value)?);
    Ok(out)
}

fn strip_magic(magic: [u8; 4], bytes: &[u8]) -> Result<&[u8], RingError> {
    if bytes.len() < magic.len() {
        return Err(RingError::Truncated(bytes.len()));
    }
    let (head, body) = bytes.split_at(magic.len());
    if head != magic {
        return Err(RingError::BadMagic { expected: magic });
    }
    Ok(body)
}
