//! Consistent-hash ring, its builder, and the codec between them and bytes.
//!
//! - [`RingBuilder`] is the mutable membership model the master edits.
//! - [`Ring`] is the immutable artifact rendered from a builder at one
//!   version. Active nodes are placed on a ring of virtual nodes (vnodes) at
//!   `blake3(node_id ++ vnode_index)`; a node's vnode count is proportional
//!   to its capacity.
//! - [`RingCodec`] turns both into versioned byte blobs and back.
//!   [`PostcardCodec`] is the production implementation.

mod builder;
mod codec;
mod error;
mod ring;

pub use builder::RingBuilder;
pub use codec::{BUILDER_MAGIC, PostcardCodec, RING_MAGIC, Rendered, RingCodec};
pub use error::RingError;
pub use ring::{BASE_CAPACITY, Ring};
