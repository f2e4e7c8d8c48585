// (c) 2020-2022 ZeroTier, Inc. -- currently propritery pending actual release and licensing. See LICENSE.md.

use crate::util::buffer::Buffer;

/// A type that can be serialized to and deserialized from the wire format used between peers.
pub trait Marshalable: Sized {
    /// Upper bound on the marshaled size of this type, used to size scratch buffers.
    const MAX_MARSHAL_SIZE: usize;

    fn marshal<const BL: usize>(&self, buf: &mut Buffer<BL>) -> std::io::Result<()>;

    fn unmarshal<const BL: usize>(buf: &Buffer<BL>, cursor: &mut usize) -> std::io::Result<Self>;

    /// Convenience wrapper that marshals into a fresh buffer sized to fit this type.
    fn to_bytes(&self) -> Vec<u8> {
        let mut tmp: Buffer<4096> = Buffer::new();
        self.marshal(&mut tmp).expect("MAX_MARSHAL_SIZE too small");
        tmp.as_bytes().to_vec()
    }
}
