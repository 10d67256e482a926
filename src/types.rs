//! Core types shared across the treebridge contract.

/// Sha1Digest: 160-bit content digest of a node's logical bytes.
pub type Sha1Digest = [u8; 20];

/// Digest of zero bytes of content, the identity of an empty node.
pub const EMPTY_SHA1: Sha1Digest = [
    0xda, 0x39, 0xa3, 0xee, 0x5e, 0x6b, 0x4b, 0x0d, 0x32, 0x55, 0xbf, 0xef, 0x95, 0x60, 0x18,
    0x90, 0xaf, 0xd8, 0x07, 0x09,
];

/// Render a digest as lowercase hex, the form used in reports and logs.
pub fn digest_hex(digest: &Sha1Digest) -> String {
    hex::encode(digest)
}
