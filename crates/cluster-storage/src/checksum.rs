/// Truncated BLAKE3 of file content (first 16 bytes).
///
/// The protocol treats checksums as opaque; only stores compute them.
pub fn content_checksum(content: &[u8]) -> [u8; 16] {
    let hash = blake3::hash(content);
    let mut truncated = [0u8; 16];
    truncated.copy_from_slice(&hash.as_bytes()[..16]);
    truncated
}
