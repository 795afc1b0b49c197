use std::io::Write;

use sha1::{Digest, Sha1};

use crate::error::{Error, Result};
use crate::pack::PackKind;

/// build a version-2 packfile of whole (non-delta) objects
pub fn build(objects: &[(PackKind, Vec<u8>)]) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    out.extend_from_slice(b"PACK");
    out.extend_from_slice(&2u32.to_be_bytes());
    out.extend_from_slice(&(objects.len() as u32).to_be_bytes());

    for (kind, data) in objects {
        out.extend_from_slice(&encode_obj_header(kind.code(), data.len() as u64));

        let mut encoder =
            flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::default());
        encoder
            .write_all(data)
            .map_err(|e| Error::MalformedPack(format!("zlib encode: {}", e)))?;
        let compressed = encoder
            .finish()
            .map_err(|e| Error::MalformedPack(format!("zlib encode: {}", e)))?;
        out.extend_from_slice(&compressed);
    }

    let trailer = Sha1::digest(&out);
    out.extend_from_slice(&trailer);
    Ok(out)
}

/// variable-length object header: type in bits 6-4 of the first byte, size
/// low nibble in bits 3-0, bit 7 continues with 7 size bits per byte
pub(crate) fn encode_obj_header(kind_code: u8, size: u64) -> Vec<u8> {
    let mut n = size;
    let mut first = (n & 0x0f) as u8 | (kind_code << 4);
    n >>= 4;

    let mut out = Vec::new();
    if n != 0 {
        first |= 0x80;
    }
    out.push(first);
    while n != 0 {
        let mut byte = (n & 0x7f) as u8;
        n >>= 7;
        if n != 0 {
            byte |= 0x80;
        }
        out.push(byte);
    }
    out
}
