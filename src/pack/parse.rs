use std::collections::HashMap;
use std::io::Read;

use sha1::{Digest, Sha1};

use crate::cancel::CancelToken;
use crate::error::{Error, Result};
use crate::hash::{compute_git_hash, GitHash};
use crate::pack::{
    apply_delta, PackKind, OBJ_OFS_DELTA, OBJ_REF_DELTA,
};

/// one fully-resolved object out of a pack
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PackObject {
    pub kind: PackKind,
    pub data: Vec<u8>,
    /// git address of the canonical bytes
    pub hash: GitHash,
}

/// parse a packfile, resolving every delta
///
/// every resolved object is remembered at its offset so later `OFS_DELTA`s
/// can base off it; `REF_DELTA` bases must already be resolved in this pack.
pub fn parse(data: &[u8], cancel: &CancelToken) -> Result<Vec<PackObject>> {
    if data.len() < 12 + 20 {
        return Err(Error::MalformedPack("shorter than header + trailer".to_string()));
    }
    if &data[..4] != b"PACK" {
        return Err(Error::MalformedPack("bad magic".to_string()));
    }
    let version = read_u32(data, 4);
    if version != 2 && version != 3 {
        return Err(Error::MalformedPack(format!("unsupported version {}", version)));
    }
    let count = read_u32(data, 8) as usize;

    let body_end = data.len() - 20;
    let trailer = &data[body_end..];
    if Sha1::digest(&data[..body_end]).as_slice() != trailer {
        return Err(Error::MalformedPack("checksum mismatch".to_string()));
    }

    let mut objects: Vec<PackObject> = Vec::with_capacity(count);
    let mut by_offset: HashMap<usize, usize> = HashMap::new();
    let mut by_hash: HashMap<GitHash, usize> = HashMap::new();

    let mut pos = 12;
    for _ in 0..count {
        cancel.check()?;

        let obj_offset = pos;
        if pos >= body_end {
            return Err(Error::MalformedPack("truncated object stream".to_string()));
        }

        let (type_code, size) = read_obj_header(data, body_end, &mut pos)?;

        let (kind, payload) = match type_code {
            OBJ_OFS_DELTA => {
                let distance = read_ofs_distance(data, body_end, &mut pos)?;
                let base_offset = obj_offset.checked_sub(distance).ok_or_else(|| {
                    Error::MalformedPack(format!("ofs-delta before pack start at {}", obj_offset))
                })?;
                let base_index = *by_offset.get(&base_offset).ok_or_else(|| {
                    Error::UnresolvedDelta(format!("no object at offset {}", base_offset))
                })?;
                let delta = inflate(data, body_end, &mut pos, size)?;
                let base = &objects[base_index];
                (base.kind, apply_delta(&base.data, &delta)?)
            }
            OBJ_REF_DELTA => {
                if pos + 20 > body_end {
                    return Err(Error::MalformedPack("truncated ref-delta base".to_string()));
                }
                let base_hash = GitHash::from_raw(&data[pos..pos + 20])?;
                pos += 20;
                let base_index = *by_hash
                    .get(&base_hash)
                    .ok_or_else(|| Error::UnresolvedDelta(base_hash.to_hex()))?;
                let delta = inflate(data, body_end, &mut pos, size)?;
                let base = &objects[base_index];
                (base.kind, apply_delta(&base.data, &delta)?)
            }
            code => {
                let kind = PackKind::from_code(code)?;
                let payload = inflate(data, body_end, &mut pos, size)?;
                if payload.len() != size {
                    return Err(Error::MalformedPack(format!(
                        "object at {} declared {} bytes, inflated {}",
                        obj_offset,
                        size,
                        payload.len()
                    )));
                }
                (kind, payload)
            }
        };

        let hash = compute_git_hash(kind.name(), &payload);
        let index = objects.len();
        objects.push(PackObject {
            kind,
            data: payload,
            hash,
        });
        by_offset.insert(obj_offset, index);
        by_hash.insert(hash, index);
    }

    if pos != body_end {
        return Err(Error::MalformedPack(format!(
            "{} trailing bytes after last object",
            body_end - pos
        )));
    }

    Ok(objects)
}

/// variable-length object header: type in bits 6-4, size nibble in bits 3-0,
/// bit 7 continues with 7 size bits per continuation byte
fn read_obj_header(data: &[u8], end: usize, pos: &mut usize) -> Result<(u8, usize)> {
    let mut byte = next_byte(data, end, pos)?;
    let type_code = (byte >> 4) & 0x07;
    let mut size = (byte & 0x0f) as usize;
    let mut shift = 4;

    while byte & 0x80 != 0 {
        byte = next_byte(data, end, pos)?;
        size |= ((byte & 0x7f) as usize) << shift;
        shift += 7;
    }

    Ok((type_code, size))
}

/// negative base distance of an `OFS_DELTA`, with git's off-by-one
/// continuation: `offset = ((offset + 1) << 7) | (b & 0x7f)`
fn read_ofs_distance(data: &[u8], end: usize, pos: &mut usize) -> Result<usize> {
    let mut byte = next_byte(data, end, pos)?;
    let mut offset = (byte & 0x7f) as usize;

    while byte & 0x80 != 0 {
        byte = next_byte(data, end, pos)?;
        offset = ((offset + 1) << 7) | (byte & 0x7f) as usize;
    }

    Ok(offset)
}

/// big-endian u32 at `pos`; callers bounds-check first
fn read_u32(data: &[u8], pos: usize) -> u32 {
    u32::from_be_bytes([data[pos], data[pos + 1], data[pos + 2], data[pos + 3]])
}

fn next_byte(data: &[u8], end: usize, pos: &mut usize) -> Result<u8> {
    if *pos >= end {
        return Err(Error::MalformedPack("truncated header".to_string()));
    }
    let byte = data[*pos];
    *pos += 1;
    Ok(byte)
}

/// inflate one zlib stream in place, advancing past its compressed bytes
fn inflate(data: &[u8], end: usize, pos: &mut usize, expected: usize) -> Result<Vec<u8>> {
    let mut decoder = flate2::read::ZlibDecoder::new(&data[*pos..end]);
    let mut out = Vec::with_capacity(expected);
    decoder
        .read_to_end(&mut out)
        .map_err(|e| Error::MalformedPack(format!("zlib inflate at {}: {}", pos, e)))?;
    *pos += decoder.total_in() as usize;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pack::build::{build, encode_obj_header};
    use std::io::Write;

    fn deflate(data: &[u8]) -> Vec<u8> {
        let mut encoder =
            flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    fn finish_pack(mut body: Vec<u8>) -> Vec<u8> {
        let trailer = Sha1::digest(&body);
        body.extend_from_slice(&trailer);
        body
    }

    fn size_varint(mut value: usize) -> Vec<u8> {
        let mut out = Vec::new();
        loop {
            let mut byte = (value & 0x7f) as u8;
            value >>= 7;
            if value != 0 {
                byte |= 0x80;
            }
            out.push(byte);
            if value == 0 {
                return out;
            }
        }
    }

    #[test]
    fn test_roundtrip_whole_objects() {
        let objects = vec![
            (PackKind::Blob, b"hello world\n".to_vec()),
            (PackKind::Commit, b"tree 0\n\nmsg".to_vec()),
        ];
        let pack = build(&objects).unwrap();
        let parsed = parse(&pack, &CancelToken::new()).unwrap();

        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0].kind, PackKind::Blob);
        assert_eq!(parsed[0].data, b"hello world\n");
        assert_eq!(
            parsed[0].hash,
            compute_git_hash("blob", b"hello world\n")
        );
        assert_eq!(parsed[1].kind, PackKind::Commit);
    }

    #[test]
    fn test_bad_magic() {
        let mut pack = build(&[]).unwrap();
        pack[0] = b'X';
        assert!(matches!(
            parse(&pack, &CancelToken::new()),
            Err(Error::MalformedPack(_))
        ));
    }

    #[test]
    fn test_bad_checksum() {
        let mut pack = build(&[(PackKind::Blob, b"x".to_vec())]).unwrap();
        let last = pack.len() - 1;
        pack[last] ^= 0xff;
        assert!(matches!(
            parse(&pack, &CancelToken::new()),
            Err(Error::MalformedPack(_))
        ));
    }

    #[test]
    fn test_version_3_accepted() {
        let mut pack = build(&[(PackKind::Blob, b"v3".to_vec())]).unwrap();
        pack[7] = 3;
        // trailer covers the version field, recompute
        let body_end = pack.len() - 20;
        let trailer = Sha1::digest(&pack[..body_end]);
        pack.truncate(body_end);
        pack.extend_from_slice(&trailer);

        let parsed = parse(&pack, &CancelToken::new()).unwrap();
        assert_eq!(parsed[0].data, b"v3");
    }

    #[test]
    fn test_ref_delta_resolves() {
        let base = b"The quick brown fox".to_vec();
        let base_hash = compute_git_hash("blob", &base);

        // delta: copy first 10 bytes of base
        let mut delta = Vec::new();
        delta.extend_from_slice(&size_varint(base.len()));
        delta.extend_from_slice(&size_varint(10));
        delta.push(0x80 | 0x10);
        delta.push(10);

        let mut body = Vec::new();
        body.extend_from_slice(b"PACK");
        body.extend_from_slice(&2u32.to_be_bytes());
        body.extend_from_slice(&2u32.to_be_bytes());
        body.extend_from_slice(&encode_obj_header(3, base.len() as u64));
        body.extend_from_slice(&deflate(&base));
        body.extend_from_slice(&encode_obj_header(OBJ_REF_DELTA, delta.len() as u64));
        body.extend_from_slice(base_hash.as_bytes());
        body.extend_from_slice(&deflate(&delta));

        let pack = finish_pack(body);
        let parsed = parse(&pack, &CancelToken::new()).unwrap();

        assert_eq!(parsed.len(), 2);
        // delta-derived object inherits the base's kind
        assert_eq!(parsed[1].kind, PackKind::Blob);
        assert_eq!(parsed[1].data, b"The quick ");
    }

    #[test]
    fn test_ofs_delta_resolves() {
        let base = b"abcdefgh".to_vec();

        let mut delta = Vec::new();
        delta.extend_from_slice(&size_varint(base.len()));
        delta.extend_from_slice(&size_varint(3));
        delta.push(0x80 | 0x01 | 0x10);
        delta.push(4);
        delta.push(3);

        let mut body = Vec::new();
        body.extend_from_slice(b"PACK");
        body.extend_from_slice(&2u32.to_be_bytes());
        body.extend_from_slice(&2u32.to_be_bytes());
        let base_offset = body.len();
        body.extend_from_slice(&encode_obj_header(3, base.len() as u64));
        body.extend_from_slice(&deflate(&base));
        let delta_offset = body.len();
        body.extend_from_slice(&encode_obj_header(OBJ_OFS_DELTA, delta.len() as u64));
        // distance fits one byte for this small pack
        let distance = delta_offset - base_offset;
        assert!(distance < 0x80);
        body.push(distance as u8);
        body.extend_from_slice(&deflate(&delta));

        let pack = finish_pack(body);
        let parsed = parse(&pack, &CancelToken::new()).unwrap();

        assert_eq!(parsed[1].kind, PackKind::Blob);
        assert_eq!(parsed[1].data, b"efg");
    }

    #[test]
    fn test_ref_delta_unresolved_base() {
        let mut delta = Vec::new();
        delta.extend_from_slice(&size_varint(0));
        delta.extend_from_slice(&size_varint(1));
        delta.push(1);
        delta.push(b'x');

        let mut body = Vec::new();
        body.extend_from_slice(b"PACK");
        body.extend_from_slice(&2u32.to_be_bytes());
        body.extend_from_slice(&1u32.to_be_bytes());
        body.extend_from_slice(&encode_obj_header(OBJ_REF_DELTA, delta.len() as u64));
        body.extend_from_slice(&[0x42; 20]);
        body.extend_from_slice(&deflate(&delta));

        let pack = finish_pack(body);
        assert!(matches!(
            parse(&pack, &CancelToken::new()),
            Err(Error::UnresolvedDelta(_))
        ));
    }

    #[test]
    fn test_cancel_between_objects() {
        let pack = build(&[(PackKind::Blob, b"x".to_vec())]).unwrap();
        let cancel = CancelToken::new();
        cancel.cancel();
        assert!(matches!(parse(&pack, &cancel), Err(Error::Cancelled)));
    }

    #[test]
    fn test_size_mismatch_rejected() {
        // declare size 3 but deflate 1 byte
        let mut body = Vec::new();
        body.extend_from_slice(b"PACK");
        body.extend_from_slice(&2u32.to_be_bytes());
        body.extend_from_slice(&1u32.to_be_bytes());
        body.extend_from_slice(&encode_obj_header(3, 3));
        body.extend_from_slice(&deflate(b"x"));

        let pack = finish_pack(body);
        assert!(matches!(
            parse(&pack, &CancelToken::new()),
            Err(Error::MalformedPack(_))
        ));
    }
}
