//! native pack framing for the got transport
//!
//! magic + entry count, then one type-tagged zlib entry per object. entity
//! and entity-list objects travel under the blob wire type; a trailer maps
//! their addresses back to the precise kind so decode can reclassify them.

use std::io::{Read, Write};

use crate::error::{Error, Result};
use crate::hash::{compute_object_hash, Hash};
use crate::types::Kind;

const MAGIC: &[u8; 4] = b"GOTP";
const VERSION: u32 = 1;

/// wire type codes, mirroring git's pack codes for the shared kinds
const WIRE_COMMIT: u8 = 1;
const WIRE_TREE: u8 = 2;
const WIRE_BLOB: u8 = 3;
const WIRE_TAG: u8 = 4;

fn wire_code(kind: Kind) -> u8 {
    match kind {
        Kind::Commit => WIRE_COMMIT,
        Kind::Tree => WIRE_TREE,
        Kind::Blob | Kind::Entity | Kind::EntityList => WIRE_BLOB,
        Kind::Tag => WIRE_TAG,
    }
}

/// encode objects into a native pack
pub fn encode(objects: &[(Kind, Vec<u8>)]) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    out.extend_from_slice(MAGIC);
    out.extend_from_slice(&VERSION.to_be_bytes());
    out.extend_from_slice(&(objects.len() as u32).to_be_bytes());

    let mut trailer: Vec<(Hash, Kind)> = Vec::new();

    for (kind, payload) in objects {
        if matches!(kind, Kind::Entity | Kind::EntityList) {
            trailer.push((compute_object_hash(kind.tag(), payload), *kind));
        }

        let mut encoder =
            flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::default());
        encoder
            .write_all(payload)
            .map_err(|e| Error::MalformedPack(format!("zlib encode: {}", e)))?;
        let compressed = encoder
            .finish()
            .map_err(|e| Error::MalformedPack(format!("zlib encode: {}", e)))?;

        out.push(wire_code(*kind));
        out.extend_from_slice(&(compressed.len() as u32).to_be_bytes());
        out.extend_from_slice(&compressed);
    }

    out.extend_from_slice(&(trailer.len() as u32).to_be_bytes());
    for (hash, kind) in trailer {
        out.extend_from_slice(hash.as_bytes());
        out.push(kind.tag());
    }

    Ok(out)
}

/// decode a native pack into (kind, payload) pairs
pub fn decode(data: &[u8]) -> Result<Vec<(Kind, Vec<u8>)>> {
    if data.len() < 12 {
        return Err(Error::MalformedPack("native pack shorter than header".to_string()));
    }
    if &data[..4] != MAGIC {
        return Err(Error::MalformedPack("bad native pack magic".to_string()));
    }
    let version = read_u32(data, 4);
    if version != VERSION {
        return Err(Error::MalformedPack(format!(
            "unsupported native pack version {}",
            version
        )));
    }
    let count = read_u32(data, 8) as usize;

    let mut pos = 12;
    let mut entries: Vec<(u8, Vec<u8>)> = Vec::with_capacity(count);
    for _ in 0..count {
        if pos + 5 > data.len() {
            return Err(Error::MalformedPack("truncated native pack entry".to_string()));
        }
        let code = data[pos];
        let length = read_u32(data, pos + 1) as usize;
        pos += 5;
        if pos + length > data.len() {
            return Err(Error::MalformedPack("truncated native pack payload".to_string()));
        }

        let mut decoder = flate2::read::ZlibDecoder::new(&data[pos..pos + length]);
        let mut payload = Vec::new();
        decoder
            .read_to_end(&mut payload)
            .map_err(|e| Error::MalformedPack(format!("zlib inflate: {}", e)))?;
        pos += length;

        entries.push((code, payload));
    }

    // entity trailer
    if pos + 4 > data.len() {
        return Err(Error::MalformedPack("missing native pack trailer".to_string()));
    }
    let trailer_count = read_u32(data, pos) as usize;
    pos += 4;

    let mut entity_kinds: std::collections::HashMap<Hash, Kind> = std::collections::HashMap::new();
    for _ in 0..trailer_count {
        if pos + 33 > data.len() {
            return Err(Error::MalformedPack("truncated native pack trailer".to_string()));
        }
        let mut raw = [0u8; 32];
        raw.copy_from_slice(&data[pos..pos + 32]);
        let kind = Kind::from_tag(data[pos + 32])?;
        if !matches!(kind, Kind::Entity | Kind::EntityList) {
            return Err(Error::MalformedPack(format!(
                "trailer kind {} is not an entity kind",
                kind
            )));
        }
        entity_kinds.insert(Hash::from_bytes(raw), kind);
        pos += 33;
    }
    if pos != data.len() {
        return Err(Error::MalformedPack("trailing bytes after native pack".to_string()));
    }

    let mut objects = Vec::with_capacity(entries.len());
    for (code, payload) in entries {
        let kind = match code {
            WIRE_COMMIT => Kind::Commit,
            WIRE_TREE => Kind::Tree,
            WIRE_TAG => Kind::Tag,
            WIRE_BLOB => reclassify_blob(&entity_kinds, &payload),
            other => {
                return Err(Error::MalformedPack(format!(
                    "unknown native pack type {}",
                    other
                )));
            }
        };
        objects.push((kind, payload));
    }
    Ok(objects)
}

/// big-endian u32 at `pos`; callers bounds-check first
fn read_u32(data: &[u8], pos: usize) -> u32 {
    u32::from_be_bytes([data[pos], data[pos + 1], data[pos + 2], data[pos + 3]])
}

/// blob-typed entries listed in the trailer decode as their entity kind
fn reclassify_blob(entity_kinds: &std::collections::HashMap<Hash, Kind>, payload: &[u8]) -> Kind {
    for kind in [Kind::Entity, Kind::EntityList] {
        let candidate = compute_object_hash(kind.tag(), payload);
        if entity_kinds.get(&candidate) == Some(&kind) {
            return kind;
        }
    }
    Kind::Blob
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object;
    use crate::types::{Entity, EntityKind, EntityList};

    #[test]
    fn test_roundtrip_plain_kinds() {
        let objects = vec![
            (Kind::Blob, b"blob bytes".to_vec()),
            (Kind::Commit, b"commit payload".to_vec()),
            (Kind::Tree, b"tree payload".to_vec()),
        ];
        let pack = encode(&objects).unwrap();
        assert_eq!(decode(&pack).unwrap(), objects);
    }

    #[test]
    fn test_entity_kinds_reclassified() {
        let entity = Entity {
            kind: EntityKind::Declaration,
            name: "F".to_string(),
            decl_kind: "func".to_string(),
            receiver: String::new(),
            body: b"func F() {}".to_vec(),
            body_hash: compute_object_hash(1, b"func F() {}"),
        };
        let entity_payload = object::store::encode_entity(&entity).unwrap();
        let list = EntityList::new("go", "main.go", vec![]);
        let list_payload = object::store::encode_entity_list(&list).unwrap();

        let objects = vec![
            (Kind::Entity, entity_payload),
            (Kind::EntityList, list_payload),
            (Kind::Blob, b"ordinary".to_vec()),
        ];
        let pack = encode(&objects).unwrap();
        let decoded = decode(&pack).unwrap();

        assert_eq!(decoded[0].0, Kind::Entity);
        assert_eq!(decoded[1].0, Kind::EntityList);
        assert_eq!(decoded[2].0, Kind::Blob);
        assert_eq!(decoded, objects);
    }

    #[test]
    fn test_bad_magic() {
        let mut pack = encode(&[]).unwrap();
        pack[0] = b'X';
        assert!(matches!(decode(&pack), Err(Error::MalformedPack(_))));
    }

    #[test]
    fn test_truncated() {
        let pack = encode(&[(Kind::Blob, b"x".to_vec())]).unwrap();
        assert!(decode(&pack[..pack.len() - 3]).is_err());
    }

    #[test]
    fn test_empty_pack() {
        let pack = encode(&[]).unwrap();
        assert!(decode(&pack).unwrap().is_empty());
    }
}
