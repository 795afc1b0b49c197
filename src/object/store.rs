use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{Error, Result};
use crate::hash::{compute_stored_hash, Hash};
use crate::repo::Repo;
use crate::types::{Commit, Entity, EntityList, Kind, Tag, Tree};

/// backend path for an object: first hex byte splayed into a directory
pub fn object_path(hash: &Hash) -> String {
    let (dir, file) = hash.to_path_components();
    format!("objects/{}/{}", dir, file)
}

/// check whether an object exists
pub fn has(repo: &Repo, hash: &Hash) -> Result<bool> {
    repo.backend().has(&object_path(hash))
}

/// write an object payload under its content address
///
/// the stored form is `<kind-tag byte><payload>`; the address is the SHA-256
/// of the stored form, so writes are idempotent by construction.
pub fn write(repo: &Repo, kind: Kind, payload: &[u8]) -> Result<Hash> {
    let mut stored = Vec::with_capacity(1 + payload.len());
    stored.push(kind.tag());
    stored.extend_from_slice(payload);

    let hash = compute_stored_hash(&stored);
    repo.backend().write(&object_path(&hash), &stored)?;
    Ok(hash)
}

/// read an object, verifying its address against the stored bytes
pub fn read(repo: &Repo, hash: &Hash) -> Result<(Kind, Vec<u8>)> {
    let path = object_path(hash);
    let stored = repo
        .backend()
        .read(&path)?
        .ok_or_else(|| Error::ObjectNotFound(hash.to_hex()))?;

    if compute_stored_hash(&stored) != *hash {
        return Err(Error::CorruptObject(*hash));
    }
    if stored.is_empty() {
        return Err(Error::CorruptObject(*hash));
    }

    let kind = Kind::from_tag(stored[0]).map_err(|_| Error::CorruptObject(*hash))?;
    Ok((kind, stored[1..].to_vec()))
}

fn read_expecting(repo: &Repo, hash: &Hash, want: Kind) -> Result<Vec<u8>> {
    let (kind, payload) = read(repo, hash)?;
    if kind != want {
        return Err(Error::InvalidObjectType(format!(
            "{} is a {}, expected {}",
            hash, kind, want
        )));
    }
    Ok(payload)
}

fn encode_cbor<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    ciborium::into_writer(value, &mut bytes)?;
    Ok(bytes)
}

fn decode_cbor<T: DeserializeOwned>(payload: &[u8]) -> Result<T> {
    Ok(ciborium::from_reader(payload)?)
}

// canonical payload encodings; exposed so validation can decode without persisting

pub fn encode_tree(tree: &Tree) -> Result<Vec<u8>> {
    encode_cbor(tree)
}

pub fn decode_tree(payload: &[u8]) -> Result<Tree> {
    decode_cbor(payload)
}

pub fn encode_commit(commit: &Commit) -> Result<Vec<u8>> {
    encode_cbor(commit)
}

pub fn decode_commit(payload: &[u8]) -> Result<Commit> {
    decode_cbor(payload)
}

pub fn encode_tag(tag: &Tag) -> Result<Vec<u8>> {
    encode_cbor(tag)
}

pub fn decode_tag(payload: &[u8]) -> Result<Tag> {
    decode_cbor(payload)
}

pub fn encode_entity(entity: &Entity) -> Result<Vec<u8>> {
    encode_cbor(entity)
}

pub fn decode_entity(payload: &[u8]) -> Result<Entity> {
    decode_cbor(payload)
}

pub fn encode_entity_list(list: &EntityList) -> Result<Vec<u8>> {
    encode_cbor(list)
}

pub fn decode_entity_list(payload: &[u8]) -> Result<EntityList> {
    decode_cbor(payload)
}

// typed writers and readers

pub fn write_blob(repo: &Repo, bytes: &[u8]) -> Result<Hash> {
    write(repo, Kind::Blob, bytes)
}

pub fn read_blob(repo: &Repo, hash: &Hash) -> Result<Vec<u8>> {
    read_expecting(repo, hash, Kind::Blob)
}

pub fn write_tree(repo: &Repo, tree: &Tree) -> Result<Hash> {
    write(repo, Kind::Tree, &encode_tree(tree)?)
}

pub fn read_tree(repo: &Repo, hash: &Hash) -> Result<Tree> {
    decode_tree(&read_expecting(repo, hash, Kind::Tree)?)
}

pub fn write_commit(repo: &Repo, commit: &Commit) -> Result<Hash> {
    write(repo, Kind::Commit, &encode_commit(commit)?)
}

pub fn read_commit(repo: &Repo, hash: &Hash) -> Result<Commit> {
    decode_commit(&read_expecting(repo, hash, Kind::Commit)?)
}

pub fn write_tag(repo: &Repo, tag: &Tag) -> Result<Hash> {
    write(repo, Kind::Tag, &encode_tag(tag)?)
}

pub fn read_tag(repo: &Repo, hash: &Hash) -> Result<Tag> {
    decode_tag(&read_expecting(repo, hash, Kind::Tag)?)
}

pub fn write_entity(repo: &Repo, entity: &Entity) -> Result<Hash> {
    write(repo, Kind::Entity, &encode_entity(entity)?)
}

pub fn read_entity(repo: &Repo, hash: &Hash) -> Result<Entity> {
    decode_entity(&read_expecting(repo, hash, Kind::Entity)?)
}

pub fn write_entity_list(repo: &Repo, list: &EntityList) -> Result<Hash> {
    write(repo, Kind::EntityList, &encode_entity_list(list)?)
}

pub fn read_entity_list(repo: &Repo, hash: &Hash) -> Result<EntityList> {
    decode_entity_list(&read_expecting(repo, hash, Kind::EntityList)?)
}
