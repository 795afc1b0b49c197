//! native ("got") protocol endpoints: refs, objects, batch, push

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::hash::{compute_object_hash, Hash};
use crate::mapping::{self, MapEntry};
use crate::object;
use crate::refs;
use crate::repo::Repo;
use crate::transport::{
    check_cap, got_headers, gotpack, json_error, json_ok, HandlerContext, Response, CT_GOT_PACK,
    CT_OCTET,
};
use crate::types::Kind;
use crate::walk::{walk, WalkOptions};

/// pagination parameters for `GET …/refs`
#[derive(Clone, Debug, Default)]
pub struct RefsQuery {
    pub limit: Option<usize>,
    pub cursor: Option<String>,
}

impl RefsQuery {
    fn is_paginated(&self) -> bool {
        self.limit.is_some() || self.cursor.is_some()
    }
}

/// `GET …/refs` — list refs, paginated when asked
///
/// names are lex-sorted; the cursor is the last name of the previous page.
/// without pagination params the legacy flat map is returned.
pub fn list_refs(repo: &Repo, query: &RefsQuery) -> Response {
    match list_refs_inner(repo, query) {
        Ok(value) => json_ok(repo, &value),
        Err(e) => json_error(repo, &e),
    }
}

fn list_refs_inner(repo: &Repo, query: &RefsQuery) -> Result<serde_json::Value> {
    let all = refs::list(repo, "")?;

    if !query.is_paginated() {
        let flat: BTreeMap<&String, String> =
            all.iter().map(|(name, hash)| (name, hash.to_hex())).collect();
        return Ok(serde_json::json!(flat));
    }

    let limit = query
        .limit
        .unwrap_or(repo.limits().native_batch_default.min(1000))
        .clamp(1, 10_000);

    let after = query.cursor.as_deref().unwrap_or("");
    let mut page: BTreeMap<&String, String> = BTreeMap::new();
    let mut last_name: Option<&String> = None;
    let mut more = false;

    for (name, hash) in all.iter() {
        if name.as_str() <= after {
            continue;
        }
        if page.len() == limit {
            more = true;
            break;
        }
        page.insert(name, hash.to_hex());
        last_name = Some(name);
    }

    let mut value = serde_json::json!({ "refs": page });
    if more {
        if let Some(last) = last_name {
            value["cursor"] = serde_json::json!(last);
        }
    }
    Ok(value)
}

/// `GET …/objects/{hash}` — raw payload with its kind in a header
pub fn get_object(repo: &Repo, hex: &str) -> Response {
    let result = Hash::from_hex(hex).and_then(|hash| object::read(repo, &hash));
    match result {
        Ok((kind, payload)) => got_headers(
            repo,
            Response::new(200, CT_OCTET, payload).with_header("X-Object-Type", kind.name()),
        ),
        Err(e) => json_error(repo, &e),
    }
}

#[derive(Debug, Deserialize)]
struct PushLine {
    #[serde(rename = "type")]
    kind: String,
    data: String,
    #[serde(default)]
    hash: Option<String>,
}

/// `POST …/objects` — push objects, NDJSON or a native pack body
pub fn push_objects(
    repo: &Repo,
    ctx: &HandlerContext,
    content_type: &str,
    content_encoding: Option<&str>,
    body: &[u8],
) -> Response {
    match push_objects_inner(repo, ctx, content_type, content_encoding, body) {
        Ok(stored) => json_ok(repo, &serde_json::json!({ "status": "ok", "stored": stored })),
        Err(e) => json_error(repo, &e),
    }
}

fn push_objects_inner(
    repo: &Repo,
    ctx: &HandlerContext,
    content_type: &str,
    content_encoding: Option<&str>,
    body: &[u8],
) -> Result<usize> {
    let limits = repo.limits();
    check_cap(body.len(), limits.native_push_bytes)?;

    let objects: Vec<(Kind, Vec<u8>, Option<Hash>)> = if content_type.starts_with(CT_GOT_PACK) {
        let raw = maybe_unzstd(body, content_encoding)?;
        check_cap(raw.len(), limits.native_push_bytes)?;
        gotpack::decode(&raw)?
            .into_iter()
            .map(|(kind, payload)| (kind, payload, None))
            .collect()
    } else {
        parse_ndjson(body)?
    };

    check_cap(objects.len(), limits.native_push_objects)?;
    validate_and_store(repo, ctx, objects)
}

fn maybe_unzstd(body: &[u8], content_encoding: Option<&str>) -> Result<Vec<u8>> {
    match content_encoding {
        Some("zstd") => zstd::decode_all(body)
            .map_err(|e| Error::MalformedRequest(format!("zstd decode: {}", e))),
        _ => Ok(body.to_vec()),
    }
}

fn parse_ndjson(body: &[u8]) -> Result<Vec<(Kind, Vec<u8>, Option<Hash>)>> {
    let mut objects = Vec::new();
    for line in body.split(|&b| b == b'\n') {
        if line.is_empty() {
            continue;
        }
        let parsed: PushLine = serde_json::from_slice(line)
            .map_err(|e| Error::MalformedRequest(format!("bad push line: {}", e)))?;
        let kind = Kind::from_name(&parsed.kind)?;
        let payload = hex::decode(&parsed.data)
            .map_err(|_| Error::MalformedRequest("object data is not hex".to_string()))?;
        let declared = parsed.hash.as_deref().map(Hash::from_hex).transpose()?;
        objects.push((kind, payload, declared));
    }
    Ok(objects)
}

/// two-phase push: validate every object, then write in declaration order
///
/// closure check: every referenced address is already persisted or appears
/// earlier in the same push, and decodes as the declared referent kind.
fn validate_and_store(
    repo: &Repo,
    ctx: &HandlerContext,
    objects: Vec<(Kind, Vec<u8>, Option<Hash>)>,
) -> Result<usize> {
    let limits = repo.limits();
    let mut pushed: HashMap<Hash, Kind> = HashMap::new();

    for (kind, payload, declared) in &objects {
        ctx.cancel.check()?;
        check_cap(payload.len(), limits.native_object_bytes)?;

        let computed = compute_object_hash(kind.tag(), payload);
        if let Some(declared) = declared {
            if *declared != computed {
                return Err(Error::HashMismatch {
                    declared: declared.to_hex(),
                    computed: computed.to_hex(),
                });
            }
        }

        for (referenced, expected) in referenced_objects(*kind, payload)? {
            let actual = match pushed.get(&referenced) {
                Some(kind) => *kind,
                None => match object::read(repo, &referenced) {
                    Ok((kind, _)) => kind,
                    Err(Error::ObjectNotFound(_)) => {
                        return Err(Error::MissingReference {
                            referrer: computed.to_hex(),
                            referenced: referenced.to_hex(),
                            kind: expected.name(),
                        });
                    }
                    Err(e) => return Err(e),
                },
            };
            if actual != expected {
                return Err(Error::MissingReference {
                    referrer: computed.to_hex(),
                    referenced: referenced.to_hex(),
                    kind: expected.name(),
                });
            }
        }

        pushed.insert(computed, *kind);
    }

    for (kind, payload, _) in &objects {
        ctx.cancel.check()?;
        object::write(repo, *kind, payload)?;
    }
    Ok(objects.len())
}

/// addresses an object's payload references, with the kind each must have
fn referenced_objects(kind: Kind, payload: &[u8]) -> Result<Vec<(Hash, Kind)>> {
    let mut out = Vec::new();
    match kind {
        Kind::Blob | Kind::Entity => {}
        Kind::Tree => {
            let tree = object::decode_tree(payload)?;
            for entry in tree.entries() {
                match &entry.kind {
                    crate::types::EntryKind::Dir { tree } => out.push((*tree, Kind::Tree)),
                    crate::types::EntryKind::File { blob, entity_list } => {
                        out.push((*blob, Kind::Blob));
                        if let Some(list) = entity_list {
                            out.push((*list, Kind::EntityList));
                        }
                    }
                }
            }
        }
        Kind::Commit => {
            let commit = object::decode_commit(payload)?;
            out.push((commit.tree, Kind::Tree));
            for parent in commit.parents {
                out.push((parent, Kind::Commit));
            }
        }
        Kind::Tag => {
            let tag = object::decode_tag(payload)?;
            out.push((tag.target, tag.target_kind()?));
        }
        Kind::EntityList => {
            let list = object::decode_entity_list(payload)?;
            for entity in list.entities {
                out.push((entity, Kind::Entity));
            }
        }
    }
    Ok(out)
}

#[derive(Debug, Deserialize)]
struct BatchRequest {
    #[serde(default)]
    wants: Vec<String>,
    #[serde(default)]
    haves: Vec<String>,
    #[serde(default)]
    max_objects: Option<usize>,
}

/// `POST …/objects/batch` — fetch reachable objects minus haves
///
/// JSON by default; a native pack stream when the client accepts
/// `application/x-got-pack`, zstd-compressed when it accepts that encoding.
pub fn batch_objects(
    repo: &Repo,
    ctx: &HandlerContext,
    accept: &str,
    accept_encoding: Option<&str>,
    body: &[u8],
) -> Response {
    match batch_objects_inner(repo, ctx, accept, accept_encoding, body) {
        Ok(response) => response,
        Err(e) => json_error(repo, &e),
    }
}

fn batch_objects_inner(
    repo: &Repo,
    ctx: &HandlerContext,
    accept: &str,
    accept_encoding: Option<&str>,
    body: &[u8],
) -> Result<Response> {
    let limits = repo.limits();
    check_cap(body.len(), limits.native_batch_bytes)?;

    let request: BatchRequest = serde_json::from_slice(body)
        .map_err(|e| Error::MalformedRequest(format!("bad batch request: {}", e)))?;
    let max_objects = request
        .max_objects
        .unwrap_or(limits.native_batch_default)
        .min(limits.native_batch_max);

    let mut have_set: HashSet<Hash> = HashSet::new();
    for hex in &request.haves {
        if let Ok(hash) = Hash::from_hex(hex) {
            have_set.insert(hash);
        }
    }

    let mut collected: Vec<Hash> = Vec::new();
    let mut seen: HashSet<Hash> = HashSet::new();
    let mut truncated = false;

    'wants: for hex in &request.wants {
        ctx.cancel.check()?;
        let want = Hash::from_hex(hex)?;
        if !object::has(repo, &want)? {
            return Err(Error::ObjectNotFound(want.to_hex()));
        }
        let have_set = &have_set;
        let seen_snapshot = seen.clone();
        let has = move |h: &Hash| have_set.contains(h) || seen_snapshot.contains(h);
        for hash in walk(repo, &want, &has, WalkOptions { entities: true })? {
            if !seen.insert(hash) {
                continue;
            }
            if collected.len() == max_objects {
                truncated = true;
                break 'wants;
            }
            collected.push(hash);
        }
    }

    if accept.contains(CT_GOT_PACK) {
        let mut objects = Vec::with_capacity(collected.len());
        for hash in &collected {
            let (kind, payload) = object::read(repo, hash)?;
            objects.push((kind, payload));
        }
        let pack = gotpack::encode(&objects)?;

        let (body, encoding) = match accept_encoding {
            Some(enc) if enc.contains("zstd") => {
                let compressed = zstd::encode_all(&pack[..], 3).map_err(|e| Error::Io {
                    path: std::path::PathBuf::from("<zstd>"),
                    source: e,
                })?;
                (compressed, Some("zstd"))
            }
            _ => (pack, None),
        };

        let mut response = Response::new(200, CT_GOT_PACK, body);
        if let Some(encoding) = encoding {
            response = response.with_header("Content-Encoding", encoding);
        }
        if truncated {
            response = response.with_header("Got-Truncated", "true");
        }
        return Ok(got_headers(repo, response));
    }

    let mut objects = Vec::with_capacity(collected.len());
    for hash in &collected {
        let (kind, payload) = object::read(repo, hash)?;
        objects.push(serde_json::json!({
            "type": kind.name(),
            "hash": hash.to_hex(),
            "data": hex::encode(payload),
        }));
    }
    Ok(json_ok(
        repo,
        &serde_json::json!({ "objects": objects, "truncated": truncated }),
    ))
}

#[derive(Debug, Deserialize)]
struct RefUpdateBatch {
    updates: Vec<RefUpdate>,
}

#[derive(Debug, Deserialize)]
struct RefUpdate {
    name: String,
    #[serde(default)]
    old: Option<String>,
    new: String,
}

/// `POST …/refs` — update refs, legacy flat map or per-ref CAS batch
pub fn update_refs(repo: &Repo, ctx: &HandlerContext, body: &[u8]) -> Response {
    match update_refs_inner(repo, ctx, body) {
        Ok(updated) => json_ok(
            repo,
            &serde_json::json!({ "status": "ok", "updated": updated }),
        ),
        Err(e) => json_error(repo, &e),
    }
}

fn update_refs_inner(
    repo: &Repo,
    ctx: &HandlerContext,
    body: &[u8],
) -> Result<BTreeMap<String, String>> {
    check_cap(body.len(), repo.limits().native_ref_update_bytes)?;

    let value: serde_json::Value = serde_json::from_slice(body)
        .map_err(|e| Error::MalformedRequest(format!("bad ref update body: {}", e)))?;

    let updates: Vec<RefUpdate> = if value.get("updates").is_some() {
        let batch: RefUpdateBatch = serde_json::from_value(value)
            .map_err(|e| Error::MalformedRequest(format!("bad ref update batch: {}", e)))?;
        batch.updates
    } else {
        // legacy shape: {name: hex|""}, no CAS
        let map: BTreeMap<String, String> = serde_json::from_value(value)
            .map_err(|e| Error::MalformedRequest(format!("bad ref update map: {}", e)))?;
        map.into_iter()
            .map(|(name, new)| RefUpdate {
                name,
                old: None,
                new,
            })
            .collect()
    };

    let mut applied = BTreeMap::new();
    for update in updates {
        refs::validate_ref_name(&update.name)?;

        if update.new.is_empty() {
            refs::update(repo, &update.name, update.old.as_deref(), None)?;
            applied.insert(update.name, String::new());
            continue;
        }

        let target = Hash::from_hex(&update.new)?;
        let (kind, _) = object::read(repo, &target)?;
        if kind != Kind::Commit {
            return Err(Error::InvalidObjectType(format!(
                "ref target {} is a {}, expected commit",
                target, kind
            )));
        }

        // extraction runs before the ref moves; the ref lands on the
        // rewritten commit when anything changed
        let outcome = crate::entities::rewrite_commit(repo, &target, ctx.extractor)?;
        if outcome.changed() {
            let table = mapping::load(repo)?;
            let mut overrides = Vec::new();
            for (old, new) in &outcome.remapped {
                if let Some((git_hash, kind)) = table.get_git(old)? {
                    overrides.push(MapEntry::new(git_hash, *new, kind));
                }
            }
            mapping::set_overrides(repo, &overrides)?;
        }

        if let Some(indexer) = ctx.indexer {
            indexer
                .index_commit(repo, &outcome.commit)
                .map_err(Error::IndexerFailure)?;
        }

        refs::update(
            repo,
            &update.name,
            update.old.as_deref(),
            Some(&outcome.commit),
        )?;
        applied.insert(update.name, outcome.commit.to_hex());
    }

    Ok(applied)
}
