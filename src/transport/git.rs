//! git smart-HTTP endpoints: info/refs, receive-pack, upload-pack

use std::collections::HashSet;

use crate::error::{Error, Result};
use crate::hash::{GitHash, Hash};
use crate::mapping::{self, MapEntry};
use crate::pack;
use crate::pktline::{self, PktReader, SidebandWriter};
use crate::refs;
use crate::repo::Repo;
use crate::transport::{
    translate, HandlerContext, Response, CT_RECEIVE_PACK_RESULT, CT_UPLOAD_PACK_RESULT,
};
use crate::types::Kind;
use crate::walk::{walk, WalkOptions};

pub const SERVICE_UPLOAD_PACK: &str = "git-upload-pack";
pub const SERVICE_RECEIVE_PACK: &str = "git-receive-pack";

const CT_UPLOAD_PACK_ADVERTISEMENT: &str = "application/x-git-upload-pack-advertisement";
const CT_RECEIVE_PACK_ADVERTISEMENT: &str = "application/x-git-receive-pack-advertisement";

const UPLOAD_CAPS: &str = "side-band-64k ofs-delta";
const RECEIVE_CAPS: &str = "report-status delete-refs ofs-delta";

const ZERO_HEX: &str = "0000000000000000000000000000000000000000";

/// `GET …/info/refs?service=` — advertise refs under their git addresses
///
/// refs whose native address never crossed the git boundary are silently
/// omitted; they become visible once a git push maps them.
pub fn info_refs(repo: &Repo, service: &str) -> Response {
    let (caps, content_type) = match service {
        SERVICE_UPLOAD_PACK => (UPLOAD_CAPS, CT_UPLOAD_PACK_ADVERTISEMENT),
        SERVICE_RECEIVE_PACK => (RECEIVE_CAPS, CT_RECEIVE_PACK_ADVERTISEMENT),
        other => {
            return Response::new(
                400,
                "text/plain",
                format!("unknown service {}\n", other).into_bytes(),
            );
        }
    };

    let advertised = match advertisable_refs(repo) {
        Ok(refs) => refs,
        Err(e) => {
            tracing::warn!(error = %e, "ref advertisement failed");
            return Response::new(500, "text/plain", b"internal error\n".to_vec());
        }
    };

    let mut body = Vec::new();
    body.extend_from_slice(&pktline::encode_str(&format!("# service={}\n", service)));
    body.extend_from_slice(pktline::FLUSH);

    if advertised.is_empty() {
        body.extend_from_slice(&pktline::encode_str(&format!(
            "{} capabilities^{{}}\0{}\n",
            ZERO_HEX, caps
        )));
    } else {
        for (i, (name, git_hash)) in advertised.iter().enumerate() {
            let line = if i == 0 {
                format!("{} refs/{}\0{}\n", git_hash.to_hex(), name, caps)
            } else {
                format!("{} refs/{}\n", git_hash.to_hex(), name)
            };
            body.extend_from_slice(&pktline::encode_str(&line));
        }
    }
    body.extend_from_slice(pktline::FLUSH);

    Response::new(200, content_type, body)
}

fn advertisable_refs(repo: &Repo) -> Result<Vec<(String, GitHash)>> {
    let table = mapping::load(repo)?;
    let mut out = Vec::new();
    for (name, native) in refs::list(repo, "")? {
        if let Some((git_hash, _)) = table.get_git(&native)? {
            out.push((name, git_hash));
        }
    }
    Ok(out)
}

/// one `<old> <new> refs/<name>` command from a receive-pack request
#[derive(Clone, Debug)]
struct RefCommand {
    old: GitHash,
    new: GitHash,
    name: String,
}

/// `POST …/git-receive-pack` — ingest a push
pub fn receive_pack(repo: &Repo, ctx: &HandlerContext, body: &[u8]) -> Response {
    if let Err(e) = super::check_cap(body.len(), repo.limits().git_push_bytes) {
        return Response::new(413, "text/plain", format!("{}\n", e).into_bytes());
    }

    let (commands, pack_bytes) = match parse_commands(body) {
        Ok(parsed) => parsed,
        Err(e) => {
            return Response::new(400, "text/plain", format!("{}\n", e).into_bytes());
        }
    };

    // unpack; failure aborts the whole push with no mapping state committed
    if !pack_bytes.is_empty() {
        if let Err(e) = unpack(repo, pack_bytes, ctx) {
            tracing::debug!(error = %e, "unpack failed");
            return report_status(&commands, Some(&e));
        }
    }

    // entity extraction per branch head, overrides registered before any
    // ref moves so later translation sees the rewritten addresses
    if let Err(e) = rewrite_heads(repo, &commands, ctx) {
        tracing::debug!(error = %e, "entity rewrite failed");
        return report_status(&commands, Some(&e));
    }

    report_ref_updates(repo, ctx, &commands)
}

fn parse_commands(body: &[u8]) -> Result<(Vec<RefCommand>, &[u8])> {
    let mut reader = PktReader::new(body);
    let mut commands = Vec::new();

    while let Some(line) = reader.next_line()? {
        // the first command carries the capability list after a NUL
        let line = line.split('\0').next().unwrap_or("").to_string();
        let mut parts = line.split_whitespace();
        let (Some(old), Some(new), Some(full_name)) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(Error::MalformedRequest(format!(
                "bad ref-update line {:?}",
                line
            )));
        };
        let name = full_name
            .strip_prefix("refs/")
            .ok_or_else(|| Error::MalformedRequest(format!("ref {:?} lacks refs/ prefix", full_name)))?;
        refs::validate_ref_name(name)?;

        commands.push(RefCommand {
            old: GitHash::from_hex(old)?,
            new: GitHash::from_hex(new)?,
            name: name.to_string(),
        });
    }

    Ok((commands, reader.rest()))
}

fn unpack(repo: &Repo, pack_bytes: &[u8], ctx: &HandlerContext) -> Result<()> {
    let objects = pack::parse(pack_bytes, ctx.cancel)?;
    translate::ingest_pack(repo, &objects, ctx.cancel)?;
    Ok(())
}

/// run the tree rewriter over every pushed branch head and register the
/// git-address overrides for the rewritten commit and trees
fn rewrite_heads(repo: &Repo, commands: &[RefCommand], ctx: &HandlerContext) -> Result<()> {
    let table = mapping::load(repo)?;
    let mut overrides: Vec<MapEntry> = Vec::new();

    for command in commands {
        if command.new.is_zero() {
            continue;
        }
        let Some((native, kind)) = table.get_native(&command.new)? else {
            // surfaced per-ref during the update phase
            continue;
        };
        if kind != Kind::Commit {
            continue;
        }

        let outcome = crate::entities::rewrite_commit(repo, &native, ctx.extractor)?;
        for (old, new) in &outcome.remapped {
            if let Some((git_hash, kind)) = table.get_git(old)? {
                overrides.push(MapEntry::new(git_hash, *new, kind));
            }
        }
    }

    mapping::set_overrides(repo, &overrides)
}

fn report_ref_updates(repo: &Repo, ctx: &HandlerContext, commands: &[RefCommand]) -> Response {
    let table = match mapping::load(repo) {
        Ok(table) => table,
        Err(e) => return report_status(commands, Some(&e)),
    };

    let mut lines = Vec::new();
    for command in commands {
        match apply_ref_update(repo, ctx, &table, command) {
            Ok(()) => lines.push(format!("ok refs/{}\n", command.name)),
            Err(e) => {
                let msg = match e {
                    Error::CasMismatch {
                        expected, actual, ..
                    } => format!("stale old hash (expected {}, got {})", expected, actual),
                    other => other.to_string(),
                };
                lines.push(format!("ng refs/{} {}\n", command.name, msg));
            }
        }
    }

    let mut body = Vec::new();
    body.extend_from_slice(&pktline::encode_str("unpack ok\n"));
    for line in lines {
        body.extend_from_slice(&pktline::encode_str(&line));
    }
    body.extend_from_slice(pktline::FLUSH);
    Response::new(200, CT_RECEIVE_PACK_RESULT, body)
}

fn apply_ref_update(
    repo: &Repo,
    ctx: &HandlerContext,
    table: &mapping::MappingTable,
    command: &RefCommand,
) -> Result<()> {
    let current = refs::get_opt(repo, &command.name)?;
    let current_git_hex = match current {
        None => ZERO_HEX.to_string(),
        Some(native) => match table.get_git(&native)? {
            Some((git_hash, _)) => git_hash.to_hex(),
            // a native-push-only ref was never advertised to this client
            None => native.to_hex(),
        },
    };

    let expected_hex = command.old.to_hex();
    if expected_hex != current_git_hex {
        return Err(Error::CasMismatch {
            name: command.name.clone(),
            expected: expected_hex,
            actual: current_git_hex,
        });
    }

    // compare-and-swap on the underlying native value closes the race
    // between the read above and the write below
    let expected_native = current.map(|h| h.to_hex()).unwrap_or_default();

    if command.new.is_zero() {
        return refs::update(repo, &command.name, Some(&expected_native), None);
    }

    let Some((native, kind)) = table.get_native(&command.new)? else {
        return Err(Error::UnmappedGit(command.new));
    };

    if kind == Kind::Commit {
        if let Some(indexer) = ctx.indexer {
            indexer
                .index_commit(repo, &native)
                .map_err(Error::IndexerFailure)?;
        }
    }

    refs::update(repo, &command.name, Some(&expected_native), Some(&native))
}

/// report-status body when unpacking failed: every ref is rejected
fn report_status(commands: &[RefCommand], unpack_err: Option<&Error>) -> Response {
    let mut body = Vec::new();
    match unpack_err {
        None => body.extend_from_slice(&pktline::encode_str("unpack ok\n")),
        Some(e) => {
            body.extend_from_slice(&pktline::encode_str(&format!("unpack error: {}\n", e)));
            for command in commands {
                body.extend_from_slice(&pktline::encode_str(&format!(
                    "ng refs/{} unpacker error\n",
                    command.name
                )));
            }
        }
    }
    body.extend_from_slice(pktline::FLUSH);
    Response::new(200, CT_RECEIVE_PACK_RESULT, body)
}

/// `POST …/git-upload-pack` — serve a fetch
pub fn upload_pack(repo: &Repo, ctx: &HandlerContext, body: &[u8]) -> Response {
    if let Err(e) = super::check_cap(body.len(), repo.limits().git_fetch_bytes) {
        return Response::new(413, "text/plain", format!("{}\n", e).into_bytes());
    }

    let request = match parse_negotiation(body) {
        Ok(request) => request,
        Err(e) => {
            return Response::new(400, "text/plain", format!("{}\n", e).into_bytes());
        }
    };

    match serve_fetch(repo, ctx, &request) {
        Ok(pack_bytes) => {
            let mut writer = SidebandWriter::new(request.sideband);
            writer.raw(&pktline::encode_str("NAK\n"));
            writer.data(&pack_bytes);
            writer.flush();
            Response::new(200, CT_UPLOAD_PACK_RESULT, writer.into_bytes())
        }
        Err(e) => {
            tracing::debug!(error = %e, "upload-pack failed");
            let msg = match &e {
                Error::CorruptObjectGraph(_) => e.to_string(),
                Error::UnmappedNative(native) => {
                    format!("invalid object graph: no git mapping for {}", native)
                }
                other => other.to_string(),
            };
            let mut writer = SidebandWriter::new(request.sideband);
            writer.fatal(&msg);
            writer.flush();
            Response::new(422, CT_UPLOAD_PACK_RESULT, writer.into_bytes())
        }
    }
}

#[derive(Clone, Debug, Default)]
struct FetchRequest {
    wants: Vec<GitHash>,
    haves: Vec<GitHash>,
    sideband: bool,
}

fn parse_negotiation(body: &[u8]) -> Result<FetchRequest> {
    let mut reader = PktReader::new(body);
    let mut request = FetchRequest::default();
    let mut first_want = true;

    loop {
        let Some(packet) = reader.next_packet()? else {
            break;
        };
        let line = match packet {
            pktline::Packet::Flush | pktline::Packet::Delim => continue,
            pktline::Packet::Data(payload) => String::from_utf8(payload)
                .map_err(|_| Error::MalformedRequest("negotiation line is not utf-8".to_string()))?,
        };
        let line = line.trim_end_matches('\n');

        if let Some(rest) = line.strip_prefix("want ") {
            let mut parts = rest.split_whitespace();
            let hex = parts
                .next()
                .ok_or_else(|| Error::MalformedRequest("empty want".to_string()))?;
            request.wants.push(GitHash::from_hex(hex)?);
            if first_want {
                request.sideband = parts.any(|cap| cap == "side-band-64k");
                first_want = false;
            }
        } else if let Some(rest) = line.strip_prefix("have ") {
            request.haves.push(GitHash::from_hex(rest.trim())?);
        } else if line == "done" {
            break;
        } else if line.is_empty() {
            continue;
        } else {
            return Err(Error::MalformedRequest(format!(
                "unknown negotiation line {:?}",
                line
            )));
        }
    }

    if request.wants.is_empty() {
        return Err(Error::MalformedRequest("no want lines".to_string()));
    }
    Ok(request)
}

/// enumerate wanted objects minus haves and build the response pack
fn serve_fetch(repo: &Repo, ctx: &HandlerContext, request: &FetchRequest) -> Result<Vec<u8>> {
    let table = mapping::load(repo)?;

    let mut have_set: HashSet<Hash> = HashSet::new();
    for have in &request.haves {
        // haves the server cannot translate are simply not common
        if let Some((native, _)) = table.get_native(have)? {
            have_set.insert(native);
        }
    }

    let mut packed: HashSet<Hash> = HashSet::new();
    let mut order: Vec<Hash> = Vec::new();
    for want in &request.wants {
        ctx.cancel.check()?;
        let Some((native, _)) = table.get_native(want)? else {
            return Err(Error::CorruptObjectGraph(format!(
                "no mapping for want {}",
                want
            )));
        };
        let have_set = &have_set;
        let packed_snapshot = packed.clone();
        let has = move |h: &Hash| have_set.contains(h) || packed_snapshot.contains(h);
        for hash in walk(repo, &native, &has, WalkOptions::default())? {
            if packed.insert(hash) {
                order.push(hash);
            }
        }
    }

    let mut objects = Vec::with_capacity(order.len());
    for native in &order {
        ctx.cancel.check()?;
        if let Some((kind, bytes, _)) = translate::native_to_git(repo, &table, native)? {
            objects.push((kind, bytes));
        }
    }

    pack::build(&objects)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancel::CancelToken;
    use crate::entities::NoopExtractor;
    use crate::hash::compute_git_hash;
    use crate::pack::PackKind;
    use crate::pktline::Packet;
    use tempfile::tempdir;

    fn test_repo() -> (tempfile::TempDir, Repo) {
        let dir = tempdir().unwrap();
        let repo_path = dir.path().join("repo");
        let repo = Repo::init(&repo_path).unwrap();
        (dir, repo)
    }

    fn tree_bytes(entries: &[(&str, &str, GitHash)]) -> Vec<u8> {
        let mut out = Vec::new();
        for (mode, name, hash) in entries {
            out.extend_from_slice(mode.as_bytes());
            out.push(b' ');
            out.extend_from_slice(name.as_bytes());
            out.push(0);
            out.extend_from_slice(hash.as_bytes());
        }
        out
    }

    /// build the canonical bytes for blob/tree/commit and their git hashes
    fn sample_objects() -> (Vec<(PackKind, Vec<u8>)>, GitHash) {
        let blob = b"hello\n".to_vec();
        let blob_hash = compute_git_hash("blob", &blob);
        let tree = tree_bytes(&[("100644", "hello.txt", blob_hash)]);
        let tree_hash = compute_git_hash("tree", &tree);
        let commit = format!(
            "tree {}\nauthor A <a@x> 1700000000 +0000\ncommitter A <a@x> 1700000000 +0000\n\ninit\n",
            tree_hash.to_hex()
        )
        .into_bytes();
        let commit_hash = compute_git_hash("commit", &commit);

        (
            vec![
                (PackKind::Commit, commit),
                (PackKind::Tree, tree),
                (PackKind::Blob, blob),
            ],
            commit_hash,
        )
    }

    fn push_body(old: &str, new: &GitHash, objects: &[(PackKind, Vec<u8>)]) -> Vec<u8> {
        let mut body = Vec::new();
        body.extend_from_slice(&pktline::encode_str(&format!(
            "{} {} refs/heads/main\0report-status\n",
            old,
            new.to_hex()
        )));
        body.extend_from_slice(pktline::FLUSH);
        body.extend_from_slice(&pack::build(objects).unwrap());
        body
    }

    fn do_push(repo: &Repo) -> GitHash {
        let (objects, commit_hash) = sample_objects();
        let cancel = CancelToken::new();
        let ctx = HandlerContext::new(&NoopExtractor, &cancel);
        let response = receive_pack(repo, &ctx, &push_body(ZERO_HEX, &commit_hash, &objects));
        assert_eq!(response.status, 200);

        let mut reader = PktReader::new(&response.body);
        assert_eq!(reader.next_line().unwrap().unwrap(), "unpack ok");
        assert_eq!(reader.next_line().unwrap().unwrap(), "ok refs/heads/main");
        commit_hash
    }

    #[test]
    fn test_push_then_advertise() {
        let (_dir, repo) = test_repo();
        let commit_hash = do_push(&repo);

        let response = info_refs(&repo, SERVICE_UPLOAD_PACK);
        assert_eq!(response.status, 200);
        let text = String::from_utf8_lossy(&response.body);
        assert!(text.contains("# service=git-upload-pack"));
        assert!(text.contains(&format!("{} refs/heads/main", commit_hash.to_hex())));
        assert!(text.contains("side-band-64k"));
    }

    #[test]
    fn test_advertise_empty_repo_placeholder() {
        let (_dir, repo) = test_repo();

        let response = info_refs(&repo, SERVICE_RECEIVE_PACK);
        let text = String::from_utf8_lossy(&response.body);
        assert!(text.contains("capabilities^{}"));
        assert!(text.contains("report-status delete-refs ofs-delta"));
    }

    #[test]
    fn test_advertise_unknown_service() {
        let (_dir, repo) = test_repo();
        assert_eq!(info_refs(&repo, "git-evil-pack").status, 400);
    }

    #[test]
    fn test_native_only_refs_omitted() {
        let (_dir, repo) = test_repo();

        // a ref written through the native path has no git mapping yet
        let native = crate::object::write_blob(&repo, b"x").unwrap();
        refs::set(&repo, "heads/native-only", &native).unwrap();

        let response = info_refs(&repo, SERVICE_UPLOAD_PACK);
        let text = String::from_utf8_lossy(&response.body);
        assert!(!text.contains("native-only"));
    }

    #[test]
    fn test_push_stale_old_hash() {
        let (_dir, repo) = test_repo();
        let commit_hash = do_push(&repo);

        // second push claims the branch is still unborn
        let (objects, _) = sample_objects();
        let cancel = CancelToken::new();
        let ctx = HandlerContext::new(&NoopExtractor, &cancel);
        let response = receive_pack(&repo, &ctx, &push_body(ZERO_HEX, &commit_hash, &objects));

        let mut reader = PktReader::new(&response.body);
        assert_eq!(reader.next_line().unwrap().unwrap(), "unpack ok");
        let status = reader.next_line().unwrap().unwrap();
        assert!(status.starts_with("ng refs/heads/main stale old hash"));
        assert!(status.contains(&format!("got {}", commit_hash.to_hex())));
    }

    #[test]
    fn test_push_delete_ref() {
        let (_dir, repo) = test_repo();
        let commit_hash = do_push(&repo);

        let mut body = Vec::new();
        body.extend_from_slice(&pktline::encode_str(&format!(
            "{} {} refs/heads/main\0report-status\n",
            commit_hash.to_hex(),
            ZERO_HEX
        )));
        body.extend_from_slice(pktline::FLUSH);

        let cancel = CancelToken::new();
        let ctx = HandlerContext::new(&NoopExtractor, &cancel);
        let response = receive_pack(&repo, &ctx, &body);

        let mut reader = PktReader::new(&response.body);
        assert_eq!(reader.next_line().unwrap().unwrap(), "unpack ok");
        assert_eq!(reader.next_line().unwrap().unwrap(), "ok refs/heads/main");
        assert!(!refs::exists(&repo, "heads/main"));
    }

    #[test]
    fn test_push_body_cap() {
        let (_dir, repo) = test_repo();
        let cancel = CancelToken::new();
        let ctx = HandlerContext::new(&NoopExtractor, &cancel);

        let body = vec![0u8; repo.limits().git_push_bytes + 1];
        assert_eq!(receive_pack(&repo, &ctx, &body).status, 413);
    }

    #[test]
    fn test_push_bad_pack_reports_unpack_error() {
        let (_dir, repo) = test_repo();
        let (_, commit_hash) = sample_objects();

        let mut body = Vec::new();
        body.extend_from_slice(&pktline::encode_str(&format!(
            "{} {} refs/heads/main\n",
            ZERO_HEX,
            commit_hash.to_hex()
        )));
        body.extend_from_slice(pktline::FLUSH);
        body.extend_from_slice(b"NOTAPACK");

        let cancel = CancelToken::new();
        let ctx = HandlerContext::new(&NoopExtractor, &cancel);
        let response = receive_pack(&repo, &ctx, &body);
        assert_eq!(response.status, 200);

        let mut reader = PktReader::new(&response.body);
        let unpack = reader.next_line().unwrap().unwrap();
        assert!(unpack.starts_with("unpack error:"));
        let status = reader.next_line().unwrap().unwrap();
        assert!(status.starts_with("ng refs/heads/main"));

        // the failed push left no mapping state behind
        assert!(mapping::load(&repo).unwrap().is_empty());
    }

    fn fetch_body(want: &GitHash, sideband: bool) -> Vec<u8> {
        let caps = if sideband { " side-band-64k ofs-delta" } else { "" };
        let mut body = Vec::new();
        body.extend_from_slice(&pktline::encode_str(&format!(
            "want {}{}\n",
            want.to_hex(),
            caps
        )));
        body.extend_from_slice(pktline::FLUSH);
        body.extend_from_slice(&pktline::encode_str("done\n"));
        body
    }

    #[test]
    fn test_fetch_roundtrip() {
        let (_dir, repo) = test_repo();
        let commit_hash = do_push(&repo);

        let cancel = CancelToken::new();
        let ctx = HandlerContext::new(&NoopExtractor, &cancel);
        let response = upload_pack(&repo, &ctx, &fetch_body(&commit_hash, false));
        assert_eq!(response.status, 200);

        let mut reader = PktReader::new(&response.body);
        match reader.next_packet().unwrap() {
            Some(Packet::Data(payload)) => assert_eq!(payload, b"NAK\n"),
            other => panic!("expected NAK, got {:?}", other),
        }

        // without sideband the pack follows raw; trailing flush terminates it
        let rest = reader.rest();
        let pack_end = rest.len() - pktline::FLUSH.len();
        let objects = pack::parse(&rest[..pack_end], &CancelToken::new()).unwrap();
        assert_eq!(objects.len(), 3);
        assert!(objects.iter().any(|o| o.hash == commit_hash));
    }

    #[test]
    fn test_fetch_with_haves_excludes_common() {
        let (_dir, repo) = test_repo();
        let commit_hash = do_push(&repo);

        let mut body = Vec::new();
        body.extend_from_slice(&pktline::encode_str(&format!(
            "want {}\n",
            commit_hash.to_hex()
        )));
        body.extend_from_slice(pktline::FLUSH);
        body.extend_from_slice(&pktline::encode_str(&format!(
            "have {}\n",
            commit_hash.to_hex()
        )));
        body.extend_from_slice(&pktline::encode_str("done\n"));

        let cancel = CancelToken::new();
        let ctx = HandlerContext::new(&NoopExtractor, &cancel);
        let response = upload_pack(&repo, &ctx, &body);
        assert_eq!(response.status, 200);

        let mut reader = PktReader::new(&response.body);
        reader.next_packet().unwrap(); // NAK
        let rest = reader.rest();
        let pack_end = rest.len() - pktline::FLUSH.len();
        let objects = pack::parse(&rest[..pack_end], &CancelToken::new()).unwrap();
        assert!(objects.is_empty());
    }

    #[test]
    fn test_fetch_corrupt_graph_sideband_error() {
        let (_dir, repo) = test_repo();

        // map a commit whose tree was never written
        let dangling = Hash::from_bytes([0x31; 32]);
        let commit = crate::types::Commit::new(dangling, vec![], "a <a@x>", 1, "+0000", "m");
        let native = crate::object::write_commit(&repo, &commit).unwrap();
        let git_hash = GitHash::from_bytes([0x32; 20]);
        mapping::set(&repo, &MapEntry::new(git_hash, native, Kind::Commit)).unwrap();

        let cancel = CancelToken::new();
        let ctx = HandlerContext::new(&NoopExtractor, &cancel);
        let response = upload_pack(&repo, &ctx, &fetch_body(&git_hash, true));
        assert_eq!(response.status, 422);
        assert_eq!(response.content_type, CT_UPLOAD_PACK_RESULT);

        let mut reader = PktReader::new(&response.body);
        match reader.next_packet().unwrap() {
            Some(Packet::Data(payload)) => {
                assert_eq!(payload[0], pktline::BAND_ERROR);
                let msg = String::from_utf8_lossy(&payload[1..]);
                assert!(msg.contains("invalid object graph"));
            }
            other => panic!("expected sideband error, got {:?}", other),
        }
        assert_eq!(reader.next_packet().unwrap(), Some(Packet::Flush));
    }

    #[test]
    fn test_fetch_unknown_want_err_without_sideband() {
        let (_dir, repo) = test_repo();

        let unknown = GitHash::from_bytes([0x44; 20]);
        let cancel = CancelToken::new();
        let ctx = HandlerContext::new(&NoopExtractor, &cancel);
        let response = upload_pack(&repo, &ctx, &fetch_body(&unknown, false));
        assert_eq!(response.status, 422);

        let mut reader = PktReader::new(&response.body);
        match reader.next_packet().unwrap() {
            Some(Packet::Data(payload)) => {
                assert!(payload.starts_with(b"ERR "));
            }
            other => panic!("expected ERR pktline, got {:?}", other),
        }
    }

    #[test]
    fn test_fetch_negotiation_cap() {
        let (_dir, repo) = test_repo();
        let cancel = CancelToken::new();
        let ctx = HandlerContext::new(&NoopExtractor, &cancel);

        let body = vec![0u8; repo.limits().git_fetch_bytes + 1];
        assert_eq!(upload_pack(&repo, &ctx, &body).status, 413);
    }
}
