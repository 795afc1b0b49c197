use crate::error::{Error, Result};
use crate::hash::GitHash;

/// a git commit as it appears on the wire
///
/// `author`/`committer` are the identity substring including `<email>`; only
/// the trailing two whitespace-delimited tokens of the header line are
/// timestamp and timezone. blank tz / zero time / empty committer mean the
/// line did not carry them.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GitCommit {
    pub tree: GitHash,
    pub parents: Vec<GitHash>,
    pub author: String,
    pub author_time: i64,
    pub author_tz: String,
    pub committer: String,
    pub committer_time: i64,
    pub committer_tz: String,
    pub message: String,
}

impl GitCommit {
    /// parse canonical commit bytes
    pub fn parse(data: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(data)
            .map_err(|_| Error::CorruptObjectMessage("commit is not utf-8".to_string()))?;

        let (headers, message) = split_headers(text)?;

        let mut tree = None;
        let mut parents = Vec::new();
        let mut author = None;
        let mut committer = None;

        for line in headers.lines() {
            if let Some(rest) = line.strip_prefix("tree ") {
                tree = Some(GitHash::from_hex(rest)?);
            } else if let Some(rest) = line.strip_prefix("parent ") {
                parents.push(GitHash::from_hex(rest)?);
            } else if let Some(rest) = line.strip_prefix("author ") {
                author = Some(parse_ident_line(rest));
            } else if let Some(rest) = line.strip_prefix("committer ") {
                committer = Some(parse_ident_line(rest));
            } else {
                // headers this model does not carry (gpgsig, encoding, …)
                // would not survive re-emission under the same address, so
                // the commit is rejected at ingest rather than corrupted
                // at fetch
                let name = line.split(' ').next().unwrap_or(line);
                return Err(Error::CorruptObjectMessage(format!(
                    "unsupported commit header {:?}",
                    name
                )));
            }
        }

        let tree = tree
            .ok_or_else(|| Error::CorruptObjectMessage("commit missing tree header".to_string()))?;
        let (author, author_time, author_tz) = author
            .ok_or_else(|| Error::CorruptObjectMessage("commit missing author header".to_string()))?;
        let (committer, committer_time, committer_tz) =
            committer.unwrap_or((String::new(), 0, String::new()));

        Ok(Self {
            tree,
            parents,
            author,
            author_time,
            author_tz,
            committer,
            committer_time,
            committer_tz,
            message: message.to_string(),
        })
    }

    /// emit canonical commit bytes, reproducing exactly what was parsed
    ///
    /// absent fields stay absent; nothing is synthesised here.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(b"tree ");
        out.extend_from_slice(self.tree.to_hex().as_bytes());
        out.push(b'\n');

        for parent in &self.parents {
            out.extend_from_slice(b"parent ");
            out.extend_from_slice(parent.to_hex().as_bytes());
            out.push(b'\n');
        }

        out.extend_from_slice(b"author ");
        emit_ident_line(&mut out, &self.author, self.author_time, &self.author_tz);

        if !self.committer.is_empty() {
            out.extend_from_slice(b"committer ");
            emit_ident_line(
                &mut out,
                &self.committer,
                self.committer_time,
                &self.committer_tz,
            );
        }

        out.push(b'\n');
        out.extend_from_slice(self.message.as_bytes());
        out
    }
}

/// split header block from message at the first blank line
fn split_headers(text: &str) -> Result<(&str, &str)> {
    match text.find("\n\n") {
        Some(pos) => Ok((&text[..pos], &text[pos + 2..])),
        None => Err(Error::CorruptObjectMessage(
            "commit missing blank line before message".to_string(),
        )),
    }
}

/// split `<ident> <unix_ts> <tz>` from the right
///
/// the identity may contain any number of spaces; a trailing `±HHMM` token is
/// the timezone and the token before it the timestamp. lines without a
/// timezone, or without a timestamp, yield blank/zero for the missing parts.
fn parse_ident_line(line: &str) -> (String, i64, String) {
    let mut rest = line;
    let mut tz = String::new();

    if let Some((head, last)) = rest.rsplit_once(' ') {
        if is_tz(last) {
            tz = last.to_string();
            rest = head;
        }
    }

    if let Some((head, last)) = rest.rsplit_once(' ') {
        if let Ok(time) = last.parse::<i64>() {
            return (head.to_string(), time, tz);
        }
    }

    (rest.to_string(), 0, tz)
}

fn emit_ident_line(out: &mut Vec<u8>, ident: &str, time: i64, tz: &str) {
    out.extend_from_slice(ident.as_bytes());
    out.push(b' ');
    out.extend_from_slice(time.to_string().as_bytes());
    if !tz.is_empty() {
        out.push(b' ');
        out.extend_from_slice(tz.as_bytes());
    }
    out.push(b'\n');
}

fn is_tz(token: &str) -> bool {
    token.len() == 5
        && (token.starts_with('+') || token.starts_with('-'))
        && token[1..].bytes().all(|b| b.is_ascii_digit())
}
