use crate::error::{Error, Result};

/// flush packet: end of section
pub const FLUSH: &[u8] = b"0000";
/// delimiter packet: accepted on parse, never emitted by this core
pub const DELIM: &[u8] = b"0001";

/// sideband channels
pub const BAND_DATA: u8 = 1;
pub const BAND_PROGRESS: u8 = 2;
pub const BAND_ERROR: u8 = 3;

/// largest channel-1 payload per sideband packet
pub const MAX_SIDEBAND_DATA: usize = 65_519;

/// frame a payload as a packet line: four hex length digits then the bytes
pub fn encode(payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(4 + payload.len());
    out.extend_from_slice(format!("{:04x}", payload.len() + 4).as_bytes());
    out.extend_from_slice(payload);
    out
}

pub fn encode_str(payload: &str) -> Vec<u8> {
    encode(payload.as_bytes())
}

/// one parsed packet
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Packet {
    Flush,
    Delim,
    Data(Vec<u8>),
}

/// pull parser over a pktline body
pub struct PktReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> PktReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// true when the body is fully consumed
    pub fn at_end(&self) -> bool {
        self.pos >= self.data.len()
    }

    /// unread remainder of the body (the packfile after a flush)
    pub fn rest(&self) -> &'a [u8] {
        &self.data[self.pos.min(self.data.len())..]
    }

    /// read the next packet; None at end of input
    pub fn next_packet(&mut self) -> Result<Option<Packet>> {
        if self.at_end() {
            return Ok(None);
        }
        if self.pos + 4 > self.data.len() {
            return Err(Error::MalformedRequest("truncated pktline length".to_string()));
        }

        let digits = &self.data[self.pos..self.pos + 4];
        let digits = std::str::from_utf8(digits)
            .map_err(|_| Error::MalformedRequest("pktline length is not hex".to_string()))?;
        let length = usize::from_str_radix(digits, 16)
            .map_err(|_| Error::MalformedRequest(format!("pktline length {:?}", digits)))?;
        self.pos += 4;

        match length {
            0 => Ok(Some(Packet::Flush)),
            1 => Ok(Some(Packet::Delim)),
            2 | 3 => Err(Error::MalformedRequest(format!(
                "reserved pktline length {}",
                length
            ))),
            _ => {
                let payload_len = length - 4;
                if self.pos + payload_len > self.data.len() {
                    return Err(Error::MalformedRequest("truncated pktline payload".to_string()));
                }
                let payload = self.data[self.pos..self.pos + payload_len].to_vec();
                self.pos += payload_len;
                Ok(Some(Packet::Data(payload)))
            }
        }
    }

    /// read a data packet as trimmed text; flush yields None
    pub fn next_line(&mut self) -> Result<Option<String>> {
        match self.next_packet()? {
            None | Some(Packet::Flush) => Ok(None),
            Some(Packet::Delim) => self.next_line(),
            Some(Packet::Data(payload)) => {
                let text = String::from_utf8(payload)
                    .map_err(|_| Error::MalformedRequest("pktline is not utf-8".to_string()))?;
                Ok(Some(text.trim_end_matches('\n').to_string()))
            }
        }
    }
}

/// response writer that frames pack bytes per the negotiated capabilities
///
/// with sideband enabled every chunk rides a channel-tagged pktline; without
/// it pack bytes are written raw and progress is dropped.
pub struct SidebandWriter {
    out: Vec<u8>,
    enabled: bool,
}

impl SidebandWriter {
    pub fn new(enabled: bool) -> Self {
        Self {
            out: Vec::new(),
            enabled,
        }
    }

    /// append pktlines already framed by the caller (ref advertisement, NAK)
    pub fn raw(&mut self, bytes: &[u8]) {
        self.out.extend_from_slice(bytes);
    }

    /// append pack bytes on channel 1
    pub fn data(&mut self, mut chunk: &[u8]) {
        if !self.enabled {
            self.out.extend_from_slice(chunk);
            return;
        }
        while !chunk.is_empty() {
            let take = chunk.len().min(MAX_SIDEBAND_DATA);
            let mut payload = Vec::with_capacity(1 + take);
            payload.push(BAND_DATA);
            payload.extend_from_slice(&chunk[..take]);
            self.out.extend_from_slice(&encode(&payload));
            chunk = &chunk[take..];
        }
    }

    /// append a progress line on channel 2; dropped without sideband
    pub fn progress(&mut self, msg: &str) {
        if !self.enabled {
            return;
        }
        let mut payload = Vec::with_capacity(1 + msg.len() + 1);
        payload.push(BAND_PROGRESS);
        payload.extend_from_slice(msg.as_bytes());
        payload.push(b'\n');
        self.out.extend_from_slice(&encode(&payload));
    }

    /// fatal error: channel-3 pktline, or an unframed `ERR` pktline
    pub fn fatal(&mut self, msg: &str) {
        if self.enabled {
            let mut payload = Vec::with_capacity(1 + msg.len());
            payload.push(BAND_ERROR);
            payload.extend_from_slice(msg.as_bytes());
            self.out.extend_from_slice(&encode(&payload));
        } else {
            self.out
                .extend_from_slice(&encode_str(&format!("ERR {}\n", msg)));
        }
    }

    pub fn flush(&mut self) {
        self.out.extend_from_slice(FLUSH);
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode() {
        assert_eq!(encode_str("hi\n"), b"0007hi\n");
        assert_eq!(encode(b""), b"0004");
    }

    #[test]
    fn test_reader_data_and_flush() {
        let mut body = Vec::new();
        body.extend_from_slice(&encode_str("want aaaa\n"));
        body.extend_from_slice(FLUSH);

        let mut reader = PktReader::new(&body);
        assert_eq!(
            reader.next_packet().unwrap(),
            Some(Packet::Data(b"want aaaa\n".to_vec()))
        );
        assert_eq!(reader.next_packet().unwrap(), Some(Packet::Flush));
        assert_eq!(reader.next_packet().unwrap(), None);
    }

    #[test]
    fn test_reader_delim_accepted() {
        let mut body = Vec::new();
        body.extend_from_slice(DELIM);
        body.extend_from_slice(&encode_str("x"));

        let mut reader = PktReader::new(&body);
        assert_eq!(reader.next_packet().unwrap(), Some(Packet::Delim));
        // next_line skips the delimiter
        let mut reader = PktReader::new(&body);
        assert_eq!(reader.next_line().unwrap(), Some("x".to_string()));
    }

    #[test]
    fn test_reader_truncated() {
        let body = b"00";
        assert!(PktReader::new(body).next_packet().is_err());

        let body = b"000ashort";
        assert!(PktReader::new(body).next_packet().is_err());
    }

    #[test]
    fn test_reader_bad_length() {
        assert!(PktReader::new(b"zzzz").next_packet().is_err());
        assert!(PktReader::new(b"0002").next_packet().is_err());
    }

    #[test]
    fn test_next_line_trims_newline() {
        let body = encode_str("have bbbb\n");
        let mut reader = PktReader::new(&body);
        assert_eq!(reader.next_line().unwrap(), Some("have bbbb".to_string()));
    }

    #[test]
    fn test_sideband_data_framing() {
        let mut writer = SidebandWriter::new(true);
        writer.data(b"PACKDATA");
        let bytes = writer.into_bytes();

        let mut reader = PktReader::new(&bytes);
        match reader.next_packet().unwrap() {
            Some(Packet::Data(payload)) => {
                assert_eq!(payload[0], BAND_DATA);
                assert_eq!(&payload[1..], b"PACKDATA");
            }
            other => panic!("unexpected packet {:?}", other),
        }
    }

    #[test]
    fn test_sideband_chunking() {
        let big = vec![0x55u8; MAX_SIDEBAND_DATA + 10];
        let mut writer = SidebandWriter::new(true);
        writer.data(&big);
        let bytes = writer.into_bytes();

        let mut reader = PktReader::new(&bytes);
        let first = match reader.next_packet().unwrap() {
            Some(Packet::Data(p)) => p,
            other => panic!("unexpected packet {:?}", other),
        };
        assert_eq!(first.len(), 1 + MAX_SIDEBAND_DATA);
        let second = match reader.next_packet().unwrap() {
            Some(Packet::Data(p)) => p,
            other => panic!("unexpected packet {:?}", other),
        };
        assert_eq!(second.len(), 1 + 10);
    }

    #[test]
    fn test_sideband_disabled_raw_passthrough() {
        let mut writer = SidebandWriter::new(false);
        writer.data(b"PACK");
        writer.progress("ignored");
        assert_eq!(writer.into_bytes(), b"PACK");
    }

    #[test]
    fn test_fatal_with_and_without_sideband() {
        let mut with = SidebandWriter::new(true);
        with.fatal("invalid object graph: missing tree");
        with.flush();
        let bytes = with.into_bytes();
        let mut reader = PktReader::new(&bytes);
        match reader.next_packet().unwrap() {
            Some(Packet::Data(payload)) => {
                assert_eq!(payload[0], BAND_ERROR);
                assert!(payload[1..].starts_with(b"invalid object graph"));
            }
            other => panic!("unexpected packet {:?}", other),
        }
        assert_eq!(reader.next_packet().unwrap(), Some(Packet::Flush));

        let mut without = SidebandWriter::new(false);
        without.fatal("boom");
        without.flush();
        let bytes = without.into_bytes();
        let mut reader = PktReader::new(&bytes);
        match reader.next_packet().unwrap() {
            Some(Packet::Data(payload)) => assert_eq!(payload, b"ERR boom\n"),
            other => panic!("unexpected packet {:?}", other),
        }
    }
}
