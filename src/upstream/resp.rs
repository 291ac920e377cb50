//! RESP2 wire codec.
//!
//! Requests are always arrays of bulk strings. Replies are decoded
//! incrementally: a frame is only consumed from the buffer once it is complete.

use bytes::Buf;
use bytes::BufMut;
use bytes::BytesMut;
use tokio_util::codec::Decoder;
use tokio_util::codec::Encoder;

use crate::UpstreamError;

/// Largest bulk string the server may send (protocol limit)
const MAX_BULK_LEN: usize = 512 * 1024 * 1024;

/// Decoded server reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Status(String),
    Error(String),
    Integer(i64),
    Bulk(Vec<u8>),
    /// Null bulk string or null array
    Nil,
    Array(Vec<Reply>),
}

impl Reply {
    /// Text of a status or bulk reply
    pub fn into_string(self) -> Option<String> {
        match self {
            Reply::Status(s) => Some(s),
            Reply::Bulk(b) => Some(String::from_utf8_lossy(&b).into_owned()),
            _ => None,
        }
    }

    /// Flattens a frame into its raw elements.
    ///
    /// Arrays yield one element per item, bulk payloads untouched; any other
    /// frame yields a single element so callers can still inspect and reject it.
    pub fn into_parts(self) -> Vec<Vec<u8>> {
        match self {
            Reply::Array(items) => items.into_iter().map(Reply::into_bytes).collect(),
            other => vec![other.into_bytes()],
        }
    }

    fn into_bytes(self) -> Vec<u8> {
        match self {
            Reply::Status(s) | Reply::Error(s) => s.into_bytes(),
            Reply::Integer(i) => i.to_string().into_bytes(),
            Reply::Bulk(b) => b,
            Reply::Nil => Vec::new(),
            Reply::Array(items) => format!("{:?}", items).into_bytes(),
        }
    }
}

/// A command as a list of arguments, name first
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    args: Vec<Vec<u8>>,
}

impl Command {
    pub fn new(name: &str) -> Self {
        Self {
            args: vec![name.as_bytes().to_vec()],
        }
    }

    pub fn arg(
        mut self,
        arg: impl AsRef<[u8]>,
    ) -> Self {
        self.args.push(arg.as_ref().to_vec());
        self
    }

    pub fn args<I, A>(
        mut self,
        args: I,
    ) -> Self
    where
        I: IntoIterator<Item = A>,
        A: AsRef<[u8]>,
    {
        self.args.extend(args.into_iter().map(|a| a.as_ref().to_vec()));
        self
    }

    pub fn name(&self) -> String {
        String::from_utf8_lossy(&self.args[0]).to_uppercase()
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct RespCodec;

impl Encoder<Command> for RespCodec {
    type Error = UpstreamError;

    fn encode(
        &mut self,
        item: Command,
        dst: &mut BytesMut,
    ) -> Result<(), Self::Error> {
        dst.put_slice(format!("*{}\r\n", item.args.len()).as_bytes());
        for arg in item.args {
            dst.put_slice(format!("${}\r\n", arg.len()).as_bytes());
            dst.put_slice(&arg);
            dst.put_slice(b"\r\n");
        }
        Ok(())
    }
}

impl Decoder for RespCodec {
    type Item = Reply;
    type Error = UpstreamError;

    fn decode(
        &mut self,
        src: &mut BytesMut,
    ) -> Result<Option<Self::Item>, Self::Error> {
        match parse(src, 0)? {
            Some((reply, consumed)) => {
                src.advance(consumed);
                Ok(Some(reply))
            }
            None => Ok(None),
        }
    }
}

/// Parses one frame starting at `pos`; returns the frame and the position after it.
fn parse(
    buf: &[u8],
    pos: usize,
) -> Result<Option<(Reply, usize)>, UpstreamError> {
    let Some((line, next)) = read_line(buf, pos) else {
        return Ok(None);
    };
    if line.is_empty() {
        return Err(UpstreamError::Protocol("empty frame header".into()));
    }

    let body = &line[1..];
    match line[0] {
        b'+' => Ok(Some((Reply::Status(lossy(body)), next))),
        b'-' => Ok(Some((Reply::Error(lossy(body)), next))),
        b':' => Ok(Some((Reply::Integer(parse_int(body)?), next))),
        b'$' => {
            let len = parse_int(body)?;
            if len < 0 {
                return Ok(Some((Reply::Nil, next)));
            }
            let len = len as usize;
            if len > MAX_BULK_LEN {
                return Err(UpstreamError::Protocol(format!("bulk length {} too large", len)));
            }
            if buf.len() < next + len + 2 {
                return Ok(None);
            }
            if &buf[next + len..next + len + 2] != b"\r\n" {
                return Err(UpstreamError::Protocol("bulk string not terminated by CRLF".into()));
            }
            Ok(Some((Reply::Bulk(buf[next..next + len].to_vec()), next + len + 2)))
        }
        b'*' => {
            let count = parse_int(body)?;
            if count < 0 {
                return Ok(Some((Reply::Nil, next)));
            }
            let mut items = Vec::with_capacity((count as usize).min(1024));
            let mut cursor = next;
            for _ in 0..count {
                match parse(buf, cursor)? {
                    Some((item, after)) => {
                        items.push(item);
                        cursor = after;
                    }
                    None => return Ok(None),
                }
            }
            Ok(Some((Reply::Array(items), cursor)))
        }
        other => Err(UpstreamError::Protocol(format!(
            "unexpected frame prefix {:?}",
            other as char
        ))),
    }
}

fn read_line(
    buf: &[u8],
    pos: usize,
) -> Option<(&[u8], usize)> {
    let rest = buf.get(pos..)?;
    let end = rest.windows(2).position(|w| w == b"\r\n")?;
    Some((&rest[..end], pos + end + 2))
}

fn parse_int(body: &[u8]) -> Result<i64, UpstreamError> {
    std::str::from_utf8(body)
        .ok()
        .and_then(|s| s.parse::<i64>().ok())
        .ok_or_else(|| UpstreamError::Protocol(format!("invalid integer {:?}", lossy(body))))
}

fn lossy(b: &[u8]) -> String {
    String::from_utf8_lossy(b).into_owned()
}
