use crate::{Error, Method};
use once_cell::sync::Lazy;
use regex::Regex;
use std::{collections::HashMap, io};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

const MAX_HEAD: usize = 64 * 1024;
const MAX_CHUNK: usize = 16 * 1024;

/// An HTTP response, without its body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// HTTP version.
    ///
    /// Should be one of HTTP/1.0 or HTTP/1.1.
    pub version: String,
    /// Status code.
    ///
    /// 100-199: info, 200-299: success, 300-399: redir, 400-499: client error, 500-599: server error.
    pub status: u16,
    /// Message associated to the status code.
    pub reason: String,
    /// Map of headers. Names are lower-case; repeated headers are joined with `", "`.
    pub headers: HashMap<String, String>,
}

impl Response {
    /// Parse a raw response head (status line and headers) into a structured [`Response`].
    pub(crate) fn parse(head: &str) -> Result<Self, Error> {
        // HTTP-Version Status-Code [Reason-Phrase]
        static STATUS_REGEX: Lazy<Regex> = Lazy::new(|| {
            Regex::new(r"^(?P<version>HTTP/\d(?:\.\d)?) (?P<status>\d{3})(?: (?P<reason>.*))?$").unwrap()
        });

        let mut lines = head.lines();
        let status_line = lines.next().unwrap_or_default().trim_end();
        let Some(parts) = STATUS_REGEX.captures(status_line) else {
            return Err(Error::InvalidResponse("invalid status line"));
        };
        let version = parts["version"].to_string();
        let status = parts["status"]
            .parse()
            .map_err(|_| Error::InvalidResponse("invalid status code"))?;
        let reason = parts.name("reason").map_or("", |m| m.as_str()).trim().to_string();

        // parse headers
        let mut headers: HashMap<String, String> = HashMap::new();
        for line in lines.map(str::trim_end).take_while(|l| !l.is_empty()) {
            let (name, value) = line
                .split_once(':')
                .ok_or(Error::InvalidResponse("invalid header line"))?;
            let (name, value) = (name.trim().to_lowercase(), value.trim());
            headers
                .entry(name)
                .and_modify(|v| {
                    v.push_str(", ");
                    v.push_str(value);
                })
                .or_insert_with(|| value.to_string());
        }

        Ok(Response {
            version,
            status,
            reason,
            headers,
        })
    }

    /// Header value by (case-insensitive) name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_lowercase()).map(String::as_str)
    }

    /// Whether the status asks for a redirect this crate follows.
    pub fn is_redirect(&self) -> bool {
        matches!(self.status, 301 | 302)
    }

    /// How the body of this response is delimited.
    pub(crate) fn framing(&self, method: Method) -> Result<Framing, Error> {
        if method == Method::HEAD || matches!(self.status, 100..=199 | 204 | 304) {
            return Ok(Framing::Empty);
        }
        let chunked = self
            .header("transfer-encoding")
            .is_some_and(|te| te.to_ascii_lowercase().contains("chunked"));
        if chunked {
            return Ok(Framing::Chunked);
        }
        match self.header("content-length") {
            Some(length) => length
                .split(',')
                .next()
                .and_then(|l| l.trim().parse().ok())
                .map(Framing::Length)
                .ok_or(Error::InvalidResponse("invalid content-length")),
            None => Ok(Framing::Close),
        }
    }
}

/// Read the next final response head, skipping interim 1xx responses.
pub(crate) async fn read_head<R>(reader: &mut R) -> Result<Response, Error>
where
    R: AsyncBufRead + Unpin,
{
    loop {
        let mut head = Vec::new();
        loop {
            let n = reader.read_until(b'\n', &mut head).await?;
            if n == 0 {
                return Err(Error::InvalidResponse("connection closed before response head"));
            }
            if head.len() > MAX_HEAD {
                return Err(Error::InvalidResponse("response head too large"));
            }
            if head.ends_with(b"\n\n") || head.ends_with(b"\n\r\n") {
                break;
            }
            // tolerate blank lines before the status line
            if head.iter().all(u8::is_ascii_whitespace) {
                head.clear();
            }
        }

        let head = std::str::from_utf8(&head)
            .map_err(|_| Error::InvalidResponse("response head is not valid text"))?;
        let response = Response::parse(head)?;
        if (100..200).contains(&response.status) && response.status != 101 {
            continue;
        }
        return Ok(response);
    }
}

/// How a response body is delimited on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Framing {
    Empty,
    Length(u64),
    Chunked,
    Close,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BodyState {
    Remaining(u64),
    ChunkSize,
    ChunkData(u64),
    Close,
    Done,
}

/// Yields the decoded body of a response chunk by chunk.
pub(crate) struct BodyReader<R> {
    reader: R,
    state: BodyState,
}

impl<R> BodyReader<R>
where
    R: AsyncBufRead + Unpin,
{
    pub(crate) fn new(reader: R, framing: Framing) -> Self {
        let state = match framing {
            Framing::Empty | Framing::Length(0) => BodyState::Done,
            Framing::Length(n) => BodyState::Remaining(n),
            Framing::Chunked => BodyState::ChunkSize,
            Framing::Close => BodyState::Close,
        };
        Self { reader, state }
    }

    /// The next piece of body data, or `None` once the body is complete.
    pub(crate) async fn chunk(&mut self) -> Result<Option<Vec<u8>>, Error> {
        loop {
            match self.state {
                BodyState::Done => return Ok(None),
                BodyState::Remaining(remaining) => {
                    let data = self.take(remaining).await?;
                    let left = remaining - data.len() as u64;
                    self.state = if left == 0 { BodyState::Done } else { BodyState::Remaining(left) };
                    return Ok(Some(data));
                }
                BodyState::ChunkData(remaining) => {
                    let data = self.take(remaining).await?;
                    let left = remaining - data.len() as u64;
                    if left == 0 {
                        self.line().await?;
                        self.state = BodyState::ChunkSize;
                    } else {
                        self.state = BodyState::ChunkData(left);
                    }
                    return Ok(Some(data));
                }
                BodyState::ChunkSize => {
                    let line = self.line().await?;
                    let size = line.split(';').next().unwrap_or_default().trim();
                    let size = u64::from_str_radix(size, 16)
                        .map_err(|_| Error::InvalidResponse("invalid chunk size"))?;
                    if size > 0 {
                        self.state = BodyState::ChunkData(size);
                        continue;
                    }
                    // last chunk: trailers are discarded up to the blank line
                    while !self.line().await?.is_empty() {}
                    self.state = BodyState::Done;
                }
                BodyState::Close => {
                    let available = self.reader.fill_buf().await?;
                    if available.is_empty() {
                        self.state = BodyState::Done;
                        continue;
                    }
                    let data = available[..available.len().min(MAX_CHUNK)].to_vec();
                    self.reader.consume(data.len());
                    return Ok(Some(data));
                }
            }
        }
    }

    /// Up to `remaining` bytes of what is buffered; EOF here means the body was cut short.
    async fn take(&mut self, remaining: u64) -> Result<Vec<u8>, Error> {
        let available = self.reader.fill_buf().await?;
        if available.is_empty() {
            return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "connection closed mid-body").into());
        }
        let n = usize::try_from(remaining).unwrap_or(usize::MAX).min(available.len()).min(MAX_CHUNK);
        let data = available[..n].to_vec();
        self.reader.consume(n);
        Ok(data)
    }

    /// One CRLF-terminated line of chunk framing, without its terminator.
    async fn line(&mut self) -> Result<String, Error> {
        let mut line = Vec::new();
        if self.reader.read_until(b'\n', &mut line).await? == 0 {
            return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "connection closed mid-body").into());
        }
        let line = String::from_utf8(line).map_err(|_| Error::InvalidResponse("invalid chunk framing"))?;
        Ok(line.trim_end_matches(['\r', '\n']).to_string())
    }
}

/// A collected response body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Content {
    /// Body decoded as UTF-8; invalid sequences become U+FFFD.
    Text(String),
    /// Body bytes as received.
    Binary(Vec<u8>),
}

impl Content {
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Content::Text(text) => text.as_bytes(),
            Content::Binary(bytes) => bytes,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Content::Text(text) => Some(text),
            Content::Binary(_) => None,
        }
    }

    /// The body as a string with one character per byte (ISO-8859-1).
    pub fn to_latin1(&self) -> String {
        self.as_bytes().iter().copied().map(char::from).collect()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        match self {
            Content::Text(text) => text.into_bytes(),
            Content::Binary(bytes) => bytes,
        }
    }
}

/// Why the operation stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// A HEAD request: only headers were received.
    Head,
    /// A response with a collected body.
    Complete,
}

/// Final result of a request after all redirects were followed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    /// Status line and headers of the last hop.
    pub response: Response,
    /// Body of the last hop; `None` for HEAD requests.
    pub content: Option<Content>,
    /// Number of redirects followed.
    pub redirects: usize,
    /// Effective URL of the last hop.
    pub url: String,
    pub termination: Termination,
}

impl Outcome {
    pub fn headers(&self) -> &HashMap<String, String> {
        &self.response.headers
    }

    pub fn text(&self) -> Option<&str> {
        self.content.as_ref().and_then(Content::as_text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn body(raw: &[u8], framing: Framing) -> Result<Vec<u8>, Error> {
        let mut reader = BodyReader::new(raw, framing);
        let mut body = Vec::new();
        while let Some(chunk) = reader.chunk().await? {
            body.extend(chunk);
        }
        Ok(body)
    }

    #[test]
    fn https_redirect() {
        let message = "HTTP/1.1 301 Moved Permanently\r\nLocation: https://archlinux.org/\r\n\r\n";

        let response = Response::parse(message).unwrap();
        assert_eq!(response.version, "HTTP/1.1".to_string());
        assert_eq!(response.status, 301);
        assert_eq!(response.reason, "Moved Permanently");
        assert_eq!(
            response.headers,
            HashMap::from([("location".to_string(), "https://archlinux.org/".to_string())])
        );
        assert!(response.is_redirect());
        assert_eq!(response.header("Location"), Some("https://archlinux.org/"));
    }

    #[test]
    fn repeated_headers_and_missing_reason() {
        let message = "HTTP/1.0 200\nVary: accept\nvary:  origin \nX-Empty:\n\n";
        let response = Response::parse(message).unwrap();
        assert_eq!(response.reason, "");
        assert_eq!(response.headers["vary"], "accept, origin");
        assert_eq!(response.headers["x-empty"], "");
    }

    #[test]
    fn invalid_heads() {
        assert!(matches!(Response::parse("SSH-2.0-OpenSSH\r\n\r\n"), Err(Error::InvalidResponse(_))));
        assert!(matches!(
            Response::parse("HTTP/1.1 200 OK\r\nno colon here\r\n\r\n"),
            Err(Error::InvalidResponse(_))
        ));
    }

    #[test]
    fn framing() {
        let parse = |head: &str| Response::parse(head).unwrap();
        let chunked = parse("HTTP/1.1 200 OK\r\nTransfer-Encoding: gzip, Chunked\r\nContent-Length: 4\r\n\r\n");
        assert_eq!(chunked.framing(Method::GET).unwrap(), Framing::Chunked);
        assert_eq!(chunked.framing(Method::HEAD).unwrap(), Framing::Empty);

        let sized = parse("HTTP/1.1 200 OK\r\nContent-Length: 12\r\n\r\n");
        assert_eq!(sized.framing(Method::POST).unwrap(), Framing::Length(12));

        let empty = parse("HTTP/1.1 204 No Content\r\nContent-Length: 12\r\n\r\n");
        assert_eq!(empty.framing(Method::GET).unwrap(), Framing::Empty);

        let close = parse("HTTP/1.1 200 OK\r\n\r\n");
        assert_eq!(close.framing(Method::GET).unwrap(), Framing::Close);

        let broken = parse("HTTP/1.1 200 OK\r\nContent-Length: lots\r\n\r\n");
        assert!(broken.framing(Method::GET).is_err());
    }

    #[tokio::test]
    async fn head_skips_interim_responses() {
        let raw = b"HTTP/1.1 100 Continue\r\n\r\nHTTP/1.1 201 Created\r\nContent-Length: 2\r\n\r\nok";
        let mut reader = &raw[..];
        let response = read_head(&mut reader).await.unwrap();
        assert_eq!(response.status, 201);
        assert_eq!(reader, b"ok");
    }

    #[tokio::test]
    async fn head_cut_short() {
        let mut reader = &b"HTTP/1.1 200 OK\r\nContent-Le"[..];
        assert!(matches!(read_head(&mut reader).await, Err(Error::InvalidResponse(_))));
    }

    #[tokio::test]
    async fn bodies() {
        assert_eq!(body(b"hello world", Framing::Length(5)).await.unwrap(), b"hello");
        assert_eq!(body(b"hello world", Framing::Close).await.unwrap(), b"hello world");
        assert_eq!(body(b"ignored", Framing::Empty).await.unwrap(), b"");

        let chunked = b"5;ext=1\r\nhello\r\n6\r\n world\r\n0\r\nExpires: never\r\n\r\n";
        assert_eq!(body(chunked, Framing::Chunked).await.unwrap(), b"hello world");
    }

    #[tokio::test]
    async fn bodies_cut_short() {
        assert!(matches!(body(b"hel", Framing::Length(5)).await, Err(Error::Transport(_))));
        assert!(matches!(body(b"5\r\nhel", Framing::Chunked).await, Err(Error::Transport(_))));
        assert!(matches!(body(b"zz\r\n", Framing::Chunked).await, Err(Error::InvalidResponse(_))));
    }

    #[test]
    fn latin1() {
        let content = Content::Binary(vec![b'a', 0xe9, 0xff]);
        assert_eq!(content.to_latin1(), "a\u{e9}\u{ff}");
        assert_eq!(content.as_text(), None);
        assert_eq!(Content::Text("é".into()).to_latin1(), "\u{c3}\u{a9}");
    }
}
