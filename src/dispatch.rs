use crate::{
    body::{self, Payload},
    collect::collect,
    headers,
    request::Body,
    response::{self, BodyReader, Content, Response},
    transport::Agent,
    uri::Target,
    Error, Method, Request,
};
use log::{debug, trace};
use std::{collections::HashMap, fmt, io};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};

const PIPE_BUFFER: usize = 16 * 1024;

/// The outbound request of a single hop, fully resolved.
///
/// The redirect controller reads the target back from here to resolve relative `Location`s.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Context {
    pub(crate) target: Target,
    pub(crate) method: Method,
    pub(crate) headers: HashMap<String, String>,
}

impl Context {
    /// Fill in the headers every request carries unless the caller already set them.
    fn new(target: Target, method: Method, mut headers: HashMap<String, String>) -> Self {
        headers
            .entry("host".to_string())
            .or_insert_with(|| target.authority());
        headers
            .entry("connection".to_string())
            .or_insert_with(|| "close".to_string());
        Self {
            target,
            method,
            headers,
        }
    }

    fn is_chunked(&self) -> bool {
        self.headers
            .get("transfer-encoding")
            .is_some_and(|te| te.to_ascii_lowercase().contains("chunked"))
    }
}

impl fmt::Display for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut headers = self.headers.iter().collect::<Vec<_>>();
        headers.sort();
        let headers = headers
            .into_iter()
            .map(|(k, v)| format!("{k}: {v}"))
            .collect::<Vec<_>>()
            .join("\r\n");

        // format: Method Request-URI HTTP-Version CRLF headers CRLF CRLF
        write!(f, "{} {} HTTP/1.1\r\n{headers}\r\n\r\n", self.method, self.target.path)
    }
}

/// What came back from one hop.
#[derive(Debug)]
pub(crate) struct Exchange {
    pub(crate) response: Response,
    /// `None` for HEAD.
    pub(crate) content: Option<Content>,
}

/// Perform exactly one request/response round trip for the current URL of `request`.
///
/// Everything that can fail without the network (URL, headers, body file) fails before a
/// connection is opened. A HEAD request drops the connection as soon as the response head is in.
pub(crate) async fn send(request: &mut Request) -> Result<(Context, Exchange), Error> {
    let target = Target::parse(&request.url)?;
    let method = request.method;
    let encoding = request.encoding;
    let agent = request.agent.clone();
    let file = request.file.clone();
    let body = if method.can_send_body() && file.is_none() {
        body_for_hop(&mut request.body)
    } else {
        None
    };

    let mut headers = headers::normalize(&request.headers);
    headers::validate(&headers)?;
    let payload = body::resolve(method, &mut headers, body, file.as_deref()).await?;
    if matches!(payload, Payload::File(_) | Payload::Stream(_)) && !headers.contains_key("content-length") {
        headers
            .entry("transfer-encoding".to_string())
            .or_insert_with(|| "chunked".to_string());
    }
    let context = Context::new(target, method, headers);
    debug!("{method} {}", context.target);
    trace!("request head: {:?}", context.headers);

    let agent = match &agent {
        Some(agent) => agent,
        None => Agent::shared(),
    };
    let mut stream = agent.connect(&context.target).await?;

    // send the message
    stream.write_all(context.to_string().as_bytes()).await?;
    let chunked = context.is_chunked();
    match payload {
        Payload::Empty => {}
        Payload::Bytes(bytes) => write_body(&mut stream, &bytes, chunked).await?,
        Payload::File(mut file) => {
            pipe(&mut file, &mut stream, chunked).await?;
        }
        Payload::Stream(mut reader) => {
            pipe(&mut reader, &mut stream, chunked).await?;
        }
    }
    if chunked {
        stream.write_all(b"0\r\n\r\n").await?;
    }
    stream.flush().await?;

    // receive the response
    let mut reader = BufReader::new(stream);
    let response = response::read_head(&mut reader).await?;
    debug!("{} {} from {}", response.status, response.reason, context.target);

    if method == Method::HEAD {
        // no body is awaited: tear the connection down right away
        drop(reader);
        return Ok((context, Exchange { response, content: None }));
    }

    let mut body = BodyReader::new(reader, response.framing(method)?);
    let content = collect(&mut body, encoding).await?;
    Ok((
        context,
        Exchange {
            response,
            content: Some(content),
        },
    ))
}

/// The body to send on this hop. In-memory bodies stay in place for later hops, a stream is
/// handed over once.
fn body_for_hop(slot: &mut Option<Body>) -> Option<Body> {
    match slot {
        Some(Body::Bytes(bytes)) => Some(Body::Bytes(bytes.clone())),
        Some(Body::Text(text)) => Some(Body::Text(text.clone())),
        Some(Body::Stream(_)) => slot.take(),
        None => None,
    }
}

async fn write_body<W>(writer: &mut W, data: &[u8], chunked: bool) -> Result<(), io::Error>
where
    W: AsyncWrite + Unpin,
{
    if !chunked {
        return writer.write_all(data).await;
    }
    if !data.is_empty() {
        writer.write_all(format!("{:x}\r\n", data.len()).as_bytes()).await?;
        writer.write_all(data).await?;
        writer.write_all(b"\r\n").await?;
    }
    Ok(())
}

/// Copy a body source to the connection, as chunks when the length is unknown.
async fn pipe<R, W>(reader: &mut R, writer: &mut W, chunked: bool) -> Result<u64, io::Error>
where
    R: AsyncRead + Unpin + ?Sized,
    W: AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; PIPE_BUFFER];
    let mut total = 0u64;
    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        write_body(writer, &buf[..n], chunked).await?;
        total += n as u64;
    }
    trace!("piped {total} body bytes");
    Ok(total)
}
