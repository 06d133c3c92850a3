use crate::{request::Body, Error, Method};
use log::trace;
use std::{collections::HashMap, io, path::Path};
use tokio::{fs, io::AsyncRead};

/// Where the bytes of a request body come from once resolved.
pub(crate) enum Payload {
    Empty,
    Bytes(Vec<u8>),
    File(fs::File),
    Stream(Box<dyn AsyncRead + Send + Unpin>),
}

/// Work out the body length and source of a request.
///
/// A length that is determined is written into `headers` as `content-length`. An explicit
/// `content-length` header is trusted as is, and a caller's `transfer-encoding` stops any length
/// from being added. Methods that cannot carry a body always get a length of zero and no payload.
pub(crate) async fn resolve(
    method: Method,
    headers: &mut HashMap<String, String>,
    body: Option<Body>,
    file: Option<&Path>,
) -> Result<Payload, Error> {
    if !method.can_send_body() {
        headers.remove("transfer-encoding");
        headers.insert("content-length".to_string(), "0".to_string());
        return Ok(Payload::Empty);
    }

    let explicit = headers.contains_key("content-length") || headers.contains_key("transfer-encoding");
    let (length, payload) = match (file, body) {
        (Some(path), _) => {
            let failed = |source: io::Error| Error::Filesystem {
                path: path.to_path_buf(),
                source,
            };
            let length = if explicit {
                None
            } else {
                let metadata = fs::metadata(path).await.map_err(failed)?;
                if !metadata.is_file() {
                    return Err(failed(io::Error::new(
                        io::ErrorKind::InvalidInput,
                        "not a regular file",
                    )));
                }
                Some(metadata.len())
            };
            let file = fs::File::open(path).await.map_err(failed)?;
            trace!("body from file {} ({length:?} bytes)", path.display());
            (length, Payload::File(file))
        }
        (None, Some(Body::Bytes(bytes))) => (Some(bytes.len() as u64), Payload::Bytes(bytes)),
        (None, Some(Body::Text(text))) => (Some(text.len() as u64), Payload::Bytes(text.into_bytes())),
        (None, Some(Body::Stream(stream))) => (None, Payload::Stream(stream)),
        (None, None) => (None, Payload::Empty),
    };

    if let (false, Some(length)) = (explicit, length) {
        headers.insert("content-length".to_string(), length.to_string());
    }

    Ok(payload)
}
