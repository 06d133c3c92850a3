use crate::{
    response::{BodyReader, Content},
    Encoding, Error,
};
use log::trace;
use tokio::io::AsyncBufRead;

/// Drain a response body and build its [`Content`] for the requested encoding.
///
/// UTF-8 bodies are decoded once the whole body is in, so multi-byte sequences split across
/// chunks survive. On error nothing collected so far is returned.
pub(crate) async fn collect<R>(body: &mut BodyReader<R>, encoding: Encoding) -> Result<Content, Error>
where
    R: AsyncBufRead + Unpin,
{
    let mut buffer = Vec::new();
    let mut chunks = 0usize;
    while let Some(chunk) = body.chunk().await? {
        buffer.extend_from_slice(&chunk);
        chunks += 1;
    }
    trace!("collected {} bytes in {chunks} chunks as {encoding:?}", buffer.len());

    Ok(match encoding {
        Encoding::Utf8 => Content::Text(match String::from_utf8(buffer) {
            Ok(text) => text,
            Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
        }),
        Encoding::Binary => Content::Binary(buffer),
    })
}
