use std::fmt::{self, Display};

use bytes::Bytes;
use futures_util::StreamExt;
use futures_util::stream::BoxStream;
use reqwest::Response;

/// The byte stream broke before it was finished.
#[derive(Debug, PartialEq, Eq)]
pub struct Error(pub String);

impl Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "stream interrupted: {}", self.0)
    }
}

/// A stream of raw body chunks.
pub struct Chunks {
    inner: BoxStream<'static, Result<Bytes, Error>>,
}

impl Chunks {
    pub fn from_response(response: Response) -> Self {
        let inner = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(|err| Error(err.to_string())))
            .boxed();
        Self { inner }
    }

    #[cfg(test)]
    pub fn from_vec(chunks: Vec<Bytes>) -> Self {
        let inner = futures_util::stream::iter(chunks.into_iter().map(Ok)).boxed();
        Self { inner }
    }

    #[inline]
    pub async fn next_chunk(&mut self) -> Result<Option<Bytes>, Error> {
        self.inner.next().await.transpose()
    }
}
