#![warn(clippy::all, clippy::pedantic)]
#![deny(unsafe_code)]
#![doc = include_str!("../README.md")]

mod body;
mod collect;
mod dispatch;
mod dns;
mod error;
mod headers;
mod redirect;
mod request;
mod response;
mod transport;
mod uri;


pub use error::Error;
pub use headers::normalize as normalize_headers;
pub use request::{Body, Encoding, Method, Request};
pub use response::{Content, Outcome, Response, Termination};
pub use transport::Agent;
pub use uri::{Scheme, Target};

/// TLS types needed to build a custom [`Agent::tls_config`].
pub use tokio_rustls::rustls;

/// Send a request as configured, following redirects.
///
/// # Errors
///
/// See [`Error`].
pub async fn remote(request: impl Into<Request>) -> Result<Outcome, Error> {
    request.into().send().await
}

/// Send a HEAD request. Only the response head is received; redirects are not followed.
///
/// # Errors
///
/// See [`Error`].
pub async fn head(request: impl Into<Request>) -> Result<Outcome, Error> {
    request.into().method(Method::HEAD).send().await
}

/// Send a GET request.
///
/// # Errors
///
/// See [`Error`].
pub async fn get(request: impl Into<Request>) -> Result<Outcome, Error> {
    request.into().method(Method::GET).send().await
}

/// Send a POST request.
///
/// # Errors
///
/// See [`Error`].
pub async fn post(request: impl Into<Request>) -> Result<Outcome, Error> {
    request.into().method(Method::POST).send().await
}

/// Send a PUT request.
///
/// # Errors
///
/// See [`Error`].
pub async fn put(request: impl Into<Request>) -> Result<Outcome, Error> {
    request.into().method(Method::PUT).send().await
}

/// Send a DELETE request.
///
/// # Errors
///
/// See [`Error`].
pub async fn delete(request: impl Into<Request>) -> Result<Outcome, Error> {
    request.into().method(Method::DELETE).send().await
}

/// Download a resource: a GET whose body is kept as raw bytes.
///
/// # Errors
///
/// See [`Error`].
pub async fn down(request: impl Into<Request>) -> Result<Outcome, Error> {
    request
        .into()
        .method(Method::GET)
        .encoding(Encoding::Binary)
        .send()
        .await
}
