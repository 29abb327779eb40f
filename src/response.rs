//! The fixed reply written to every connection.
//!
//! Built once at startup and only ever read afterwards. Connections keep a
//! cursor into it rather than a copy.

/// Body length used by the server binary.
pub const DEFAULT_BODY_LENGTH: usize = 18684;

/// A precomputed `HTTP/1.1 200` response whose body cycles through `a..=z`.
///
/// The only header is `Content-Length`, and it always matches the body.
///
/// # Example
/// ```
/// let response = pulse::Response::fixed(3);
/// assert_eq!(
///     response.as_bytes(),
///     b"HTTP/1.1 200 OK\r\nContent-Length: 3\r\n\r\nabc"
/// );
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    bytes: Box<[u8]>,
    body_length: usize,
}

impl Response {
    /// Builds the response for a body of `body_length` bytes.
    pub fn fixed(body_length: usize) -> Self {
        let head = format!("HTTP/1.1 200 OK\r\nContent-Length: {body_length}\r\n\r\n");

        let mut bytes = Vec::with_capacity(head.len() + body_length);
        bytes.extend_from_slice(head.as_bytes());
        bytes.extend((0..body_length).map(|index| b'a' + (index % 26) as u8));

        Self {
            bytes: bytes.into_boxed_slice(),
            body_length,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Total length in bytes, head included.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn body_length(&self) -> usize {
        self.body_length
    }

    pub fn head_length(&self) -> usize {
        self.bytes.len() - self.body_length
    }
}
