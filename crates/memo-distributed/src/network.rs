//! Wire protocol between cache nodes
//!
//! Every message is a JSON document preceded by its length as a big-endian
//! `u32`. A connection starts with a challenge from the host; the client
//! answers with `SHA-256(nonce || secret)` and is either accepted or
//! rejected. After that the client sends one [`Request`] at a time and
//! waits for the matching [`Response`].

use crate::error::{DistributedError, Result};
use crate::types::NodeId;
use memo_core::SubCache;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::io::{Read, Write};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Operations on the shared map
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Request {
    /// Snapshot of one sub-cache
    Get { key: String },
    /// Replace one sub-cache
    Set { key: String, value: SubCache },
    /// Drop one sub-cache
    Delete { key: String },
    /// Membership test
    Contains { key: String },
    /// Render the whole map
    Stringify,
}

impl Request {
    pub fn name(&self) -> &'static str {
        match self {
            Request::Get { .. } => "get",
            Request::Set { .. } => "set",
            Request::Delete { .. } => "delete",
            Request::Contains { .. } => "contains",
            Request::Stringify => "stringify",
        }
    }

    pub fn key(&self) -> Option<&str> {
        match self {
            Request::Get { key }
            | Request::Set { key, .. }
            | Request::Delete { key }
            | Request::Contains { key } => Some(key),
            Request::Stringify => None,
        }
    }
}

/// Host replies, one per request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Response {
    Entry(Option<SubCache>),
    Stored,
    Deleted,
    NotFound { key: String },
    Contains(bool),
    Text(String),
    Failed { reason: String },
}

/// Messages from host to client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum HostMessage {
    /// First frame on every connection
    Challenge { nonce: String },
    /// Handshake succeeded
    Accepted { host_id: NodeId },
    /// Handshake failed; the host closes the connection
    Rejected { reason: String },
    Response(Response),
}

/// Messages from client to host. `R` is borrowed when sending.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ClientMessage<R = Request> {
    Authenticate { node_id: NodeId, digest: String },
    Request(R),
}

/// Handshake digest: hex `SHA-256(nonce || secret)`
pub fn auth_digest(nonce: &str, secret: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(nonce.as_bytes());
    hasher.update(secret.as_bytes());
    hasher
        .finalize()
        .iter()
        .map(|byte| format!("{:02x}", byte))
        .collect()
}

fn encode<T: Serialize>(message: &T) -> Result<(u32, Vec<u8>)> {
    let body = serde_json::to_vec(message)?;
    let len = u32::try_from(body.len()).map_err(|_| DistributedError::FrameTooLarge(body.len()))?;
    Ok((len, body))
}

fn check_len(len: u32, max_frame_bytes: usize) -> Result<usize> {
    let len = len as usize;
    if len > max_frame_bytes {
        return Err(DistributedError::FrameTooLarge(len));
    }
    Ok(len)
}

/// Write one frame to a blocking stream
pub fn write_frame<W: Write, T: Serialize>(writer: &mut W, message: &T) -> Result<()> {
    let (len, body) = encode(message)?;
    writer.write_all(&len.to_be_bytes())?;
    writer.write_all(&body)?;
    writer.flush()?;
    Ok(())
}

/// Read one frame from a blocking stream
pub fn read_frame<R: Read, T: DeserializeOwned>(
    reader: &mut R,
    max_frame_bytes: usize,
) -> Result<T> {
    let mut prefix = [0u8; 4];
    reader.read_exact(&mut prefix)?;
    let len = check_len(u32::from_be_bytes(prefix), max_frame_bytes)?;

    let mut body = vec![0u8; len];
    reader.read_exact(&mut body)?;
    Ok(serde_json::from_slice(&body)?)
}

/// Write one frame to an async stream
pub async fn write_frame_async<W, T>(writer: &mut W, message: &T) -> Result<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let (len, body) = encode(message)?;
    writer.write_all(&len.to_be_bytes()).await?;
    writer.write_all(&body).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one frame from an async stream
pub async fn read_frame_async<R, T>(reader: &mut R, max_frame_bytes: usize) -> Result<T>
where
    R: AsyncRead + Unpin,
    T: DeserializeOwned,
{
    let len = check_len(reader.read_u32().await?, max_frame_bytes)?;

    let mut body = vec![0u8; len];
    reader.read_exact(&mut body).await?;
    Ok(serde_json::from_slice(&body)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use memo_core::CallKey;
    use serde_json::json;
    use std::io::Cursor;

    fn sub_cache() -> SubCache {
        let mut sub = SubCache::new();
        sub.insert(CallKey::from_raw("[5]"), json!(7));
        sub
    }

    #[test]
    fn test_digest_depends_on_both_inputs() {
        let digest = auth_digest("nonce", "secret");
        assert_eq!(digest.len(), 64);
        assert!(digest.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(digest, auth_digest("nonce", "secret"));
        assert_ne!(digest, auth_digest("nonce", "other"));
        assert_ne!(digest, auth_digest("other", "secret"));
    }

    #[test]
    fn test_digest_known_value() {
        // sha256("abc")
        assert_eq!(
            auth_digest("ab", "c"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_frame_layout() {
        let mut buffer = Vec::new();
        write_frame(&mut buffer, &Request::Stringify).unwrap();

        let body = serde_json::to_vec(&Request::Stringify).unwrap();
        assert_eq!(&buffer[..4], &(body.len() as u32).to_be_bytes());
        assert_eq!(&buffer[4..], &body[..]);
    }

    #[test]
    fn test_borrowed_request_reads_as_owned() {
        let request = Request::Set {
            key: "pkg::add_two".into(),
            value: sub_cache(),
        };
        let mut buffer = Vec::new();
        write_frame(&mut buffer, &ClientMessage::Request(&request)).unwrap();

        let decoded: ClientMessage = read_frame(&mut Cursor::new(buffer), 1024).unwrap();
        match decoded {
            ClientMessage::Request(decoded) => assert_eq!(decoded, request),
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[test]
    fn test_oversized_frame_rejected() {
        let mut buffer = Vec::new();
        write_frame(&mut buffer, &Response::Entry(Some(sub_cache()))).unwrap();

        let result: Result<Response> = read_frame(&mut Cursor::new(buffer), 4);
        assert!(matches!(result, Err(DistributedError::FrameTooLarge(_))));
    }

    #[test]
    fn test_truncated_frame_is_host_lost() {
        let mut buffer = Vec::new();
        write_frame(&mut buffer, &Response::Stored).unwrap();
        buffer.truncate(buffer.len() - 1);

        let err = read_frame::<_, Response>(&mut Cursor::new(buffer), 1024).unwrap_err();
        assert!(err.is_host_lost());
    }

    #[tokio::test]
    async fn test_async_frames_match_blocking() {
        let mut buffer = Vec::new();
        write_frame_async(&mut buffer, &Response::Contains(true))
            .await
            .unwrap();

        let blocking: Response = read_frame(&mut Cursor::new(buffer.clone()), 1024).unwrap();
        assert_eq!(blocking, Response::Contains(true));

        let mut reader = &buffer[..];
        let decoded: Response = read_frame_async(&mut reader, 1024).await.unwrap();
        assert_eq!(decoded, Response::Contains(true));
    }

    #[test]
    fn test_request_accessors() {
        assert_eq!(Request::Get { key: "f".into() }.key(), Some("f"));
        assert_eq!(Request::Stringify.key(), None);
        assert_eq!(Request::Delete { key: "f".into() }.name(), "delete");
    }
}
