use anyhow::{bail, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Launch requests are small; anything past this is a broken peer.
const MAX_FRAME_SIZE: u32 = 1024 * 1024;

/// Write one length-prefixed frame.
pub async fn write_frame<S>(stream: &mut S, data: &[u8]) -> std::io::Result<()>
where
    S: AsyncWrite + Unpin,
{
    let len = data.len() as u32;
    stream.write_all(&len.to_be_bytes()).await?;
    stream.write_all(data).await?;
    stream.flush().await?;
    Ok(())
}

/// Read one length-prefixed frame. `Ok(None)` on clean EOF.
pub async fn read_frame<S>(stream: &mut S) -> std::io::Result<Option<Vec<u8>>>
where
    S: AsyncRead + Unpin,
{
    let mut len_buf = [0u8; 4];
    match stream.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e),
    }
    let len = u32::from_be_bytes(len_buf);
    if len > MAX_FRAME_SIZE {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("frame too large: {} bytes", len),
        ));
    }
    let mut buf = vec![0u8; len as usize];
    stream.read_exact(&mut buf).await?;
    Ok(Some(buf))
}

/// Serialize as JSON and send as one frame.
pub async fn send<S, T>(stream: &mut S, msg: &T) -> Result<()>
where
    S: AsyncWrite + Unpin,
    T: Serialize,
{
    let json = serde_json::to_vec(msg)?;
    write_frame(stream, &json).await?;
    Ok(())
}

/// Receive and deserialize one frame. `Ok(None)` on clean EOF.
pub async fn recv<S, T>(stream: &mut S) -> Result<Option<T>>
where
    S: AsyncRead + Unpin,
    T: DeserializeOwned,
{
    match read_frame(stream).await? {
        Some(data) => Ok(Some(serde_json::from_slice(&data)?)),
        None => Ok(None),
    }
}

/// Like `recv`, but EOF is an error.
pub async fn recv_required<S, T>(stream: &mut S) -> Result<T>
where
    S: AsyncRead + Unpin,
    T: DeserializeOwned,
{
    match recv(stream).await? {
        Some(msg) => Ok(msg),
        None => bail!("connection closed unexpectedly"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::UnixStream;

    #[tokio::test]
    async fn frame_roundtrip() {
        let (mut a, mut b) = UnixStream::pair().unwrap();
        write_frame(&mut a, b"launch").await.unwrap();
        let got = read_frame(&mut b).await.unwrap().unwrap();
        assert_eq!(got, b"launch");
    }

    #[tokio::test]
    async fn eof_is_none() {
        let (a, mut b) = UnixStream::pair().unwrap();
        drop(a);
        assert!(read_frame(&mut b).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn recv_required_errors_on_eof() {
        let (a, mut b) = UnixStream::pair().unwrap();
        drop(a);
        let got: Result<String> = recv_required(&mut b).await;
        assert!(got.is_err());
    }

    #[tokio::test]
    async fn oversized_frame_is_rejected() {
        let (mut a, mut b) = UnixStream::pair().unwrap();
        let len = (MAX_FRAME_SIZE + 1).to_be_bytes();
        a.write_all(&len).await.unwrap();
        assert!(read_frame(&mut b).await.is_err());
    }

    #[tokio::test]
    async fn json_roundtrip_through_frames() {
        use crate::server::protocol::{Reply, Request};

        let (mut a, mut b) = UnixStream::pair().unwrap();
        send(&mut a, &Request::Identify).await.unwrap();
        let got: Request = recv_required(&mut b).await.unwrap();
        assert!(matches!(got, Request::Identify));

        let reply = Reply::Identity {
            uid: 1000,
            display: ":0".to_string(),
        };
        send(&mut b, &reply).await.unwrap();
        let got: Reply = recv_required(&mut a).await.unwrap();
        assert_eq!(got, reply);
    }
}
