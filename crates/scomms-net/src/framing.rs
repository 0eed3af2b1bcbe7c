//! Length-delimited message framing over any byte stream.

use std::time::Duration;

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::time::timeout;
use tokio_util::codec::{Framed, LengthDelimitedCodec};

use scomms_shared::constants::{CHANNEL_BUFFER, FRAME_OVERHEAD, RPC_TIMEOUT_SECS};

use crate::error::{NetError, Result};

pub type MessageChannel<T> = Framed<T, LengthDelimitedCodec>;

pub fn codec(max_frame_len: usize) -> LengthDelimitedCodec {
    LengthDelimitedCodec::builder()
        .length_field_type::<u32>()
        .max_frame_length(max_frame_len + FRAME_OVERHEAD)
        .new_codec()
}

pub fn channel<T>(io: T, max_frame_len: usize) -> MessageChannel<T>
where
    T: AsyncRead + AsyncWrite,
{
    Framed::with_capacity(io, codec(max_frame_len), CHANNEL_BUFFER)
}

pub async fn send<T>(channel: &mut MessageChannel<T>, msg: Vec<u8>) -> Result<()>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    channel.send(Bytes::from(msg)).await?;
    Ok(())
}

pub async fn recv<T>(channel: &mut MessageChannel<T>) -> Result<Vec<u8>>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    let frame = channel.next().await.ok_or(NetError::Closed)??;
    Ok(frame.freeze().to_vec())
}

/// Receive with the initial-read deadline applied. Only the first frame of
/// a connection gets one; later phases may legitimately sit idle.
pub async fn recv_timeout<T>(channel: &mut MessageChannel<T>) -> Result<Vec<u8>>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    timeout(Duration::from_secs(RPC_TIMEOUT_SECS), recv(channel))
        .await
        .map_err(|_| NetError::Timeout)?
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn send_recv_round_trip() {
        let (a, b) = tokio::io::duplex(64 * 1024);
        let mut tx = channel(a, 1024);
        let mut rx = channel(b, 1024);

        send(&mut tx, b"frame one".to_vec()).await.unwrap();
        send(&mut tx, b"frame two".to_vec()).await.unwrap();

        assert_eq!(recv(&mut rx).await.unwrap(), b"frame one");
        assert_eq!(recv(&mut rx).await.unwrap(), b"frame two");
    }

    #[tokio::test]
    async fn closed_stream_reports_closed() {
        let (a, b) = tokio::io::duplex(1024);
        let mut rx = channel(b, 1024);
        drop(a);

        assert!(matches!(recv(&mut rx).await, Err(NetError::Closed)));
    }

    #[tokio::test]
    async fn oversized_frame_rejected_on_receive() {
        let (a, b) = tokio::io::duplex(1024 * 1024);
        // sender allows more than the receiver accepts
        let mut tx = channel(a, 512 * 1024);
        let mut rx = channel(b, 16);

        send(&mut tx, vec![0u8; 64 * 1024]).await.unwrap();
        assert!(matches!(recv(&mut rx).await, Err(NetError::Io(_))));
    }
}
