//! Read pump — forwards decoded host messages into the channel.

use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use hostlink_protocol::{CodecError, DecodedFrame, Message};

/// Reads messages from the host and forwards them to `inbound`.
///
/// A frame whose body is not a valid message is logged and skipped.
/// Exits on cancellation, end of stream, or an I/O or size error, and then
/// cancels the channel so the writer and the host process go down with it.
/// Dropping `inbound` is what signals the close to the client.
pub(crate) async fn read_pump<S>(
    mut read: S,
    inbound: mpsc::Sender<Message>,
    cancel: CancellationToken,
) where
    S: StreamExt<Item = Result<DecodedFrame, CodecError>> + Unpin,
{
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            frame = read.next() => {
                match frame {
                    Some(Ok(Ok(msg))) => {
                        trace!(id = ?msg.id, msg_type = ?msg.msg_type, "received message");
                        if inbound.send(msg).await.is_err() {
                            debug!("inbound receiver dropped");
                            break;
                        }
                    }
                    Some(Ok(Err(e))) | Some(Err(CodecError::Json(e))) => {
                        warn!(error = %e, "skipping malformed message from native host");
                    }
                    Some(Err(e)) => {
                        warn!(error = %e, "failed to read from native host");
                        break;
                    }
                    None => {
                        debug!("native host output ended");
                        break;
                    }
                }
            }
        }
    }

    cancel.cancel();
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::{BufMut, BytesMut};
    use futures_util::stream;
    use hostlink_protocol::{MessageType, NativeMessageCodec};
    use tokio_util::codec::FramedRead;

    fn frame(buf: &mut BytesMut, json: &str) {
        buf.put_slice(&(json.len() as u32).to_ne_bytes());
        buf.put_slice(json.as_bytes());
    }

    #[tokio::test]
    async fn forwards_messages_then_closes() {
        let (tx, mut rx) = mpsc::channel(16);
        let cancel = CancellationToken::new();
        let frames = stream::iter(vec![
            Ok(Ok(Message::new(MessageType::Progress))),
            Ok(Ok(Message::response("r1"))),
        ]);

        read_pump(frames, tx, cancel.clone()).await;

        assert!(rx.recv().await.unwrap().is_type(&MessageType::Progress));
        assert_eq!(rx.recv().await.unwrap().id.as_deref(), Some("r1"));
        assert!(rx.recv().await.is_none());
        assert!(cancel.is_cancelled());
    }

    #[tokio::test]
    async fn malformed_frame_is_skipped() {
        let mut bytes = BytesMut::new();
        frame(&mut bytes, r#"{"id":42,"result":"ok"}"#);
        frame(&mut bytes, "[1,2,3]");
        frame(&mut bytes, r#"{"type":"progress","downloadId":"d1","progress":1}"#);
        let bytes = bytes.freeze();

        let (tx, mut rx) = mpsc::channel(16);
        let cancel = CancellationToken::new();
        let framed = FramedRead::new(&bytes[..], NativeMessageCodec::new());

        read_pump(framed, tx, cancel.clone()).await;

        let msg = rx.recv().await.unwrap();
        assert!(msg.is_type(&MessageType::Progress));
        assert_eq!(msg.field("downloadId").unwrap(), "d1");
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn stops_on_oversized_frame() {
        let (tx, mut rx) = mpsc::channel(16);
        let cancel = CancellationToken::new();
        let frames = stream::iter(vec![
            Err(CodecError::TooLarge { size: 10, max: 1 }),
            Ok(Ok(Message::response("never"))),
        ]);

        read_pump(frames, tx, cancel.clone()).await;
        assert!(rx.recv().await.is_none());
        assert!(cancel.is_cancelled());
    }

    #[tokio::test]
    async fn stops_on_cancel() {
        let (tx, _rx) = mpsc::channel(16);
        let cancel = CancellationToken::new();
        let frames = stream::pending::<Result<DecodedFrame, CodecError>>();

        let c = cancel.clone();
        let handle = tokio::spawn(async move {
            read_pump(frames, tx, c).await;
        });

        cancel.cancel();
        tokio::time::timeout(std::time::Duration::from_secs(2), handle)
            .await
            .expect("should stop")
            .expect("no panic");
    }
}
