//! Newline-delimited JSON framing for channels that cross a process boundary

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::{mpsc, oneshot};

use crate::application::errors::ChannelError;

/// Encode one frame, including the trailing newline
pub fn encode<T: Serialize>(value: &T) -> Result<String, ChannelError> {
    let mut line = serde_json::to_string(value)?;
    line.push('\n');
    Ok(line)
}

pub fn decode<T: DeserializeOwned>(line: &str) -> Result<T, ChannelError> {
    Ok(serde_json::from_str(line.trim_end())?)
}

pub async fn write_frame<W, T>(writer: &mut W, value: &T) -> Result<(), ChannelError>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    writer.write_all(encode(value)?.as_bytes()).await?;
    writer.flush().await?;
    Ok(())
}

/// Drain a queue into `writer` until every producer is gone, or until `stop`
/// fires, in which case whatever is already queued is written first.
pub async fn write_frames<W, T>(
    mut rx: mpsc::UnboundedReceiver<T>,
    mut writer: W,
    stop: Option<oneshot::Receiver<()>>,
) -> Result<(), ChannelError>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let Some(mut stop) = stop else {
        while let Some(item) = rx.recv().await {
            write_frame(&mut writer, &item).await?;
        }
        return Ok(());
    };

    loop {
        tokio::select! {
            biased;
            item = rx.recv() => match item {
                Some(item) => write_frame(&mut writer, &item).await?,
                None => break,
            },
            _ = &mut stop => {
                while let Ok(item) = rx.try_recv() {
                    write_frame(&mut writer, &item).await?;
                }
                break;
            }
        }
    }
    Ok(())
}

/// Read frames from `reader` and hand each decoded value to `deliver`.
///
/// Lines that fail to decode are passed to `fallback`, which may turn them
/// into a value or drop them. Stops at end of input or when `deliver` fails.
pub async fn read_frames<R, T, D, F>(reader: R, mut deliver: D, mut fallback: F) -> Result<(), ChannelError>
where
    R: AsyncRead + Unpin,
    T: DeserializeOwned,
    D: FnMut(T) -> Result<(), ChannelError>,
    F: FnMut(&str, ChannelError) -> Option<T>,
{
    let mut lines = BufReader::new(reader).lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let item = match decode::<T>(&line) {
            Ok(item) => Some(item),
            Err(e) => fallback(&line, e),
        };
        if let Some(item) = item {
            if deliver(item).is_err() {
                break;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::channel::{ControlMessage, PointsAction};
    use crate::infrastructure::logging::{LogLevel, LogMessage};

    #[test]
    fn control_frames_are_tagged_json_lines() {
        let line = encode(&ControlMessage::Broadcast {
            text: "hello".into(),
            channel: Some("foo".into()),
        })
        .unwrap();
        assert!(line.ends_with('\n'));
        assert!(line.contains(r#""type":"broadcast""#));

        let points = ControlMessage::Points {
            action: PointsAction::Add { user: "alice".into(), amount: 50 },
        };
        let decoded: ControlMessage = decode(&encode(&points).unwrap()).unwrap();
        assert_eq!(decoded, points);
    }

    #[tokio::test]
    async fn frames_cross_a_byte_stream_in_order() {
        let (client, server) = tokio::io::duplex(64);
        let (tx, rx) = mpsc::unbounded_channel();
        for i in 0..20 {
            tx.send(LogMessage::new(LogLevel::Info, format!("line {i}"))).unwrap();
        }
        drop(tx);

        let writer = tokio::spawn(write_frames(rx, client, None));

        let mut received = Vec::new();
        read_frames(
            server,
            |msg: LogMessage| {
                received.push(msg.text);
                Ok(())
            },
            |_, _| None,
        )
        .await
        .unwrap();
        writer.await.unwrap().unwrap();

        let expected: Vec<String> = (0..20).map(|i| format!("line {i}")).collect();
        assert_eq!(received, expected);
    }

    #[tokio::test]
    async fn undecodable_lines_go_to_fallback() {
        let input: &[u8] = b"not json\n{\"level\":\"error\",\"text\":\"boom\"}\n\n";
        let mut received = Vec::new();
        read_frames(
            input,
            |msg: LogMessage| {
                received.push(msg);
                Ok(())
            },
            |line, _| Some(LogMessage::new(LogLevel::Raw, line)),
        )
        .await
        .unwrap();

        assert_eq!(
            received,
            vec![
                LogMessage::new(LogLevel::Raw, "not json"),
                LogMessage::new(LogLevel::Error, "boom"),
            ]
        );
    }

    #[tokio::test]
    async fn stop_flushes_pending_frames() {
        let (tx, rx) = mpsc::unbounded_channel();
        let (stop_tx, stop_rx) = oneshot::channel();
        tx.send(ControlMessage::Status).unwrap();
        tx.send(ControlMessage::Shutdown).unwrap();
        stop_tx.send(()).unwrap();

        let mut out = Vec::new();
        write_frames(rx, &mut out, Some(stop_rx)).await.unwrap();
        // producer still alive, the stop signal ended the loop
        drop(tx);

        let text = String::from_utf8(out).unwrap();
        assert_eq!(text.lines().count(), 2);
    }
}
