//! One report exchange with a tracker

use anyhow::{anyhow, bail, Context, Result};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::timeout;
use tracing::{info, warn};
use tracker_shared::{Report, RequestDecoder};

const ACCEPTED: &[u8] = b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\nConnection: close\r\n\r\nOK";
const REJECTED: &[u8] =
    b"HTTP/1.1 400 Bad Request\r\nContent-Length: 0\r\nConnection: close\r\n\r\n";

/// Read one POST, log the report it carries, answer and close
///
/// A client that does not deliver a complete request within `read_timeout`
/// is rejected. Returns the path and the decoded report.
pub async fn handle_connection<S>(
    mut stream: S,
    peer: &str,
    read_timeout: Duration,
) -> Result<(String, Report)>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let outcome = match timeout(read_timeout, read_report(&mut stream)).await {
        Ok(outcome) => outcome,
        Err(_) => Err(anyhow!("no complete request within {:?}", read_timeout)),
    };

    match &outcome {
        Ok((path, Report::Location { identity, fix })) => info!(
            "[{}] {} LOCATION device={} user={} lat={:.6} lng={:.6}",
            peer, path, identity.device_id, identity.user_id, fix.latitude, fix.longitude
        ),
        Ok((path, Report::Emergency { identity })) => warn!(
            "[{}] {} EMERGENCY device={} user={}",
            peer, path, identity.device_id, identity.user_id
        ),
        Err(e) => warn!("[{}] Rejected request: {:#}", peer, e),
    }

    let reply = if outcome.is_ok() { ACCEPTED } else { REJECTED };
    if let Err(e) = send_reply(&mut stream, reply).await {
        warn!("[{}] {:#}", peer, e);
        return Err(e);
    }

    outcome
}

async fn send_reply<S: AsyncWrite + Unpin>(stream: &mut S, reply: &[u8]) -> Result<()> {
    stream.write_all(reply).await.context("failed to send reply")?;
    stream.shutdown().await.context("failed to close")?;
    Ok(())
}

async fn read_report<S: AsyncRead + Unpin>(stream: &mut S) -> Result<(String, Report)> {
    let mut decoder = RequestDecoder::new();
    let mut buf = vec![0u8; 4096];

    loop {
        if let Some(request) = decoder.decode_next()? {
            let report = Report::from_request(&request)?;
            return Ok((request.path, report));
        }

        let n = stream.read(&mut buf).await.context("read failed")?;
        if n == 0 {
            bail!(
                "peer closed with an incomplete request ({} bytes buffered)",
                decoder.buffer_len()
            );
        }
        decoder.extend(&buf[..n]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracker_shared::{DeviceIdentity, Fix, NetworkEndpoint, ReportEncoder};

    const TIMEOUT: Duration = Duration::from_secs(30);

    fn encoder() -> ReportEncoder {
        ReportEncoder::new(
            DeviceIdentity::new("9702425019", "o2nNqGRLosentS0lipHbs3kSYwx1"),
            NetworkEndpoint {
                host: "collector.local".into(),
                port: 8080,
                routine_path: "/update_location".into(),
                emergency_path: "/emergency".into(),
            },
        )
    }

    async fn exchange(request: &[u8]) -> (Result<(String, Report)>, Vec<u8>) {
        let (mut client, server) = tokio::io::duplex(8192);
        client.write_all(request).await.unwrap();

        let outcome = handle_connection(server, "test", TIMEOUT).await;

        let mut reply = Vec::new();
        client.read_to_end(&mut reply).await.unwrap();
        (outcome, reply)
    }

    #[tokio::test]
    async fn test_accepts_location_report() {
        let report = encoder().encode_routine(&Fix::new(37.422, -122.084));

        let (outcome, reply) = exchange(&report.request).await;

        let (path, decoded) = outcome.unwrap();
        assert_eq!(path, "/update_location");
        match decoded {
            Report::Location { identity, fix } => {
                assert_eq!(identity.device_id, "9702425019");
                assert!((fix.latitude - 37.422).abs() < 1e-7);
                assert!((fix.longitude + 122.084).abs() < 1e-7);
            }
            other => panic!("unexpected report: {:?}", other),
        }
        assert!(reply.starts_with(b"HTTP/1.1 200 OK"));
    }

    #[tokio::test]
    async fn test_accepts_emergency() {
        let report = encoder().encode_emergency();

        let (outcome, reply) = exchange(&report.request).await;

        let (path, decoded) = outcome.unwrap();
        assert_eq!(path, "/emergency");
        assert!(matches!(decoded, Report::Emergency { .. }));
        assert!(reply.starts_with(b"HTTP/1.1 200 OK"));
    }

    #[tokio::test]
    async fn test_rejects_form_without_identity() {
        let body = "lat=1.000000&lng=2.000000";
        let request = format!(
            "POST /update_location HTTP/1.1\r\nHost: collector.local\r\nContent-Type: application/x-www-form-urlencoded\r\nContent-Length: {}\r\n\r\n{}",
            body.len(),
            body
        );

        let (outcome, reply) = exchange(request.as_bytes()).await;

        assert!(outcome.is_err());
        assert!(reply.starts_with(b"HTTP/1.1 400"));
    }

    #[tokio::test]
    async fn test_truncated_request_is_rejected() {
        let report = encoder().encode_emergency();
        let (mut client, server) = tokio::io::duplex(8192);
        client
            .write_all(&report.request[..report.request.len() - 5])
            .await
            .unwrap();
        client.shutdown().await.unwrap();

        let outcome = handle_connection(server, "test", TIMEOUT).await;
        assert!(outcome.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_client_times_out() {
        let (mut client, server) = tokio::io::duplex(8192);
        client.write_all(b"POST /emergency HTTP/1.1\r\n").await.unwrap();
        let start = tokio::time::Instant::now();

        let outcome = handle_connection(server, "test", TIMEOUT).await;

        assert!(outcome.is_err());
        assert!(start.elapsed() >= TIMEOUT);

        let mut reply = Vec::new();
        client.read_to_end(&mut reply).await.unwrap();
        assert!(reply.starts_with(b"HTTP/1.1 400"));
    }

    #[tokio::test]
    async fn test_reply_failure_is_reported() {
        let report = encoder().encode_emergency();
        let (mut client, server) = tokio::io::duplex(8192);
        client.write_all(&report.request).await.unwrap();
        // Peer gone before the reply
        drop(client);

        let outcome = handle_connection(server, "test", TIMEOUT).await;
        assert!(outcome.is_err());
    }
}
