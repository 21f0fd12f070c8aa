//! HTTP long-polling transport.

use crate::error::{WsError, WsResult};
use crate::frame::{decode_payload, EnginePacket, Handshake};
use tracing::debug;

/// An open Engine.IO long-polling session.
pub(crate) struct PollingSession {
    client: reqwest::Client,
    session_url: String,
    handshake: Handshake,
}

impl PollingSession {
    /// Perform the open handshake: the first GET returns the open packet.
    pub async fn open(client: reqwest::Client, base_url: String) -> WsResult<Self> {
        let response = client.get(&base_url).send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(WsError::ConnectionFailed(format!(
                "polling handshake failed: status={status}, body={body}"
            )));
        }

        let first = decode_payload(&body)
            .into_iter()
            .next()
            .ok_or_else(|| WsError::Protocol("empty polling handshake".to_string()))?;

        let handshake = match EnginePacket::decode(first)? {
            EnginePacket::Open(handshake) => handshake,
            other => {
                return Err(WsError::Protocol(format!(
                    "expected open packet, got {other:?}"
                )))
            }
        };

        debug!(sid = %handshake.sid, "Polling session opened");
        let session_url = format!("{base_url}&sid={}", handshake.sid);

        Ok(Self {
            client,
            session_url,
            handshake,
        })
    }

    pub fn handshake(&self) -> &Handshake {
        &self.handshake
    }

    /// Long-poll for the next batch of packets.
    pub async fn poll(&self) -> WsResult<Vec<String>> {
        let response = self.client.get(&self.session_url).send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(WsError::ConnectionClosed {
                code: status.as_u16(),
                reason: body,
            });
        }

        Ok(decode_payload(&body)
            .into_iter()
            .map(str::to_string)
            .collect())
    }

    /// Send one packet.
    pub async fn send(&self, packet: &str) -> WsResult<()> {
        let response = self
            .client
            .post(&self.session_url)
            .header("content-type", "text/plain;charset=UTF-8")
            .body(packet.to_string())
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(WsError::ConnectionFailed(format!(
                "polling send failed: status={status}, body={body}"
            )));
        }
        Ok(())
    }
}
