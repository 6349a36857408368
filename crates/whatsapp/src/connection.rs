//! Provider connection state and pairing endpoints.
//!
//! Consumed by the connection-management collaborator (pairing UI) and by
//! the dispatcher's advisory pre-send check.

use serde::{Deserialize, Serialize};

use crate::{Result, outbound::WhatsAppClient};

/// Provider session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Open,
    Connecting,
    Closed,
    Unknown,
}

impl ConnectionState {
    fn parse(raw: &str) -> Self {
        match raw {
            "open" => Self::Open,
            "connecting" => Self::Connecting,
            "close" | "closed" => Self::Closed,
            _ => Self::Unknown,
        }
    }
}

/// QR payload for pairing a fresh session.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QrPayload {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub base64: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ConnectionStateResponse {
    #[serde(default)]
    instance: Option<InstanceState>,
}

#[derive(Debug, Deserialize)]
struct InstanceState {
    #[serde(default)]
    state: Option<String>,
}

impl WhatsAppClient {
    /// Current session state (`open` / `connecting` / `closed`).
    pub async fn connection_state(&self) -> Result<ConnectionState> {
        let resp = self
            .get("instance/connectionState")
            .send()
            .await?
            .error_for_status()?;
        let parsed: ConnectionStateResponse = resp.json().await?;
        Ok(parsed
            .instance
            .and_then(|i| i.state)
            .map(|s| ConnectionState::parse(&s))
            .unwrap_or(ConnectionState::Unknown))
    }

    /// Fetch the pairing QR payload for a disconnected session.
    pub async fn connect_qr(&self) -> Result<QrPayload> {
        let resp = self
            .get("instance/connect")
            .send()
            .await?
            .error_for_status()?;
        Ok(resp.json().await?)
    }

    /// Tear the provider session down.
    pub async fn logout(&self) -> Result<()> {
        self.delete("instance/logout")
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod tests {
    use {super::*, std::time::Duration};

    fn client(base: &str) -> WhatsAppClient {
        WhatsAppClient::new(base, "test-key", "main", Duration::from_secs(2)).unwrap()
    }

    #[tokio::test]
    async fn parses_connection_state() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/instance/connectionState/main")
            .match_header("apikey", "test-key")
            .with_status(200)
            .with_body(r#"{"instance": {"instanceName": "main", "state": "open"}}"#)
            .create_async()
            .await;

        let state = client(&server.url()).connection_state().await.unwrap();
        assert_eq!(state, ConnectionState::Open);
    }

    #[tokio::test]
    async fn unknown_state_maps_to_unknown() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/instance/connectionState/main")
            .with_status(200)
            .with_body(r#"{"instance": {"state": "refused"}}"#)
            .create_async()
            .await;

        let state = client(&server.url()).connection_state().await.unwrap();
        assert_eq!(state, ConnectionState::Unknown);
    }

    #[tokio::test]
    async fn qr_payload_round_trips() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/instance/connect/main")
            .with_status(200)
            .with_body(r#"{"code": "2@abc", "base64": "data:image/png;base64,xyz"}"#)
            .create_async()
            .await;

        let qr = client(&server.url()).connect_qr().await.unwrap();
        assert_eq!(qr.code.as_deref(), Some("2@abc"));
        assert!(qr.base64.is_some());
    }
}
