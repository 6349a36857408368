//! Provider send client.

use std::time::Duration;

use {
    serde::{Deserialize, Serialize},
    tracing::debug,
};

use crate::{Error, Result};

/// HTTP client for the provider API. One instance per configured provider
/// session; cheap to clone.
#[derive(Clone)]
pub struct WhatsAppClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    instance: String,
}

/// Body of a text send.
#[derive(Debug, Serialize)]
struct SendTextBody<'a> {
    number: &'a str,
    #[serde(rename = "textMessage")]
    text_message: TextMessage<'a>,
}

#[derive(Debug, Serialize)]
struct TextMessage<'a> {
    text: &'a str,
}

/// Provider acknowledgement of an accepted send.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SendReceipt {
    /// Provider-assigned message id; recorded on the outbound message so
    /// the provider's echo of this send dedups on the inbound path.
    #[serde(default)]
    pub message_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SendResponse {
    #[serde(default)]
    key: Option<SendResponseKey>,
}

#[derive(Debug, Deserialize)]
struct SendResponseKey {
    #[serde(default)]
    id: Option<String>,
}

impl WhatsAppClient {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        instance: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.into(),
            api_key: api_key.into(),
            instance: instance.into(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{path}/{}", self.base_url.trim_end_matches('/'), self.instance)
    }

    pub(crate) fn get(&self, path: &str) -> reqwest::RequestBuilder {
        self.http.get(self.url(path)).header("apikey", &self.api_key)
    }

    pub(crate) fn delete(&self, path: &str) -> reqwest::RequestBuilder {
        self.http
            .delete(self.url(path))
            .header("apikey", &self.api_key)
    }

    /// Send a text message to `number` (bare digits).
    ///
    /// Every failure — non-2xx, unreachable host, timeout — maps to
    /// [`Error::Delivery`]; the caller records nothing locally in that case.
    pub async fn send_text(&self, number: &str, text: &str) -> Result<SendReceipt> {
        let body = SendTextBody {
            number,
            text_message: TextMessage { text },
        };

        let resp = self
            .http
            .post(self.url("message/sendText"))
            .header("apikey", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(Error::delivery)?;

        let status = resp.status();
        if !status.is_success() {
            let detail = resp.text().await.unwrap_or_default();
            return Err(Error::delivery(format!("{status}: {detail}")));
        }

        // The send already succeeded; a receipt the client cannot parse only
        // costs the echo-dedup id.
        let receipt = match resp.json::<SendResponse>().await {
            Ok(parsed) => SendReceipt {
                message_id: parsed.key.and_then(|k| k.id),
            },
            Err(e) => {
                debug!(error = %e, "unparseable send response; no receipt id");
                SendReceipt::default()
            },
        };
        Ok(receipt)
    }
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn client(base: &str) -> WhatsAppClient {
        WhatsAppClient::new(base, "test-key", "main", Duration::from_secs(2)).unwrap()
    }

    #[tokio::test]
    async fn send_text_returns_provider_message_id() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/message/sendText/main")
            .match_header("apikey", "test-key")
            .with_status(201)
            .with_body(r#"{"key": {"remoteJid": "551@s.whatsapp.net", "fromMe": true, "id": "SRV1"}, "status": "PENDING"}"#)
            .create_async()
            .await;

        let receipt = client(&server.url())
            .send_text("5511999990000", "Olá")
            .await
            .unwrap();
        assert_eq!(receipt.message_id.as_deref(), Some("SRV1"));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn non_success_status_is_delivery_failure() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/message/sendText/main")
            .with_status(500)
            .with_body(r#"{"error": "instance offline"}"#)
            .create_async()
            .await;

        let err = client(&server.url())
            .send_text("5511999990000", "Olá")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Delivery { .. }));
    }

    #[tokio::test]
    async fn unreachable_host_is_delivery_failure() {
        // Nothing listens here.
        let c = client("http://127.0.0.1:9");
        let err = c.send_text("551", "oi").await.unwrap_err();
        assert!(matches!(err, Error::Delivery { .. }));
    }

    #[tokio::test]
    async fn unparseable_receipt_still_succeeds() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/message/sendText/main")
            .with_status(200)
            .with_body("ok")
            .create_async()
            .await;

        let receipt = client(&server.url()).send_text("551", "oi").await.unwrap();
        assert!(receipt.message_id.is_none());
    }
}
