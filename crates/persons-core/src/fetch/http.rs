use super::Fetch;
use crate::FetchError;
use serde_json::Value;

/// [`Fetch`] over HTTP GET with JSON payloads.
#[derive(Debug, Clone, Default)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl Fetch for HttpFetcher {
    fn fetch(&self, url: &str) -> impl Future<Output = Result<Value, FetchError>> + Send {
        let request = self.client.get(url);
        async move {
            let response = request.send().await.map_err(transport)?;
            let response = response.error_for_status().map_err(|e| match e.status() {
                Some(status) => FetchError::Status {
                    code: status.as_u16(),
                },
                None => transport(e),
            })?;
            response.json::<Value>().await.map_err(|e| {
                if e.is_decode() {
                    FetchError::Decode {
                        reason: e.to_string(),
                    }
                } else {
                    transport(e)
                }
            })
        }
    }
}

fn transport(e: reqwest::Error) -> FetchError {
    FetchError::Transport {
        reason: e.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unreachable_host_is_a_transport_error() {
        // Port 9 (discard) on loopback is closed in test environments.
        let err = HttpFetcher::default()
            .fetch("http://127.0.0.1:9/posts/1")
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Transport { .. }), "{err:?}");
    }

    #[tokio::test]
    async fn malformed_url_is_a_transport_error() {
        let err = HttpFetcher::default().fetch("not a url").await.unwrap_err();
        assert!(matches!(err, FetchError::Transport { .. }), "{err:?}");
    }
}
