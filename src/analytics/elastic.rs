//! Elasticsearch-style document indexing.

use chrono::{DateTime, Local};
use url::Url;

use crate::analytics::{AnalyticsDocument, AnalyticsError, ResponseAnalyzer};

const BUFFER_CAPACITY: usize = 1_000;

/// Posts one document per exchange to `<base>/<index>/_doc`.
pub struct ElasticAnalyzer {
    documents: flume::Sender<AnalyticsDocument>,
    endpoint: Url,
}

impl ElasticAnalyzer {
    /// Parse `http://host:port/index` and start the indexing task.
    /// Must be called inside a Tokio runtime.
    pub fn new(endpoint: &str) -> Result<Self, AnalyticsError> {
        let endpoint = document_url(endpoint)?;
        let client = reqwest::Client::builder()
            .pool_max_idle_per_host(4)
            .build()?;

        let (documents, rx) = flume::bounded(BUFFER_CAPACITY);
        tokio::spawn(index_documents(client, endpoint.clone(), rx));

        tracing::info!(endpoint = %endpoint, "Analytics indexing enabled");
        Ok(Self {
            documents,
            endpoint,
        })
    }

    /// Where documents are posted.
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

impl ResponseAnalyzer for ElasticAnalyzer {
    fn analyze(
        &self,
        request: &[u8],
        response: &[u8],
        started: DateTime<Local>,
        stopped: DateTime<Local>,
    ) {
        let doc = AnalyticsDocument::from_exchange(request, response, started, stopped);
        if let Err(flume::TrySendError::Full(_)) = self.documents.try_send(doc) {
            tracing::debug!("Analytics buffer full, dropping document");
        }
    }
}

/// Turn `http://host:port/index` into `http://host:port/index/_doc`.
fn document_url(endpoint: &str) -> Result<Url, AnalyticsError> {
    let url = Url::parse(endpoint).map_err(|e| AnalyticsError::Endpoint(e.to_string()))?;
    let index = url
        .path_segments()
        .and_then(|mut segments| segments.find(|s| !s.is_empty()))
        .ok_or_else(|| AnalyticsError::Endpoint(format!("{} has no index", endpoint)))?
        .to_string();

    url.join(&format!("/{}/_doc", index))
        .map_err(|e| AnalyticsError::Endpoint(e.to_string()))
}

async fn index_documents(
    client: reqwest::Client,
    endpoint: Url,
    rx: flume::Receiver<AnalyticsDocument>,
) {
    while let Ok(doc) = rx.recv_async().await {
        match client.post(endpoint.clone()).json(&doc).send().await {
            Ok(res) if !res.status().is_success() => {
                tracing::warn!(status = %res.status(), "Analytics store rejected document");
            }
            Ok(_) => {}
            Err(e) => tracing::warn!(error = %e, "Failed to index analytics document"),
        }
    }
    tracing::debug!("Analytics indexing stopped");
}
