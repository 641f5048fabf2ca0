//! ResultsDB REST client.
//!
//! Each call makes exactly one request. Creation succeeds only on `201`,
//! updates only on `200`; any other status becomes [`UpdaterError::Api`]
//! carrying the server's explanation.

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde_json::Value;

use crate::config::Config;
use crate::error::UpdaterError;
use crate::models::{
    Job, JobStatus, JobStatusUpdate, NewJob, NewResult, NewTestCase, TestCase, TestCaseUpdate,
};

pub type Result<T> = std::result::Result<T, UpdaterError>;

#[async_trait]
pub trait ResultsDb: Send + Sync {
    /// `Ok(None)` when the server does not answer `200` for the name.
    async fn get_testcase(&self, name: &str) -> Result<Option<TestCase>>;

    async fn create_testcase(&self, name: &str, url: &str) -> Result<()>;

    async fn set_testcase(&self, name: &str, url: &str) -> Result<()>;

    async fn create_job(&self, name: &str, url: &str, status: JobStatus) -> Result<Job>;

    async fn create_result(&self, result: &NewResult) -> Result<()>;

    async fn set_job_status(&self, job_id: u64, status: JobStatus) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct HttpResultsDb {
    base_url: String,
    client: Client,
}

impl HttpResultsDb {
    pub fn new(config: &Config) -> Result<Self> {
        let mut builder = Client::builder();

        if let Some(path) = &config.resultsdb_api_ca {
            let cert_error = |reason: String| UpdaterError::Certificate {
                path: path.display().to_string(),
                reason,
            };
            let pem = std::fs::read(path).map_err(|e| cert_error(e.to_string()))?;
            let cert =
                reqwest::Certificate::from_pem(&pem).map_err(|e| cert_error(e.to_string()))?;
            builder = builder.add_root_certificate(cert);
        }
        if let Some(timeout) = config.resultsdb_api_timeout {
            builder = builder.timeout(timeout);
        }

        Ok(Self::with_client(&config.resultsdb_api_url, builder.build()?))
    }

    pub fn with_client(base_url: &str, client: Client) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn testcase_url(&self, name: &str) -> String {
        format!("{}/testcases/{}", self.base_url, quote_plus(name))
    }
}

#[async_trait]
impl ResultsDb for HttpResultsDb {
    async fn get_testcase(&self, name: &str) -> Result<Option<TestCase>> {
        let response = self.client.get(self.testcase_url(name)).send().await?;
        if response.status() != StatusCode::OK {
            tracing::debug!(testcase = name, status = %response.status(), "test case not found");
            return Ok(None);
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| UpdaterError::Decode(e.to_string()))?;
        if body.as_object().map_or(true, |o| o.is_empty()) {
            return Ok(None);
        }
        serde_json::from_value(body)
            .map(Some)
            .map_err(|e| UpdaterError::Decode(e.to_string()))
    }

    async fn create_testcase(&self, name: &str, url: &str) -> Result<()> {
        let response = self
            .client
            .post(format!("{}/testcases", self.base_url))
            .json(&NewTestCase { name, url })
            .send()
            .await?;
        expect(response, StatusCode::CREATED).await?;
        Ok(())
    }

    async fn set_testcase(&self, name: &str, url: &str) -> Result<()> {
        let response = self
            .client
            .put(self.testcase_url(name))
            .json(&TestCaseUpdate { url })
            .send()
            .await?;
        expect(response, StatusCode::OK).await?;
        Ok(())
    }

    async fn create_job(&self, name: &str, url: &str, status: JobStatus) -> Result<Job> {
        let response = self
            .client
            .post(format!("{}/jobs", self.base_url))
            .json(&NewJob {
                name,
                ref_url: url,
                status,
            })
            .send()
            .await?;
        expect(response, StatusCode::CREATED)
            .await?
            .json()
            .await
            .map_err(|e| UpdaterError::Decode(e.to_string()))
    }

    async fn create_result(&self, result: &NewResult) -> Result<()> {
        let response = self
            .client
            .post(format!("{}/results", self.base_url))
            .json(result)
            .send()
            .await?;
        expect(response, StatusCode::CREATED).await?;
        Ok(())
    }

    async fn set_job_status(&self, job_id: u64, status: JobStatus) -> Result<()> {
        let response = self
            .client
            .put(format!("{}/jobs/{}", self.base_url, job_id))
            .json(&JobStatusUpdate { status })
            .send()
            .await?;
        expect(response, StatusCode::OK).await?;
        Ok(())
    }
}

async fn expect(response: Response, expected: StatusCode) -> Result<Response> {
    let status = response.status();
    if status == expected {
        return Ok(response);
    }

    match response.text().await {
        Ok(body) => Err(UpdaterError::api(status.as_u16(), &body)),
        Err(e) => Err(UpdaterError::Api {
            status: status.as_u16(),
            message: format!("couldn't read response body: {}", e),
        }),
    }
}

/// Form-style escaping for names used as a path segment.
fn quote_plus(name: &str) -> String {
    url::form_urlencoded::byte_serialize(name.as_bytes()).collect()
}
