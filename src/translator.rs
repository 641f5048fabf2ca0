//! Turns one CI message into ResultsDB records.
//!
//! The pipeline is a fixed sequence of steps. Every step except the test case
//! URL correction stops the pipeline on failure; nothing is retried or rolled
//! back.

use std::sync::Arc;

use crate::error::UpdaterError;
use crate::message::{self, Message};
use crate::models::{JobStatus, NewResult};
use crate::resultsdb::ResultsDb;

/// What a fully processed message left behind in ResultsDB.
#[derive(Debug, Clone, PartialEq)]
pub struct Report {
    pub testcase: String,
    pub job_id: u64,
    pub status: JobStatus,
    pub results: usize,
}

/// The step that stopped the pipeline.
#[derive(Debug, thiserror::Error)]
pub enum Abort {
    #[error("the test case \"{testcase}\" couldn't be created: {source}")]
    CreateTestCase {
        testcase: String,
        source: UpdaterError,
    },
    #[error("the test case \"{testcase}\" couldn't be fetched: {source}")]
    FetchTestCase {
        testcase: String,
        source: UpdaterError,
    },
    #[error("the new job couldn't be created: {0}")]
    CreateJob(UpdaterError),
    #[error("the new result #{index} for job id \"{job_id}\" couldn't be created: {source}")]
    CreateResult {
        job_id: u64,
        index: usize,
        source: UpdaterError,
    },
    #[error("the job status for job id \"{job_id}\" couldn't be set to \"COMPLETED\": {source}")]
    CompleteJob { job_id: u64, source: UpdaterError },
}

#[derive(Clone)]
pub struct Translator {
    resultsdb: Arc<dyn ResultsDb>,
}

impl Translator {
    pub fn new(resultsdb: Arc<dyn ResultsDb>) -> Self {
        Self { resultsdb }
    }

    /// Mirrors `msg` into ResultsDB. Failures are logged, never returned.
    pub async fn post_to_resultsdb(&self, msg: &Message) {
        match self.translate(msg).await {
            Ok(report) => tracing::info!(
                message_id = msg.id(),
                testcase = %report.testcase,
                job_id = report.job_id,
                status = %report.status,
                results = report.results,
                "message recorded"
            ),
            Err(abort) => tracing::error!(message_id = msg.id(), "{}", abort),
        }
    }

    pub async fn translate(&self, msg: &Message) -> Result<Report, Abort> {
        let ci = msg.msg();

        if ci.team().is_none() {
            tracing::warn!(
                message_id = msg.id(),
                "The message did not contain a team. Using \"unassigned.job_names\" as the name for the Test Case"
            );
        }
        let testcase = ci.testcase_name();
        self.ensure_testcase(msg, &testcase).await?;

        let status = ci.initial_status();
        if status == JobStatus::Crashed {
            tracing::warn!(
                message_id = msg.id(),
                "The message did not contain any tests. Marking the job as \"CRASHED\""
            );
        }

        let job = self
            .resultsdb
            .create_job(&ci.job_names, &ci.jenkins_build_url, status)
            .await
            .map_err(Abort::CreateJob)?;
        tracing::debug!(
            message_id = msg.id(),
            job_id = job.id,
            name = ?job.name,
            status = ?job.status,
            "job created"
        );

        let mut results = 0;
        if let Some(tests) = ci.tests() {
            let log_url = ci.log_url();
            let job_type = ci.job_type();
            for (index, entry) in tests.iter().enumerate() {
                let result = NewResult {
                    testcase_name: testcase.clone(),
                    job_id: job.id,
                    outcome: message::outcome(entry),
                    log_url: log_url.clone(),
                    result_data: message::result_data(entry, ci.component(), job_type),
                };
                self.resultsdb
                    .create_result(&result)
                    .await
                    .map_err(|source| Abort::CreateResult {
                        job_id: job.id,
                        index,
                        source,
                    })?;
                results += 1;
            }
        }

        let status = if status == JobStatus::Running {
            self.resultsdb
                .set_job_status(job.id, JobStatus::Completed)
                .await
                .map_err(|source| Abort::CompleteJob {
                    job_id: job.id,
                    source,
                })?;
            JobStatus::Completed
        } else {
            status
        };

        Ok(Report {
            testcase,
            job_id: job.id,
            status,
            results,
        })
    }

    async fn ensure_testcase(&self, msg: &Message, testcase: &str) -> Result<(), Abort> {
        let url = &msg.msg().jenkins_job_url;
        let existing = self
            .resultsdb
            .get_testcase(testcase)
            .await
            .map_err(|source| Abort::FetchTestCase {
                testcase: testcase.to_string(),
                source,
            })?;

        match existing {
            Some(found) if found.url.as_deref() == Some(url.as_str()) => Ok(()),
            Some(_) => {
                if let Err(e) = self.resultsdb.set_testcase(testcase, url).await {
                    tracing::error!(
                        message_id = msg.id(),
                        testcase,
                        "The URL of the test case couldn't be corrected: {}",
                        e
                    );
                }
                Ok(())
            }
            None => self
                .resultsdb
                .create_testcase(testcase, url)
                .await
                .map_err(|source| Abort::CreateTestCase {
                    testcase: testcase.to_string(),
                    source,
                }),
        }
    }
}
