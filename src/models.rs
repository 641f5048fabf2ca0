use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum JobStatus {
    Running,
    Crashed,
    Completed,
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            JobStatus::Running => "RUNNING",
            JobStatus::Crashed => "CRASHED",
            JobStatus::Completed => "COMPLETED",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Outcome {
    Passed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TestCase {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Job {
    pub id: u64,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub ref_url: Option<String>,
    #[serde(default)]
    pub status: Option<JobStatus>,
}

#[derive(Debug, Serialize)]
pub struct NewTestCase<'a> {
    pub name: &'a str,
    pub url: &'a str,
}

#[derive(Debug, Serialize)]
pub struct TestCaseUpdate<'a> {
    pub url: &'a str,
}

#[derive(Debug, Serialize)]
pub struct NewJob<'a> {
    pub name: &'a str,
    pub ref_url: &'a str,
    pub status: JobStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewResult {
    pub testcase_name: String,
    pub job_id: u64,
    pub outcome: Outcome,
    pub log_url: String,
    pub result_data: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Serialize)]
pub struct JobStatusUpdate {
    pub status: JobStatus,
}
