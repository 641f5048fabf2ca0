use serde::Deserialize;
use serde_json::{Map, Value};

use crate::models::{JobStatus, Outcome};

pub type TestEntry = Map<String, Value>;

/// A CI job-completion message as delivered by the bus.
#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    #[serde(default)]
    pub headers: Headers,
    pub body: Body,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Headers {
    #[serde(rename = "message-id")]
    pub message_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Body {
    pub msg: CiMsg,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CiMsg {
    #[serde(default)]
    pub team: Option<Value>,
    pub job_names: String,
    pub jenkins_job_url: String,
    pub jenkins_build_url: String,
    #[serde(default)]
    pub tests: Option<Vec<TestEntry>>,
    #[serde(default)]
    pub component: Option<Value>,
    #[serde(default)]
    pub brew_task_id: Option<Value>,
}

impl Message {
    pub fn id(&self) -> &str {
        self.headers.message_id.as_deref().unwrap_or("unknown")
    }

    pub fn msg(&self) -> &CiMsg {
        &self.body.msg
    }
}

impl CiMsg {
    /// The team as text. Non-string values are rendered as JSON.
    pub fn team(&self) -> Option<String> {
        self.team.as_ref().filter(|team| is_truthy(team)).map(|team| match team {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
    }

    /// `{team}.{job_names}`, or `unassigned.{job_names}` without a team.
    pub fn testcase_name(&self) -> String {
        format!(
            "{}.{}",
            self.team().as_deref().unwrap_or("unassigned"),
            self.job_names
        )
    }

    /// Test entries, or `None` when the list is missing or empty.
    pub fn tests(&self) -> Option<&[TestEntry]> {
        self.tests.as_deref().filter(|tests| !tests.is_empty())
    }

    pub fn initial_status(&self) -> JobStatus {
        if self.tests().is_some() {
            JobStatus::Running
        } else {
            JobStatus::Crashed
        }
    }

    pub fn job_type(&self) -> &'static str {
        match &self.brew_task_id {
            Some(id) if is_truthy(id) => "koji_build",
            _ => "unknown",
        }
    }

    /// Stored as `item` on every result, as sent.
    pub fn component(&self) -> Value {
        match &self.component {
            Some(component) if !component.is_null() => component.clone(),
            _ => Value::String("unknown".into()),
        }
    }

    pub fn log_url(&self) -> String {
        format!("{}/console", self.jenkins_build_url.trim_end_matches('/'))
    }
}

/// `PASSED` only when the entry reports a failure count of exactly zero.
pub fn outcome(entry: &TestEntry) -> Outcome {
    match entry.get("failed").and_then(failure_count) {
        Some(0) => Outcome::Passed,
        _ => Outcome::Failed,
    }
}

fn failure_count(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.trunc() as i64)),
        Value::String(s) => s.trim().parse().ok(),
        Value::Bool(b) => Some(*b as i64),
        _ => None,
    }
}

/// The entry as stored in `result_data`, tagged with the component and job type.
pub fn result_data(entry: &TestEntry, component: Value, job_type: &str) -> TestEntry {
    let mut data = entry.clone();
    data.insert("item".into(), component);
    data.insert("type".into(), Value::String(job_type.to_string()));
    data
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map_or(true, |f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn message(msg: Value) -> Message {
        serde_json::from_value(json!({
            "headers": {"message-id": "ID:1"},
            "body": {"msg": msg}
        }))
        .unwrap()
    }

    fn entry(value: Value) -> TestEntry {
        value.as_object().unwrap().clone()
    }

    fn base() -> Value {
        json!({
            "job_names": "unit-tests",
            "jenkins_job_url": "http://j/x",
            "jenkins_build_url": "http://b/1/"
        })
    }

    #[test]
    fn decodes_envelope() {
        let msg = message(json!({
            "team": "ci",
            "job_names": "unit-tests",
            "jenkins_job_url": "http://j/x",
            "jenkins_build_url": "http://b/1/",
            "tests": [{"failed": "0"}],
            "component": "core",
            "brew_task_id": 1234
        }));
        assert_eq!(msg.id(), "ID:1");
        assert_eq!(msg.msg().testcase_name(), "ci.unit-tests");
        assert_eq!(msg.msg().tests().map(|t| t.len()), Some(1));
        assert_eq!(msg.msg().component(), json!("core"));
        assert_eq!(msg.msg().job_type(), "koji_build");
    }

    #[test]
    fn missing_message_id() {
        let msg: Message =
            serde_json::from_value(json!({"body": {"msg": base()}})).unwrap();
        assert_eq!(msg.id(), "unknown");
    }

    #[test]
    fn unassigned_testcase_name() {
        let msg = message(base());
        assert_eq!(msg.msg().testcase_name(), "unassigned.unit-tests");

        let mut with_empty_team = base();
        with_empty_team["team"] = json!("");
        assert_eq!(
            message(with_empty_team).msg().testcase_name(),
            "unassigned.unit-tests"
        );

        let mut with_null_team = base();
        with_null_team["team"] = Value::Null;
        assert_eq!(
            message(with_null_team).msg().testcase_name(),
            "unassigned.unit-tests"
        );
    }

    #[test]
    fn status_follows_tests() {
        assert_eq!(message(base()).msg().initial_status(), JobStatus::Crashed);

        let mut empty = base();
        empty["tests"] = json!([]);
        assert_eq!(message(empty).msg().initial_status(), JobStatus::Crashed);

        let mut some = base();
        some["tests"] = json!([{"failed": 1}]);
        assert_eq!(message(some).msg().initial_status(), JobStatus::Running);
    }

    #[test]
    fn job_type_needs_truthy_brew_task() {
        assert_eq!(message(base()).msg().job_type(), "unknown");

        for (id, expected) in [
            (json!(0), "unknown"),
            (json!(""), "unknown"),
            (Value::Null, "unknown"),
            (json!("12345"), "koji_build"),
            (json!(12345), "koji_build"),
        ] {
            let mut msg = base();
            msg["brew_task_id"] = id;
            assert_eq!(message(msg).msg().job_type(), expected);
        }
    }

    #[test]
    fn log_url_strips_trailing_slash() {
        assert_eq!(message(base()).msg().log_url(), "http://b/1/console");

        let mut msg = base();
        msg["jenkins_build_url"] = json!("http://b/1");
        assert_eq!(message(msg).msg().log_url(), "http://b/1/console");
    }

    #[test]
    fn outcome_from_failure_count() {
        assert_eq!(outcome(&entry(json!({"failed": "0"}))), Outcome::Passed);
        assert_eq!(outcome(&entry(json!({"failed": 0}))), Outcome::Passed);
        assert_eq!(outcome(&entry(json!({"failed": " 0 "}))), Outcome::Passed);
        assert_eq!(outcome(&entry(json!({"failed": "2"}))), Outcome::Failed);
        assert_eq!(outcome(&entry(json!({"failed": 3}))), Outcome::Failed);
        assert_eq!(outcome(&entry(json!({"passed": 10}))), Outcome::Failed);
        assert_eq!(outcome(&entry(json!({"failed": "n/a"}))), Outcome::Failed);
        assert_eq!(outcome(&entry(json!({"failed": null}))), Outcome::Failed);
    }

    #[test]
    fn result_data_is_tagged() {
        let data = result_data(&entry(json!({"failed": "0", "item": "old"})), json!("core"), "unknown");
        assert_eq!(
            Value::Object(data),
            json!({"failed": "0", "item": "core", "type": "unknown"})
        );
    }

    #[test]
    fn component_defaults_to_unknown() {
        assert_eq!(message(base()).msg().component(), json!("unknown"));

        let mut with_null = base();
        with_null["component"] = Value::Null;
        assert_eq!(message(with_null).msg().component(), json!("unknown"));
    }

    #[test]
    fn non_string_team_and_component_still_decode() {
        let mut msg = base();
        msg["team"] = json!(5);
        msg["component"] = json!(7);
        let msg = message(msg);
        assert_eq!(msg.msg().testcase_name(), "5.unit-tests");
        assert_eq!(msg.msg().component(), json!(7));

        let mut falsy = base();
        falsy["team"] = json!(0);
        assert_eq!(message(falsy).msg().testcase_name(), "unassigned.unit-tests");
    }
}
