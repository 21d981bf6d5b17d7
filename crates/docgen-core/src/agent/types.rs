use std::collections::BTreeSet;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Error code of a result synthesized when a task exceeds its deadline.
pub const ERROR_TIMEOUT: &str = "timeout";
/// Error code of a result synthesized when an agent errors or panics.
pub const ERROR_INFRASTRUCTURE: &str = "infrastructure_failure";
/// Error code of a result synthesized for a task that never reported.
pub const ERROR_MISSING_RESULT: &str = "missing_result";

/// Default per-task timeout for built-in agents.
pub const DEFAULT_TIMEOUT_SECONDS: u64 = 300;

/// Static description of what an agent accepts and how it may be scheduled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentCapabilities {
    pub name: String,
    pub description: String,
    pub input_types: BTreeSet<String>,
    pub output_types: BTreeSet<String>,
    pub supported_languages: BTreeSet<String>,
    pub max_parallel_tasks: usize,
    pub timeout_seconds: u64,
}

impl AgentCapabilities {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_types: BTreeSet::new(),
            output_types: BTreeSet::new(),
            supported_languages: BTreeSet::new(),
            max_parallel_tasks: 1,
            timeout_seconds: DEFAULT_TIMEOUT_SECONDS,
        }
    }

    pub fn with_input_types<I: IntoIterator<Item = S>, S: Into<String>>(mut self, types: I) -> Self {
        self.input_types = types.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_output_types<I: IntoIterator<Item = S>, S: Into<String>>(
        mut self,
        types: I,
    ) -> Self {
        self.output_types = types.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_languages<I: IntoIterator<Item = S>, S: Into<String>>(mut self, langs: I) -> Self {
        self.supported_languages = langs.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_max_parallel_tasks(mut self, max: usize) -> Self {
        self.max_parallel_tasks = max;
        self
    }

    pub fn with_timeout_seconds(mut self, seconds: u64) -> Self {
        self.timeout_seconds = seconds;
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

/// One unit of work for a single agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentTask {
    pub id: String,
    #[serde(rename = "type")]
    pub task_type: String,
    #[serde(default)]
    pub input_data: Map<String, Value>,
    pub created_at: DateTime<Utc>,
    /// Overrides the capability timeout for this task only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

impl AgentTask {
    pub fn new(id: impl Into<String>, task_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            task_type: task_type.into(),
            input_data: Map::new(),
            created_at: Utc::now(),
            timeout_ms: None,
        }
    }

    pub fn with_input(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.input_data.insert(key.into(), value.into());
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    /// Non-empty string input, if present.
    pub fn input_str(&self, key: &str) -> Option<&str> {
        self.input_data
            .get(key)
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())
    }

    /// Deadline for this task under `capabilities`.
    pub fn effective_timeout(&self, capabilities: &AgentCapabilities) -> Duration {
        self.timeout_ms
            .map(Duration::from_millis)
            .unwrap_or_else(|| capabilities.timeout())
    }
}

/// Outcome of one task attempt. `data` is present iff `success`, `error` iff not.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentResult {
    pub task_id: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub duration_ms: u64,
}

impl AgentResult {
    pub fn success(task_id: impl Into<String>, data: Map<String, Value>, duration: Duration) -> Self {
        Self {
            task_id: task_id.into(),
            success: true,
            data: Some(data),
            error: None,
            duration_ms: duration.as_millis() as u64,
        }
    }

    pub fn failure(task_id: impl Into<String>, error: impl Into<String>, duration: Duration) -> Self {
        Self {
            task_id: task_id.into(),
            success: false,
            data: None,
            error: Some(error.into()),
            duration_ms: duration.as_millis() as u64,
        }
    }

    pub fn timeout(task_id: impl Into<String>, duration: Duration) -> Self {
        Self::failure(task_id, ERROR_TIMEOUT, duration)
    }

    pub fn infrastructure_failure(task_id: impl Into<String>, duration: Duration) -> Self {
        Self::failure(task_id, ERROR_INFRASTRUCTURE, duration)
    }

    pub fn is_timeout(&self) -> bool {
        self.error.as_deref() == Some(ERROR_TIMEOUT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_override_beats_capability_timeout() {
        let caps = AgentCapabilities::new("architecture", "").with_timeout_seconds(300);
        let task = AgentTask::new("t1", "architecture");
        assert_eq!(task.effective_timeout(&caps), Duration::from_secs(300));

        let task = task.with_timeout_ms(500);
        assert_eq!(task.effective_timeout(&caps), Duration::from_millis(500));
    }

    #[test]
    fn test_input_str_ignores_blank() {
        let task = AgentTask::new("t1", "component")
            .with_input("component_name", "  ")
            .with_input("repository_root", "/tmp/repo");
        assert_eq!(task.input_str("component_name"), None);
        assert_eq!(task.input_str("repository_root"), Some("/tmp/repo"));
        assert_eq!(task.input_str("absent"), None);
    }

    #[test]
    fn test_result_shape() {
        let ok = AgentResult::success("a", Map::new(), Duration::from_millis(12));
        assert!(ok.success && ok.data.is_some() && ok.error.is_none());
        assert_eq!(ok.duration_ms, 12);

        let timed_out = AgentResult::timeout("b", Duration::from_millis(500));
        assert!(!timed_out.success && timed_out.data.is_none());
        assert!(timed_out.is_timeout());

        let json = serde_json::to_value(&timed_out).unwrap();
        assert!(json.get("data").is_none());
        assert_eq!(json["error"], "timeout");
    }

    #[test]
    fn test_task_serializes_type_field() {
        let task = AgentTask::new("t1", "usage");
        let json = serde_json::to_value(&task).unwrap();
        assert_eq!(json["type"], "usage");
        assert!(json.get("timeout_ms").is_none());
    }
}
