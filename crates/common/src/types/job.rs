use crate::types::environment::{Environment, Resource};
use crate::types::schema::DatabaseConfig;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Job kinds; each one is consumed from its own set of queue shards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum JobKind {
    DeleteEnvironment,
    DeployVersion,
    RedeployVersion,
    UndeployVersion,
    UpdateEndpoints,
    UpdateFunctions,
    UpdateResourceAccess,
}

impl JobKind {
    pub const ALL: [JobKind; 7] = [
        JobKind::DeleteEnvironment,
        JobKind::DeployVersion,
        JobKind::RedeployVersion,
        JobKind::UndeployVersion,
        JobKind::UpdateEndpoints,
        JobKind::UpdateFunctions,
        JobKind::UpdateResourceAccess,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::DeleteEnvironment => "delete-environment",
            JobKind::DeployVersion => "deploy-version",
            JobKind::RedeployVersion => "redeploy-version",
            JobKind::UndeployVersion => "undeploy-version",
            JobKind::UpdateEndpoints => "update-endpoints",
            JobKind::UpdateFunctions => "update-functions",
            JobKind::UpdateResourceAccess => "update-resource-access",
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        JobKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| format!("unknown job kind '{s}'"))
    }
}

/// How a metadata update merges into the previously cached list.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubAction {
    #[default]
    Set,
    Add,
    Update,
    Delete,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppRef {
    #[serde(default)]
    pub name: String,
}

/// Queue payload. Immutable once published.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub env: Environment,
    /// Creation time, used for staleness checks.
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub callback: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor: Option<Value>,
    #[serde(default)]
    pub app: AppRef,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    #[serde(default)]
    pub sub_action: SubAction,
    #[serde(default)]
    pub databases: Vec<DatabaseConfig>,
    #[serde(default)]
    pub endpoints: Vec<Value>,
    #[serde(default)]
    pub functions: Vec<Value>,
    #[serde(default)]
    pub middlewares: Vec<Value>,
    #[serde(default)]
    pub queues: Vec<Value>,
    #[serde(default)]
    pub tasks: Vec<Value>,
    #[serde(default)]
    pub storages: Vec<Value>,
    #[serde(default)]
    pub caches: Vec<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_resource: Option<Resource>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub drop_data: Option<bool>,
}

impl Job {
    pub fn env_iid(&self) -> &str {
        &self.env.iid
    }

    /// Undeploy drops tenant data unless told otherwise.
    pub fn drops_data(&self) -> bool {
        self.drop_data.unwrap_or(true)
    }

    pub fn from_slice(payload: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn job_kind_names_match_queue_names() {
        for kind in JobKind::ALL {
            assert_eq!(kind.as_str().parse::<JobKind>().unwrap(), kind);
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{}\"", kind.as_str()));
        }
    }

    #[test]
    fn minimal_payload_parses_with_defaults() {
        let payload = json!({
            "env": {"iid": "env-1", "name": "dev", "version": {"name": "v1"}},
            "timestamp": "2024-05-01T10:00:00Z",
            "callback": "http://platform/callback"
        });
        let job = Job::from_slice(payload.to_string().as_bytes()).unwrap();
        assert_eq!(job.env_iid(), "env-1");
        assert_eq!(job.sub_action, SubAction::Set);
        assert!(job.databases.is_empty());
        assert!(job.drops_data());
    }

    #[test]
    fn drop_data_false_is_respected() {
        let payload = json!({
            "env": {"iid": "env-1"},
            "timestamp": "2024-05-01T10:00:00Z",
            "dropData": false,
            "subAction": "delete"
        });
        let job: Job = serde_json::from_value(payload).unwrap();
        assert!(!job.drops_data());
        assert_eq!(job.sub_action, SubAction::Delete);
    }
}
