use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Lifecycle status of an environment as stored under `{env}.status`.
///
/// An absent key is the "unset" state and is modelled as `Option<EnvStatus>`
/// by callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EnvStatus {
    Deploying,
    Redeploying,
    Undeploying,
    #[serde(rename = "Auto-deploying")]
    AutoDeploying,
    Deleting,
    #[serde(rename = "OK")]
    Ok,
    Error,
}

impl EnvStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EnvStatus::Deploying => "Deploying",
            EnvStatus::Redeploying => "Redeploying",
            EnvStatus::Undeploying => "Undeploying",
            EnvStatus::AutoDeploying => "Auto-deploying",
            EnvStatus::Deleting => "Deleting",
            EnvStatus::Ok => "OK",
            EnvStatus::Error => "Error",
        }
    }

    /// A workflow currently owns the environment.
    pub fn is_in_progress(&self) -> bool {
        !matches!(self, EnvStatus::Ok | EnvStatus::Error)
    }
}

impl fmt::Display for EnvStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EnvStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let status = match s {
            "Deploying" => EnvStatus::Deploying,
            "Redeploying" => EnvStatus::Redeploying,
            "Undeploying" => EnvStatus::Undeploying,
            "Auto-deploying" => EnvStatus::AutoDeploying,
            "Deleting" => EnvStatus::Deleting,
            "OK" => EnvStatus::Ok,
            "Error" => EnvStatus::Error,
            other => return Err(format!("unknown environment status '{other}'")),
        };
        Ok(status)
    }
}
