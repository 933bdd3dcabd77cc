//! Environment status guard.
//!
//! Jobs for one environment can land on different queue shards, so message
//! order gives no protection. Before any work starts the guard compares the
//! environment's status with the job kind's policy and the job's age.

use chrono::TimeDelta;
use common::types::{EnvStatus, JobKind};

/// What a job does when it found the environment busy for too long.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StalePolicy {
    /// Force the environment into `Error` and drop the job.
    TimeOut,
    /// Run the job anyway.
    Admit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Policy {
    pub blocking: &'static [EnvStatus],
    pub skip_when_deleting: bool,
    pub stale: StalePolicy,
}

const DEPLOYING: &[EnvStatus] = &[EnvStatus::Deploying, EnvStatus::Redeploying];
const REDEPLOYING: &[EnvStatus] = &[
    EnvStatus::Deploying,
    EnvStatus::Redeploying,
    EnvStatus::Undeploying,
    EnvStatus::AutoDeploying,
];

pub fn policy(kind: JobKind) -> Policy {
    match kind {
        JobKind::DeleteEnvironment => Policy {
            blocking: DEPLOYING,
            skip_when_deleting: false,
            stale: StalePolicy::Admit,
        },
        JobKind::DeployVersion | JobKind::UndeployVersion | JobKind::UpdateEndpoints => Policy {
            blocking: DEPLOYING,
            skip_when_deleting: true,
            stale: StalePolicy::TimeOut,
        },
        JobKind::RedeployVersion => Policy {
            blocking: REDEPLOYING,
            skip_when_deleting: false,
            stale: StalePolicy::TimeOut,
        },
        JobKind::UpdateFunctions | JobKind::UpdateResourceAccess => Policy {
            blocking: &[],
            skip_when_deleting: true,
            stale: StalePolicy::TimeOut,
        },
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Process,
    /// Hand the message back; another workflow still owns the environment.
    Defer,
    /// Acknowledge without doing anything.
    Skip,
    TimeOut,
}

/// `age` is the time since the job was published; `status` is `None` while
/// the environment has no status yet.
pub fn decide(
    kind: JobKind,
    status: Option<EnvStatus>,
    age: TimeDelta,
    max_wait: TimeDelta,
) -> Decision {
    let policy = policy(kind);
    let Some(status) = status else {
        return Decision::Process;
    };

    if policy.blocking.contains(&status) {
        if age < max_wait {
            return Decision::Defer;
        }
        return match policy.stale {
            StalePolicy::TimeOut => Decision::TimeOut,
            StalePolicy::Admit => Decision::Process,
        };
    }

    if policy.skip_when_deleting && status == EnvStatus::Deleting {
        return Decision::Skip;
    }
    Decision::Process
}

/// Log line sent with the callback of a timed-out job.
pub fn timeout_message(kind: JobKind) -> &'static str {
    match kind {
        JobKind::DeployVersion => {
            "App version deployment timed out due to waiting too long for the deployment to complete"
        }
        JobKind::RedeployVersion => "App version redeployment timed out due to errors",
        JobKind::UndeployVersion => {
            "App version undeployment timed out due to waiting too long for the deployment to complete"
        }
        JobKind::DeleteEnvironment => "Environment deletion timed out due to errors",
        JobKind::UpdateEndpoints => "Endpoints update timed out due to errors",
        JobKind::UpdateFunctions => "Functions update timed out due to errors",
        JobKind::UpdateResourceAccess => {
            "Resource access settings update timed out due to waiting too long for the deployment to complete"
        }
    }
}
