//! Bookkeeping collections every environment database carries.

use shared_clients::document::IndexSpec;

const WEEK: u64 = 7 * 24 * 60 * 60;
const HALF_YEAR: u64 = 180 * 24 * 60 * 60;

pub struct InternalCollection {
    pub name: &'static str,
    pub indexes: Vec<IndexSpec>,
    /// Operation log line written once the collection is created.
    pub created: &'static str,
}

fn ascending(paths: &[&str]) -> Vec<IndexSpec> {
    paths.iter().map(|p| IndexSpec::ascending(*p)).collect()
}

fn with_ttl(paths: &[&str], ttl_path: &str, seconds: u64) -> Vec<IndexSpec> {
    let mut indexes = ascending(paths);
    indexes.push(IndexSpec::ascending(ttl_path).expire_after(seconds));
    indexes
}

pub fn collections() -> Vec<InternalCollection> {
    let mut files = ascending(&[
        "id", "path", "bucketId", "storageId", "isPublic", "size", "mimeType", "uploadedAt",
        "updatedAt", "userId",
    ]);
    files.push(IndexSpec::ascending("tags").sparse());

    let mut buckets = ascending(&[
        "id", "storageId", "name", "isPublic", "createdAt", "updatedAt", "userId",
    ]);
    buckets.push(IndexSpec::ascending("tags").sparse());

    vec![
        InternalCollection {
            name: "files",
            indexes: files,
            created: "Created file storage info collection",
        },
        InternalCollection {
            name: "buckets",
            indexes: buckets,
            created: "Created bucket storage info collection",
        },
        InternalCollection {
            name: "messages",
            indexes: with_ttl(
                &["trackingId", "queueId", "status", "startedAt", "completedAt", "delay"],
                "submittedAt",
                WEEK,
            ),
            created: "Created message info collection",
        },
        InternalCollection {
            name: "cronjobs",
            indexes: with_ttl(
                &["trackingId", "cronJobId", "status", "startedAt", "completedAt"],
                "triggeredAt",
                WEEK,
            ),
            created: "Created cron job info collection",
        },
        InternalCollection {
            name: "endpoint_logs",
            indexes: with_ttl(
                &[
                    "path", "method", "status", "duration", "orgId", "appId", "versionId", "envId",
                    "endpointId",
                ],
                "timestamp",
                HALF_YEAR,
            ),
            created: "Created endpoint execution logs collection",
        },
        InternalCollection {
            name: "queue_logs",
            indexes: with_ttl(
                &[
                    "name", "status", "duration", "orgId", "appId", "versionId", "envId", "queueId",
                ],
                "timestamp",
                HALF_YEAR,
            ),
            created: "Created message queue execution logs collection",
        },
        InternalCollection {
            name: "cronjob_logs",
            indexes: with_ttl(
                &["name", "status", "duration", "appId", "versionId", "envId", "taskId"],
                "timestamp",
                HALF_YEAR,
            ),
            created: "Created cron job execution logs collection",
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_collections_expire_their_entries() {
        let all = collections();
        assert_eq!(all.len(), 7);
        for c in &all {
            let ttl: Vec<_> = c
                .indexes
                .iter()
                .filter_map(|i| i.expire_after_seconds)
                .collect();
            match c.name {
                "files" | "buckets" => assert!(ttl.is_empty()),
                "messages" | "cronjobs" => assert_eq!(ttl, vec![WEEK]),
                _ => assert_eq!(ttl, vec![HALF_YEAR]),
            }
        }
    }
}
