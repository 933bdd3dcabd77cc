//! Cache key layout. Everything an environment owns lives under `{env}.`.

pub fn status(env: &str) -> String {
    format!("{env}.status")
}

pub fn object(env: &str) -> String {
    format!("{env}.object")
}

pub fn timestamp(env: &str) -> String {
    format!("{env}.timestamp")
}

pub fn database(env: &str, db_iid: &str) -> String {
    format!("{env}.db.{db_iid}")
}

pub fn databases(env: &str) -> String {
    format!("{env}.databases")
}

/// Application metadata list (`endpoints`, `queues`, ...) of an environment.
pub fn metadata(env: &str, kind: &str) -> String {
    format!("{env}.{kind}")
}

pub fn env_pattern(env: &str) -> String {
    format!("{env}.*")
}

/// Runtime data the API servers keep per environment, dropped with the data.
pub const DATA_NAMESPACES: [&str; 3] = ["sessions", "tokens", "cache"];

pub fn namespace(prefix: &str, env: &str) -> String {
    format!("{prefix}.{env}.*")
}
