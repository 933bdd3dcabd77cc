use crate::commands::read_document;
use catalog::{diff, process_database};
use clap::Args;
use common::error::WorkerError;
use common::types::DatabaseConfig;
use std::path::PathBuf;

#[derive(Debug, Args)]
pub struct DiffArgs {
    /// Database design currently deployed (JSON or YAML)
    #[arg(long, value_name = "FILE")]
    pub prev: PathBuf,
    /// Database design about to be deployed
    #[arg(long, value_name = "FILE")]
    pub curr: PathBuf,
}

pub fn handle_diff(args: &DiffArgs) -> Result<(), WorkerError> {
    let prev: DatabaseConfig = read_document(&args.prev)?;
    let curr: DatabaseConfig = read_document(&args.curr)?;
    println!("{}", render_diff(prev, curr)?);
    Ok(())
}

/// Change set as pretty JSON, or `null` when nothing changed.
pub fn render_diff(mut prev: DatabaseConfig, mut curr: DatabaseConfig) -> Result<String, WorkerError> {
    process_database(&mut prev).map_err(WorkerError::input)?;
    process_database(&mut curr).map_err(WorkerError::input)?;
    let changes = diff(Some(prev.models.as_slice()), &curr.models);
    serde_json::to_string_pretty(&changes).map_err(WorkerError::run)
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::types::DatabaseType;
    use pretty_assertions::assert_eq;
    use serde_json::Value;
    use std::fs;
    use test_utils::fixtures::{database, field, model};

    fn users(name: &str, updated: i64) -> DatabaseConfig {
        database(
            "db1",
            DatabaseType::PostgreSQL,
            vec![model("m1", "users")
                .field(field("f1", name, "text").updated(updated))
                .updated(updated)
                .build()],
        )
    }

    #[test]
    fn unchanged_designs_render_null() {
        let out = render_diff(users("name", 0), users("name", 0)).unwrap();
        assert_eq!(out, "null");
    }

    #[test]
    fn renamed_field_shows_up_in_the_change_set() {
        let out = render_diff(users("name", 0), users("fullName", 5)).unwrap();
        let value: Value = serde_json::from_str(&out).unwrap();
        let delta = &value["updated"][0]["fieldChanges"]["updated"][0];
        assert_eq!(delta["iid"], "f1");
        assert_eq!(delta["isNameChanged"], true);
        assert_eq!(delta["oldName"], "name");
    }

    #[test]
    fn reads_yaml_and_json_designs() {
        let dir = tempfile::tempdir().unwrap();
        let json = dir.path().join("prev.json");
        let yaml = dir.path().join("curr.yaml");
        fs::write(&json, serde_json::to_string(&users("name", 0)).unwrap()).unwrap();
        fs::write(&yaml, serde_yaml::to_string(&users("name", 0)).unwrap()).unwrap();

        let prev: DatabaseConfig = read_document(&json).unwrap();
        let curr: DatabaseConfig = read_document(&yaml).unwrap();
        assert_eq!(prev, curr);

        let args = DiffArgs {
            prev: json,
            curr: yaml,
        };
        handle_diff(&args).unwrap();
    }

    #[test]
    fn missing_file_is_an_input_error() {
        let err = read_document::<DatabaseConfig>(std::path::Path::new("/nonexistent/design.json"))
            .unwrap_err();
        assert!(matches!(err, WorkerError::Input { .. }));
    }
}
