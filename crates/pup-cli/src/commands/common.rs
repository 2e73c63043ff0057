//! Shared context and helpers for CLI commands.

use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use pup_core::config::{RemoteConfig, ServiceConfig};
use pup_core::connectivity::ConnectivityMonitor;
use pup_core::db::Database;
use pup_core::remote::{HttpRemoteStore, MemoryRemoteStore, RemoteStore};
use pup_core::{DataService, Record};
use serde_json::Value;

use crate::error::CliError;

/// Everything a command needs: the facade, the acting user, and whether a
/// remote endpoint is configured at all.
pub struct CliContext {
    pub service: Arc<DataService>,
    pub connectivity: Arc<ConnectivityMonitor>,
    pub user_id: String,
    pub remote_configured: bool,
}

/// Open the data service from CLI/env configuration.
///
/// With `PUP_REMOTE_URL` set, the service talks to the hosted document API
/// and starts optimistically online (a failing request downgrades writes to
/// the queue). Without it, the CLI runs local-only: the monitor stays
/// offline and every mutation queues durably.
pub async fn open_context(db_path: Option<PathBuf>) -> Result<CliContext, CliError> {
    let user_id = env::var("PUP_USER_ID")
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| "local-user".to_string());

    let db_path = resolve_db_path(db_path);
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let db = Database::open(&db_path).await?;

    let (remote, connectivity, remote_configured): (Arc<dyn RemoteStore>, _, _) =
        match remote_config_from_env()? {
            Some(config) => {
                tracing::debug!("Using remote document API at {}", config.endpoint);
                let store = HttpRemoteStore::new(config).map_err(pup_core::Error::from)?;
                (
                    Arc::new(store),
                    Arc::new(ConnectivityMonitor::new(true)),
                    true,
                )
            }
            None => {
                tracing::debug!("No remote configured; running local-only");
                (
                    Arc::new(MemoryRemoteStore::new()),
                    Arc::new(ConnectivityMonitor::new(false)),
                    false,
                )
            }
        };

    let service = Arc::new(DataService::new(
        db,
        remote,
        Arc::clone(&connectivity),
        ServiceConfig::default(),
    ));

    Ok(CliContext {
        service,
        connectivity,
        user_id,
        remote_configured,
    })
}

fn remote_config_from_env() -> Result<Option<RemoteConfig>, CliError> {
    let Some(url) = env::var("PUP_REMOTE_URL")
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
    else {
        return Ok(None);
    };

    let mut config = RemoteConfig::new(url)?;
    if let Ok(token) = env::var("PUP_REMOTE_TOKEN") {
        config = config.with_auth_token(token);
    }
    Ok(Some(config))
}

fn resolve_db_path(cli_db_path: Option<PathBuf>) -> PathBuf {
    cli_db_path
        .or_else(|| env::var_os("PUP_DB_PATH").map(PathBuf::from))
        .unwrap_or_else(default_db_path)
}

fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("pup")
        .join("pup.db")
}

/// Today's date in the `YYYY-MM-DD` form records carry.
pub fn today() -> String {
    chrono::Utc::now().format("%Y-%m-%d").to_string()
}

/// Build a record from (key, value) pairs, skipping `None` values.
pub fn build_record(fields: Vec<(&str, Option<Value>)>) -> Record {
    let mut record = Record::new();
    for (key, value) in fields {
        if let Some(value) = value {
            record.set(key, value);
        }
    }
    record
}

/// Render records as one line each: a short id column plus selected fields.
pub fn format_record_lines(records: &[Record], fields: &[&str]) -> Vec<String> {
    records
        .iter()
        .map(|record| {
            let id = record.id().unwrap_or("-");
            let short_id = id.chars().take(13).collect::<String>();
            let mut parts = vec![format!("{short_id:<13}")];
            for field in fields {
                let rendered = match record.get(field) {
                    Some(Value::String(s)) => s.clone(),
                    Some(other) => other.to_string(),
                    None => "-".to_string(),
                };
                parts.push(format!("{rendered:<12}"));
            }
            parts.join("  ").trim_end().to_string()
        })
        .collect()
}

/// Print records either as lines or as pretty JSON.
pub fn print_records(records: &[Record], fields: &[&str], as_json: bool) -> Result<(), CliError> {
    if as_json {
        println!("{}", serde_json::to_string_pretty(records)?);
    } else {
        for line in format_record_lines(records, fields) {
            println!("{line}");
        }
    }
    Ok(())
}

/// Sort records newest-first by their `date` field; order within equal
/// dates is unspecified, matching the store's contract.
pub fn sort_by_date_desc(records: &mut [Record]) {
    records.sort_by(|a, b| {
        let a_date = a.str_field("date").unwrap_or("");
        let b_date = b.str_field("date").unwrap_or("");
        b_date.cmp(a_date)
    });
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    #[test]
    fn build_record_skips_missing_fields() {
        let record = build_record(vec![
            ("userId", Some(json!("u1"))),
            ("name", Some(json!("Rex"))),
            ("breed", None),
        ]);

        assert_eq!(record.user_id(), Some("u1"));
        assert_eq!(record.str_field("name"), Some("Rex"));
        assert_eq!(record.get("breed"), None);
    }

    #[test]
    fn format_record_lines_shortens_ids_and_fills_gaps() {
        let record = Record::from_value(json!({
            "id": "srv-12345678901234567890",
            "name": "Rex"
        }))
        .unwrap();

        let lines = format_record_lines(&[record], &["name", "breed"]);
        assert_eq!(lines.len(), 1);
        assert!(lines[0].starts_with("srv-123456789"));
        assert!(lines[0].contains("Rex"));
        assert!(lines[0].contains('-'));
    }

    #[test]
    fn sort_by_date_desc_orders_newest_first() {
        let mut records = vec![
            Record::from_value(json!({"id": "a", "date": "2026-01-01"})).unwrap(),
            Record::from_value(json!({"id": "b", "date": "2026-03-01"})).unwrap(),
            Record::from_value(json!({"id": "c"})).unwrap(),
        ];

        sort_by_date_desc(&mut records);

        assert_eq!(records[0].id(), Some("b"));
        assert_eq!(records[1].id(), Some("a"));
        assert_eq!(records[2].id(), Some("c"));
    }

    #[test]
    fn today_is_iso_shaped() {
        let today = today();
        assert_eq!(today.len(), 10);
        assert_eq!(today.chars().nth(4), Some('-'));
    }
}
