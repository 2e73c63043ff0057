//! `pup health` subcommands.

use std::path::PathBuf;

use serde_json::json;

use crate::commands::common::{build_record, open_context, print_records, sort_by_date_desc, today};
use crate::error::CliError;

pub async fn run_add(
    dog_id: &str,
    record_type: &str,
    date: Option<&str>,
    notes: Option<&str>,
    db_path: Option<PathBuf>,
) -> Result<(), CliError> {
    let ctx = open_context(db_path).await?;
    let record = build_record(vec![
        ("userId", Some(json!(ctx.user_id))),
        ("dogId", Some(json!(dog_id))),
        ("type", Some(json!(record_type))),
        ("date", Some(json!(date.map_or_else(today, ToString::to_string)))),
        ("notes", notes.map(|n| json!(n))),
    ]);

    let entry = ctx.service.add_health_record(record).await?;
    println!("{}", entry.id().unwrap_or_default());
    Ok(())
}

pub async fn run_list(
    dog_id: Option<&str>,
    as_json: bool,
    db_path: Option<PathBuf>,
) -> Result<(), CliError> {
    let ctx = open_context(db_path).await?;
    let mut entries = match dog_id {
        Some(dog_id) => ctx.service.fetch_health_records_for_dog(dog_id).await?,
        None => ctx.service.fetch_health_records(&ctx.user_id).await?,
    };

    sort_by_date_desc(&mut entries);
    print_records(&entries, &["date", "type", "dogId", "notes"], as_json)
}
