//! `pup activity` subcommands.

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

    let activity = ctx.service.add_activity(record).await?;
    println!("{}", activity.id().unwrap_or_default());
    Ok(())
}

pub async fn run_list(
    dog_id: Option<&str>,
    as_json: bool,
    db_path: Option<PathBuf>,
) -> Result<(), CliError> {
    let ctx = open_context(db_path).await?;
    let mut activities = match dog_id {
        Some(dog_id) => ctx.service.fetch_activities_for_dog(dog_id).await?,
        None => ctx.service.fetch_activities(&ctx.user_id).await?,
    };

    sort_by_date_desc(&mut activities);
    print_records(&activities, &["date", "type", "dogId", "notes"], as_json)
}
