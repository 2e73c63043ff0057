//! `pup vaccination` subcommands.

use std::path::PathBuf;

use serde_json::json;

use crate::commands::common::{build_record, open_context, print_records, sort_by_date_desc, today};
use crate::error::CliError;

pub async fn run_add(
    dog_id: &str,
    vaccine: &str,
    date: Option<&str>,
    db_path: Option<PathBuf>,
) -> Result<(), CliError> {
    let vaccine = vaccine.trim();
    if vaccine.is_empty() {
        return Err(CliError::InvalidArgument(
            "vaccine name cannot be empty".into(),
        ));
    }

    let ctx = open_context(db_path).await?;
    let record = build_record(vec![
        ("userId", Some(json!(ctx.user_id))),
        ("dogId", Some(json!(dog_id))),
        ("vaccine", Some(json!(vaccine))),
        ("date", Some(json!(date.map_or_else(today, ToString::to_string)))),
    ]);

    let vaccination = ctx.service.add_vaccination(record).await?;
    println!("{}", vaccination.id().unwrap_or_default());
    Ok(())
}

pub async fn run_list(
    dog_id: Option<&str>,
    as_json: bool,
    db_path: Option<PathBuf>,
) -> Result<(), CliError> {
    let ctx = open_context(db_path).await?;
    let mut vaccinations = match dog_id {
        Some(dog_id) => ctx.service.fetch_vaccinations_for_dog(dog_id).await?,
        None => ctx.service.fetch_vaccinations(&ctx.user_id).await?,
    };

    sort_by_date_desc(&mut vaccinations);
    print_records(&vaccinations, &["date", "vaccine", "dogId"], as_json)
}
