//! `pup dog` subcommands.

use std::path::PathBuf;

use serde_json::json;

use crate::commands::common::{build_record, open_context, print_records};
use crate::error::CliError;

pub async fn run_add(
    name: &str,
    breed: Option<&str>,
    weight: Option<f64>,
    db_path: Option<PathBuf>,
) -> Result<(), CliError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(CliError::InvalidArgument("dog name cannot be empty".into()));
    }

    let ctx = open_context(db_path).await?;
    let record = build_record(vec![
        ("userId", Some(json!(ctx.user_id))),
        ("name", Some(json!(name))),
        ("breed", breed.map(|b| json!(b))),
        ("weight", weight.map(|w| json!(w))),
    ]);

    let dog = ctx.service.add_dog(record).await?;
    println!("{}", dog.id().unwrap_or_default());
    Ok(())
}

pub async fn run_list(as_json: bool, db_path: Option<PathBuf>) -> Result<(), CliError> {
    let ctx = open_context(db_path).await?;
    let dogs = ctx.service.fetch_dogs(&ctx.user_id).await?;
    print_records(&dogs, &["name", "breed", "weight"], as_json)
}
