//! `pup sync`, `pup status`, and `pup queue` commands.

use std::path::PathBuf;

use crate::commands::common::open_context;
use crate::error::CliError;

pub async fn run_sync(db_path: Option<PathBuf>) -> Result<(), CliError> {
    let ctx = open_context(db_path).await?;
    if !ctx.remote_configured {
        return Err(CliError::SyncNotConfigured);
    }

    if !ctx.service.refresh_connectivity().await {
        let pending = ctx.service.pending_op_count().await?;
        println!("Remote unreachable; {pending} operations remain queued");
        return Ok(());
    }

    let report = ctx.service.sync_now(&ctx.user_id).await?;
    println!(
        "Sync completed: {} pushed, {} pulled, {} dead-lettered",
        report.drain.committed, report.pulled, report.drain.dead_lettered
    );
    Ok(())
}

pub async fn run_status(db_path: Option<PathBuf>) -> Result<(), CliError> {
    let ctx = open_context(db_path).await?;

    let online = if ctx.remote_configured {
        ctx.service.refresh_connectivity().await
    } else {
        false
    };
    let pending = ctx.service.pending_op_count().await?;
    let dead = ctx.service.dead_letters().await?.len();

    println!("user:    {}", ctx.user_id);
    println!("remote:  {}", if ctx.remote_configured { "configured" } else { "not configured" });
    println!("online:  {online}");
    println!("pending: {pending}");
    println!("dead:    {dead}");
    Ok(())
}

pub async fn run_queue(dead: bool, db_path: Option<PathBuf>) -> Result<(), CliError> {
    let ctx = open_context(db_path).await?;

    if dead {
        let letters = ctx.service.dead_letters().await?;
        if letters.is_empty() {
            println!("No dead-lettered operations");
            return Ok(());
        }
        for letter in letters {
            println!(
                "{:<10}  {:<14}  {:<24}  {}",
                letter.kind.as_str(),
                letter.collection.as_str(),
                letter.doc_id,
                letter.reason
            );
        }
        return Ok(());
    }

    let pending = ctx.service.pending_op_count().await?;
    println!("{pending} operations pending sync");
    Ok(())
}
