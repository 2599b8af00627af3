//! `spendwise ask`: one assistant turn from the command line.

use crate::runtime;
use anyhow::Context;
use spendwise_config::AppConfig;
use spendwise_core::context::TurnContext;
use spendwise_core::expense::UserId;
use std::path::Path;

pub async fn run(
    path: Option<&Path>,
    user: i64,
    thread: Option<&str>,
    message: &str,
) -> anyhow::Result<()> {
    let config = AppConfig::load_with(path).context("Failed to load config")?;
    if !config.users.iter().any(|u| u.id == user) {
        eprintln!("Warning: user {user} is not in the config; tools will report it unknown.");
    }

    let rt = runtime::build(&config).await?;
    let ctx = TurnContext::for_caller(Some(UserId(user)), thread);

    eprint!("Thinking...");
    let result = rt.controller.run(&ctx, message).await;
    eprint!("\r           \r");

    let outcome = result.context("Assistant turn failed")?;
    println!("{}", outcome.reply);
    Ok(())
}
