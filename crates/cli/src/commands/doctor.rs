//! `spendwise doctor`: check config, database and provider reachability.

use spendwise_config::AppConfig;
use spendwise_core::provider::Provider;
use std::path::Path;

/// One diagnostic line.
#[derive(Debug, PartialEq, Eq)]
pub enum Check {
    Pass(String),
    Fail(String),
}

impl Check {
    fn failed(&self) -> bool {
        matches!(self, Check::Fail(_))
    }
}

pub async fn run(path: Option<&Path>) -> anyhow::Result<()> {
    println!("Spendwise doctor");
    println!("================\n");

    let checks = diagnose(path, None).await;
    for check in &checks {
        match check {
            Check::Pass(msg) => println!("  ok    {msg}"),
            Check::Fail(msg) => println!("  FAIL  {msg}"),
        }
    }

    let issues = checks.iter().filter(|c| c.failed()).count();
    println!();
    if issues == 0 {
        println!("All checks passed.");
        Ok(())
    } else {
        anyhow::bail!("{issues} issue(s) found")
    }
}

/// Run every check. `provider` replaces the configured one when given.
pub async fn diagnose(path: Option<&Path>, provider: Option<&dyn Provider>) -> Vec<Check> {
    let mut checks = Vec::new();

    let config = match AppConfig::load_with(path) {
        Ok(config) => {
            checks.push(Check::Pass("Config valid".into()));
            config
        }
        Err(e) => {
            checks.push(Check::Fail(format!("Config invalid: {e}")));
            return checks;
        }
    };

    if config.users.is_empty() {
        checks.push(Check::Fail("No [[users]] configured; the API will reject every token".into()));
    } else {
        checks.push(Check::Pass(format!("{} user(s) configured", config.users.len())));
    }

    match spendwise_store::open(&config.database.url).await {
        Ok(_) => checks.push(Check::Pass(format!("Database {} opened", config.database.url))),
        Err(e) => checks.push(Check::Fail(format!("Database {}: {e}", config.database.url))),
    }

    let built;
    let provider = match provider {
        Some(p) => p,
        None => match spendwise_providers::build_from_config(&config) {
            Ok(p) => {
                built = p;
                built.as_ref()
            }
            Err(e) => {
                checks.push(Check::Fail(format!("Provider not usable: {e}")));
                return checks;
            }
        },
    };

    match provider.health_check().await {
        Ok(true) => checks.push(Check::Pass(format!("Provider {} reachable", provider.name()))),
        Ok(false) => checks.push(Check::Fail(format!(
            "Provider {} rejected the health check",
            provider.name()
        ))),
        Err(e) => checks.push(Check::Fail(format!("Provider {}: {e}", provider.name()))),
    }

    checks
}
