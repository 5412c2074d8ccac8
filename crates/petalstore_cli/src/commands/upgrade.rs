//! Upgrade command implementation.

use petalstore_core::{shop, DatabaseFactory, MigrationPlan, SchemaUpgrader, UpgradeReport};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Applies the shop migration plan, optionally stopping at `to`.
pub async fn run(
    path: &Path,
    name: &str,
    to: Option<u64>,
    dry_run: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    info!("Upgrading {} in {:?}", name, path);

    let plan = shop::shop_plan()?;
    plan.validate()?;

    if dry_run {
        if let Some(max) = to {
            let last = plan.target_version().unwrap_or(0);
            if max > last {
                return Err(format!("version {} is past the plan's last step {}", max, last).into());
            }
        }
        let current = super::existing_only(path).version_of(name)?;
        let pending: Vec<_> = plan
            .pending(current)
            .into_iter()
            .filter(|m| to.map_or(true, |max| m.version <= max))
            .collect();

        if pending.is_empty() {
            println!("✓ {} is at version {}; nothing to apply.", name, current);
        } else {
            println!(
                "Dry run - would apply {} step(s) to {} (version {}):",
                pending.len(),
                name,
                current
            );
            for migration in &pending {
                println!("  v{}: {}", migration.version, migration.name);
            }
        }
        return Ok(());
    }

    let factory = Arc::new(DatabaseFactory::in_directory(path));
    let report = apply(factory, name, plan, to).await?;
    print_report(name, &report);
    Ok(())
}

/// Runs `plan` against database `name` of `factory`.
pub async fn apply(
    factory: Arc<DatabaseFactory>,
    name: &str,
    plan: MigrationPlan,
    to: Option<u64>,
) -> Result<UpgradeReport, Box<dyn std::error::Error>> {
    let upgrader = SchemaUpgrader::new(factory, name);
    Ok(upgrader.run_to(Arc::new(plan), to).await?)
}

fn print_report(name: &str, report: &UpgradeReport) {
    if !report.upgraded() {
        println!(
            "✓ {} is at version {}; nothing to apply.",
            name, report.old_version
        );
        return;
    }

    println!(
        "✓ Upgraded {} from version {} to {}",
        name, report.old_version, report.new_version
    );
    for step in &report.steps {
        println!("  v{}: {}", step.version, step.name);
        for change in &step.changes {
            println!("      {}", change);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn apply_stops_at_the_requested_version() {
        let dir = tempfile::tempdir().unwrap();
        let factory = Arc::new(DatabaseFactory::in_directory(dir.path()));

        let report = apply(Arc::clone(&factory), "shop", shop::shop_plan().unwrap(), Some(2))
            .await
            .unwrap();
        assert_eq!(report.new_version, 2);

        let report = apply(factory, "shop", shop::shop_plan().unwrap(), None)
            .await
            .unwrap();
        assert_eq!(report.old_version, 2);
        assert_eq!(report.new_version, 6);
    }

    #[tokio::test]
    async fn dry_run_creates_nothing() {
        let dir = tempfile::tempdir().unwrap();

        run(dir.path(), "shop", None, true).await.unwrap();

        let factory = DatabaseFactory::in_directory(dir.path());
        assert!(factory.database_names().unwrap().is_empty());
    }

    #[tokio::test]
    async fn apply_refuses_a_version_past_the_plan() {
        let dir = tempfile::tempdir().unwrap();
        let factory = Arc::new(DatabaseFactory::in_directory(dir.path()));

        let result = apply(Arc::clone(&factory), "shop", shop::shop_plan().unwrap(), Some(99)).await;

        assert!(result.is_err());
        assert_eq!(factory.version_of("shop").unwrap(), 0);
    }
}
