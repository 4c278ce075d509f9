use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use sqlx::migrate::Migrator;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;

use rma_service::authz::Role;
use rma_service::events::verify_chain;
use rma_service::utils::normalize_email;

#[derive(Parser, Debug)]
#[command(author, version, about = "rma-service admin tool", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create an empty up/down migration pair with the provided name
    MakeMigration { name: String },
    /// Apply pending migrations
    MigrateRun,
    /// Show which migrations are applied
    MigrateStatus,
    /// Roll back the last applied migration
    MigrateRollback,
    /// Assign a role (USER, ADMIN, SUPERADMIN) to the user with this email
    SetRole { email: String, role: Role },
    /// Recompute the audit hash chain and report the first broken row
    VerifyAudit,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // containers may start the binary outside the crate root
    if dotenvy::dotenv().is_err() {
        let _ = dotenvy::from_path(Path::new(env!("CARGO_MANIFEST_DIR")).join(".env"));
    }

    match Cli::parse().command {
        Commands::MakeMigration { name } => {
            let path = make_migration_pair(&name)?;
            println!("Created migration: {}", path.display());
        }
        Commands::MigrateRun => {
            let pool = connect().await?;
            migrator().await?.run(&pool).await?;
            println!("Migrations applied");
        }
        Commands::MigrateStatus => {
            let pool = connect().await?;
            print_status(&pool, &migrator().await?).await?;
        }
        Commands::MigrateRollback => {
            let pool = connect().await?;
            migrator()
                .await?
                .undo(&pool, 1)
                .await
                .context("no migrations were rolled back")?;
            println!("Rolled back last migration");
        }
        Commands::SetRole { email, role } => {
            let pool = connect().await?;
            set_role(&pool, &email, role).await?;
            println!("{email} is now {role}");
        }
        Commands::VerifyAudit => {
            let pool = connect().await?;
            match verify_chain(&pool).await? {
                Ok(checked) => println!("audit chain intact ({checked} events)"),
                Err(broken) => anyhow::bail!(
                    "audit chain broken at seq {} (event {})",
                    broken.seq,
                    broken.event_id
                ),
            }
        }
    }

    Ok(())
}

fn make_migration_pair(name: &str) -> anyhow::Result<PathBuf> {
    let stem = format!("{}_{}", Utc::now().format("%Y%m%d%H%M%S"), migration_slug(name));
    let up = Path::new("migrations").join(format!("{stem}.up.sql"));
    let down = Path::new("migrations").join(format!("{stem}.down.sql"));

    if let Some(existing) = [&up, &down].into_iter().find(|p| p.exists()) {
        anyhow::bail!("migration already exists: {}", existing.display());
    }

    for (path, body) in [
        (&up, "-- Write your migration SQL here\n"),
        (&down, "-- Revert the matching .up.sql here\n"),
    ] {
        fs::write(path, body).with_context(|| format!("failed to create {}", path.display()))?;
    }

    Ok(up)
}

fn migration_slug(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            'a'..='z' | '0'..='9' | '_' => c,
            'A'..='Z' => c.to_ascii_lowercase(),
            _ => '_',
        })
        .collect()
}

async fn set_role(pool: &SqlitePool, email: &str, role: Role) -> anyhow::Result<()> {
    let result = sqlx::query("UPDATE users SET role = ?, updated_at = ? WHERE email = ?")
        .bind(role.as_str())
        .bind(Utc::now())
        .bind(normalize_email(email))
        .execute(pool)
        .await
        .context("failed to update role")?;

    if result.rows_affected() == 0 {
        anyhow::bail!("no user with email {email}");
    }

    Ok(())
}

async fn connect() -> anyhow::Result<SqlitePool> {
    let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL not set")?;
    SqlitePoolOptions::new()
        .max_connections(2)
        .connect(&database_url)
        .await
        .context("failed to connect to database")
}

async fn migrator() -> anyhow::Result<Migrator> {
    let local = Path::new("./migrations");
    let dir = if local.exists() {
        local.to_path_buf()
    } else {
        Path::new(env!("CARGO_MANIFEST_DIR")).join("migrations")
    };

    let shown = dir.display().to_string();
    Migrator::new(dir)
        .await
        .with_context(|| format!("failed to load migrations from {shown}"))
}

async fn print_status(pool: &SqlitePool, migrator: &Migrator) -> anyhow::Result<()> {
    let tracked: Option<String> =
        sqlx::query_scalar("SELECT name FROM sqlite_master WHERE type = 'table' AND name = '_sqlx_migrations'")
            .fetch_optional(pool)
            .await?;

    let applied: HashSet<i64> = match tracked {
        Some(_) => sqlx::query_scalar::<_, i64>("SELECT version FROM _sqlx_migrations WHERE success = 1")
            .fetch_all(pool)
            .await?
            .into_iter()
            .collect(),
        None => HashSet::new(),
    };

    println!("{:<8} {:<20} Name", "Status", "Version");
    for migration in migrator.iter().filter(|m| !m.migration_type.is_down_migration()) {
        let state = if applied.contains(&migration.version) { "applied" } else { "pending" };
        let name = match migration.description.trim() {
            "" => "unknown",
            desc => desc,
        };
        println!("{:<8} {:<20} {}", state, migration.version, name);
    }

    Ok(())
}
