/// PostgreSQL plumbing for the remote storage backend
///
/// # Modules
///
/// - `pool`: connection pool creation and health checks
/// - `migrations`: schema migrations for the `tasks`, `subtasks` and
///   `interruption_tasks` tables
///
/// # Example
///
/// ```no_run
/// use tasktimer_shared::db::migrations::run_migrations;
/// use tasktimer_shared::db::pool::{create_pool, DatabaseConfig};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let pool = create_pool(DatabaseConfig::from_url(std::env::var("DATABASE_URL")?)).await?;
///     run_migrations(&pool).await?;
///     Ok(())
/// }
/// ```

pub mod migrations;
pub mod pool;
