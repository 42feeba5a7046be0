use anyhow::Result;
use sea_orm::{ConnectionTrait, Database, DatabaseConnection, Schema};

pub mod entity;

const DEFAULT_DB_URL: &str = "sqlite://ggrevealer.db?mode=rwc";

pub async fn connect() -> Result<DatabaseConnection> {
    let url = std::env::var("DATABASE_URL").unwrap_or_else(|_| DEFAULT_DB_URL.to_string());
    connect_to(&url).await
}

pub async fn connect_to(url: &str) -> Result<DatabaseConnection> {
    let conn = Database::connect(url).await?;
    Ok(conn)
}

/// Creates the job tables when they do not exist yet. SQLite deployments
/// have no external migration step.
pub async fn init_schema(conn: &DatabaseConnection) -> Result<()> {
    let backend = conn.get_database_backend();
    let schema = Schema::new(backend);

    let mut statements = vec![
        schema.create_table_from_entity(entity::jobs::Entity),
        schema.create_table_from_entity(entity::job_files::Entity),
        schema.create_table_from_entity(entity::screenshots::Entity),
        schema.create_table_from_entity(entity::job_logs::Entity),
    ];
    for statement in &mut statements {
        statement.if_not_exists();
        conn.execute(backend.build(&*statement)).await?;
    }
    Ok(())
}
