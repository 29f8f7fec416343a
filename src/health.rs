use anyhow::Result;

use crate::store::postgres::DbPool;

pub async fn health_check(pool: &DbPool) -> Result<()> {
    sqlx::query("SELECT 1").execute(pool).await?;
    Ok(())
}
