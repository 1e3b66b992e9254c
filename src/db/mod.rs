use std::time::Duration;

use anyhow::Context;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Sqlite, SqlitePool, Transaction};

pub mod row_parsers;

pub async fn init() -> anyhow::Result<SqlitePool> {
	let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL not set")?;

	let pool = SqlitePoolOptions::new()
		.max_connections(10)
		.min_connections(1)
		.acquire_timeout(Duration::from_secs(10))
		.connect(&database_url)
		.await
		.context("failed to connect to database")?;

	sqlx::migrate!()
		.run(&pool)
		.await
		.context("failed to run migrations")?;

	tracing::info!("database ready");

	Ok(pool)
}

/// Starts a transaction that takes SQLite's write lock on its first statement.
///
/// A deferred transaction that reads before it writes fails with SQLITE_BUSY,
/// without waiting, if another connection started writing in between.
pub async fn begin_write(pool: &SqlitePool) -> Result<Transaction<'static, Sqlite>, sqlx::Error> {
	let mut tx = pool.begin().await?;
	sqlx::query("UPDATE id_sequences SET value = value WHERE 0")
		.execute(&mut *tx)
		.await?;
	Ok(tx)
}

#[cfg(test)]
mod tests {
	use super::*;
	use sqlx::sqlite::SqliteConnectOptions;

	#[tokio::test]
	async fn second_writer_is_locked_out_until_commit() {
		let dir = tempfile::tempdir().unwrap();
		let opts = SqliteConnectOptions::new()
			.filename(dir.path().join("lock.db"))
			.create_if_missing(true)
			.busy_timeout(Duration::from_millis(100));
		let pool = SqlitePoolOptions::new()
			.max_connections(2)
			.connect_with(opts)
			.await
			.unwrap();
		sqlx::migrate!().run(&pool).await.unwrap();

		let first = begin_write(&pool).await.unwrap();

		let err = begin_write(&pool).await.unwrap_err();
		assert!(err.to_string().contains("locked"), "{err}");

		first.commit().await.unwrap();

		let next = begin_write(&pool).await.unwrap();
		next.rollback().await.unwrap();
	}
}
