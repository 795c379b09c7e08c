//! 本地数据集只读巡检工具
//!
//! 独立于采集管道：打开一个 SQLite 数据集库，列出其中的表并
//! 逐表打印行数与内容预览。只读访问，不做任何写入。

use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Column, Row};

const PREVIEW_ROWS: u32 = 20;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .init();

    let path = std::env::args()
        .nth(1)
        .context("usage: cohort-inspect <dataset.sqlite3>")?;

    let options = SqliteConnectOptions::new()
        .filename(&path)
        .read_only(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await
        .with_context(|| format!("failed to open {}", path))?;

    let tables: Vec<String> =
        sqlx::query_scalar("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name")
            .fetch_all(&pool)
            .await?;

    if tables.is_empty() {
        println!("{}: no tables", path);
        return Ok(());
    }

    for table in tables {
        let count: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM \"{}\"", table))
            .fetch_one(&pool)
            .await?;
        println!("== {} ({} rows)", table, count);

        let rows = sqlx::query(&format!("SELECT * FROM \"{}\" LIMIT {}", table, PREVIEW_ROWS))
            .fetch_all(&pool)
            .await?;
        for row in &rows {
            let rendered: Vec<String> = row
                .columns()
                .iter()
                .map(|column| format!("{}={}", column.name(), render_value(row, column.ordinal())))
                .collect();
            println!("  {}", rendered.join("  "));
        }
        if count > rows.len() as i64 {
            println!("  ... {} more rows", count - rows.len() as i64);
        }
    }

    Ok(())
}

/// SQLite 列是动态类型的，按整型、浮点、文本的顺序尝试解码
fn render_value(row: &SqliteRow, index: usize) -> String {
    if let Ok(value) = row.try_get::<Option<i64>, _>(index) {
        return value.map_or_else(|| "NULL".to_string(), |v| v.to_string());
    }
    if let Ok(value) = row.try_get::<Option<f64>, _>(index) {
        return value.map_or_else(|| "NULL".to_string(), |v| v.to_string());
    }
    if let Ok(value) = row.try_get::<Option<String>, _>(index) {
        return value.unwrap_or_else(|| "NULL".to_string());
    }
    "<blob>".to_string()
}
