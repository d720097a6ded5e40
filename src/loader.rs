use crate::warehouse::{Value, Warehouse};
use anyhow::{Context, Result};
use tracing::info;

/// Builds `INSERT INTO table (a, b) VALUES (?1, ?2)`.
pub fn insert_statement(table: &str, columns: &[&str]) -> String {
    let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("?{i}")).collect();
    format!(
        "INSERT INTO {table} ({}) VALUES ({})",
        columns.join(", "),
        placeholders.join(", ")
    )
}

/// Inserts every row with a single batched statement, then commits.
///
/// The batch is all-or-nothing: one bad row fails the call and nothing from it is
/// committed. Returns the number of rows inserted.
pub fn load_rows<W: Warehouse + ?Sized>(
    wh: &mut W,
    table: &str,
    columns: &[&str],
    rows: &[Vec<Value>],
) -> Result<usize> {
    let sql = insert_statement(table, columns);
    let inserted = wh
        .execute_many(&sql, rows)
        .with_context(|| format!("Failed to load {} rows into {table}", rows.len()))?;
    wh.commit()
        .with_context(|| format!("Failed to commit {table}"))?;
    info!(table, rows = inserted, "Loaded");
    Ok(inserted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::warehouse::SqliteWarehouse;

    #[test]
    fn statement_has_one_placeholder_per_column() {
        assert_eq!(
            insert_statement("dim_city", &["city_name"]),
            "INSERT INTO dim_city (city_name) VALUES (?1)"
        );
        assert_eq!(
            insert_statement("t", &["a", "b", "c"]),
            "INSERT INTO t (a, b, c) VALUES (?1, ?2, ?3)"
        );
    }

    #[test]
    fn load_rows_commits() {
        let mut wh = SqliteWarehouse::open_in_memory().unwrap();
        wh.execute("CREATE TABLE t (a TEXT, b INTEGER)").unwrap();

        let rows = vec![
            vec![Value::from("x"), Value::Integer(1)],
            vec![Value::from("y"), Value::Null],
        ];
        assert_eq!(load_rows(&mut wh, "t", &["a", "b"], &rows).unwrap(), 2);

        let fetched = wh.fetch_all("SELECT a, b FROM t ORDER BY a").unwrap();
        assert_eq!(fetched, rows);
    }

    #[test]
    fn empty_batch_is_a_no_op() {
        let mut wh = SqliteWarehouse::open_in_memory().unwrap();
        wh.execute("CREATE TABLE t (a TEXT)").unwrap();
        assert_eq!(load_rows(&mut wh, "t", &["a"], &[]).unwrap(), 0);
    }

    #[test]
    fn failure_names_the_table() {
        let mut wh = SqliteWarehouse::open_in_memory().unwrap();
        let err = load_rows(&mut wh, "missing", &["a"], &[vec![Value::from("x")]]).unwrap_err();
        assert!(err.to_string().contains("missing"));
    }
}
