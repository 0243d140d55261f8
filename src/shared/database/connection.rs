use crate::shared::errors::{AppError, AppResult};
use rusqlite::functions::FunctionFlags;
use rusqlite::Connection;
use std::path::Path;

/// Unicode対応の小文字化を行うSQL関数名（組み込みの`lower`はASCIIのみ）
pub const UNICODE_LOWER_FUNCTION: &str = "unicode_lower";

/// データベース接続を初期化し、スキーマを作成する
///
/// # 引数
/// * `database_path` - データベースファイルのパス
///
/// # 戻り値
/// データベース接続、または失敗時はエラー
///
/// # 処理内容
/// 1. 親ディレクトリの確保
/// 2. データベース接続の開設
/// 3. テーブルとインデックスの作成
pub fn initialize_database(database_path: &Path) -> AppResult<Connection> {
    if let Some(parent) = database_path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent).map_err(|e| {
                AppError::configuration(format!("データディレクトリの作成に失敗: {e}"))
            })?;
            log::info!("データディレクトリを作成: {parent:?}");
        }
    }

    let is_first_run = !database_path.exists();

    let conn = Connection::open(database_path)?;
    create_tables(&conn)?;

    if is_first_run {
        log::info!("新規データベースを作成しました: {database_path:?}");
    } else {
        log::info!("既存のデータベースを使用します: {database_path:?}");
    }

    Ok(conn)
}

/// データベーステーブルを作成する
///
/// 既に存在する場合は何もしない。
///
/// # 引数
/// * `conn` - データベース接続
///
/// # 戻り値
/// 成功時はOk(())、失敗時はエラー
pub fn create_tables(conn: &Connection) -> AppResult<()> {
    register_functions(conn)?;
    create_subscriptions_table(conn)?;
    create_indexes(conn)?;
    Ok(())
}

/// 接続にアプリケーション定義のSQL関数を登録する
///
/// 関数は接続単位で登録されるため、接続を開くたびに呼び出す必要がある。
///
/// # 引数
/// * `conn` - データベース接続
///
/// # 戻り値
/// 成功時はOk(())、失敗時はエラー
pub fn register_functions(conn: &Connection) -> AppResult<()> {
    conn.create_scalar_function(
        UNICODE_LOWER_FUNCTION,
        1,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| {
            let value: Option<String> = ctx.get(0)?;
            Ok(value.map(|text| text.to_lowercase()))
        },
    )?;

    Ok(())
}

/// サブスクリプションテーブルを作成する
fn create_subscriptions_table(conn: &Connection) -> AppResult<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS subscriptions (
            id TEXT PRIMARY KEY,
            service_name TEXT NOT NULL,
            price INTEGER NOT NULL CHECK (price >= 0 AND price <= 2147483647),
            owner_id TEXT NOT NULL,
            start_period TEXT NOT NULL,
            end_period TEXT CHECK (end_period IS NULL OR end_period >= start_period),
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )",
        [],
    )?;

    Ok(())
}

/// インデックスを作成する
fn create_indexes(conn: &Connection) -> AppResult<()> {
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_subscriptions_owner ON subscriptions(owner_id)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_subscriptions_service ON subscriptions(service_name)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_subscriptions_start ON subscriptions(start_period)",
        [],
    )?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn column_names(conn: &Connection) -> Vec<String> {
        let mut stmt = conn.prepare("PRAGMA table_info(subscriptions)").unwrap();
        stmt.query_map([], |row| row.get::<_, String>(1))
            .unwrap()
            .collect::<Result<Vec<_>, _>>()
            .unwrap()
    }

    #[test]
    fn test_create_tables() {
        let conn = Connection::open_in_memory().unwrap();
        create_tables(&conn).unwrap();

        assert_eq!(
            column_names(&conn),
            vec![
                "id",
                "service_name",
                "price",
                "owner_id",
                "start_period",
                "end_period",
                "created_at",
                "updated_at"
            ]
        );
    }

    #[test]
    fn test_create_tables_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        create_tables(&conn).unwrap();
        assert!(create_tables(&conn).is_ok());
    }

    #[test]
    fn test_check_constraints() {
        let conn = Connection::open_in_memory().unwrap();
        create_tables(&conn).unwrap();

        let negative_price = conn.execute(
            "INSERT INTO subscriptions VALUES ('a', 'Netflix', -1, 'o', '2025-01-01', NULL, 't', 't')",
            [],
        );
        assert!(negative_price.is_err());

        let inverted_range = conn.execute(
            "INSERT INTO subscriptions VALUES ('b', 'Netflix', 1, 'o', '2025-05-01', '2025-04-01', 't', 't')",
            [],
        );
        assert!(inverted_range.is_err());

        let too_expensive = conn.execute(
            "INSERT INTO subscriptions VALUES ('c', 'Netflix', 2147483648, 'o', '2025-01-01', NULL, 't', 't')",
            [],
        );
        assert!(too_expensive.is_err());
    }

    #[test]
    fn test_unicode_lower_function() {
        let conn = Connection::open_in_memory().unwrap();
        create_tables(&conn).unwrap();

        let lowered: String = conn
            .query_row("SELECT unicode_lower('Яндекс ÄRZTE Plus')", [], |row| row.get(0))
            .unwrap();
        assert_eq!(lowered, "яндекс ärzte plus");

        let null: Option<String> = conn
            .query_row("SELECT unicode_lower(NULL)", [], |row| row.get(0))
            .unwrap();
        assert!(null.is_none());
    }

    #[test]
    fn test_initialize_database_creates_directory_and_file() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("nested").join("test.db");

        let conn = initialize_database(&db_path).unwrap();
        assert!(db_path.exists());
        assert_eq!(column_names(&conn).len(), 8);
        drop(conn);

        // 既存ファイルでも再初期化できる
        assert!(initialize_database(&db_path).is_ok());
    }
}
