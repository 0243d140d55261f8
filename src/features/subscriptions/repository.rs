use super::models::{
    CostWindowFilter, ListFilter, RowScanMode, Subscription, UpdateSubscriptionDto, WriteOutcome,
};
use super::predicate::{build_list_predicate, build_total_cost_predicate};
use crate::shared::errors::{AppError, AppResult};
use rusqlite::types::Type;
use rusqlite::{params, params_from_iter, Connection, Row};
use uuid::Uuid;

const SELECT_COLUMNS: &str = "SELECT id, service_name, price, owner_id, start_period, end_period, created_at, updated_at
         FROM subscriptions";

/// サブスクリプションを作成する
///
/// IDと監査タイムスタンプは呼び出し側で設定済みであること。
///
/// # 引数
/// * `conn` - データベース接続
/// * `subscription` - 保存するサブスクリプション
///
/// # 戻り値
/// 成功時はOk(())、制約違反や接続エラーの場合は永続化エラー
pub fn create(conn: &Connection, subscription: &Subscription) -> AppResult<()> {
    subscription.validate()?;

    conn.execute(
        "INSERT INTO subscriptions (id, service_name, price, owner_id, start_period, end_period, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            subscription.id.to_string(),
            subscription.service_name,
            subscription.price,
            subscription.owner_id.to_string(),
            subscription.start_period,
            subscription.end_period,
            subscription.created_at,
            subscription.updated_at,
        ],
    )?;

    Ok(())
}

/// IDでサブスクリプションを取得する
///
/// # 引数
/// * `conn` - データベース接続
/// * `id` - サブスクリプションID
///
/// # 戻り値
/// サブスクリプション、該当なしの場合はNotFound、それ以外は永続化エラー
pub fn find_by_id(conn: &Connection, id: Uuid) -> AppResult<Subscription> {
    conn.query_row(
        &format!("{SELECT_COLUMNS} WHERE id = ?1"),
        params![id.to_string()],
        map_subscription_row,
    )
    .map_err(|e| match e {
        rusqlite::Error::QueryReturnedNoRows => {
            AppError::NotFound(format!("ID {id} のサブスクリプションが見つかりません"))
        }
        _ => AppError::from(e),
    })
}

/// サブスクリプションを更新する
///
/// 更新するのはサービス名・金額・終了月（と更新日時）のみ。
/// 該当行がなくてもエラーにはせず、影響行数0として返す。
///
/// # 引数
/// * `conn` - データベース接続
/// * `id` - サブスクリプションID
/// * `dto` - サブスクリプション更新用DTO
/// * `updated_at` - 更新日時（RFC3339形式）
///
/// # 戻り値
/// 影響行数、または失敗時はエラー
pub fn update(
    conn: &Connection,
    id: Uuid,
    dto: &UpdateSubscriptionDto,
    updated_at: &str,
) -> AppResult<WriteOutcome> {
    dto.validate()?;

    let rows_affected = conn.execute(
        "UPDATE subscriptions
         SET service_name = ?1, price = ?2, end_period = ?3, updated_at = ?4
         WHERE id = ?5",
        params![
            dto.service_name,
            dto.price,
            dto.end_period,
            updated_at,
            id.to_string()
        ],
    )?;

    Ok(WriteOutcome { rows_affected })
}

/// サブスクリプションを削除する
///
/// 該当行がなくてもエラーにはせず、影響行数0として返す。
///
/// # 引数
/// * `conn` - データベース接続
/// * `id` - サブスクリプションID
///
/// # 戻り値
/// 影響行数、または失敗時はエラー
pub fn delete(conn: &Connection, id: Uuid) -> AppResult<WriteOutcome> {
    let rows_affected = conn.execute(
        "DELETE FROM subscriptions WHERE id = ?1",
        params![id.to_string()],
    )?;

    Ok(WriteOutcome { rows_affected })
}

/// サブスクリプション一覧を取得する（デコードできない行は読み飛ばす）
///
/// # 引数
/// * `conn` - データベース接続
/// * `filter` - 一覧取得のフィルター
///
/// # 戻り値
/// サブスクリプションのリスト（該当なしの場合は空）、または失敗時はエラー
pub fn list(conn: &Connection, filter: &ListFilter) -> AppResult<Vec<Subscription>> {
    list_with_mode(conn, filter, RowScanMode::Lenient)
}

/// 行スキャンモードを指定してサブスクリプション一覧を取得する
///
/// 読み取りトランザクション内で実行する。ページングはLIMIT/OFFSETで行うため、
/// 別の接続からの挿入・削除によってページ境界の行がずれることはある。
///
/// # 引数
/// * `conn` - データベース接続
/// * `filter` - 一覧取得のフィルター
/// * `mode` - 行のデコードに失敗した場合の扱い
///
/// # 戻り値
/// サブスクリプションのリスト（該当なしの場合は空）、または失敗時はエラー
pub fn list_with_mode(
    conn: &Connection,
    filter: &ListFilter,
    mode: RowScanMode,
) -> AppResult<Vec<Subscription>> {
    filter.validate()?;

    let predicate = build_list_predicate(filter);
    let query = format!(
        "{SELECT_COLUMNS}{} ORDER BY rowid{}",
        predicate.where_clause(),
        predicate.pagination_clause()
    );
    log::debug!(
        "サブスクリプション一覧クエリ: {query} (引数{}件)",
        predicate.args().len()
    );

    let tx = conn.unchecked_transaction()?;

    let subscriptions = {
        let mut stmt = tx.prepare(&query)?;
        let mut rows = stmt.query(params_from_iter(predicate.args()))?;

        let mut subscriptions = Vec::new();
        let mut position = 0usize;
        // カーソルの進行エラーは伝播し、行のデコードエラーだけをモードに応じて扱う
        while let Some(row) = rows.next()? {
            position += 1;
            match map_subscription_row(row) {
                Ok(subscription) => subscriptions.push(subscription),
                Err(e) => match mode {
                    RowScanMode::Lenient => {
                        log::warn!("一覧取得で{position}行目のデコードに失敗したため読み飛ばします: {e}");
                    }
                    RowScanMode::Strict => {
                        return Err(AppError::persistence(format!(
                            "一覧取得で{position}行目のデコードに失敗しました: {e}"
                        )));
                    }
                },
            }
        }
        subscriptions
    };

    tx.commit()?;

    Ok(subscriptions)
}

/// 期間内のサブスクリプション合計金額を計算する
///
/// # 引数
/// * `conn` - データベース接続
/// * `filter` - 期間内合計金額のフィルター
///
/// # 戻り値
/// 合計金額（該当なしの場合は0）、または失敗時はエラー
pub fn total_cost(conn: &Connection, filter: &CostWindowFilter) -> AppResult<i64> {
    let predicate = build_total_cost_predicate(filter);
    let query = format!(
        "SELECT COALESCE(SUM(price), 0) FROM subscriptions{}",
        predicate.where_clause()
    );
    log::debug!(
        "合計金額クエリ: {query} (引数{}件)",
        predicate.args().len()
    );

    let total = conn.query_row(&query, params_from_iter(predicate.args()), |row| {
        row.get::<_, i64>(0)
    })?;

    Ok(total)
}

/// 行をサブスクリプションに変換する
fn map_subscription_row(row: &Row<'_>) -> rusqlite::Result<Subscription> {
    Ok(Subscription {
        id: uuid_column(row, 0)?,
        service_name: row.get(1)?,
        price: row.get(2)?,
        owner_id: uuid_column(row, 3)?,
        start_period: row.get(4)?,
        end_period: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

/// テキストで保存されたUUIDを読み出す
fn uuid_column(row: &Row<'_>, index: usize) -> rusqlite::Result<Uuid> {
    let raw: String = row.get(index)?;
    Uuid::parse_str(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(index, Type::Text, Box::new(e)))
}
