use super::models::{
    validate_period_range, CostWindowFilter, CreateSubscriptionDto, ListFilter, Subscription,
    UpdateSubscriptionDto, WriteOutcome,
};
use super::repository;
use crate::shared::errors::{AppError, AppResult, ErrorSeverity};
use crate::shared::request_context::RequestContext;
use crate::AppState;
use chrono::Utc;
use rusqlite::Connection;
use std::sync::MutexGuard;
use uuid::Uuid;

/// サブスクリプションを作成する
///
/// # 引数
/// * `state` - アプリケーション状態
/// * `ctx` - リクエストコンテキスト
/// * `dto` - サブスクリプション作成用DTO
///
/// # 戻り値
/// 作成されたサブスクリプション、または失敗時はエラー
pub fn create_subscription(
    state: &AppState,
    ctx: &RequestContext,
    dto: CreateSubscriptionDto,
) -> AppResult<Subscription> {
    log::info!(
        "[{}] サブスクリプション作成開始: service_name={}",
        ctx.request_id(),
        dto.service_name
    );

    let result = insert_new(state, dto);

    match &result {
        Ok(subscription) => log::info!(
            "[{}] サブスクリプションを作成しました: id={}",
            ctx.request_id(),
            subscription.id
        ),
        Err(e) => log_failure(ctx, "サブスクリプション作成", e),
    }
    result
}

/// IDでサブスクリプションを取得する
///
/// # 引数
/// * `state` - アプリケーション状態
/// * `ctx` - リクエストコンテキスト
/// * `id` - サブスクリプションID
///
/// # 戻り値
/// サブスクリプション、または存在しない場合はNotFound
pub fn get_subscription(
    state: &AppState,
    ctx: &RequestContext,
    id: Uuid,
) -> AppResult<Subscription> {
    log::debug!("[{}] サブスクリプション取得: id={id}", ctx.request_id());

    let result = lock_db(state).and_then(|db| repository::find_by_id(&db, id));

    if let Err(e) = &result {
        log_failure(ctx, "サブスクリプション取得", e);
    }
    result
}

/// サブスクリプションを更新する
///
/// 存在しないIDはNotFoundとして扱う。開始月・所有者は変更されない。
///
/// # 引数
/// * `state` - アプリケーション状態
/// * `ctx` - リクエストコンテキスト
/// * `id` - サブスクリプションID
/// * `dto` - サブスクリプション更新用DTO
///
/// # 戻り値
/// 影響行数、または失敗時はエラー
pub fn update_subscription(
    state: &AppState,
    ctx: &RequestContext,
    id: Uuid,
    dto: UpdateSubscriptionDto,
) -> AppResult<WriteOutcome> {
    log::info!("[{}] サブスクリプション更新開始: id={id}", ctx.request_id());

    let result = update_existing(state, id, &dto);

    match &result {
        Ok(outcome) => log::info!(
            "[{}] サブスクリプションを更新しました: id={id}, rows_affected={}",
            ctx.request_id(),
            outcome.rows_affected
        ),
        Err(e) => log_failure(ctx, "サブスクリプション更新", e),
    }
    result
}

/// サブスクリプションを削除する
///
/// 存在しないIDでもエラーにはならない（影響行数0）。
///
/// # 引数
/// * `state` - アプリケーション状態
/// * `ctx` - リクエストコンテキスト
/// * `id` - サブスクリプションID
///
/// # 戻り値
/// 影響行数、または失敗時はエラー
pub fn delete_subscription(
    state: &AppState,
    ctx: &RequestContext,
    id: Uuid,
) -> AppResult<WriteOutcome> {
    log::info!("[{}] サブスクリプション削除開始: id={id}", ctx.request_id());

    let result = lock_db(state).and_then(|db| repository::delete(&db, id));

    match &result {
        Ok(outcome) if outcome.is_noop() => log::info!(
            "[{}] 削除対象のサブスクリプションがありませんでした: id={id}",
            ctx.request_id()
        ),
        Ok(_) => log::info!(
            "[{}] サブスクリプションを削除しました: id={id}",
            ctx.request_id()
        ),
        Err(e) => log_failure(ctx, "サブスクリプション削除", e),
    }
    result
}

/// サブスクリプション一覧を取得する
///
/// 行のデコードに失敗した場合の扱いは設定（LIST_ROW_SCAN）に従う。
///
/// # 引数
/// * `state` - アプリケーション状態
/// * `ctx` - リクエストコンテキスト
/// * `filter` - 一覧取得のフィルター
///
/// # 戻り値
/// サブスクリプションのリスト、または失敗時はエラー
pub fn list_subscriptions(
    state: &AppState,
    ctx: &RequestContext,
    filter: &ListFilter,
) -> AppResult<Vec<Subscription>> {
    log::debug!(
        "[{}] サブスクリプション一覧取得: limit={}, offset={}",
        ctx.request_id(),
        filter.limit,
        filter.offset
    );

    let result = lock_db(state)
        .and_then(|db| repository::list_with_mode(&db, filter, state.config.list_row_scan));

    match &result {
        Ok(subscriptions) => log::debug!(
            "[{}] サブスクリプション一覧を取得しました: {}件",
            ctx.request_id(),
            subscriptions.len()
        ),
        Err(e) => log_failure(ctx, "サブスクリプション一覧取得", e),
    }
    result
}

/// 期間内のサブスクリプション合計金額を計算する
///
/// # 引数
/// * `state` - アプリケーション状態
/// * `ctx` - リクエストコンテキスト
/// * `filter` - 期間内合計金額のフィルター
///
/// # 戻り値
/// 合計金額、または失敗時はエラー
pub fn total_cost(
    state: &AppState,
    ctx: &RequestContext,
    filter: &CostWindowFilter,
) -> AppResult<i64> {
    log::debug!(
        "[{}] 合計金額計算: {}〜{}",
        ctx.request_id(),
        filter.window_start,
        filter.window_end
    );

    let result = lock_db(state).and_then(|db| repository::total_cost(&db, filter));

    match &result {
        Ok(total) => log::debug!("[{}] 合計金額: {total}", ctx.request_id()),
        Err(e) => log_failure(ctx, "合計金額計算", e),
    }
    result
}

/// IDと監査タイムスタンプを採番して保存する
fn insert_new(state: &AppState, dto: CreateSubscriptionDto) -> AppResult<Subscription> {
    dto.validate()?;

    let now = current_timestamp(state);
    let subscription = Subscription {
        id: Uuid::new_v4(),
        service_name: dto.service_name,
        price: dto.price,
        owner_id: dto.owner_id,
        start_period: dto.start_period,
        end_period: dto.end_period,
        created_at: now.clone(),
        updated_at: now,
    };

    let db = lock_db(state)?;
    repository::create(&db, &subscription)?;
    Ok(subscription)
}

/// 既存レコードの開始月と照合してから更新する
fn update_existing(
    state: &AppState,
    id: Uuid,
    dto: &UpdateSubscriptionDto,
) -> AppResult<WriteOutcome> {
    dto.validate()?;

    let db = lock_db(state)?;
    let existing = repository::find_by_id(&db, id)?;
    validate_period_range(existing.start_period, dto.end_period)?;

    repository::update(&db, id, dto, &current_timestamp(state))
}

/// データベース接続のロックを取得する
fn lock_db(state: &AppState) -> AppResult<MutexGuard<'_, Connection>> {
    state
        .db
        .lock()
        .map_err(|e| AppError::concurrency(format!("データベースロックエラー: {e}")))
}

/// 設定されたタイムゾーンでの現在時刻（RFC3339形式）
fn current_timestamp(state: &AppState) -> String {
    Utc::now().with_timezone(&state.config.timezone).to_rfc3339()
}

fn log_failure(ctx: &RequestContext, operation: &str, error: &AppError) {
    match error.severity() {
        ErrorSeverity::Low => log::info!(
            "[{}] {operation}を中止しました: {}",
            ctx.request_id(),
            error.details()
        ),
        ErrorSeverity::Medium => log::warn!(
            "[{}] {operation}に失敗しました: {}",
            ctx.request_id(),
            error.details()
        ),
        ErrorSeverity::High => log::error!(
            "[{}] {operation}に失敗しました: {}",
            ctx.request_id(),
            error.details()
        ),
    }
}
