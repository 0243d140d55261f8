use super::models::{
    CostWindowFilter, CreateSubscriptionDto, ListFilter, UpdateSubscriptionDto, WriteOutcome,
};
use super::month_year::{MonthYear, INVALID_MONTH_YEAR};
use super::service;
use crate::shared::errors::{AppError, AppResult};
use crate::shared::request_context::RequestContext;
use crate::AppState;
use hyper::StatusCode;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

/// ハンドラーの処理結果（ステータスコードとJSON本文）
pub type HandlerResult = AppResult<(StatusCode, Value)>;

/// 期間内合計金額リクエストの本文
#[derive(Debug, Deserialize)]
struct TotalCostRequest {
    #[serde(default)]
    service_name: Option<String>,
    #[serde(default, alias = "user_id")]
    owner_id: Option<Uuid>,
    #[serde(default, alias = "start_date")]
    start_period: Option<MonthYear>,
    #[serde(default, alias = "end_date")]
    end_period: Option<MonthYear>,
}

impl TotalCostRequest {
    fn into_filter(self) -> AppResult<CostWindowFilter> {
        let window_start = self
            .start_period
            .ok_or_else(|| AppError::validation("集計開始月（start_period）は必須です"))?;
        let window_end = self
            .end_period
            .ok_or_else(|| AppError::validation("集計終了月（end_period）は必須です"))?;

        Ok(CostWindowFilter {
            service_name: self.service_name,
            owner_id: self.owner_id,
            window_start,
            window_end,
        })
    }
}

/// POST /api/subscriptions
pub fn create_subscription(state: &AppState, ctx: &RequestContext, body: &[u8]) -> HandlerResult {
    let dto: CreateSubscriptionDto = decode_body(body)?;
    let subscription = service::create_subscription(state, ctx, dto)?;
    Ok((StatusCode::CREATED, serde_json::to_value(subscription)?))
}

/// GET /api/subscriptions/{id}
pub fn get_subscription(state: &AppState, ctx: &RequestContext, raw_id: &str) -> HandlerResult {
    let id = parse_id(raw_id)?;
    let subscription = service::get_subscription(state, ctx, id)?;
    Ok((StatusCode::OK, serde_json::to_value(subscription)?))
}

/// PUT /api/subscriptions/{id}
pub fn update_subscription(
    state: &AppState,
    ctx: &RequestContext,
    raw_id: &str,
    body: &[u8],
) -> HandlerResult {
    let id = parse_id(raw_id)?;
    let dto: UpdateSubscriptionDto = decode_body(body)?;
    let outcome = service::update_subscription(state, ctx, id, dto)?;
    Ok((StatusCode::OK, write_outcome_body("更新しました", outcome)))
}

/// DELETE /api/subscriptions/{id}
pub fn delete_subscription(state: &AppState, ctx: &RequestContext, raw_id: &str) -> HandlerResult {
    let id = parse_id(raw_id)?;
    let outcome = service::delete_subscription(state, ctx, id)?;
    Ok((StatusCode::OK, write_outcome_body("削除しました", outcome)))
}

/// GET /api/subscriptions/list
pub fn list_subscriptions(
    state: &AppState,
    ctx: &RequestContext,
    query: Option<&str>,
) -> HandlerResult {
    let filter = parse_list_query(query.unwrap_or(""))?;
    let subscriptions = service::list_subscriptions(state, ctx, &filter)?;
    Ok((StatusCode::OK, json!({ "subscriptions": subscriptions })))
}

/// POST /api/subscriptions/total
pub fn total_cost(state: &AppState, ctx: &RequestContext, body: &[u8]) -> HandlerResult {
    let request: TotalCostRequest = decode_body(body)?;
    let filter = request.into_filter()?;
    let total = service::total_cost(state, ctx, &filter)?;
    Ok((StatusCode::OK, json!({ "total": total })))
}

/// リクエスト本文のJSONを復号する
///
/// 年月の値が不正な場合は形式エラー、それ以外の復号失敗はJSONエラーとして返す。
fn decode_body<T: DeserializeOwned>(body: &[u8]) -> AppResult<T> {
    serde_json::from_slice(body).map_err(|e| {
        if e.is_data() && e.to_string().starts_with(INVALID_MONTH_YEAR) {
            AppError::format(e.to_string())
        } else {
            AppError::Json(e)
        }
    })
}

fn parse_id(raw_id: &str) -> AppResult<Uuid> {
    Uuid::parse_str(raw_id)
        .map_err(|_| AppError::validation(format!("IDの形式が正しくありません: {raw_id}")))
}

fn write_outcome_body(action: &str, outcome: WriteOutcome) -> Value {
    json!({
        "message": format!("サブスクリプションを{action}"),
        "rows_affected": outcome.rows_affected,
    })
}

/// 一覧取得のクエリ文字列を解析する
///
/// 未知のキーは無視する。空のservice_nameはフィルターなしとして扱う。
///
/// # 引数
/// * `query` - `?` を除いたクエリ文字列
///
/// # 戻り値
/// 一覧取得のフィルター、または値が不正な場合はバリデーションエラー
fn parse_list_query(query: &str) -> AppResult<ListFilter> {
    let mut filter = ListFilter::default();

    for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
        match key.as_ref() {
            "service_name" => {
                filter.service_name = Some(value.into_owned()).filter(|v| !v.is_empty());
            }
            "owner_id" | "user_id" => {
                if !value.is_empty() {
                    filter.owner_id = Some(Uuid::parse_str(&value).map_err(|_| {
                        AppError::validation(format!("owner_idの形式が正しくありません: {value}"))
                    })?);
                }
            }
            "limit" => filter.limit = parse_integer("limit", &value)?,
            "offset" => filter.offset = parse_integer("offset", &value)?,
            _ => {}
        }
    }

    filter.validate()?;
    Ok(filter)
}

fn parse_integer(name: &str, value: &str) -> AppResult<i64> {
    value
        .parse::<i64>()
        .map_err(|_| AppError::validation(format!("{name}は整数で指定してください: {value}")))
}
