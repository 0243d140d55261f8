use super::month_year::MonthYear;
use crate::shared::errors::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

/// サービス名の最大文字数
pub const MAX_SERVICE_NAME_LENGTH: usize = 100;

/// 金額の上限（集計時の整数オーバーフローを防ぐ）
pub const MAX_PRICE: i64 = i32::MAX as i64;

/// 一覧取得時の既定の取得件数
pub const DEFAULT_LIST_LIMIT: i64 = 10;

/// サブスクリプションデータモデル
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Subscription {
    pub id: Uuid,                       // 作成時に採番、以後不変
    pub service_name: String,           // サービス名、空文字不可
    pub price: i64,                     // 月額（最小通貨単位）、0以上
    pub owner_id: Uuid,                 // 契約ユーザーID、以後不変
    pub start_period: MonthYear,        // 課金開始月（含む）
    pub end_period: Option<MonthYear>,  // 課金終了月、Noneは継続中
    pub created_at: String,             // RFC3339形式
    pub updated_at: String,             // RFC3339形式
}

impl Subscription {
    /// エンティティの不変条件を検証する
    ///
    /// # 戻り値
    /// 検証成功時はOk(())、失敗時はバリデーションエラー
    pub fn validate(&self) -> AppResult<()> {
        validate_service_name(&self.service_name)?;
        validate_price(self.price)?;
        validate_period_range(self.start_period, self.end_period)
    }
}

/// サブスクリプション作成用DTO
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CreateSubscriptionDto {
    pub service_name: String,
    pub price: i64,
    #[serde(alias = "user_id")]
    pub owner_id: Uuid,
    #[serde(alias = "start_date")]
    pub start_period: MonthYear,
    #[serde(default, alias = "end_date")]
    pub end_period: Option<MonthYear>,
}

impl CreateSubscriptionDto {
    /// 作成内容を検証する
    pub fn validate(&self) -> AppResult<()> {
        validate_service_name(&self.service_name)?;
        validate_price(self.price)?;
        validate_period_range(self.start_period, self.end_period)
    }
}

/// サブスクリプション更新用DTO
///
/// 更新できるのはサービス名・金額・終了月のみ。開始月と所有者は作成後に変更できない。
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct UpdateSubscriptionDto {
    pub service_name: String,
    pub price: i64,
    #[serde(default, alias = "end_date")]
    pub end_period: Option<MonthYear>,
}

impl UpdateSubscriptionDto {
    /// 更新内容を検証する（開始月との前後関係は既存レコードと照合して別途検証する）
    pub fn validate(&self) -> AppResult<()> {
        validate_service_name(&self.service_name)?;
        validate_price(self.price)
    }
}

/// 一覧取得のフィルター
///
/// 2つの数値は位置で意味が決まる。1番目は取得件数の上限（LIMIT）、
/// 2番目は読み飛ばす件数（OFFSET）にそのまま束縛される。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListFilter {
    /// サービス名の部分一致（大文字小文字を区別しない）。空文字はフィルターなし
    pub service_name: Option<String>,
    /// 所有者IDの完全一致
    pub owner_id: Option<Uuid>,
    pub limit: i64,
    pub offset: i64,
}

impl Default for ListFilter {
    fn default() -> Self {
        Self {
            service_name: None,
            owner_id: None,
            limit: DEFAULT_LIST_LIMIT,
            offset: 0,
        }
    }
}

impl ListFilter {
    /// ページング値を検証する
    pub fn validate(&self) -> AppResult<()> {
        if self.limit < 0 {
            return Err(AppError::validation("limitは0以上である必要があります"));
        }
        if self.offset < 0 {
            return Err(AppError::validation("offsetは0以上である必要があります"));
        }
        Ok(())
    }
}

/// 期間内合計金額のフィルター
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CostWindowFilter {
    /// サービス名の完全一致。空文字はフィルターなし
    pub service_name: Option<String>,
    /// 所有者IDの完全一致
    pub owner_id: Option<Uuid>,
    /// 集計期間の開始月（必須）
    pub window_start: MonthYear,
    /// 集計期間の終了月（必須）
    pub window_end: MonthYear,
}

/// 更新・削除の結果
///
/// 0件更新は成功と区別しない。存在保証が必要な呼び出し側は件数を確認する。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WriteOutcome {
    pub rows_affected: usize,
}

impl WriteOutcome {
    /// 対象行が存在しなかったかどうか
    pub fn is_noop(&self) -> bool {
        self.rows_affected == 0
    }
}

/// 一覧取得で行のデコードに失敗した場合の扱い
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RowScanMode {
    /// デコードできない行を読み飛ばして続行する
    #[default]
    Lenient,
    /// デコードできない行があれば一覧取得全体を失敗させる
    Strict,
}

impl FromStr for RowScanMode {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "lenient" => Ok(RowScanMode::Lenient),
            "strict" => Ok(RowScanMode::Strict),
            other => Err(AppError::configuration(format!(
                "行スキャンモードは'lenient'または'strict'である必要があります: {other}"
            ))),
        }
    }
}

/// サービス名のバリデーション
fn validate_service_name(service_name: &str) -> AppResult<()> {
    if service_name.trim().is_empty() {
        return Err(AppError::validation("サービス名を入力してください"));
    }
    if service_name.chars().count() > MAX_SERVICE_NAME_LENGTH {
        return Err(AppError::validation(format!(
            "サービス名は{MAX_SERVICE_NAME_LENGTH}文字以内で入力してください"
        )));
    }
    Ok(())
}

/// 金額のバリデーション
fn validate_price(price: i64) -> AppResult<()> {
    if price < 0 {
        return Err(AppError::validation("金額は0以上である必要があります"));
    }
    if price > MAX_PRICE {
        return Err(AppError::validation(format!(
            "金額は{MAX_PRICE}以下である必要があります"
        )));
    }
    Ok(())
}

/// 開始月と終了月の前後関係のバリデーション
pub(crate) fn validate_period_range(
    start_period: MonthYear,
    end_period: Option<MonthYear>,
) -> AppResult<()> {
    if let Some(end) = end_period {
        if end < start_period {
            return Err(AppError::validation(format!(
                "終了月（{end}）は開始月（{start_period}）以降である必要があります"
            )));
        }
    }
    Ok(())
}
