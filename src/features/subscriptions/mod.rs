/// サブスクリプション機能モジュール
///
/// このモジュールは、サブスクリプション管理に関連するすべての機能を提供します：
/// - 年月（MM-YYYY）の変換
/// - サブスクリプションの作成、取得、更新、削除
/// - 条件付き一覧取得（部分一致・所有者・ページング）
/// - 期間内の合計金額の計算
pub mod handlers;
pub mod models;
pub mod month_year;
pub mod predicate;
pub mod repository;
pub mod service;


// 公開インターフェース
pub use models::{
    CostWindowFilter, CreateSubscriptionDto, ListFilter, RowScanMode, Subscription,
    UpdateSubscriptionDto, WriteOutcome,
};
pub use month_year::MonthYear;
pub use predicate::{build_list_predicate, build_total_cost_predicate, Predicate, QueryParam};
pub use service::{
    create_subscription, delete_subscription, get_subscription, list_subscriptions, total_cost,
    update_subscription,
};
