use super::models::{CostWindowFilter, ListFilter};
use super::month_year::MonthYear;
use crate::shared::database::UNICODE_LOWER_FUNCTION;
use rusqlite::types::{ToSql, ToSqlOutput};

/// プレースホルダーに束縛する値
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryParam {
    Text(String),
    Integer(i64),
    Period(MonthYear),
}

impl ToSql for QueryParam {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        match self {
            QueryParam::Text(value) => value.to_sql(),
            QueryParam::Integer(value) => value.to_sql(),
            QueryParam::Period(value) => value.to_sql(),
        }
    }
}

/// 条件句と、その順番どおりに並んだ束縛値の組
///
/// 生成後は変更できない。条件句には `?1`, `?2`, ... の番号付きプレースホルダーのみが現れ、
/// 呼び出し側の値がSQL本文に埋め込まれることはない。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Predicate {
    conditions: Vec<String>,
    pagination: Option<String>,
    args: Vec<QueryParam>,
}

impl Predicate {
    /// 条件の一覧
    pub fn conditions(&self) -> &[String] {
        &self.conditions
    }

    /// 束縛値（プレースホルダー番号順）
    pub fn args(&self) -> &[QueryParam] {
        &self.args
    }

    /// WHERE句を取得する。条件がなければ空文字（全件一致）
    pub fn where_clause(&self) -> String {
        if self.conditions.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", self.conditions.join(" AND "))
        }
    }

    /// LIMIT/OFFSET句を取得する。ページングがなければ空文字
    pub fn pagination_clause(&self) -> &str {
        self.pagination.as_deref().unwrap_or("")
    }
}

/// 条件を順番に積み上げて `Predicate` を組み立てるビルダー
#[derive(Debug, Default)]
pub struct PredicateBuilder {
    conditions: Vec<String>,
    pagination: Option<String>,
    args: Vec<QueryParam>,
}

impl PredicateBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// 条件を1つ追加する
    ///
    /// # 引数
    /// * `render` - 割り当てられたプレースホルダー（`?N`）を受け取り、条件式を返す関数
    /// * `arg` - そのプレースホルダーに束縛する値
    pub fn condition<F>(mut self, render: F, arg: QueryParam) -> Self
    where
        F: FnOnce(&str) -> String,
    {
        let placeholder = self.bind(arg);
        self.conditions.push(render(&placeholder));
        self
    }

    /// LIMIT/OFFSETを追加する。1番目の値がLIMIT、2番目がOFFSETに束縛される
    pub fn paginate(mut self, limit: i64, offset: i64) -> Self {
        let limit_placeholder = self.bind(QueryParam::Integer(limit));
        let offset_placeholder = self.bind(QueryParam::Integer(offset));
        self.pagination = Some(format!(
            " LIMIT {limit_placeholder} OFFSET {offset_placeholder}"
        ));
        self
    }

    pub fn build(self) -> Predicate {
        Predicate {
            conditions: self.conditions,
            pagination: self.pagination,
            args: self.args,
        }
    }

    // 値を積んだ直後の件数がそのまま1始まりの番号になる
    fn bind(&mut self, arg: QueryParam) -> String {
        self.args.push(arg);
        format!("?{}", self.args.len())
    }
}

/// 一覧取得用の条件を組み立てる
///
/// # 引数
/// * `filter` - 一覧取得のフィルター
///
/// # 戻り値
/// サービス名（大文字小文字を区別しない部分一致）→ 所有者ID → LIMIT → OFFSET の順に束縛された条件
pub fn build_list_predicate(filter: &ListFilter) -> Predicate {
    let mut builder = PredicateBuilder::new();

    // サービス名フィルター（空文字はフィルターなし）
    // LIKEの大文字小文字無視はASCIIのみのため、両辺をUnicode小文字化して比較する
    if let Some(service_name) = non_empty(filter.service_name.as_deref()) {
        builder = builder.condition(
            |p| format!("{UNICODE_LOWER_FUNCTION}(service_name) LIKE {p} ESCAPE '\\'"),
            QueryParam::Text(contains_pattern(&service_name.to_lowercase())),
        );
    }

    // 所有者フィルター
    if let Some(owner_id) = filter.owner_id {
        builder = builder.condition(
            |p| format!("owner_id = {p}"),
            QueryParam::Text(owner_id.to_string()),
        );
    }

    builder.paginate(filter.limit, filter.offset).build()
}

/// 期間内合計金額用の条件を組み立てる
///
/// 集計対象は「開始月が集計開始月以降」かつ「終了月がない、または集計終了月以前」の行のみ。
/// 区間の重なり判定ではないため、集計開始月より前に始まった行は期間と重なっていても含まれない。
///
/// # 引数
/// * `filter` - 期間内合計金額のフィルター
///
/// # 戻り値
/// サービス名（完全一致）→ 所有者ID → 開始月 → 終了月 の順に束縛された条件
pub fn build_total_cost_predicate(filter: &CostWindowFilter) -> Predicate {
    let mut builder = PredicateBuilder::new();

    if let Some(service_name) = non_empty(filter.service_name.as_deref()) {
        builder = builder.condition(
            |p| format!("service_name = {p}"),
            QueryParam::Text(service_name.to_string()),
        );
    }

    if let Some(owner_id) = filter.owner_id {
        builder = builder.condition(
            |p| format!("owner_id = {p}"),
            QueryParam::Text(owner_id.to_string()),
        );
    }

    builder
        .condition(
            |p| format!("start_period >= {p}"),
            QueryParam::Period(filter.window_start),
        )
        .condition(
            |p| format!("(end_period IS NULL OR end_period <= {p})"),
            QueryParam::Period(filter.window_end),
        )
        .build()
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}

/// LIKE用の部分一致パターンを作成する（ワイルドカード文字はエスケープ）
fn contains_pattern(value: &str) -> String {
    let mut pattern = String::with_capacity(value.len() + 2);
    pattern.push('%');
    for c in value.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

#[cfg(test)]
mod tests {
    use super::*;
    use quickcheck_macros::quickcheck;
    use regex::Regex;
    use uuid::Uuid;

    fn month(text: &str) -> MonthYear {
        MonthYear::parse(text).unwrap()
    }

    fn window_filter(service_name: Option<&str>, owner_id: Option<Uuid>) -> CostWindowFilter {
        CostWindowFilter {
            service_name: service_name.map(str::to_string),
            owner_id,
            window_start: month("01-2025"),
            window_end: month("06-2025"),
        }
    }

    /// 出現順のプレースホルダー番号を取り出す
    fn placeholder_numbers(sql: &str) -> Vec<usize> {
        let pattern = Regex::new(r"\?([0-9]+)").unwrap();
        pattern
            .captures_iter(sql)
            .map(|c| c[1].parse().unwrap())
            .collect()
    }

    fn rendered(predicate: &Predicate) -> String {
        format!("{}{}", predicate.where_clause(), predicate.pagination_clause())
    }

    #[test]
    fn test_list_without_filters_has_no_where() {
        let predicate = build_list_predicate(&ListFilter {
            limit: 20,
            offset: 40,
            ..ListFilter::default()
        });

        assert!(!rendered(&predicate).contains("WHERE"));
        assert_eq!(predicate.where_clause(), "");
        assert_eq!(predicate.pagination_clause(), " LIMIT ?1 OFFSET ?2");
        assert_eq!(
            predicate.args(),
            &[QueryParam::Integer(20), QueryParam::Integer(40)]
        );
    }

    #[test]
    fn test_list_with_owner_only() {
        let owner_id = Uuid::new_v4();
        let predicate = build_list_predicate(&ListFilter {
            owner_id: Some(owner_id),
            limit: 5,
            offset: 10,
            ..ListFilter::default()
        });

        assert_eq!(predicate.conditions().len(), 1);
        assert_eq!(predicate.where_clause(), " WHERE owner_id = ?1");
        assert_eq!(predicate.pagination_clause(), " LIMIT ?2 OFFSET ?3");
        assert_eq!(
            predicate.args(),
            &[
                QueryParam::Text(owner_id.to_string()),
                QueryParam::Integer(5),
                QueryParam::Integer(10),
            ]
        );
    }

    #[test]
    fn test_list_condition_order() {
        let owner_id = Uuid::new_v4();
        let predicate = build_list_predicate(&ListFilter {
            service_name: Some("net".to_string()),
            owner_id: Some(owner_id),
            limit: 1,
            offset: 0,
        });

        assert_eq!(
            predicate.where_clause(),
            " WHERE unicode_lower(service_name) LIKE ?1 ESCAPE '\\' AND owner_id = ?2"
        );
        assert_eq!(predicate.args()[0], QueryParam::Text("%net%".to_string()));
        assert_eq!(predicate.args()[1], QueryParam::Text(owner_id.to_string()));
        assert_eq!(predicate.args()[2], QueryParam::Integer(1));
        assert_eq!(predicate.args()[3], QueryParam::Integer(0));
    }

    #[test]
    fn test_list_empty_service_name_is_no_filter() {
        let predicate = build_list_predicate(&ListFilter {
            service_name: Some(String::new()),
            ..ListFilter::default()
        });

        assert!(predicate.conditions().is_empty());
        assert_eq!(predicate.args().len(), 2);
    }

    #[test]
    fn test_service_name_is_never_interpolated() {
        let hostile = "x' OR 1=1; DROP TABLE subscriptions; --";
        let predicate = build_list_predicate(&ListFilter {
            service_name: Some(hostile.to_string()),
            ..ListFilter::default()
        });

        let sql = rendered(&predicate);
        assert!(!sql.contains("DROP"));
        assert!(!sql.contains("1=1"));
        assert_eq!(
            predicate.args()[0],
            QueryParam::Text(format!("%{}%", hostile.to_lowercase()))
        );
    }

    #[test]
    fn test_list_pattern_is_unicode_lowercased() {
        let predicate = build_list_predicate(&ListFilter {
            service_name: Some("ЯНДЕКС Ärzte".to_string()),
            ..ListFilter::default()
        });

        assert_eq!(
            predicate.args()[0],
            QueryParam::Text("%яндекс ärzte%".to_string())
        );
    }

    #[test]
    fn test_contains_pattern_escapes_wildcards() {
        assert_eq!(contains_pattern("100%"), "%100\\%%");
        assert_eq!(contains_pattern("a_b"), "%a\\_b%");
        assert_eq!(contains_pattern("c:\\"), "%c:\\\\%");
        assert_eq!(contains_pattern("Spotify"), "%Spotify%");
    }

    #[test]
    fn test_total_cost_always_has_window_conditions() {
        let predicate = build_total_cost_predicate(&window_filter(None, None));

        assert_eq!(
            predicate.where_clause(),
            " WHERE start_period >= ?1 AND (end_period IS NULL OR end_period <= ?2)"
        );
        assert_eq!(predicate.pagination_clause(), "");
        assert_eq!(
            predicate.args(),
            &[
                QueryParam::Period(month("01-2025")),
                QueryParam::Period(month("06-2025")),
            ]
        );
    }

    #[test]
    fn test_total_cost_argument_counts() {
        let owner_id = Uuid::new_v4();

        assert_eq!(build_total_cost_predicate(&window_filter(None, None)).args().len(), 2);
        assert_eq!(
            build_total_cost_predicate(&window_filter(Some("Netflix"), None)).args().len(),
            3
        );
        assert_eq!(
            build_total_cost_predicate(&window_filter(None, Some(owner_id))).args().len(),
            3
        );

        let full = build_total_cost_predicate(&window_filter(Some("Netflix"), Some(owner_id)));
        assert_eq!(full.args().len(), 4);
        assert_eq!(
            full.conditions(),
            &[
                "service_name = ?1".to_string(),
                "owner_id = ?2".to_string(),
                "start_period >= ?3".to_string(),
                "(end_period IS NULL OR end_period <= ?4)".to_string(),
            ]
        );
        // 完全一致なのでワイルドカードで囲まない
        assert_eq!(full.args()[0], QueryParam::Text("Netflix".to_string()));
    }

    #[test]
    fn test_total_cost_empty_service_name_is_no_filter() {
        let predicate = build_total_cost_predicate(&window_filter(Some(""), None));
        assert_eq!(predicate.conditions().len(), 2);
    }

    #[test]
    fn test_builder_binds_sequentially() {
        let predicate = PredicateBuilder::new()
            .condition(|p| format!("a = {p}"), QueryParam::Integer(1))
            .condition(|p| format!("b = {p}"), QueryParam::Integer(2))
            .paginate(3, 4)
            .build();

        assert_eq!(rendered(&predicate), " WHERE a = ?1 AND b = ?2 LIMIT ?3 OFFSET ?4");
        assert_eq!(placeholder_numbers(&rendered(&predicate)), vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_query_param_binding() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        let params = [
            QueryParam::Text("abc".to_string()),
            QueryParam::Integer(42),
            QueryParam::Period(month("03-2025")),
        ];

        let (text, number, period): (String, i64, String) = conn
            .query_row(
                "SELECT ?1, ?2, ?3",
                rusqlite::params_from_iter(params.iter()),
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .unwrap();

        assert_eq!(text, "abc");
        assert_eq!(number, 42);
        assert_eq!(period, "2025-03-01");
    }

    #[quickcheck]
    fn prop_list_placeholders_match_arguments(
        service_name: Option<String>,
        with_owner: bool,
        limit: u16,
        offset: u16,
    ) -> bool {
        let filter = ListFilter {
            service_name,
            owner_id: with_owner.then(Uuid::new_v4),
            limit: i64::from(limit),
            offset: i64::from(offset),
        };
        let predicate = build_list_predicate(&filter);
        let numbers = placeholder_numbers(&rendered(&predicate));
        let count = predicate.args().len();

        // 番号は1から連番で、束縛値の数と一致し、最後の2つはLIMITとOFFSET
        numbers == (1..=count).collect::<Vec<_>>()
            && predicate.args()[count - 2] == QueryParam::Integer(filter.limit)
            && predicate.args()[count - 1] == QueryParam::Integer(filter.offset)
    }

    #[quickcheck]
    fn prop_total_cost_placeholders_match_arguments(
        service_name: Option<String>,
        with_owner: bool,
    ) -> bool {
        let filter = CostWindowFilter {
            service_name,
            owner_id: with_owner.then(Uuid::new_v4),
            window_start: month("01-2024"),
            window_end: month("12-2024"),
        };
        let predicate = build_total_cost_predicate(&filter);
        let numbers = placeholder_numbers(&predicate.where_clause());
        let optional = predicate.args().len() - 2;

        numbers == (1..=predicate.args().len()).collect::<Vec<_>>()
            && optional <= 2
            && predicate.conditions().len() == optional + 2
    }
}
