use crate::shared::errors::{AppError, AppResult};
use chrono::{Datelike, NaiveDate};
use once_cell::sync::Lazy;
use regex::Regex;
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// 外部表現（MM-YYYY）の書式。`\d` はUnicode数字にも一致するため使わない
static MONTH_YEAR_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([0-9]{2})-([0-9]{4})$").expect("年月パターンの正規表現が不正です")
});

/// データストア内の表現（YYYY-MM-DD）
const STORAGE_FORMAT: &str = "%Y-%m-%d";

/// 年月精度の日付
///
/// 常にその月の1日に固定して保持する。日の値は比較・表示のどちらにも使われない。
/// 外部とのやり取りは `MM-YYYY`、データストアには `YYYY-MM-01` として保存する。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MonthYear(NaiveDate);

impl MonthYear {
    /// 年と月から年月を作成する
    ///
    /// # 引数
    /// * `year` - 年（0〜9999、4桁で表現できる範囲）
    /// * `month` - 月（1〜12）
    ///
    /// # 戻り値
    /// 年月、または範囲外の場合は形式エラー
    pub fn new(year: i32, month: u32) -> AppResult<Self> {
        if !(1..=12).contains(&month) {
            return Err(AppError::format(format!(
                "月は01から12の間で指定してください: {month}"
            )));
        }
        if !(0..=9999).contains(&year) {
            return Err(AppError::format(format!(
                "年は4桁で指定してください: {year}"
            )));
        }

        NaiveDate::from_ymd_opt(year, month, 1)
            .map(MonthYear)
            .ok_or_else(|| AppError::format(format!("無効な年月です: {month:02}-{year}")))
    }

    /// 任意の日付から年月を作成する（日の値は捨てる）
    ///
    /// # 引数
    /// * `date` - 日付
    ///
    /// # 戻り値
    /// その日付が属する月、または年が4桁に収まらない場合は形式エラー
    pub fn from_date(date: NaiveDate) -> AppResult<Self> {
        Self::new(date.year(), date.month())
    }

    /// `MM-YYYY` 形式のテキストを解析する
    ///
    /// # 引数
    /// * `text` - 2桁の月、`-`、4桁の年からなるテキスト
    ///
    /// # 戻り値
    /// 月初日に固定された年月、または形式エラー
    pub fn parse(text: &str) -> AppResult<Self> {
        let captures = MONTH_YEAR_PATTERN.captures(text).ok_or_else(|| {
            AppError::format(format!("年月はMM-YYYY形式で指定してください: {text}"))
        })?;

        // 桁数はパターンで保証済み
        let month: u32 = captures[1]
            .parse()
            .map_err(|_| AppError::format(format!("月が数値ではありません: {text}")))?;
        let year: i32 = captures[2]
            .parse()
            .map_err(|_| AppError::format(format!("年が数値ではありません: {text}")))?;

        Self::new(year, month)
    }

    /// 年を取得
    pub fn year(&self) -> i32 {
        self.0.year()
    }

    /// 月を取得
    pub fn month(&self) -> u32 {
        self.0.month()
    }

    /// データストア用の表現（YYYY-MM-01）に変換する
    pub fn to_storage_string(&self) -> String {
        self.0.format(STORAGE_FORMAT).to_string()
    }

    /// データストア用の表現から年月を復元する
    ///
    /// # 引数
    /// * `text` - `YYYY-MM-DD` 形式の日付テキスト
    ///
    /// # 戻り値
    /// 年月、または日付として解釈できない場合は形式エラー
    pub fn from_storage_str(text: &str) -> AppResult<Self> {
        let date = NaiveDate::parse_from_str(text, STORAGE_FORMAT)
            .map_err(|e| AppError::format(format!("保存された日付が不正です: {text}: {e}")))?;
        Self::from_date(date)
    }
}

impl fmt::Display for MonthYear {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}-{:04}", self.month(), self.year())
    }
}

impl FromStr for MonthYear {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for MonthYear {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// 逆シリアル化エラーのメッセージ接頭辞（リクエスト本文の形式エラー判定に使う）
pub(crate) const INVALID_MONTH_YEAR: &str = "年月の形式が正しくありません";

impl<'de> Deserialize<'de> for MonthYear {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        MonthYear::parse(&text).map_err(|e| {
            serde::de::Error::custom(format!("{INVALID_MONTH_YEAR}: {}", e.user_message()))
        })
    }
}

impl ToSql for MonthYear {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.to_storage_string()))
    }
}

impl FromSql for MonthYear {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let text = value.as_str()?;
        MonthYear::from_storage_str(text).map_err(|e| FromSqlError::Other(Box::new(e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quickcheck_macros::quickcheck;

    #[test]
    fn test_parse_valid_month_year() {
        let value = MonthYear::parse("07-2025").unwrap();
        assert_eq!(value.year(), 2025);
        assert_eq!(value.month(), 7);
        assert_eq!(value.to_storage_string(), "2025-07-01");
    }

    #[test]
    fn test_parse_rejects_malformed_text() {
        let inputs = [
            "13-2025", "00-2025", "1-2025", "2025-01", "01/2025", "01-25", "01-20250", " 01-2025",
            "01-2025 ", "", "ab-cdef", "０１-2025",
        ];

        for input in inputs {
            let result = MonthYear::parse(input);
            assert!(
                matches!(result, Err(AppError::Format(_))),
                "{input:?} は形式エラーになるべきです"
            );
        }
    }

    #[test]
    fn test_format_ignores_day_component() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 28).unwrap();
        let value = MonthYear::from_date(date).unwrap();
        assert_eq!(value.to_string(), "03-2024");
        assert_eq!(value.to_storage_string(), "2024-03-01");
    }

    #[test]
    fn test_format_pads_small_years() {
        let value = MonthYear::new(987, 1).unwrap();
        assert_eq!(value.to_string(), "01-0987");
        assert_eq!(MonthYear::parse("01-0987").unwrap(), value);
    }

    #[test]
    fn test_year_out_of_range() {
        assert!(matches!(MonthYear::new(10000, 1), Err(AppError::Format(_))));
        assert!(matches!(MonthYear::new(-1, 1), Err(AppError::Format(_))));
    }

    #[test]
    fn test_ordering_is_chronological() {
        let dec = MonthYear::parse("12-2024").unwrap();
        let jan = MonthYear::parse("01-2025").unwrap();
        assert!(dec < jan);
        // ストア表現も同じ順序で比較される
        assert!(dec.to_storage_string() < jan.to_storage_string());
    }

    #[test]
    fn test_storage_representation() {
        let value = MonthYear::parse("02-2025").unwrap();
        assert_eq!(value.to_storage_string(), "2025-02-01");
        assert_eq!(MonthYear::from_storage_str("2025-02-01").unwrap(), value);
        assert!(MonthYear::from_storage_str("02-2025").is_err());
    }

    #[test]
    fn test_serde_uses_external_format() {
        let value = MonthYear::parse("11-2023").unwrap();
        let json = serde_json::to_string(&value).unwrap();
        assert_eq!(json, "\"11-2023\"");

        let decoded: MonthYear = serde_json::from_str("\"11-2023\"").unwrap();
        assert_eq!(decoded, value);

        let invalid: Result<MonthYear, _> = serde_json::from_str("\"2023-11\"");
        assert!(invalid.is_err());
    }

    #[test]
    fn test_sql_round_trip() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        let value = MonthYear::parse("09-2026").unwrap();

        let stored: String = conn
            .query_row("SELECT ?1", [value], |row| row.get(0))
            .unwrap();
        assert_eq!(stored, "2026-09-01");

        let restored: MonthYear = conn
            .query_row("SELECT '2026-09-01'", [], |row| row.get(0))
            .unwrap();
        assert_eq!(restored, value);

        let broken: rusqlite::Result<MonthYear> =
            conn.query_row("SELECT 'not-a-date'", [], |row| row.get(0));
        assert!(broken.is_err());
    }

    #[quickcheck]
    fn prop_decode_encode_preserves_month_and_year(year: u16, month: u8) -> bool {
        let year = i32::from(year % 10000);
        let month = u32::from(month % 12) + 1;
        let value = MonthYear::new(year, month).unwrap();

        let decoded = MonthYear::parse(&value.to_string()).unwrap();
        decoded.year() == year && decoded.month() == month
    }

    #[quickcheck]
    fn prop_any_day_encodes_to_its_month(days_from_epoch: u32) -> bool {
        // 0001-01-01 から 9999-12-31 までの範囲に収める
        let base = NaiveDate::from_ymd_opt(1, 1, 1).unwrap();
        let date = base + chrono::Duration::days(i64::from(days_from_epoch % 3_652_058));
        let value = MonthYear::from_date(date).unwrap();

        value.to_string() == format!("{:02}-{:04}", date.month(), date.year())
    }
}
