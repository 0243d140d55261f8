use super::environment::{get_database_filename, get_environment, Environment};
use crate::features::subscriptions::RowScanMode;
use crate::shared::errors::{AppError, AppResult};
use chrono_tz::Tz;
use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

/// データディレクトリ配下のアプリケーション用ディレクトリ名
const APP_DIR_NAME: &str = "subscription-tracker";

const DEFAULT_SERVER_HOST: &str = "127.0.0.1";
const DEFAULT_SERVER_PORT: u16 = 8080;

/// アプリケーション設定
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// 実行環境
    pub environment: Environment,
    /// SQLiteデータベースファイルのパス
    pub database_path: PathBuf,
    /// 待ち受けホスト
    pub server_host: String,
    /// 待ち受けポート
    pub server_port: u16,
    /// 一覧取得で行のデコードに失敗した場合の扱い
    pub list_row_scan: RowScanMode,
    /// 作成日時・更新日時に使うタイムゾーン
    pub timezone: Tz,
}

impl AppConfig {
    /// 環境変数から設定を読み込む
    ///
    /// # 戻り値
    /// アプリケーション設定、または値が不正な場合は設定エラー
    pub fn from_env() -> AppResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// 任意の参照関数から設定を読み込む
    ///
    /// # 引数
    /// * `lookup` - キーに対応する値を返す関数（未設定はNone）
    ///
    /// # 戻り値
    /// アプリケーション設定、または値が不正な場合は設定エラー
    pub fn from_lookup<F>(lookup: F) -> AppResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let environment = get_environment();
        let mut problems = Vec::new();

        let database_path = match lookup("DATABASE_PATH").filter(|v| !v.trim().is_empty()) {
            Some(path) => PathBuf::from(path),
            None => match default_database_path(environment) {
                Some(path) => path,
                None => {
                    problems.push(
                        "データディレクトリを特定できません。DATABASE_PATHを設定してください"
                            .to_string(),
                    );
                    PathBuf::new()
                }
            },
        };

        let server_host = lookup("SERVER_HOST").unwrap_or_else(|| DEFAULT_SERVER_HOST.to_string());

        let server_port = match lookup("SERVER_PORT") {
            Some(raw) => raw.trim().parse::<u16>().unwrap_or_else(|_| {
                problems.push(format!("SERVER_PORTが不正です: {raw}"));
                DEFAULT_SERVER_PORT
            }),
            None => DEFAULT_SERVER_PORT,
        };

        let list_row_scan = match lookup("LIST_ROW_SCAN") {
            Some(raw) => raw.parse::<RowScanMode>().unwrap_or_else(|e| {
                problems.push(e.details());
                RowScanMode::default()
            }),
            None => RowScanMode::default(),
        };

        let timezone = match lookup("APP_TIMEZONE") {
            Some(raw) => raw.trim().parse::<Tz>().unwrap_or_else(|_| {
                problems.push(format!("APP_TIMEZONEが不正です: {raw}"));
                Tz::UTC
            }),
            None => Tz::UTC,
        };

        if !problems.is_empty() {
            return Err(AppError::configuration(problems.join("; ")));
        }

        let config = Self {
            environment,
            database_path,
            server_host,
            server_port,
            list_row_scan,
            timezone,
        };
        config.validate()?;

        Ok(config)
    }

    /// 設定を検証する
    ///
    /// # 戻り値
    /// 設定が有効な場合はOk(())、問題がある場合はすべてをまとめた設定エラー
    pub fn validate(&self) -> AppResult<()> {
        let mut problems = Vec::new();

        if self.database_path.as_os_str().is_empty() {
            problems.push("データベースパスが空です".to_string());
        }
        if self.server_host.parse::<IpAddr>().is_err() {
            problems.push(format!(
                "SERVER_HOSTはIPアドレスで指定してください: {}",
                self.server_host
            ));
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(AppError::configuration(problems.join("; ")))
        }
    }

    /// 待ち受けアドレスを取得
    pub fn socket_addr(&self) -> AppResult<SocketAddr> {
        let ip = self.server_host.parse::<IpAddr>().map_err(|e| {
            AppError::configuration(format!("待ち受けアドレスが不正です: {e}"))
        })?;
        Ok(SocketAddr::new(ip, self.server_port))
    }

    /// デバッグ情報を取得
    ///
    /// # 戻り値
    /// デバッグ情報のマップ
    pub fn get_debug_info(&self) -> HashMap<String, String> {
        let mut info = HashMap::new();
        info.insert(
            "environment".to_string(),
            self.environment.as_str().to_string(),
        );
        info.insert(
            "database_path".to_string(),
            self.database_path.display().to_string(),
        );
        info.insert(
            "listen".to_string(),
            format!("{}:{}", self.server_host, self.server_port),
        );
        info.insert(
            "list_row_scan".to_string(),
            format!("{:?}", self.list_row_scan).to_lowercase(),
        );
        info.insert("timezone".to_string(), self.timezone.name().to_string());
        info
    }
}

/// 既定のデータベースパスを取得する
///
/// # 戻り値
/// `<データディレクトリ>/subscription-tracker/<環境別ファイル名>`、特定できない場合はNone
pub fn default_database_path(environment: Environment) -> Option<PathBuf> {
    dirs::data_dir().map(|dir| {
        dir.join(APP_DIR_NAME)
            .join(get_database_filename(environment))
    })
}
