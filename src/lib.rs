pub mod features;
pub mod server;
pub mod shared;

use log::{error, info};
use rusqlite::Connection;
use shared::config::{initialize_logging_system, load_environment_variables, AppConfig};
use shared::database::initialize_database;
use shared::errors::AppResult;
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

/// アプリケーション状態（データベース接続と設定を保持）
pub struct AppState {
    pub db: Mutex<Connection>,
    pub config: AppConfig,
}

impl AppState {
    pub fn new(db: Connection, config: AppConfig) -> Self {
        Self {
            db: Mutex::new(db),
            config,
        }
    }
}

/// アプリケーションを起動し、停止シグナルを受けるまでリクエストを処理する
///
/// # 戻り値
/// 正常終了時はOk(())、初期化に失敗した場合はエラー
pub async fn run() -> AppResult<()> {
    // LOG_LEVELを.envからも読めるよう、ログ初期化より先に読み込む
    load_environment_variables();
    initialize_logging_system();

    info!("アプリケーション初期化を開始します...");

    let config = AppConfig::from_env().map_err(|e| {
        error!("設定の読み込みに失敗しました: {}", e.details());
        e
    })?;
    info!("設定: {:?}", config.get_debug_info());

    info!("データベースを初期化しています...");
    let db_conn = initialize_database(&config.database_path).map_err(|e| {
        error!("データベースの初期化に失敗しました: {}", e.details());
        e
    })?;
    info!("データベースの初期化が完了しました");

    let addr = config.socket_addr()?;
    let listener = TcpListener::bind(addr).await?;
    let state = Arc::new(AppState::new(db_conn, config));

    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Ctrl-Cを受信しました。停止処理を開始します");
                signal_token.cancel();
            }
            Err(e) => error!("停止シグナルの待機に失敗しました: {e}"),
        }
    });

    info!("アプリケーション初期化が完了しました");
    server::serve(state, listener, shutdown).await?;

    info!("アプリケーションを終了しました");
    Ok(())
}
