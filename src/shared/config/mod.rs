/// 環境設定関連のモジュール
pub mod environment;

/// アプリケーション設定
pub mod app_config;

// 便利な再エクスポート
pub use app_config::{default_database_path, AppConfig};
pub use environment::{
    get_database_filename, get_environment, initialize_logging_system, load_environment_variables,
    Environment, EnvironmentConfig,
};
