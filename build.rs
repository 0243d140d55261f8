use std::env;

fn main() {
    // ENVIRONMENT環境変数に基づいて適切な.envファイルを読み込み
    let environment = env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string());

    let env_file = match environment.as_str() {
        "production" => ".env.production",
        _ => ".env",
    };

    println!("cargo:rerun-if-env-changed=ENVIRONMENT");
    println!("cargo:rerun-if-changed={env_file}");

    if dotenv::from_filename(env_file).is_ok() {
        println!("cargo:warning={env_file}ファイルを読み込みました");
    }

    // プロダクションビルドのみ実行環境を埋め込む
    // 開発ビルドでは実行時のENVIRONMENTで切り替えられるようにする
    if let Ok(embedded) = env::var("ENVIRONMENT") {
        if embedded == "production" {
            println!("cargo:rustc-env=EMBEDDED_ENVIRONMENT={embedded}");
        }
    }
}
