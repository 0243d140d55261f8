#[tokio::main]
async fn main() {
    if let Err(e) = subscription_tracker_lib::run().await {
        eprintln!("アプリケーションの起動に失敗しました: {}", e.details());
        std::process::exit(1);
    }
}
