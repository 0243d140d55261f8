use crate::features::subscriptions::handlers;
use crate::shared::errors::{AppError, AppResult};
use crate::shared::request_context::RequestContext;
use crate::AppState;
use http_body_util::{BodyExt, Full, Limited};
use hyper::body::{Bytes, Incoming};
use hyper::header::{HeaderName, HeaderValue, ALLOW, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde_json::{json, Value};
use std::convert::Infallible;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;

/// リクエストIDを受け渡すヘッダー
pub const REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("x-request-id");

/// リクエスト本文の上限サイズ
const MAX_BODY_BYTES: usize = 64 * 1024;

const COLLECTION_PATH: &str = "/api/subscriptions";

/// ルーティング結果
#[derive(Debug, PartialEq, Eq)]
enum Route<'a> {
    Collection,
    List,
    Total,
    Item(&'a str),
    NotFound,
}

fn route(path: &str) -> Route<'_> {
    if path == COLLECTION_PATH {
        return Route::Collection;
    }

    match path
        .strip_prefix(COLLECTION_PATH)
        .and_then(|rest| rest.strip_prefix('/'))
    {
        Some("list") => Route::List,
        Some("total") => Route::Total,
        Some(id) if !id.is_empty() && !id.contains('/') => Route::Item(id),
        _ => Route::NotFound,
    }
}

/// 本文を読み込み済みのリクエストを処理する
///
/// ネットワークに依存しないため、テストからも直接呼び出せる。
///
/// # 引数
/// * `state` - アプリケーション状態
/// * `request` - 本文を読み込み済みのリクエスト
///
/// # 戻り値
/// JSONレスポンス（リクエストIDヘッダー付き）
pub fn dispatch(state: &AppState, request: Request<Bytes>) -> Response<Full<Bytes>> {
    let ctx = request_context_from(&request);
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let query = request.uri().query().map(str::to_string);
    let body = request.into_body();

    log::debug!("[{}] {method} {path}", ctx.request_id());

    let result = match (route(&path), &method) {
        (Route::Collection, &Method::POST) => handlers::create_subscription(state, &ctx, &body),
        (Route::List, &Method::GET) => {
            handlers::list_subscriptions(state, &ctx, query.as_deref())
        }
        (Route::Total, &Method::POST) => handlers::total_cost(state, &ctx, &body),
        (Route::Item(id), &Method::GET) => handlers::get_subscription(state, &ctx, id),
        (Route::Item(id), &Method::PUT) => handlers::update_subscription(state, &ctx, id, &body),
        (Route::Item(id), &Method::DELETE) => handlers::delete_subscription(state, &ctx, id),
        (Route::NotFound, _) => {
            log::debug!("[{}] 未対応のパス: {path}", ctx.request_id());
            return error_response(
                &ctx,
                StatusCode::NOT_FOUND,
                "指定されたパスは存在しません",
            );
        }
        (allowed, _) => {
            let mut response = error_response(
                &ctx,
                StatusCode::METHOD_NOT_ALLOWED,
                "このパスでは許可されていないメソッドです",
            );
            response
                .headers_mut()
                .insert(ALLOW, HeaderValue::from_static(allowed_methods(&allowed)));
            return response;
        }
    };

    match result {
        Ok((status, body)) => json_response(&ctx, status, &body),
        Err(e) => {
            let status = status_for(&e);
            if status.is_server_error() {
                log::error!("[{}] リクエスト処理エラー: {}", ctx.request_id(), e.details());
            }
            error_response(&ctx, status, e.user_message())
        }
    }
}

/// エラーに対応するHTTPステータスコード
pub fn status_for(error: &AppError) -> StatusCode {
    match error {
        AppError::Format(_) | AppError::Validation(_) | AppError::Json(_) => {
            StatusCode::BAD_REQUEST
        }
        AppError::NotFound(_) => StatusCode::NOT_FOUND,
        AppError::Persistence(_)
        | AppError::Configuration(_)
        | AppError::Io(_)
        | AppError::Concurrency(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn allowed_methods(route: &Route<'_>) -> &'static str {
    match route {
        Route::Collection | Route::Total => "POST",
        Route::List => "GET",
        Route::Item(_) => "GET, PUT, DELETE",
        Route::NotFound => "",
    }
}

/// X-Request-Idヘッダーを引き継ぐか、なければ新しく採番する
fn request_context_from<B>(request: &Request<B>) -> RequestContext {
    request
        .headers()
        .get(&REQUEST_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(RequestContext::new)
        .unwrap_or_else(RequestContext::generate)
}

fn json_response(ctx: &RequestContext, status: StatusCode, body: &Value) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from(body.to_string())));
    *response.status_mut() = status;
    response.headers_mut().insert(
        CONTENT_TYPE,
        HeaderValue::from_static("application/json; charset=utf-8"),
    );
    if let Ok(value) = HeaderValue::from_str(ctx.request_id()) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}

fn error_response(ctx: &RequestContext, status: StatusCode, message: &str) -> Response<Full<Bytes>> {
    json_response(ctx, status, &json!({ "error": message }))
}

/// 接続を受け付けてリクエストを処理する
///
/// `shutdown` がキャンセルされると新しい接続の受け付けを止めて戻る。
///
/// # 引数
/// * `state` - アプリケーション状態
/// * `listener` - バインド済みのリスナー
/// * `shutdown` - 停止シグナル
pub async fn serve(
    state: Arc<AppState>,
    listener: TcpListener,
    shutdown: CancellationToken,
) -> AppResult<()> {
    let addr = listener.local_addr()?;
    log::info!("HTTPサーバーを開始しました: http://{addr}");

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                log::info!("停止シグナルを受信したため、接続の受け付けを終了します");
                break;
            }
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    log::debug!("接続を受け付けました: {peer}");
                    let state = Arc::clone(&state);
                    tokio::spawn(async move {
                        handle_connection(stream, state).await;
                    });
                }
                Err(e) => {
                    log::error!("接続受け入れエラー: {e}");
                }
            },
        }
    }

    Ok(())
}

/// TCP接続を処理する
async fn handle_connection(stream: TcpStream, state: Arc<AppState>) {
    let io = TokioIo::new(stream);
    let service = service_fn(move |req| handle_request(req, Arc::clone(&state)));

    if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
        log::error!("HTTP接続処理エラー: {err}");
    }
}

/// 本文を読み込み、データベース処理をブロッキングスレッドで実行する
async fn handle_request(
    req: Request<Incoming>,
    state: Arc<AppState>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let (parts, body) = req.into_parts();

    let bytes = match Limited::new(body, MAX_BODY_BYTES).collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            let ctx = request_context_from(&Request::from_parts(parts, ()));
            log::warn!("[{}] リクエスト本文の読み込みに失敗: {e}", ctx.request_id());
            return Ok(error_response(
                &ctx,
                StatusCode::PAYLOAD_TOO_LARGE,
                "リクエスト本文を読み込めませんでした",
            ));
        }
    };

    let request = Request::from_parts(parts, bytes);
    let response = tokio::task::spawn_blocking(move || dispatch(&state, request)).await;

    Ok(response.unwrap_or_else(|e| {
        log::error!("リクエスト処理タスクが異常終了しました: {e}");
        error_response(
            &RequestContext::generate(),
            StatusCode::INTERNAL_SERVER_ERROR,
            "内部エラーが発生しました",
        )
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_route() {
        assert_eq!(route("/api/subscriptions"), Route::Collection);
        assert_eq!(route("/api/subscriptions/list"), Route::List);
        assert_eq!(route("/api/subscriptions/total"), Route::Total);
        assert_eq!(route("/api/subscriptions/abc"), Route::Item("abc"));
        assert_eq!(route("/api/subscriptions/"), Route::NotFound);
        assert_eq!(route("/api/subscriptions/a/b"), Route::NotFound);
        assert_eq!(route("/api/subscriptionsx"), Route::NotFound);
        assert_eq!(route("/"), Route::NotFound);
    }

    #[test]
    fn test_status_for() {
        assert_eq!(status_for(&AppError::format("x")), StatusCode::BAD_REQUEST);
        assert_eq!(status_for(&AppError::validation("x")), StatusCode::BAD_REQUEST);
        assert_eq!(status_for(&AppError::not_found("x")), StatusCode::NOT_FOUND);
        assert_eq!(
            status_for(&AppError::persistence("x")),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            status_for(&AppError::concurrency("x")),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_request_id_is_propagated() {
        let request = Request::builder()
            .header("X-Request-Id", "abc-123")
            .body(())
            .unwrap();
        assert_eq!(request_context_from(&request).request_id(), "abc-123");

        let request = Request::builder().body(()).unwrap();
        assert!(uuid::Uuid::parse_str(request_context_from(&request).request_id()).is_ok());
    }
}
