use uuid::Uuid;

/// リクエスト単位の相関ID
///
/// サービス層の各操作に明示的に渡し、ログの先頭に `[<request_id>]` として出力する。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    request_id: String,
}

impl RequestContext {
    /// 既存のリクエストIDからコンテキストを作成する
    ///
    /// # 引数
    /// * `request_id` - 呼び出し元から渡されたリクエストID（空白のみの場合は新規採番）
    pub fn new<S: Into<String>>(request_id: S) -> Self {
        let request_id = request_id.into();
        if request_id.trim().is_empty() {
            return Self::generate();
        }
        Self { request_id }
    }

    /// 新しいリクエストIDを採番する
    pub fn generate() -> Self {
        Self {
            request_id: Uuid::new_v4().to_string(),
        }
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keeps_given_id() {
        let ctx = RequestContext::new("req-123");
        assert_eq!(ctx.request_id(), "req-123");
    }

    #[test]
    fn test_blank_id_is_replaced() {
        let ctx = RequestContext::new("  ");
        assert!(Uuid::parse_str(ctx.request_id()).is_ok());
    }

    #[test]
    fn test_generated_ids_differ() {
        assert_ne!(RequestContext::generate(), RequestContext::generate());
    }
}
