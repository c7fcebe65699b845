/// Telegram Bot API 客户端
///
/// 封装 sendPoll / sendDocument / sendMessage / getUpdates 调用，
/// 并把 API 错误响应归类为 [`EndpointError`]
use super::endpoint::{ChatTarget, MessagingEndpoint, QuizRequest, TextDocument};
use crate::config::Config;
use crate::error::EndpointError;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

/// 被视为“内容被拒绝”的错误描述片段
const CONTENT_REJECTED_MARKERS: [&str; 3] =
    ["too long", "can't parse entities", "unsupported start tag"];

/// 普通请求的超时时间
const REQUEST_TIMEOUT_SECS: u64 = 30;

pub struct TelegramClient {
    http: reqwest::Client,
    /// `{api_base_url}/bot{token}`
    base_url: String,
}

/// Bot API 统一响应包
#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
    error_code: Option<u16>,
    parameters: Option<ResponseParameters>,
}

#[derive(Debug, Deserialize)]
struct ResponseParameters {
    retry_after: Option<u64>,
}

/// getUpdates 返回的一条更新
#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    pub message: Option<IncomingMessage>,
    pub edited_message: Option<IncomingMessage>,
}

impl Update {
    /// 新消息或被编辑的消息
    pub fn into_message(self) -> Option<IncomingMessage> {
        self.message.or(self.edited_message)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct IncomingMessage {
    pub chat: Chat,
    pub from: Option<User>,
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub id: i64,
}

impl IncomingMessage {
    /// 提交者 ID：优先取发送者，其次取会话 ID
    pub fn owner_id(&self) -> i64 {
        self.from.as_ref().map(|u| u.id).unwrap_or(self.chat.id)
    }
}

impl TelegramClient {
    /// 创建新的 Bot API 客户端
    pub fn new(config: &Config) -> Result<Self, EndpointError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(
                REQUEST_TIMEOUT_SECS + config.long_poll_timeout_secs,
            ))
            .build()?;

        Ok(Self {
            http,
            base_url: format!(
                "{}/bot{}",
                config.api_base_url.trim_end_matches('/'),
                config.bot_token
            ),
        })
    }

    /// 长轮询获取更新
    ///
    /// # 参数
    /// - `offset`: 下一条待确认的 update_id
    /// - `timeout_secs`: 服务端挂起等待的秒数
    pub async fn get_updates(
        &self,
        offset: Option<i64>,
        timeout_secs: u64,
    ) -> Result<Vec<Update>, EndpointError> {
        let mut body = json!({
            "timeout": timeout_secs,
            "allowed_updates": ["message", "edited_message"],
        });
        if let Some(offset) = offset {
            body["offset"] = json!(offset);
        }
        self.call("getUpdates", &body).await
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, body: &Value) -> Result<T, EndpointError> {
        debug!("调用 {}: {}", method, body);
        let response = self
            .http
            .post(format!("{}/{}", self.base_url, method))
            .json(body)
            .send()
            .await?;
        Self::read_response(method, response).await
    }

    async fn read_response<T: DeserializeOwned>(
        method: &str,
        response: reqwest::Response,
    ) -> Result<T, EndpointError> {
        let status = response.status().as_u16();
        let text = response.text().await?;
        let parsed: ApiResponse<T> = serde_json::from_str(&text).map_err(|e| {
            EndpointError::Transport(format!("{} 响应无法解析 (HTTP {}): {}", method, status, e))
        })?;

        if parsed.ok {
            return parsed.result.ok_or_else(|| {
                EndpointError::Transport(format!("{} 响应缺少 result 字段", method))
            });
        }

        Err(classify_error(
            parsed.error_code.unwrap_or(status),
            parsed.description.as_deref().unwrap_or_default(),
            parsed.parameters.and_then(|p| p.retry_after),
        ))
    }
}

/// 把 Bot API 错误响应归类
///
/// # 参数
/// - `code`: `error_code`（缺失时用 HTTP 状态码）
/// - `description`: 错误描述
/// - `retry_after`: `parameters.retry_after`
pub fn classify_error(code: u16, description: &str, retry_after: Option<u64>) -> EndpointError {
    let lowered = description.to_lowercase();
    match code {
        429 => EndpointError::RateLimited {
            retry_after: retry_after.unwrap_or(1),
        },
        400 if CONTENT_REJECTED_MARKERS.iter().any(|m| lowered.contains(m)) => {
            EndpointError::ContentRejected(description.to_string())
        }
        400 => EndpointError::BadRequest(description.to_string()),
        403 => EndpointError::Forbidden(description.to_string()),
        _ => EndpointError::Api {
            code,
            description: description.to_string(),
        },
    }
}

#[async_trait]
impl MessagingEndpoint for TelegramClient {
    async fn send_quiz(&self, request: &QuizRequest) -> Result<(), EndpointError> {
        let options: Vec<Value> = request
            .options
            .iter()
            .map(|text| json!({ "text": text }))
            .collect();

        let mut body = json!({
            "chat_id": request.target,
            "question": request.question,
            "options": options,
            "type": "quiz",
            "correct_option_id": request.correct_index,
            "is_anonymous": request.anonymous,
        });
        if let Some(explanation) = &request.explanation {
            body["explanation"] = json!(explanation);
        }

        let _: Value = self.call("sendPoll", &body).await?;
        Ok(())
    }

    async fn send_document(
        &self,
        target: &ChatTarget,
        document: &TextDocument,
    ) -> Result<(), EndpointError> {
        let part = reqwest::multipart::Part::bytes(document.content.clone().into_bytes())
            .file_name(document.file_name.clone())
            .mime_str("text/plain")?;
        let form = reqwest::multipart::Form::new()
            .text("chat_id", target.to_string())
            .text("caption", document.caption.clone())
            .part("document", part);

        debug!("调用 sendDocument: {} -> {}", document.file_name, target);
        let response = self
            .http
            .post(format!("{}/sendDocument", self.base_url))
            .multipart(form)
            .send()
            .await?;
        let _: Value = Self::read_response("sendDocument", response).await?;
        Ok(())
    }

    async fn send_message(&self, target: &ChatTarget, text: &str) -> Result<(), EndpointError> {
        let body = json!({ "chat_id": target, "text": text });
        let _: Value = self.call("sendMessage", &body).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_rate_limit() {
        assert_eq!(
            classify_error(429, "Too Many Requests: retry after 7", Some(7)),
            EndpointError::RateLimited { retry_after: 7 }
        );
    }

    #[test]
    fn test_classify_content_rejected() {
        for description in [
            "Bad Request: message is too long",
            "Bad Request: can't parse entities: unexpected end tag",
            "Bad Request: unsupported start tag \"br\"",
        ] {
            assert!(matches!(
                classify_error(400, description, None),
                EndpointError::ContentRejected(_)
            ));
        }
    }

    #[test]
    fn test_classify_other_codes() {
        assert!(matches!(
            classify_error(400, "Bad Request: chat not found", None),
            EndpointError::BadRequest(_)
        ));
        assert!(matches!(
            classify_error(403, "Forbidden: bot is not a member", None),
            EndpointError::Forbidden(_)
        ));
        assert!(matches!(
            classify_error(502, "Bad Gateway", None),
            EndpointError::Api { code: 502, .. }
        ));
    }

    #[test]
    fn test_update_deserialization() {
        let raw = r#"{"update_id": 10, "message": {"message_id": 1, "chat": {"id": 5, "type": "private"}, "from": {"id": 42, "is_bot": false}, "text": "/start"}}"#;
        let update: Update = serde_json::from_str(raw).unwrap();
        let message = update.into_message().unwrap();
        assert_eq!(message.owner_id(), 42);
        assert_eq!(message.text.as_deref(), Some("/start"));
    }
}
