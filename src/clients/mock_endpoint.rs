//! 测试用消息端点
//!
//! 按调用类型预置 FIFO 响应，并记录每次调用及其发生时刻（tokio 时钟）。
//! 预置响应用完后默认返回成功。

use super::endpoint::{ChatTarget, MessagingEndpoint, QuizRequest, TextDocument};
use crate::error::EndpointError;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio::time::Instant;

/// 端点调用类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallKind {
    Quiz,
    Document,
    Message,
}

/// 一次被记录的端点调用
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EndpointCall {
    Quiz(QuizRequest),
    Document {
        target: ChatTarget,
        document: TextDocument,
    },
    Message {
        target: ChatTarget,
        text: String,
    },
}

impl EndpointCall {
    pub fn kind(&self) -> CallKind {
        match self {
            EndpointCall::Quiz(_) => CallKind::Quiz,
            EndpointCall::Document { .. } => CallKind::Document,
            EndpointCall::Message { .. } => CallKind::Message,
        }
    }
}

enum MockResponse {
    Immediate(Result<(), EndpointError>),
    /// 等待触发后才返回
    Triggered {
        response: Result<(), EndpointError>,
        trigger: oneshot::Receiver<()>,
    },
}

#[derive(Clone, Default)]
pub struct MockEndpoint {
    responses: Arc<Mutex<HashMap<CallKind, VecDeque<MockResponse>>>>,
    calls: Arc<Mutex<Vec<(Instant, EndpointCall)>>>,
}

impl MockEndpoint {
    pub fn new() -> Self {
        Self::default()
    }

    /// 为某类调用追加一个预置响应，按 FIFO 顺序消费
    pub fn add_response(&self, kind: CallKind, response: Result<(), EndpointError>) {
        self.responses
            .lock()
            .entry(kind)
            .or_default()
            .push_back(MockResponse::Immediate(response));
    }

    /// 追加一个需要手动触发的响应
    ///
    /// 返回的 sender 发送 `()` 或被 drop 时，对应调用才会完成
    pub fn add_response_with_trigger(
        &self,
        kind: CallKind,
        response: Result<(), EndpointError>,
    ) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        self.responses
            .lock()
            .entry(kind)
            .or_default()
            .push_back(MockResponse::Triggered {
                response,
                trigger: rx,
            });
        tx
    }

    pub fn calls(&self) -> Vec<EndpointCall> {
        self.calls.lock().iter().map(|(_, c)| c.clone()).collect()
    }

    pub fn quiz_requests(&self) -> Vec<QuizRequest> {
        self.calls
            .lock()
            .iter()
            .filter_map(|(_, c)| match c {
                EndpointCall::Quiz(request) => Some(request.clone()),
                _ => None,
            })
            .collect()
    }

    /// 所有投票请求的发起时刻
    pub fn quiz_times(&self) -> Vec<Instant> {
        self.calls
            .lock()
            .iter()
            .filter(|(_, c)| c.kind() == CallKind::Quiz)
            .map(|(at, _)| *at)
            .collect()
    }

    pub fn documents(&self) -> Vec<(ChatTarget, TextDocument)> {
        self.calls
            .lock()
            .iter()
            .filter_map(|(_, c)| match c {
                EndpointCall::Document { target, document } => {
                    Some((target.clone(), document.clone()))
                }
                _ => None,
            })
            .collect()
    }

    pub fn messages(&self) -> Vec<(ChatTarget, String)> {
        self.calls
            .lock()
            .iter()
            .filter_map(|(_, c)| match c {
                EndpointCall::Message { target, text } => Some((target.clone(), text.clone())),
                _ => None,
            })
            .collect()
    }

    /// 发给某个目标的文本消息
    pub fn messages_to(&self, target: &ChatTarget) -> Vec<String> {
        self.messages()
            .into_iter()
            .filter(|(t, _)| t == target)
            .map(|(_, text)| text)
            .collect()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    fn record(&self, call: EndpointCall) -> Option<MockResponse> {
        let kind = call.kind();
        self.calls.lock().push((Instant::now(), call));
        self.responses
            .lock()
            .get_mut(&kind)
            .and_then(|queue| queue.pop_front())
    }

    async fn respond(response: Option<MockResponse>) -> Result<(), EndpointError> {
        match response {
            None => Ok(()),
            Some(MockResponse::Immediate(result)) => result,
            Some(MockResponse::Triggered { response, trigger }) => {
                // sender 被 drop 同样视为触发
                let _ = trigger.await;
                response
            }
        }
    }
}

#[async_trait]
impl MessagingEndpoint for MockEndpoint {
    async fn send_quiz(&self, request: &QuizRequest) -> Result<(), EndpointError> {
        let response = self.record(EndpointCall::Quiz(request.clone()));
        Self::respond(response).await
    }

    async fn send_document(
        &self,
        target: &ChatTarget,
        document: &TextDocument,
    ) -> Result<(), EndpointError> {
        let response = self.record(EndpointCall::Document {
            target: target.clone(),
            document: document.clone(),
        });
        Self::respond(response).await
    }

    async fn send_message(&self, target: &ChatTarget, text: &str) -> Result<(), EndpointError> {
        let response = self.record(EndpointCall::Message {
            target: target.clone(),
            text: text.to_string(),
        });
        Self::respond(response).await
    }
}
