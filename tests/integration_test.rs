use quiz_poll_dispatch::clients::{CallKind, ChatTarget, MessagingEndpoint, MockEndpoint, QuizRequest};
use quiz_poll_dispatch::orchestrator::{BatchScheduler, CycleOutcome, CycleReport, DispatchQueue};
use quiz_poll_dispatch::parsers::parse_submission;
use quiz_poll_dispatch::services::poll_sender::{ARCHIVE_CAPTION, ARCHIVE_FILE_NAME, LONG_TRUNCATION_MARKER};
use quiz_poll_dispatch::services::SettingsStore;
use quiz_poll_dispatch::workflow::SubmissionFlow;
use quiz_poll_dispatch::{Config, EndpointError, TelegramClient};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

const TWO_QUESTIONS: &str = "Question 1:
What is 2+2?
A. 3
B. 4
C. 5
D. 6
Correct Answer: B
Explanation: basic math

Question 2:
Color of the sky?
A. Red
B. Blue
C. Green
D. Black
Correct Answer: B";

fn setup(mock: &MockEndpoint) -> (SubmissionFlow, Arc<BatchScheduler>) {
    let config = Config::default();
    let queue = DispatchQueue::new();
    let settings = Arc::new(SettingsStore::in_memory());
    let scheduler = Arc::new(BatchScheduler::new(
        queue.clone(),
        Arc::new(mock.clone()),
        settings.clone(),
        config.clone(),
    ));
    let flow = SubmissionFlow::new(queue, settings, config);
    (flow, scheduler)
}

fn layout_b(question: &str) -> String {
    format!("Question.\n{}\nA) one\nB) two\nC) three\nD) four\n\nAns: C\nExplanation because", question)
}

#[tokio::test(start_paused = true)]
async fn test_submission_to_delivery() {
    let mock = MockEndpoint::new();
    let (flow, scheduler) = setup(&mock);

    flow.handle(1, "/setchannel -100555").await;
    flow.handle(1, "/setformat [Quiz] || @channel").await;
    let response = flow.handle(1, TWO_QUESTIONS).await;
    assert!(response.trigger_drain);

    let outcome = scheduler.run_cycle(1).await;

    assert_eq!(
        outcome,
        CycleOutcome::Completed(CycleReport {
            sent: 2,
            total: 2,
            batches: 1
        })
    );
    let sent = mock.quiz_requests();
    assert_eq!(sent[0].target, ChatTarget::Id(-100555));
    assert_eq!(sent[0].question, "[Quiz]\n\nWhat is 2+2?");
    assert_eq!(sent[0].options, vec!["3", "4", "5", "6"]);
    assert_eq!(sent[0].correct_index, 1);
    assert_eq!(sent[0].explanation.as_deref(), Some("basic math\n\n@channel"));
    assert_eq!(sent[1].explanation.as_deref(), Some("@channel"));
}

#[tokio::test(start_paused = true)]
async fn test_drain_leaves_other_owners_in_order() {
    let mock = MockEndpoint::new();
    let (flow, scheduler) = setup(&mock);
    flow.handle(1, "/setchannel @x_channel").await;
    flow.handle(2, "/setchannel @y_channel").await;

    flow.handle(1, &layout_b("x1")).await;
    flow.handle(1, &layout_b("x2")).await;
    flow.handle(2, &layout_b("y1")).await;
    flow.handle(1, &layout_b("x3")).await;
    flow.handle(2, &layout_b("y2")).await;

    scheduler.run_cycle(2).await;

    let remaining: Vec<(i64, String)> = scheduler
        .queue()
        .snapshot()
        .into_iter()
        .map(|item| (item.owner, item.record.question))
        .collect();
    assert_eq!(
        remaining,
        vec![(1, "x1".into()), (1, "x2".into()), (1, "x3".into())]
    );

    scheduler.run_cycle(1).await;
    let questions: Vec<String> = mock.quiz_requests().into_iter().map(|r| r.question).collect();
    assert_eq!(questions, vec!["y1", "y2", "x1", "x2", "x3"]);
    assert!(scheduler.queue().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_submissions_are_accepted_while_a_cycle_runs() {
    let mock = MockEndpoint::new();
    let trigger = mock.add_response_with_trigger(CallKind::Quiz, Ok(()));
    let (flow, scheduler) = setup(&mock);
    flow.handle(1, "/setchannel @first").await;
    flow.handle(2, "/setchannel @second").await;
    flow.handle(1, TWO_QUESTIONS).await;

    let running = {
        let scheduler = scheduler.clone();
        tokio::spawn(async move { scheduler.run_cycle(1).await })
    };
    while !scheduler.queue().state().busy {
        tokio::task::yield_now().await;
    }

    let response = flow.handle(2, TWO_QUESTIONS).await;
    assert!(response.trigger_drain);
    assert_eq!(
        scheduler.run_cycle(2).await,
        CycleOutcome::AlreadyProcessing {
            active_owner: Some(1)
        }
    );
    assert_eq!(scheduler.queue().len(), 2);

    trigger.send(()).unwrap();
    assert!(matches!(
        running.await.unwrap(),
        CycleOutcome::Completed(CycleReport { sent: 2, .. })
    ));
    assert!(!scheduler.queue().state().busy);

    assert!(matches!(
        scheduler.run_cycle(2).await,
        CycleOutcome::Completed(CycleReport { sent: 2, .. })
    ));
}

#[tokio::test(start_paused = true)]
async fn test_rejected_content_is_archived_losslessly() {
    let mock = MockEndpoint::new();
    mock.add_response(
        CallKind::Quiz,
        Err(EndpointError::ContentRejected("Bad Request: message is too long".into())),
    );
    let (flow, scheduler) = setup(&mock);
    flow.handle(1, "/setchannel @long_channel").await;
    flow.handle(1, "/setformat [P] || [S]").await;

    let question = format!("Why {}?", "x".repeat(1200));
    let explanation = format!("Because {}", "y".repeat(2500));
    let text = format!(
        "Question 1:\n{}\nA. 3\nB. 4\nC. 5\nD. 6\nCorrect Answer: B\nExplanation: {}",
        question, explanation
    );
    flow.handle(1, &text).await;

    let outcome = scheduler.run_cycle(1).await;
    assert!(matches!(
        outcome,
        CycleOutcome::Completed(CycleReport { sent: 1, total: 1, .. })
    ));

    let documents = mock.documents();
    assert_eq!(documents.len(), 1);
    let (target, archive) = &documents[0];
    assert_eq!(*target, ChatTarget::Username("@long_channel".into()));
    assert_eq!(archive.file_name, ARCHIVE_FILE_NAME);
    assert_eq!(archive.caption, ARCHIVE_CAPTION);
    assert_eq!(
        archive.content,
        format!(
            "QUESTION:\n[P]\n\n{}\n\nOPTIONS:\nA. 3\nB. 4\nC. 5\nD. 6\n\nEXPLANATION:\n{}\n\n[S]",
            question, explanation
        )
    );

    let retried = &mock.quiz_requests()[1];
    assert_eq!(retried.question.chars().count(), 1000);
    assert!(retried.question.ends_with(LONG_TRUNCATION_MARKER));
    let retried_explanation = retried.explanation.as_deref().unwrap();
    assert_eq!(retried_explanation.chars().count(), 2000);
    assert!(retried_explanation.ends_with(LONG_TRUNCATION_MARKER));
    assert_eq!(retried.correct_index, 1);
}

#[tokio::test]
async fn test_missing_channel_drops_and_notifies() {
    let mock = MockEndpoint::new();
    let (flow, scheduler) = setup(&mock);
    flow.handle(9, TWO_QUESTIONS).await;

    assert_eq!(
        scheduler.run_cycle(9).await,
        CycleOutcome::NoTarget { dropped: 2 }
    );
    assert!(scheduler.queue().is_empty());
    assert!(mock.quiz_requests().is_empty());
    assert_eq!(mock.messages_to(&ChatTarget::Id(9)).len(), 1);
}

#[test]
fn test_parsing_is_idempotent() {
    let csv = "Question,Option1,Option2,Option3,Option4,Answer\n\"Capital of France?\",\"Paris\",\"Rome\",\"Berlin\",\"Madrid\",\"A\"";
    for text in [TWO_QUESTIONS, csv] {
        assert_eq!(parse_submission(text), parse_submission(text));
    }
}

/// 启动只响应一次的本地 HTTP 服务，返回 (地址, 收到的原始请求)
async fn serve_once(
    status: &'static str,
    body: &'static str,
) -> (String, tokio::task::JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut request = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            let n = socket.read(&mut chunk).await.unwrap();
            if n == 0 {
                break;
            }
            request.extend_from_slice(&chunk[..n]);
            if let Some(pos) = request.windows(4).position(|w| w == b"\r\n\r\n") {
                let headers = String::from_utf8_lossy(&request[..pos]).to_lowercase();
                let length = headers
                    .lines()
                    .find_map(|l| l.strip_prefix("content-length:"))
                    .and_then(|v| v.trim().parse::<usize>().ok())
                    .unwrap_or(0);
                if request.len() >= pos + 4 + length {
                    break;
                }
            }
        }
        let response = format!(
            "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            status,
            body.len(),
            body
        );
        socket.write_all(response.as_bytes()).await.unwrap();
        let _ = socket.shutdown().await;
        String::from_utf8_lossy(&request).to_string()
    });
    (format!("http://{}", addr), handle)
}

fn client_for(base_url: String) -> TelegramClient {
    // 本地服务不能走系统代理
    std::env::set_var("NO_PROXY", "127.0.0.1");
    let config = Config {
        bot_token: "TEST".into(),
        api_base_url: base_url,
        ..Config::default()
    };
    TelegramClient::new(&config).unwrap()
}

fn quiz() -> QuizRequest {
    QuizRequest::new(
        ChatTarget::Username("@chan".into()),
        "What is 2+2?".into(),
        vec!["3".into(), "4".into()],
        1,
        "<b>literal</b>".into(),
    )
}

#[tokio::test]
async fn test_telegram_send_poll_request() {
    let (base, server) = serve_once("200 OK", r#"{"ok":true,"result":{"message_id":1}}"#).await;
    let client = client_for(base);

    tokio_test::assert_ok!(client.send_quiz(&quiz()).await);

    let request = server.await.unwrap();
    assert!(request.starts_with("POST /botTEST/sendPoll"));
    assert!(request.contains(r#""type":"quiz""#));
    assert!(request.contains(r#""is_anonymous":true"#));
    assert!(request.contains(r#""correct_option_id":1"#));
    assert!(request.contains(r#""chat_id":"@chan""#));
    assert!(request.contains(r#""explanation":"<b>literal</b>""#));
    assert!(!request.contains("parse_mode"));
}

#[tokio::test]
async fn test_telegram_rate_limit_is_classified() {
    let (base, server) = serve_once(
        "429 Too Many Requests",
        r#"{"ok":false,"error_code":429,"description":"Too Many Requests: retry after 3","parameters":{"retry_after":3}}"#,
    )
    .await;
    let client = client_for(base);

    let result = client.send_quiz(&quiz()).await;

    assert_eq!(result, Err(EndpointError::RateLimited { retry_after: 3 }));
    server.await.unwrap();
}

#[tokio::test]
async fn test_telegram_oversize_is_content_rejected() {
    let (base, server) = serve_once(
        "400 Bad Request",
        r#"{"ok":false,"error_code":400,"description":"Bad Request: message is too long"}"#,
    )
    .await;
    let client = client_for(base);

    let result = client.send_message(&ChatTarget::Id(5), "hi").await;

    assert!(matches!(result, Err(EndpointError::ContentRejected(_))));
    server.await.unwrap();
}
