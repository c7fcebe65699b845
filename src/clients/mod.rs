pub mod endpoint;
pub mod mock_endpoint;
pub mod telegram_client;

pub use endpoint::{ChatTarget, MessagingEndpoint, QuizRequest, TextDocument};
pub use mock_endpoint::{CallKind, EndpointCall, MockEndpoint};
pub use telegram_client::{classify_error, IncomingMessage, TelegramClient, Update};
