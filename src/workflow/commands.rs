//! 用户命令解析
//!
//! 以 `/` 开头的消息按命令处理，其余文本都视为题目提交

use crate::clients::ChatTarget;
use crate::services::OwnerFormat;

pub const HELP_TEXT: &str = "🤖 Quiz Poll Bot

First set the target channel:
 /setchannel <channel_id_or_username>

Examples:
 /setchannel -1001234567890
 /setchannel @mychannel

(Add the bot to the channel and allow it to post.)

Optionally set a format:
 /setformat <prefix> || <suffix>

Example:
 /setformat [SOT] || [@SOT_Academy]

Then send MCQ text. Both layouts are supported:

Layout 1 -
Question 1:
Question text
A. ...
B. ...
C. ...
D. ...
Correct Answer: A
Explanation: ...

Layout 2 -
Question.
Question text
A)
B)
C)
D)

Ans: A
Explanation: ...

Or send CSV:
Question,Option1,Option2,Option3,Option4,Option5,Answer,Explanation";

pub const SET_CHANNEL_USAGE: &str = "Usage: /setchannel <channel_id_or_username>";
pub const SET_FORMAT_USAGE: &str = "Usage: /setformat <prefix> || <suffix>";
pub const FORMAT_SAVED_TEXT: &str = "✅ Format saved!";
pub const UNKNOWN_COMMAND_TEXT: &str = "Unknown command. Use /start for instructions.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `/start` 或 `/help`
    Help,
    /// `/setchannel <id>`，保留原始输入用于回复
    SetChannel { raw: String, target: ChatTarget },
    SetChannelUsage,
    /// `/setformat <prefix> || <suffix>`
    SetFormat(OwnerFormat),
    SetFormatUsage,
    Unknown(String),
    /// 普通文本：题目提交
    Submission(String),
}

impl Command {
    pub fn parse(text: &str) -> Self {
        let trimmed = text.trim_start();
        if !trimmed.starts_with('/') {
            return Command::Submission(text.to_string());
        }

        let (head, rest) = trimmed
            .split_once(char::is_whitespace)
            .unwrap_or((trimmed, ""));
        // 群组中的命令可能带 `@botname` 后缀
        let name = head.split('@').next().unwrap_or(head).to_lowercase();
        let args: Vec<&str> = rest.split_whitespace().collect();

        match name.as_str() {
            "/start" | "/help" => Command::Help,
            "/setchannel" => match args.first() {
                Some(raw) => Command::SetChannel {
                    raw: raw.to_string(),
                    target: ChatTarget::parse(raw),
                },
                None => Command::SetChannelUsage,
            },
            "/setformat" => {
                let joined = args.join(" ");
                match joined.split_once("||") {
                    Some((prefix, suffix)) => {
                        Command::SetFormat(OwnerFormat::new(prefix.trim(), suffix.trim()))
                    }
                    None => Command::SetFormatUsage,
                }
            }
            _ => Command::Unknown(name),
        }
    }
}
