//! 题目解析层
//!
//! - `free_text` - 两种人工书写布局
//! - `tabular` - CSV（表头映射 / 位置推断）
//!
//! 入口 [`parse_submission`] 只看第一行决定走哪个解析器

pub mod free_text;
pub mod tabular;

pub use free_text::{parse_block, parse_free_text, BlockFailure};
pub use tabular::{normalize_answer, parse_positional, parse_tabular, CsvError, RowFailure};

use crate::models::PollRecord;
use regex::Regex;
use std::sync::LazyLock;

const TABULAR_HEADER_HINTS: [&str; 3] = ["question", "questions", "option1"];

static HAS_QUESTION_KEYWORD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)Question").unwrap());
static HAS_ANSWER_KEYWORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(Correct\s*Answer|Ans|Answer)").unwrap());

/// 输入格式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputFormat {
    Tabular,
    FreeText,
}

/// 一次提交的解析结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Submission {
    /// 自由文本缺少 `Question` 或答案关键字，没有尝试解析
    NotRecognized,
    Parsed {
        format: InputFormat,
        records: Vec<PollRecord>,
    },
}

/// 根据第一行非空文本判断格式
///
/// 含逗号且含表头关键字（或以 `questions` 开头）时视为 CSV，其余都按自由文本处理
pub fn detect_format(text: &str) -> InputFormat {
    let Some(first_line) = text.lines().find(|l| !l.trim().is_empty()) else {
        return InputFormat::FreeText;
    };

    let lower = first_line.trim().to_lowercase();
    let has_hint = TABULAR_HEADER_HINTS.iter().any(|h| lower.contains(h));
    if lower.contains(',') && (has_hint || lower.starts_with("questions")) {
        InputFormat::Tabular
    } else {
        InputFormat::FreeText
    }
}

/// 自由文本至少要同时出现题目和答案关键字
pub fn looks_like_quiz_text(text: &str) -> bool {
    HAS_QUESTION_KEYWORD.is_match(text) && HAS_ANSWER_KEYWORD.is_match(text)
}

/// 检测格式并解析整条提交
pub fn parse_submission(text: &str) -> Submission {
    match detect_format(text) {
        InputFormat::Tabular => Submission::Parsed {
            format: InputFormat::Tabular,
            records: parse_tabular(text, false),
        },
        InputFormat::FreeText if !looks_like_quiz_text(text) => Submission::NotRecognized,
        InputFormat::FreeText => Submission::Parsed {
            format: InputFormat::FreeText,
            records: parse_free_text(text),
        },
    }
}
