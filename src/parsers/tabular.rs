//! CSV 题目解析
//!
//! 优先按表头映射列；表头无法识别时按位置推断；
//! 文本本身结构损坏（引号未闭合、空表头）时退回到严格的位置读取。
//!
//! 位置推断和答案猜测都是启发式的：
//! - 没有选项列时，取题干列之后的最多 5 列
//! - 没有答案列时，取第一个"纯数字"或"不超过 3 个字符且含字母"的单元格，
//!   选项本身很短（如 `Yes`/`No`）时会误判

use crate::models::{PollRecord, MAX_OPTIONS};
use regex::Regex;
use std::collections::HashMap;
use std::sync::LazyLock;
use thiserror::Error;
use tracing::{debug, warn};

static MARKUP_TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]+>").unwrap());

const QUESTION_KEYS: [&str; 3] = ["questions", "question", "q"];
const ANSWER_KEYS: [&str; 5] = ["answer", "ans", "correct", "correct answer", "correct_answer"];
const EXPLANATION_KEYS: [&str; 4] = ["explanation", "explain", "explanation_text", "explaination"];

/// 选项不足时补齐到的数量
const MIN_OPTION_SLOTS: usize = 4;
/// 位置模式下一行至少需要的列数
const MIN_POSITIONAL_COLUMNS: usize = 6;

/// CSV 文本结构错误
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CsvError {
    #[error("第 {line} 行开始的引号未闭合")]
    UnterminatedQuote { line: usize },
    #[error("表头为空")]
    EmptyHeader,
}

/// 单行被丢弃的原因
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowFailure {
    /// 找不到答案
    MissingAnswer,
    /// 答案既不是字母也不含数字
    UnparsableAnswer(String),
    /// 答案超出选项范围
    AnswerOutOfRange { index: usize, options: usize },
    /// 位置模式下列数不足
    TooFewColumns(usize),
}

/// 解析 CSV 文本
///
/// `strip_markup` 为 true 时去掉题干、选项、解析中的 `<...>` 标签
pub fn parse_tabular(text: &str, strip_markup: bool) -> Vec<PollRecord> {
    match read_rows(text, true).and_then(HeaderMap::from_rows) {
        Ok((header, rows)) => rows
            .iter()
            .enumerate()
            .filter_map(|(i, row)| keep_row(i + 2, header.parse_row(row, strip_markup)))
            .collect(),
        Err(e) => {
            warn!("CSV 表头解析失败，改用位置模式: {}", e);
            parse_positional(text, strip_markup)
        }
    }
}

/// 严格位置模式：0=题干，1–5=选项，6=答案，7=解析
pub fn parse_positional(text: &str, strip_markup: bool) -> Vec<PollRecord> {
    let rows = match read_rows(text, false) {
        Ok(rows) => rows,
        Err(e) => {
            warn!("CSV 读取失败: {}", e);
            return Vec::new();
        }
    };

    rows.iter()
        .enumerate()
        .filter(|(i, row)| !(*i == 0 && looks_like_header(row)))
        .filter_map(|(i, row)| keep_row(i + 1, parse_positional_row(row, strip_markup)))
        .collect()
}

fn keep_row(line: usize, result: Result<PollRecord, RowFailure>) -> Option<PollRecord> {
    match result {
        Ok(record) => Some(record),
        Err(reason) => {
            debug!("跳过 CSV 第 {} 行: {:?}", line, reason);
            None
        }
    }
}

/// 表头列名 → 列下标
struct HeaderMap {
    columns: Vec<String>,
    index: HashMap<String, usize>,
}

impl HeaderMap {
    fn from_rows(mut rows: Vec<Vec<String>>) -> Result<(Self, Vec<Vec<String>>), CsvError> {
        if rows.is_empty() {
            return Ok((
                Self {
                    columns: Vec::new(),
                    index: HashMap::new(),
                },
                rows,
            ));
        }

        let columns = rows.remove(0);
        if columns.iter().all(|c| c.trim().is_empty()) {
            return Err(CsvError::EmptyHeader);
        }

        let mut index = HashMap::new();
        for (i, name) in columns.iter().enumerate() {
            index.entry(name.trim().to_lowercase()).or_insert(i);
        }
        Ok((Self { columns, index }, rows))
    }

    fn find(&self, keys: &[&str]) -> Option<usize> {
        keys.iter().find_map(|k| self.index.get(*k).copied())
    }

    fn parse_row(&self, row: &[String], strip_markup: bool) -> Result<PollRecord, RowFailure> {
        let cell = |i: usize| row.get(i).map(String::as_str).unwrap_or("");

        let question_col = self.find(&QUESTION_KEYS).unwrap_or(0);
        let question = clean(cell(question_col), strip_markup);

        let mut options: Vec<String> = (1..=MAX_OPTIONS)
            .filter_map(|n| self.index.get(&format!("option{}", n)))
            .map(|&i| clean(cell(i), strip_markup))
            .collect();

        if options.iter().all(|o| o.is_empty()) {
            let end = (question_col + 1 + MAX_OPTIONS).min(self.columns.len());
            options = (question_col + 1..end)
                .map(|i| clean(cell(i), strip_markup))
                .collect();
        }
        pad_options(&mut options);

        let explicit = self
            .find(&ANSWER_KEYS)
            .map(|i| cell(i).trim())
            .filter(|v| !v.is_empty());
        let header_cells: Vec<&str> = (0..self.columns.len()).map(cell).collect();
        let raw_answer = explicit
            .or_else(|| guess_answer_cell(&header_cells))
            .ok_or(RowFailure::MissingAnswer)?;
        let correct_index = resolve_answer(raw_answer, options.len())?;

        let explanation = self
            .find(&EXPLANATION_KEYS)
            .map(|i| clean(cell(i), strip_markup))
            .unwrap_or_default();

        Ok(PollRecord::new(question, options, correct_index, explanation))
    }
}

fn parse_positional_row(row: &[String], strip_markup: bool) -> Result<PollRecord, RowFailure> {
    if row.len() < MIN_POSITIONAL_COLUMNS {
        return Err(RowFailure::TooFewColumns(row.len()));
    }

    let question = clean(&row[0], strip_markup);
    let mut options: Vec<String> = row[1..row.len().min(1 + MAX_OPTIONS)]
        .iter()
        .map(|o| clean(o, strip_markup))
        .collect();
    pad_options(&mut options);

    let raw_answer = row
        .get(6)
        .map(|a| a.trim())
        .filter(|a| !a.is_empty())
        .ok_or(RowFailure::MissingAnswer)?;
    let correct_index = resolve_answer(raw_answer, options.len())?;
    let explanation = row.get(7).map(|e| clean(e, strip_markup)).unwrap_or_default();

    Ok(PollRecord::new(question, options, correct_index, explanation))
}

fn looks_like_header(row: &[String]) -> bool {
    row.first()
        .map(|c| QUESTION_KEYS.contains(&c.trim().to_lowercase().as_str()))
        .unwrap_or(false)
}

fn pad_options(options: &mut Vec<String>) {
    while options.len() < MIN_OPTION_SLOTS {
        options.push(String::new());
    }
}

fn clean(value: &str, strip_markup: bool) -> String {
    let value = value.trim();
    if strip_markup {
        MARKUP_TAG.replace_all(value, "").trim().to_string()
    } else {
        value.to_string()
    }
}

/// 启发式答案单元格：第一个纯数字（少于 6 位）或不超过 3 个字符且含字母的单元格
pub fn guess_answer_cell<'a>(cells: &[&'a str]) -> Option<&'a str> {
    cells.iter().copied().map(str::trim).find(|v| {
        if v.is_empty() {
            return false;
        }
        let numeric = v.chars().all(|c| c.is_ascii_digit()) && v.len() < 6;
        let short_alpha = v.chars().count() <= 3 && v.chars().any(char::is_alphabetic);
        numeric || short_alpha
    })
}

/// 答案规范化：首字母 A–E → 0–4；否则取第一串数字作为从 1 开始的序号
pub fn normalize_answer(raw: &str) -> Option<usize> {
    let upper = raw.trim().to_uppercase();
    if let Some(first @ 'A'..='E') = upper.chars().next() {
        return Some(first as usize - 'A' as usize);
    }

    let digits: String = upper
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse::<usize>().ok()?.checked_sub(1)
}

fn resolve_answer(raw: &str, option_count: usize) -> Result<usize, RowFailure> {
    let index =
        normalize_answer(raw).ok_or_else(|| RowFailure::UnparsableAnswer(raw.to_string()))?;
    if index >= option_count {
        return Err(RowFailure::AnswerOutOfRange {
            index,
            options: option_count,
        });
    }
    Ok(index)
}

/// 读取 CSV 行，支持引号字段、`""` 转义和字段内换行
///
/// `strict` 为 false 时，未闭合的引号一直延续到文本结尾；全空行被忽略
fn read_rows(text: &str, strict: bool) -> Result<Vec<Vec<String>>, CsvError> {
    let mut rows = Vec::new();
    let mut row: Vec<String> = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut quote_line = 0;
    let mut line = 1;
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            match c {
                '"' if chars.peek() == Some(&'"') => {
                    chars.next();
                    field.push('"');
                }
                '"' => in_quotes = false,
                '\n' => {
                    line += 1;
                    field.push(c);
                }
                _ => field.push(c),
            }
            continue;
        }

        match c {
            '"' if field.is_empty() => {
                in_quotes = true;
                quote_line = line;
            }
            ',' => row.push(std::mem::take(&mut field)),
            '\r' if chars.peek() == Some(&'\n') => {}
            '\r' | '\n' => {
                line += 1;
                row.push(std::mem::take(&mut field));
                push_row(&mut rows, std::mem::take(&mut row));
            }
            _ => field.push(c),
        }
    }

    if in_quotes && strict {
        return Err(CsvError::UnterminatedQuote { line: quote_line });
    }
    if !field.is_empty() || !row.is_empty() {
        row.push(field);
        push_row(&mut rows, row);
    }
    Ok(rows)
}

fn push_row(rows: &mut Vec<Vec<String>>, row: Vec<String>) {
    if row.iter().any(|f| !f.trim().is_empty()) {
        rows.push(row);
    }
}
