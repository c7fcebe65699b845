//! 自由文本题目解析
//!
//! 支持两种人工书写的布局：
//!
//! ```text
//! Question 1:              Question.
//! 题干                      题干
//! A. ...                   A) ...
//! B. ...                   B) ...
//! C. ...                   C) ...
//! D. ...                   D) ...
//! Correct Answer: B        Ans: B
//! Explanation: ...         Explanation ...
//! ```
//!
//! 每个 `Question` 块独立解析，任何一块失败都只丢弃该块。
//! 每一步都是"主策略 → 兜底策略"的有序组合，先命中者生效。

use crate::models::PollRecord;
use regex::Regex;
use std::collections::HashMap;
use std::sync::LazyLock;
use tracing::debug;

static QUESTION_HEADER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?im)^[ \t]*Question[ \t]*\d*[ \t]*[:.]").unwrap());

/// 第一行选项 A 的起始位置（必须在换行之后）
static FIRST_OPTION_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\n\s*A\s*[.)]").unwrap());

static STARTS_WITH_OPTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^\s*A\s*[.)]").unwrap());

/// 行首的选项标记 `A.` / `A)` / `A )`
static OPTION_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?im)^[ \t]*([A-D])[ \t]*[.)]").unwrap());

static OPTION_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^\s*([A-D])\s*[.)]\s*(.*)$").unwrap());

/// 行首的答案标记，优先于任意位置的匹配
static ANSWER_LINE_START: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?im)^[ \t]*(?:Correct[ \t]*Answer|Answer|Ans)[ \t]*[:.]?[ \t]*([A-D])\b").unwrap()
});

/// 字母必须独占一行（允许 `D.` / `D)`），避免把下一行的选项标记当成答案
static ANSWER_LINE_START_NEXT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?im)^[ \t]*(?:Correct[ \t]*Answer|Answer|Ans)[ \t]*[:.]?[ \t]*\n\s*([A-D])[ \t]*[.)]?[ \t]*$").unwrap()
});

static ANSWER_SAME_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:Correct[ \t]*Answer|Answer|Ans)[ \t]*[:.]?[ \t]*([A-D])\b").unwrap()
});

static ANSWER_NEXT_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?im)\b(?:Correct[ \t]*Answer|Answer|Ans)[ \t]*[:.]?[ \t]*\n\s*([A-D])[ \t]*[.)]?[ \t]*$").unwrap()
});

static EXPLANATION_LINE_START: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?ims)^[ \t]*Explanation\s*[:.]?\s*(.*)").unwrap());

static EXPLANATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)Explanation\s*[:.]?\s*(.*)").unwrap());

const LETTERS: [char; 4] = ['A', 'B', 'C', 'D'];

/// 单个题目块被丢弃的原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockFailure {
    /// 块内没有内容
    Empty,
    /// A–D 四个选项不完整
    MissingOptions,
    /// 找不到答案标记
    MissingAnswer,
    /// 答案字母不在 A–D 之内
    AnswerOutOfRange,
}

/// 解析整段自由文本，返回所有成功识别的题目
///
/// 不会失败：无法解析的块被逐个跳过
pub fn parse_free_text(text: &str) -> Vec<PollRecord> {
    let normalized = normalize_line_endings(text);

    QUESTION_HEADER
        .split(&normalized)
        .filter(|block| !block.trim().is_empty())
        .enumerate()
        .filter_map(|(i, block)| match parse_block(block) {
            Ok(record) => Some(record),
            Err(reason) => {
                debug!("跳过第 {} 个题目块: {:?}", i + 1, reason);
                None
            }
        })
        .collect()
}

/// 解析一个 `Question` 块
pub fn parse_block(block: &str) -> Result<PollRecord, BlockFailure> {
    let block = block.trim();
    if block.is_empty() {
        return Err(BlockFailure::Empty);
    }

    let question = extract_question(block);

    let options = options_by_markers(block)
        .or_else(|| options_by_lines(block))
        .ok_or(BlockFailure::MissingOptions)?;

    // 答案和解析只在选项区及其之后查找，题干中的关键词不参与匹配
    let tail = answer_region(block);
    let (letter, answer_end) = answer_letter(tail).ok_or(BlockFailure::MissingAnswer)?;
    let correct_index = LETTERS
        .iter()
        .position(|&l| l == letter)
        .ok_or(BlockFailure::AnswerOutOfRange)?;

    Ok(PollRecord::new(
        question,
        options.to_vec(),
        correct_index,
        extract_explanation(tail, answer_end),
    ))
}

fn normalize_line_endings(text: &str) -> String {
    text.replace("\r\n", "\n").replace('\r', "\n")
}

/// 题干：第一个选项行之前的全部文本
///
/// 找不到选项行时退回到第一行；第一行本身就是选项时题干为空
fn extract_question(block: &str) -> String {
    if let Some(m) = FIRST_OPTION_LINE.find(block) {
        return block[..m.start()].trim().to_string();
    }

    match block.lines().next() {
        Some(first) if !STARTS_WITH_OPTION.is_match(first) => first.trim().to_string(),
        _ => String::new(),
    }
}

/// 主策略：按顺序定位 A、B、C、D 标记，每个选项截止到下一个标记
///
/// 选项可以跨行；D 只取到行尾，避免吞掉答案和解析
fn options_by_markers(block: &str) -> Option<[String; 4]> {
    let mut positions: Vec<(usize, usize)> = Vec::with_capacity(4);
    let mut search_from = 0;

    for letter in LETTERS {
        let found = OPTION_MARKER.captures_iter(block).find(|caps| {
            let whole = caps.get(0).map(|m| m.start()).unwrap_or(0);
            whole >= search_from && first_char_upper(&caps[1]) == Some(letter)
        })?;
        let whole = found.get(0)?;
        positions.push((whole.start(), whole.end()));
        search_from = whole.end();
    }

    let mut options: [String; 4] = Default::default();
    for (i, &(_, body_start)) in positions.iter().enumerate() {
        let body_end = match positions.get(i + 1) {
            Some(&(next_start, _)) => next_start,
            None => block[body_start..]
                .find('\n')
                .map(|off| body_start + off)
                .unwrap_or(block.len()),
        };
        options[i] = block[body_start..body_end].trim().to_string();
    }
    Some(options)
}

/// 兜底策略：逐行扫描 `<字母><.|)><文本>`，四个字母必须齐全
fn options_by_lines(block: &str) -> Option<[String; 4]> {
    let mut found: HashMap<char, String> = HashMap::new();
    for line in block.lines() {
        if let Some(caps) = OPTION_LINE.captures(line) {
            if let Some(letter) = first_char_upper(&caps[1]) {
                found.insert(letter, caps[2].trim().to_string());
            }
        }
    }

    let mut options: [String; 4] = Default::default();
    for (i, letter) in LETTERS.iter().enumerate() {
        options[i] = found.remove(letter)?;
    }
    Some(options)
}

/// 从第一个选项行开始的剩余文本；块以选项开头时即整个块
fn answer_region(block: &str) -> &str {
    FIRST_OPTION_LINE
        .find(block)
        .map(|m| &block[m.start()..])
        .unwrap_or(block)
}

/// 答案字母及答案标记的结束位置
///
/// 依次尝试：行首同一行、行首换行、任意位置同一行、任意位置换行
fn answer_letter(region: &str) -> Option<(char, usize)> {
    [
        &*ANSWER_LINE_START,
        &*ANSWER_LINE_START_NEXT,
        &*ANSWER_SAME_LINE,
        &*ANSWER_NEXT_LINE,
    ]
    .iter()
    .find_map(|re| re.captures(region))
    .and_then(|caps| {
        let end = caps.get(0)?.end();
        first_char_upper(&caps[1]).map(|letter| (letter, end))
    })
}

/// 解析：优先取行首的 `Explanation`，否则只在答案之后查找
fn extract_explanation(region: &str, answer_end: usize) -> String {
    EXPLANATION_LINE_START
        .captures(region)
        .or_else(|| EXPLANATION.captures(&region[answer_end..]))
        .map(|caps| caps[1].trim().to_string())
        .unwrap_or_default()
}

fn first_char_upper(s: &str) -> Option<char> {
    s.chars().next().map(|c| c.to_ascii_uppercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NO_QUESTION_TEXT;

    #[test]
    fn test_layout_a() {
        let text = "Question 1:\nWhat is 2+2?\nA. 3\nB. 4\nC. 5\nD. 6\nCorrect Answer: B\nExplanation: basic math";
        let records = parse_free_text(text);
        assert_eq!(records.len(), 1);
        let r = &records[0];
        assert_eq!(r.question, "What is 2+2?");
        assert_eq!(r.options, vec!["3", "4", "5", "6"]);
        assert_eq!(r.correct_index, 1);
        assert_eq!(r.explanation, "basic math");
    }

    #[test]
    fn test_layout_b() {
        let text = "Question.\nCapital of Japan?\nA) Seoul\nB) Beijing\nC) Tokyo\nD) Bangkok\n\nAns: C\nExplanation Tokyo has been the capital since 1868.";
        let records = parse_free_text(text);
        assert_eq!(records.len(), 1);
        let r = &records[0];
        assert_eq!(r.question, "Capital of Japan?");
        assert_eq!(r.options, vec!["Seoul", "Beijing", "Tokyo", "Bangkok"]);
        assert_eq!(r.correct_index, 2);
        assert_eq!(r.explanation, "Tokyo has been the capital since 1868.");
    }

    #[test]
    fn test_multiple_blocks_with_crlf_and_mixed_separators() {
        let text = "Question 1:\r\nFirst?\r\nA. a1\r\nB. b1\r\nC. c1\r\nD. d1\r\nAnswer: a\r\n\r\nquestion 2.\r\nSecond?\r\nA ) a2\r\nB ) b2\r\nC ) c2\r\nD ) d2\r\nCorrect answer: D";
        let records = parse_free_text(text);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].correct_index, 0);
        assert_eq!(records[0].explanation, "");
        assert_eq!(records[1].question, "Second?");
        assert_eq!(records[1].options, vec!["a2", "b2", "c2", "d2"]);
        assert_eq!(records[1].correct_index, 3);
    }

    #[test]
    fn test_multiline_question_and_option() {
        let text = "Question 3:\nRead the passage.\nWhich is true?\nA. first line\ncontinues here\nB. two\nC. three\nD. four\nAns: A";
        let r = &parse_free_text(text)[0];
        assert_eq!(r.question, "Read the passage.\nWhich is true?");
        assert_eq!(r.options[0], "first line\ncontinues here");
        assert_eq!(r.options[3], "four");
    }

    #[test]
    fn test_answer_letter_on_its_own_line() {
        let text = "Question:\nPick one\nA. x\nB. y\nC. z\nD. w\nAns.\nD";
        let records = parse_free_text(text);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].correct_index, 3);
    }

    #[test]
    fn test_out_of_order_options_use_line_scan() {
        let block = "Shuffled?\nB. bee\nA. ay\nD. dee\nC. see\nAnswer: C";
        let record = parse_block(block).unwrap();
        assert_eq!(record.options, vec!["ay", "bee", "see", "dee"]);
        assert_eq!(record.correct_index, 2);
    }

    #[test]
    fn test_missing_options_drops_block() {
        let text = "Question 1:\nOnly two?\nA. yes\nB. no\nCorrect Answer: A";
        assert!(parse_free_text(text).is_empty());
        assert_eq!(
            parse_block("Only two?\nA. yes\nB. no\nCorrect Answer: A"),
            Err(BlockFailure::MissingOptions)
        );
    }

    #[test]
    fn test_missing_answer_drops_only_that_block() {
        let text = "Question 1:\nMissing key?\nA. 1\nB. 2\nC. 3\nD. 4\n\nQuestion 2:\nHas answer\nA. 1\nB. 2\nC. 3\nD. 4\nAns: B";
        let records = parse_free_text(text);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].question, "Has answer");
        assert_eq!(
            parse_block("Missing key?\nA. 1\nB. 2\nC. 3\nD. 4"),
            Err(BlockFailure::MissingAnswer)
        );
    }

    #[test]
    fn test_empty_headers_are_skipped() {
        let text = "Question 1:\nQuestion 2:\n\nQuestion 3:\nReal?\nA. a\nB. b\nC. c\nD. d\nAns: B";
        let records = parse_free_text(text);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].question, "Real?");
    }

    #[test]
    fn test_missing_question_text_uses_placeholder() {
        let text = "Question 1:\nA. a\nB. b\nC. c\nD. d\nAns: A";
        let records = parse_free_text(text);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].question, NO_QUESTION_TEXT);
    }

    #[test]
    fn test_answer_word_inside_question_does_not_win() {
        let text = "Question 1:\nWhich answer below is right?\nA. one\nB. two\nC. three\nD. four\nCorrect Answer: D";
        let records = parse_free_text(text);
        assert_eq!(records[0].correct_index, 3);
    }

    #[test]
    fn test_answer_verb_in_question_is_ignored() {
        let text = "Question 1:\nHow should you answer a riddle?\nA. quickly\nB. slowly\nC. honestly\nD. never\nCorrect Answer: C\nExplanation: be honest";
        let records = parse_free_text(text);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].question, "How should you answer a riddle?");
        assert_eq!(records[0].correct_index, 2);
        assert_eq!(records[0].explanation, "be honest");
    }

    #[test]
    fn test_explanation_word_in_question_is_ignored() {
        let text = "Question 1:\nWhich explanation fits best?\nA. one\nB. two\nC. three\nD. four\nCorrect Answer: B\nExplanation: two fits";
        let records = parse_free_text(text);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].question, "Which explanation fits best?");
        assert_eq!(records[0].explanation, "two fits");
    }

    #[test]
    fn test_explanation_inline_after_answer() {
        let record = parse_block("Q?\nA. 1\nB. 2\nC. 3\nD. 4\nAns: B explanation: two").unwrap();
        assert_eq!(record.correct_index, 1);
        assert_eq!(record.explanation, "two");
    }

    #[test]
    fn test_answer_letter_on_next_line_with_marker() {
        let text = "Question.\nPick\nA) x\nB) y\nC) z\nD) w\nAns:\nD.";
        let records = parse_free_text(text);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].options, vec!["x", "y", "z", "w"]);
        assert_eq!(records[0].correct_index, 3);
    }

    #[test]
    fn test_reparse_is_identical() {
        let text = "Question 1:\nQ?\nA. 1\nB. 2\nC. 3\nD. 4\nAns: C\nExplanation: because";
        assert_eq!(parse_free_text(text), parse_free_text(text));
    }
}
