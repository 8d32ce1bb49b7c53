//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! Redis 风格的 glob 匹配，供进程内存储实现 SCAN MATCH 语义。
//!
//! 支持 `*`、`?`、`[abc]`、`[^a-z]` 以及 `\` 转义。

use crate::error::{CacheError, Result};
use regex::Regex;

/// 已编译的 glob 模式
#[derive(Clone, Debug)]
pub struct GlobPattern {
    source: String,
    regex: Regex,
}

impl GlobPattern {
    pub fn new(pattern: &str) -> Result<Self> {
        let translated = translate(pattern);
        let regex = Regex::new(&translated)
            .map_err(|e| CacheError::InvalidPattern(format!("{}: {}", pattern, e)))?;
        Ok(Self {
            source: pattern.to_string(),
            regex,
        })
    }

    pub fn matches(&self, key: &str) -> bool {
        self.regex.is_match(key)
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }
}

fn push_literal(out: &mut String, c: char) {
    let mut buf = [0u8; 4];
    out.push_str(&regex::escape(c.encode_utf8(&mut buf)));
}

fn translate(pattern: &str) -> String {
    let chars: Vec<char> = pattern.chars().collect();
    let mut out = String::with_capacity(pattern.len() * 2 + 8);
    out.push_str("(?s)^");

    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            '*' => out.push_str(".*"),
            '?' => out.push('.'),
            '\\' if i + 1 < chars.len() => {
                i += 1;
                push_literal(&mut out, chars[i]);
            }
            '[' => match class_end(&chars, i) {
                Some(end) => {
                    push_class(&mut out, &chars[i + 1..end]);
                    i = end;
                }
                // 未闭合的 '[' 按字面量处理
                None => push_literal(&mut out, '['),
            },
            c => push_literal(&mut out, c),
        }
        i += 1;
    }

    out.push('$');
    out
}

/// 查找与 `start` 处 '[' 配对的 ']'
fn class_end(chars: &[char], start: usize) -> Option<usize> {
    let mut i = start + 1;
    if chars.get(i) == Some(&'^') {
        i += 1;
    }
    while i < chars.len() {
        match chars[i] {
            '\\' => i += 2,
            ']' => return Some(i),
            _ => i += 1,
        }
    }
    None
}

fn push_class(out: &mut String, body: &[char]) {
    let (negated, body) = match body.first() {
        Some('^') => (true, &body[1..]),
        _ => (false, body),
    };
    if body.is_empty() {
        // "[]" 不匹配任何字符，"[^]" 匹配任意字符
        out.push_str(if negated { "." } else { "\\b\\B" });
        return;
    }

    out.push('[');
    if negated {
        out.push('^');
    }
    let mut i = 0;
    while i < body.len() {
        let c = match body[i] {
            '\\' if i + 1 < body.len() => {
                i += 1;
                body[i]
            }
            c => c,
        };
        let is_range = body.get(i + 1) == Some(&'-') && i + 2 < body.len();
        push_class_char(out, c);
        if is_range {
            out.push('-');
            push_class_char(out, body[i + 2]);
            i += 2;
        }
        i += 1;
    }
    out.push(']');
}

fn push_class_char(out: &mut String, c: char) {
    if matches!(c, '\\' | ']' | '[' | '^' | '-' | '&' | '~') {
        out.push('\\');
    }
    out.push(c);
}
