//! Pretty-printing for node replies, in the style redis-cli users expect:
//! `(integer) 3`, `(nil)`, numbered array items, red errors.

use std::fmt::Write;

use colored::Colorize;
use shardis::{Frame, NodeReplies};

pub fn format_response(frame: &Frame) -> String {
    let mut out = String::new();
    render(frame, "", &mut out);
    out
}

/// One block per node: the address as a header, then the reply indented
/// beneath it.
pub fn format_node_replies(replies: &NodeReplies) -> String {
    let mut out = String::new();
    for (node, frame) in replies {
        if !out.is_empty() {
            out.push('\n');
        }
        let _ = writeln!(out, "{}", node.cyan().bold());
        render(frame, "  ", &mut out);
    }
    out
}

/// Drops ANSI escape sequences and control characters from text a node
/// sent back. Tabs and line breaks are kept.
fn sanitize(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();
    while let Some(ch) = chars.next() {
        match ch {
            '\x1b' => {
                if chars.next_if_eq(&'[').is_some() {
                    // CSI parameters run until the final letter
                    chars.by_ref().find(char::is_ascii_alphabetic);
                }
            }
            '\t' | '\n' | '\r' => out.push(ch),
            c if c.is_control() => {}
            c => out.push(c),
        }
    }
    out
}

fn render(frame: &Frame, indent: &str, out: &mut String) {
    let _ = match frame {
        Frame::Simple(s) => write!(out, "{indent}{}", sanitize(s).green()),
        Frame::Error(e) => write!(out, "{indent}{} {}", "(error)".red(), sanitize(e).red()),
        Frame::Integer(n) => write!(out, "{indent}{}", format!("(integer) {n}").yellow()),
        Frame::Double(d) => write!(out, "{indent}{}", format!("(double) {d}").yellow()),
        Frame::Boolean(b) => write!(out, "{indent}{}", format!("({b})").yellow()),
        Frame::Null => write!(out, "{indent}{}", "(nil)".dimmed()),
        Frame::Bulk(data) => match std::str::from_utf8(data) {
            // multi-line text such as INFO prints as-is
            Ok(text) if text.contains('\n') => {
                let lines: Vec<String> = sanitize(text)
                    .lines()
                    .map(|l| format!("{indent}{}", l.green()))
                    .collect();
                write!(out, "{}", lines.join("\n"))
            }
            Ok(text) => write!(out, "{indent}{}", format!("\"{}\"", sanitize(text)).green()),
            Err(_) => {
                let hex = data.iter().fold(String::new(), |mut acc, b| {
                    let _ = write!(acc, "{b:02x}");
                    acc
                });
                write!(out, "{indent}{}", hex.green())
            }
        },
        Frame::Array(items) if items.is_empty() => {
            write!(out, "{indent}{}", "(empty array)".dimmed())
        }
        Frame::Map(pairs) if pairs.is_empty() => {
            write!(out, "{indent}{}", "(empty map)".dimmed())
        }
        Frame::Array(items) => {
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push('\n');
                }
                let _ = write!(out, "{indent}{}) ", i + 1);
                render(item, "", out);
            }
            Ok(())
        }
        Frame::Map(pairs) => {
            for (i, (key, value)) in pairs.iter().enumerate() {
                if i > 0 {
                    out.push('\n');
                }
                let _ = write!(out, "{indent}{}) ", i + 1);
                render(key, "", out);
                out.push_str(" => ");
                render(value, "", out);
            }
            Ok(())
        }
    };
}
