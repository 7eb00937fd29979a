//! stubls - a small language server used to exercise the harness.
//!
//! Speaks Content-Length framed JSON-RPC over stdin/stdout and publishes
//! diagnostics for a toy expression language: any identifier that is neither
//! bound by a `let` or lambda parameter nor a keyword or builtin is reported
//! as undefined. Scope is flat across the whole document. CLI flags inject
//! the failure modes the harness must survive. No tokio — one thread,
//! blocking reads.

use std::io::{Read, Write};

use clap::Parser;
use serde_json::Value;

#[derive(Debug, Parser)]
#[command(name = "stubls")]
struct Args {
    /// Exit immediately without reading anything.
    #[arg(long)]
    crash_on_start: bool,

    /// Write a header with a garbage Content-Length before normal operation.
    #[arg(long)]
    bad_framing: bool,

    /// Never publish diagnostics.
    #[arg(long)]
    no_diagnostics: bool,

    /// Exit right after the first didOpen, before publishing.
    #[arg(long)]
    exit_on_open: bool,

    /// Sleep before each publish (milliseconds).
    #[arg(long, default_value_t = 0)]
    diagnostics_delay: u64,
}

const KEYWORDS: &[&str] = &["let", "in", "if", "then", "else", "true", "false"];
const BUILTINS: &[&str] = &["length", "map", "filter", "sum"];

fn main() {
    let args = Args::parse();

    if args.crash_on_start {
        std::process::exit(1);
    }

    let stdout = std::io::stdout();
    if args.bad_framing {
        let mut out = stdout.lock();
        let _ = out.write_all(b"Content-Length: bogus\r\n\r\n");
        let _ = out.flush();
    }

    serve(&args, &mut std::io::stdin().lock(), &mut stdout.lock());
}

fn serve(args: &Args, reader: &mut dyn Read, writer: &mut dyn Write) {
    let mut buffer = Vec::new();
    let mut temp = [0u8; 4096];

    loop {
        match reader.read(&mut temp) {
            Ok(0) | Err(_) => break,
            Ok(n) => buffer.extend_from_slice(&temp[..n]),
        }

        while let Some((message, consumed)) = try_parse_message(&buffer) {
            buffer.drain(..consumed);

            let Ok(frame) = serde_json::from_str::<Value>(&message) else {
                continue;
            };

            handle_frame(args, &frame, writer);
        }
    }
}

fn handle_frame(args: &Args, frame: &Value, writer: &mut dyn Write) {
    let method = frame.get("method").and_then(Value::as_str);
    let id = frame.get("id").cloned();

    match (method, id) {
        (Some("initialize"), Some(id)) => {
            write_framed(
                writer,
                &serde_json::json!({
                    "jsonrpc": "2.0",
                    "id": id,
                    "result": {
                        "capabilities": {
                            "textDocumentSync": { "openClose": true, "change": 1 }
                        },
                        "serverInfo": { "name": "stubls" }
                    }
                }),
            );
        }
        (Some("shutdown"), Some(id)) => {
            write_framed(
                writer,
                &serde_json::json!({ "jsonrpc": "2.0", "id": id, "result": null }),
            );
        }
        (Some(unknown), Some(id)) => {
            write_framed(
                writer,
                &serde_json::json!({
                    "jsonrpc": "2.0",
                    "id": id,
                    "error": { "code": -32601, "message": format!("stubls: method not found: {unknown}") }
                }),
            );
        }
        (Some("textDocument/didOpen"), None) => {
            if args.exit_on_open {
                std::process::exit(1);
            }
            let td = frame.get("params").and_then(|p| p.get("textDocument"));
            let uri = td
                .and_then(|td| td.get("uri"))
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            let text = td
                .and_then(|td| td.get("text"))
                .and_then(Value::as_str)
                .unwrap_or_default();

            if !args.no_diagnostics {
                if args.diagnostics_delay > 0 {
                    std::thread::sleep(std::time::Duration::from_millis(args.diagnostics_delay));
                }
                publish_diagnostics(writer, &uri, text);
            }
        }
        (Some("exit"), None) => {
            std::process::exit(0);
        }
        _ => {}
    }
}

fn publish_diagnostics(writer: &mut dyn Write, uri: &str, text: &str) {
    let diagnostics: Vec<Value> = analyze(text)
        .into_iter()
        .map(|issue| {
            serde_json::json!({
                "range": {
                    "start": { "line": issue.line, "character": issue.col },
                    "end": { "line": issue.line, "character": issue.col + issue.name.len() }
                },
                "severity": 1,
                "source": "stubls",
                "message": format!("undefined variable `{}`", issue.name)
            })
        })
        .collect();

    write_framed(
        writer,
        &serde_json::json!({
            "jsonrpc": "2.0",
            "method": "textDocument/publishDiagnostics",
            "params": { "uri": uri, "diagnostics": diagnostics }
        }),
    );
}

struct Issue {
    name: String,
    line: usize,
    col: usize,
}

struct Token {
    name: String,
    line: usize,
    col: usize,
    /// Last non-whitespace byte before the token, if any.
    prev: Option<u8>,
    /// First non-whitespace byte after the token, if any.
    next: Option<u8>,
}

/// Flat-scope undefined-identifier check. String literals are opaque, `@`
/// prefixes and `.`-access name files and fields rather than variables, and
/// `name:` positions are dict keys.
fn analyze(text: &str) -> Vec<Issue> {
    let tokens = tokenize(text);

    let mut bound: Vec<&str> = Vec::new();
    for (i, token) in tokens.iter().enumerate() {
        let after_let = i > 0 && tokens[i - 1].name == "let";
        if after_let || token.prev == Some(b'\\') {
            bound.push(&token.name);
        }
    }

    let mut issues = Vec::new();
    for token in &tokens {
        let name = token.name.as_str();
        if KEYWORDS.contains(&name) || BUILTINS.contains(&name) {
            continue;
        }
        if matches!(token.prev, Some(b'.' | b'@' | b'\\')) {
            continue;
        }
        if token.next == Some(b':') {
            continue;
        }
        if !bound.contains(&name) {
            issues.push(Issue {
                name: name.to_string(),
                line: token.line,
                col: token.col,
            });
        }
    }
    issues
}

fn tokenize(text: &str) -> Vec<Token> {
    let mut tokens: Vec<Token> = Vec::new();
    let mut in_string = false;
    let mut prev_glyph: Option<u8> = None;

    for (line_idx, line) in text.lines().enumerate() {
        let bytes = line.as_bytes();
        let mut i = 0;
        while i < bytes.len() {
            let b = bytes[i];

            if b == b'"' {
                in_string = !in_string;
                prev_glyph = Some(b);
                i += 1;
                continue;
            }
            if in_string {
                i += 1;
                continue;
            }

            if b.is_ascii_alphabetic() || b == b'_' {
                let start = i;
                while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_') {
                    i += 1;
                }
                let next = bytes[i..]
                    .iter()
                    .copied()
                    .find(|b| !b.is_ascii_whitespace());
                tokens.push(Token {
                    name: line[start..i].to_string(),
                    line: line_idx,
                    col: start,
                    prev: prev_glyph,
                    next,
                });
                prev_glyph = bytes.get(i.wrapping_sub(1)).copied();
                continue;
            }

            if !b.is_ascii_whitespace() {
                prev_glyph = Some(b);
            } else if prev_glyph.is_some_and(|g| g.is_ascii_alphanumeric() || g == b'_') {
                // Whitespace after an identifier: keep the glyph so `\x y`
                // does not treat `y` as lambda-bound.
                prev_glyph = None;
            }
            i += 1;
        }
        // A line break separates glyphs the same way a space does.
        if !in_string {
            prev_glyph = None;
        }
    }

    tokens
}

/// Parse one Content-Length framed message from the buffer. Returns the body
/// and the number of bytes consumed.
fn try_parse_message(buffer: &[u8]) -> Option<(String, usize)> {
    let header_end = buffer.windows(4).position(|w| w == b"\r\n\r\n")?;
    let headers = std::str::from_utf8(&buffer[..header_end]).ok()?;

    let mut content_length: Option<usize> = None;
    for line in headers.lines() {
        if line.to_ascii_lowercase().starts_with("content-length:") {
            content_length = line
                .split_once(':')
                .and_then(|(_, v)| v.trim().parse().ok());
        }
    }

    let content_length = content_length?;
    let total = header_end + 4 + content_length;

    if buffer.len() < total {
        return None;
    }

    let body = std::str::from_utf8(&buffer[header_end + 4..total]).ok()?;
    Some((body.to_string(), total))
}

fn write_framed(writer: &mut dyn Write, value: &Value) {
    let Ok(json) = serde_json::to_string(value) else {
        return;
    };
    let _ = write!(writer, "Content-Length: {}\r\n\r\n{json}", json.len());
    let _ = writer.flush();
}
