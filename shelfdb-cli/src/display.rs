use colored::Colorize;
use serde_json::Value;

/// Format one result document for display.
/// If `raw_json` is true, output unformatted JSON suitable for piping.
pub fn format_document(doc: &Value, raw_json: bool) -> String {
    if raw_json {
        return doc.to_string();
    }
    pretty_json(doc)
}

/// Format a list of result documents, one per block.
pub fn format_documents(docs: &[Value], raw_json: bool) -> String {
    if docs.is_empty() && !raw_json {
        return "(empty)".dimmed().to_string();
    }
    docs.iter()
        .map(|doc| format_document(doc, raw_json))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn format_error(err: &shelfdb::Error) -> String {
    format!("{} {}", "Error:".red().bold(), err.to_string().red())
}

/// Section header in the style `--- Operation N: Title ---`.
pub fn operation_header(number: u32, title: &str) -> String {
    format!("--- Operation {number}: {title} ---").bold().to_string()
}

pub fn notice(text: &str) -> String {
    text.green().to_string()
}

fn pretty_json(value: &Value) -> String {
    let formatted = serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string());
    colorize_json(&formatted)
}

fn colorize_json(json_str: &str) -> String {
    let mut result = String::with_capacity(json_str.len() * 2);
    let mut in_key = false;
    let mut in_string = false;
    let mut is_key = true; // next string is a key
    let mut escape = false;
    let mut token = String::new();

    for ch in json_str.chars() {
        if escape {
            token.push(ch);
            escape = false;
            continue;
        }

        if ch == '\\' && (in_key || in_string) {
            token.push(ch);
            escape = true;
            continue;
        }

        if ch == '"' {
            token.push('"');
            if in_key {
                result.push_str(&token.blue().bold().to_string());
                token.clear();
                in_key = false;
                is_key = false;
            } else if in_string {
                result.push_str(&token.green().to_string());
                token.clear();
                in_string = false;
            } else if is_key {
                in_key = true;
            } else {
                in_string = true;
            }
            continue;
        }

        if in_key || in_string {
            token.push(ch);
            continue;
        }

        match ch {
            ':' => {
                result.push_str(&":".dimmed().to_string());
                is_key = false;
            }
            ',' | '{' => {
                flush_primitive(&mut result, &mut token);
                result.push(ch);
                is_key = true;
            }
            '}' | ']' => {
                flush_primitive(&mut result, &mut token);
                result.push(ch);
                is_key = false;
            }
            '[' => {
                result.push('[');
                is_key = false;
            }
            _ if ch.is_whitespace() => {
                flush_primitive(&mut result, &mut token);
                result.push(ch);
            }
            _ => token.push(ch),
        }
    }

    flush_primitive(&mut result, &mut token);
    result
}

fn flush_primitive(result: &mut String, token: &mut String) {
    if token.is_empty() {
        return;
    }
    let colored = match token.as_str() {
        "true" | "false" => token.yellow().to_string(),
        "null" => token.dimmed().to_string(),
        t if t.parse::<f64>().is_ok() => token.cyan().to_string(),
        _ => token.clone(),
    };
    result.push_str(&colored);
    token.clear();
}
