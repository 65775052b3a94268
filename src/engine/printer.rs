use colored::{Color, Colorize};
use serde_json::Value;

use super::models::Response;

const PREVIEW_CHARS: usize = 2048;

pub fn print_response(response: &Response, verbose: bool) {
    let status_color = if response.status >= 400 {
        Color::Red
    } else if response.status >= 300 {
        Color::Yellow
    } else {
        Color::Green
    };

    println!("{} {}", response.method.bold(), response.url.cyan());
    println!(
        "{} {} {}",
        "Status:".bold(),
        format!("{}", response.status).color(status_color),
        format!("({:.1} ms)", response.elapsed_ms()).dimmed()
    );

    if verbose {
        println!("{}", "Request headers".bold());
        for (name, value) in &response.request_headers {
            println!("  {}: {}", name.cyan(), value.dimmed());
        }
        if let Some(body) = &response.request_body {
            println!("{}", "Request body".bold());
            println!("{}", format_json(body).unwrap_or_else(|| body.clone()));
        }
        println!("{}", "Response headers".bold());
        for (name, value) in &response.headers {
            println!("  {}: {}", name.cyan(), value.dimmed());
        }
    }

    println!("{}", "Body".bold());
    if response.body.is_empty() {
        println!("{}", "(empty)".dimmed());
        return;
    }

    if verbose {
        println!(
            "{}",
            format_json(&response.body).unwrap_or_else(|| response.body.clone())
        );
        return;
    }

    let preview = create_preview(&response.body, PREVIEW_CHARS);
    println!("{preview}");
    if preview.len() < response.body.len() {
        println!(
            "{}",
            format!(
                "[{} bytes total, pass --verbose for the full body]",
                response.body.len()
            )
            .dimmed()
        );
    }
}

/// Truncates to at most `limit` bytes without splitting a character.
fn create_preview(body: &str, limit: usize) -> &str {
    if body.len() <= limit {
        return body;
    }
    let mut end = limit;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    &body[..end]
}

fn format_json(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    serde_json::to_string_pretty(&value).ok()
}
