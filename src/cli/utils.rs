use serde_json::Value;
use std::io::Write;

use crate::cli::OutputFormat;

/// Print a JSON document, or its text rendering, depending on the output format
pub fn output_value(output_format: OutputFormat, value: &Value, text: impl FnOnce() -> String) -> anyhow::Result<()> {
    match output_format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(value)?),
        OutputFormat::Text => println!("{}", text()),
    }
    Ok(())
}

/// Print one JSON document per line
pub fn output_json_line(value: &Value) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string(value)?);
    Ok(())
}

/// Print a fragment without a newline and flush so it shows up immediately
pub fn output_fragment(text: &str) -> anyhow::Result<()> {
    let mut stdout = std::io::stdout().lock();
    stdout.write_all(text.as_bytes())?;
    stdout.flush()?;
    Ok(())
}

/// Keep only the last four characters of a secret
pub fn redact_secret(secret: Option<&str>) -> String {
    match secret {
        None => "(not set)".to_string(),
        Some(s) => {
            let chars: Vec<char> = s.chars().collect();
            if chars.len() <= 4 {
                "****".to_string()
            } else {
                let tail: String = chars[chars.len() - 4..].iter().collect();
                format!("****{}", tail)
            }
        }
    }
}

/// Host part of a URL, without credentials or path
pub fn url_host(url: Option<&str>) -> String {
    match url {
        None => "(not set)".to_string(),
        Some(raw) => url::Url::parse(raw)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
            .unwrap_or_else(|| "(invalid url)".to_string()),
    }
}
