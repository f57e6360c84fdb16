//! Reference implementation of the external-module stdio protocol.
//!
//! Reads `call <json>\n` commands on stdin and answers each with a framed
//! record set: an i32-LE record count, then per record an i32-LE size and
//! that many bytes of JSON event body. The bare command `exit` terminates
//! the process. Useful as a protocol probe while developing custom modules
//! and as the child process in the agent's integration tests.
//!
//! Parameters understood:
//!   `service` (string)  service reported in the emitted record
//!   `count`   (number)  how many records to emit per call (default 1)
//!   `mode`    (string)  `garbage` makes the record body undecodable

use anyhow::Result;
use std::io::{BufRead, BufReader, Write};

fn main() -> Result<()> {
    let stdin = std::io::stdin();
    let stdout = std::io::stdout();
    let mut reader = BufReader::new(stdin.lock());
    let mut out = stdout.lock();

    loop {
        let buffered = reader.fill_buf()?;
        if buffered.is_empty() || buffered.starts_with(b"exit") {
            return Ok(());
        }

        let mut line = String::new();
        if reader.read_line(&mut line)? == 0 {
            return Ok(());
        }
        let Some(raw_params) = line.strip_prefix("call ") else {
            continue;
        };

        let params: serde_json::Value = serde_json::from_str(raw_params.trim())?;
        let service = params
            .get("service")
            .and_then(|v| v.as_str())
            .unwrap_or("mock");
        let count = params
            .get("count")
            .and_then(|v| v.as_i64())
            .unwrap_or(1) as i32;
        let garbage = params.get("mode").and_then(|v| v.as_str()) == Some("garbage");

        out.write_all(&count.to_le_bytes())?;
        for i in 0..count {
            let body = if garbage {
                "##not json##".to_string()
            } else {
                serde_json::json!({
                    "service": service,
                    "state": "ok",
                    "metric": f64::from(i),
                })
                .to_string()
            };
            out.write_all(&(body.len() as i32).to_le_bytes())?;
            out.write_all(body.as_bytes())?;
        }
        out.flush()?;
    }
}
