//! Failure classification command: `draftsync classify`.

use anyhow::{Context, Result};

use draftsync::classify::classify;
use draftsync::errors::FailureBody;

/// Classify a status/body pair and print the result as JSON.
///
/// One `--message` is a text body; several are a list body.
pub fn cmd_classify(status: Option<u16>, messages: &[String]) -> Result<()> {
    let body = match messages {
        [] => FailureBody::Text(String::new()),
        [single] => FailureBody::Text(single.clone()),
        many => FailureBody::List(many.to_vec()),
    };
    let classification = classify(status, body);
    let json =
        serde_json::to_string_pretty(&classification).context("Failed to serialize classification")?;
    println!("{}", json);
    Ok(())
}
