//! Replays recorded test completions through the reporter hooks.

use std::path::Path;

use anyhow::{Context, Result};
use futures_util::future::join_all;
use planbridge_core::test_result::TestCompletionEvent;
use planbridge_runtime::ReporterHooks;

pub fn parse_events(raw: &str) -> Result<Vec<TestCompletionEvent>> {
    raw.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(index, line)| {
            serde_json::from_str(line)
                .with_context(|| format!("invalid test event on line {}", index + 1))
        })
        .collect()
}

pub fn load_events(path: &Path) -> Result<Vec<TestCompletionEvent>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read events file {}", path.display()))?;
    parse_events(&raw)
}

/// Begin, deliver every completion concurrently, then end.
pub async fn replay_events<H>(hooks: &H, events: &[TestCompletionEvent])
where
    H: ReporterHooks + ?Sized,
{
    hooks.on_begin().await;
    join_all(
        events
            .iter()
            .map(|event| hooks.on_test_end(&event.test, &event.result)),
    )
    .await;
    hooks.on_end().await;
}
