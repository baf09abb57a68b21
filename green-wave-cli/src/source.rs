//! Recorded-track position source
//!
//! A track file is either a JSON array or JSON lines. Each entry is a fix
//! (`{"latitude": .., "longitude": .., "speed_mps": .., "timestamp_ms": ..}`)
//! or a recorded failure (`{"error": "timeout"}`).

use anyhow::{Context, Result};
use green_wave_core::{PositionErrorKind, PositionFix, PositionSource};
use serde::Deserialize;
use std::collections::VecDeque;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum TrackEntry {
    Fix(PositionFix),
    Failure { error: PositionErrorKind },
}

/// Replays a recorded track one entry per request
pub struct ReplaySource {
    entries: VecDeque<TrackEntry>,
}

impl ReplaySource {
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read track file: {:?}", path))?;
        let source = Self::parse(&content)
            .with_context(|| format!("Failed to parse track file: {:?}", path))?;
        log::info!("Loaded {} track entries from {:?}", source.entries.len(), path);
        Ok(source)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let entries: Vec<TrackEntry> = if content.trim_start().starts_with('[') {
            serde_json::from_str(content)?
        } else {
            content
                .lines()
                .enumerate()
                .filter(|(_, line)| !line.trim().is_empty())
                .map(|(idx, line)| {
                    serde_json::from_str(line).with_context(|| format!("line {}", idx + 1))
                })
                .collect::<Result<_>>()?
        };

        Ok(Self {
            entries: entries.into(),
        })
    }

    pub fn remaining(&self) -> usize {
        self.entries.len()
    }
}

impl PositionSource for ReplaySource {
    fn request_position(&mut self) -> std::result::Result<PositionFix, PositionErrorKind> {
        match self.entries.pop_front() {
            Some(TrackEntry::Fix(fix)) => Ok(fix),
            Some(TrackEntry::Failure { error }) => Err(error),
            None => Err(PositionErrorKind::PositionUnavailable),
        }
    }

    fn is_exhausted(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Sleeper used between polls; without `realtime` the replay runs flat out
pub fn sleeper(realtime: bool) -> impl FnMut(Duration) {
    move |delay| {
        if realtime {
            log::trace!("Sleeping {:?} before next poll", delay);
            std::thread::sleep(delay);
        }
    }
}
