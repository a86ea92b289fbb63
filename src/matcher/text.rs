//! Plain-text feature stores.
//!
//! A database file groups scalar samples under a header line per reference:
//!
//! ```text
//! Video: /videos/video1.mp4
//! Frame 0: 0.0123
//! Frame 1: 0.0456
//! Video: /videos/video2.mp4
//! Frame 0: 0.0789
//! ```
//!
//! A query file holds only `Frame` lines. A value list is a whitespace-separated list of
//! numbers, indexed from 0.

use std::path::Path;

use super::{FeatureSequence, Reference};
use crate::{Error, Result};

const VIDEO_PREFIX: &str = "Video:";
const FRAME_PREFIX: &str = "Frame ";

fn malformed(line: usize, reason: impl Into<String>) -> Error {
    Error::MalformedFeatureData {
        line,
        reason: reason.into(),
    }
}

fn parse_frame_line(line_no: usize, line: &str) -> Result<(u32, f64)> {
    let rest = line
        .strip_prefix(FRAME_PREFIX)
        .ok_or_else(|| malformed(line_no, format!("expected a frame line, got {:?}", line)))?;
    let (index, value) = rest
        .split_once(':')
        .ok_or_else(|| malformed(line_no, "missing ':' after frame index"))?;
    let index = index
        .trim()
        .parse::<u32>()
        .map_err(|e| malformed(line_no, format!("invalid frame index {:?}: {}", index, e)))?;
    let value = value
        .trim()
        .parse::<f64>()
        .map_err(|e| malformed(line_no, format!("invalid feature value {:?}: {}", value, e)))?;
    Ok((index, value))
}

/// Parses a database of scalar references, preserving their order.
pub fn parse_database(input: &str) -> Result<Vec<Reference>> {
    let mut references = Vec::new();
    let mut current: Option<(String, Vec<(u32, f64)>)> = None;

    for (i, raw) in input.lines().enumerate() {
        let line_no = i + 1;
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }

        // Paths are kept verbatim after the single space that follows the prefix.
        if let Some(path) = raw.trim_start().strip_prefix(VIDEO_PREFIX) {
            let path = path.trim_end_matches('\r');
            let path = path.strip_prefix(' ').unwrap_or(path);
            if path.trim().is_empty() {
                return Err(malformed(line_no, "empty video path"));
            }
            if let Some((video_id, samples)) = current.take() {
                references.push(Reference::new(video_id, FeatureSequence::from_samples(samples)?));
            }
            current = Some((path.to_string(), Vec::new()));
            continue;
        }

        let sample = parse_frame_line(line_no, line)?;
        match current.as_mut() {
            Some((_, samples)) => samples.push(sample),
            None => return Err(malformed(line_no, "frame line before the first video header")),
        }
    }

    if let Some((video_id, samples)) = current {
        references.push(Reference::new(video_id, FeatureSequence::from_samples(samples)?));
    }

    Ok(references)
}

/// Parses a sequence made of `Frame` lines only.
pub fn parse_frames(input: &str) -> Result<FeatureSequence> {
    let mut samples = Vec::new();
    for (i, line) in input.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        samples.push(parse_frame_line(i + 1, line)?);
    }
    FeatureSequence::from_samples(samples)
}

/// Parses a whitespace-separated list of values.
pub fn parse_values(input: &str) -> Result<FeatureSequence> {
    let mut values = Vec::new();
    for (i, line) in input.lines().enumerate() {
        for token in line.split_whitespace() {
            let value = token
                .parse::<f64>()
                .map_err(|e| malformed(i + 1, format!("invalid feature value {:?}: {}", token, e)))?;
            values.push(value);
        }
    }
    FeatureSequence::scalar(values)
}

/// Parses a query sequence in either the `Frame` line format or as a value list.
pub fn parse_sequence(input: &str) -> Result<FeatureSequence> {
    let is_frames = input
        .split_whitespace()
        .next()
        .map(|t| t == FRAME_PREFIX.trim_end())
        .unwrap_or(false);
    if is_frames {
        parse_frames(input)
    } else {
        parse_values(input)
    }
}

fn write_samples(out: &mut String, features: &FeatureSequence) -> Result<()> {
    if features.as_scalar().is_none() {
        return Err(Error::FeatureKindMismatch {
            query: "scalar",
            reference: features.kind(),
        });
    }
    for (index, value) in features.samples() {
        // Debug formatting keeps a decimal point on whole numbers and round-trips exactly.
        out.push_str(&format!("{}{}: {:?}\n", FRAME_PREFIX, index, value));
    }
    Ok(())
}

/// Serializes scalar references into the database format.
pub fn write_database(references: &[Reference]) -> Result<String> {
    let mut out = String::new();
    for r in references {
        out.push_str(&format!("{} {}\n", VIDEO_PREFIX, r.video_id));
        write_samples(&mut out, &r.features)?;
    }
    Ok(out)
}

/// Serializes a scalar sequence into `Frame` lines.
pub fn write_frames(features: &FeatureSequence) -> Result<String> {
    let mut out = String::new();
    write_samples(&mut out, features)?;
    Ok(out)
}

fn read_to_string(path: impl AsRef<Path>) -> Result<String> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(Error::FeatureDataNotFound(path.to_owned()));
    }
    Ok(std::fs::read_to_string(path)?)
}

/// Reads a database file from disk.
pub fn read_database(path: impl AsRef<Path>) -> Result<Vec<Reference>> {
    parse_database(&read_to_string(path)?)
}

/// Reads a query sequence file from disk. See [parse_sequence].
pub fn read_sequence(path: impl AsRef<Path>) -> Result<FeatureSequence> {
    parse_sequence(&read_to_string(path)?)
}
