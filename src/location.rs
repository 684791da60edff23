//! Object storage locations.
//!
//! Parses `scheme://bucket/prefix` strings with nom.
//!
//! ```text
//! s3://sales-processed/processed/sales/
//! ┬─   ──────┬──────── ───────┬────────
//! │          │                └── Prefix (normalized, may be empty)
//! │          └── Bucket
//! └── Scheme
//! ```

use std::fmt;
use std::path::{Path, PathBuf};

use nom::{
    bytes::complete::{tag, take_while, take_while1},
    combinator::rest,
    sequence::{terminated, tuple},
    IResult,
};

use crate::config::normalize_prefix;
use crate::error::{LoadError, LoadResult};

/// A bucket plus key prefix in object storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    pub scheme: String,
    pub bucket: String,
    /// Normalized: no leading `/`, trailing `/` unless empty.
    pub prefix: String,
}

impl Location {
    /// Parse a location string.
    pub fn parse(input: &str) -> LoadResult<Self> {
        let input = input.trim();
        match parse_location(input) {
            Ok((_, (scheme, bucket, prefix))) => Ok(Self {
                scheme: scheme.to_string(),
                bucket: bucket.to_string(),
                prefix: normalize_prefix(prefix),
            }),
            Err(e) => Err(LoadError::location(input, format!("{:?}", e))),
        }
    }

    /// Map this location onto a local directory tree rooted at `root`.
    pub fn resolve_under(&self, root: &Path) -> PathBuf {
        let mut path = root.join(&self.bucket);
        for part in self.prefix.split('/').filter(|p| !p.is_empty()) {
            path.push(part);
        }
        path
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}/{}", self.scheme, self.bucket, self.prefix)
    }
}

fn parse_scheme(input: &str) -> IResult<&str, &str> {
    terminated(
        take_while1(|c: char| c.is_ascii_alphanumeric() || c == '+' || c == '-' || c == '.'),
        tag("://"),
    )(input)
}

fn parse_bucket(input: &str) -> IResult<&str, &str> {
    take_while1(|c: char| c != '/' && !c.is_whitespace())(input)
}

fn parse_location(input: &str) -> IResult<&str, (&str, &str, &str)> {
    let (input, (scheme, bucket, _)) =
        tuple((parse_scheme, parse_bucket, take_while(|c: char| c == '/')))(input)?;
    let (input, prefix) = rest(input)?;
    Ok((input, (scheme, bucket, prefix)))
}
