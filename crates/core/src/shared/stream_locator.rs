use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use crate::shared::constants::STREAM_SCHEME;

/// Punctuation allowed in a locator path besides ASCII alphanumerics.
const PATH_PUNCTUATION: &str = "-._~:/?#[]@!$&'()*+,;=";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LocatorError {
    #[error("stream address is empty")]
    Empty,
    #[error("stream address must start with rtmp://")]
    Scheme,
    #[error("invalid host in stream address")]
    Host,
    #[error("invalid port in stream address")]
    Port,
    #[error("invalid path in stream address")]
    Path,
}

/// A validated `rtmp://host[:port]/path` address.
///
/// Only obtainable through [`StreamLocator::parse`], so a value of this type
/// always satisfies the grammar it was parsed with.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct StreamLocator {
    raw: String,
    host_end: usize,
    port: Option<u16>,
    path_start: usize,
}

impl StreamLocator {
    /// Parses `raw` against the locator grammar.
    ///
    /// `strict` requires at least one character after the first path `/`.
    /// Without it the path may be empty or absent altogether.
    pub fn parse(raw: &str, strict: bool) -> Result<Self, LocatorError> {
        if raw.is_empty() {
            return Err(LocatorError::Empty);
        }

        let Some(rest) = raw
            .strip_prefix(STREAM_SCHEME)
            .and_then(|r| r.strip_prefix("://"))
        else {
            return Err(LocatorError::Scheme);
        };
        let prefix_len = raw.len() - rest.len();

        let host_len = rest
            .find(|c: char| !is_host_char(c))
            .unwrap_or(rest.len());
        if host_len == 0 {
            return Err(LocatorError::Host);
        }
        let host_end = prefix_len + host_len;
        let mut tail = &rest[host_len..];

        let mut port = None;
        if let Some(after_colon) = tail.strip_prefix(':') {
            let digits = after_colon
                .find(|c: char| !c.is_ascii_digit())
                .unwrap_or(after_colon.len());
            if digits == 0 {
                return Err(LocatorError::Port);
            }
            port = Some(
                after_colon[..digits]
                    .parse::<u16>()
                    .map_err(|_| LocatorError::Port)?,
            );
            tail = &after_colon[digits..];
        }

        let path_start = raw.len() - tail.len();
        if tail.is_empty() {
            if strict {
                return Err(LocatorError::Path);
            }
        } else {
            let Some(segment) = tail.strip_prefix('/') else {
                // Anything other than a path here means the host or port
                // ran into a character neither of them allows.
                return Err(if port.is_some() {
                    LocatorError::Port
                } else {
                    LocatorError::Host
                });
            };
            if strict && segment.is_empty() {
                return Err(LocatorError::Path);
            }
            if !segment.chars().all(is_path_char) {
                return Err(LocatorError::Path);
            }
        }

        Ok(Self {
            raw: raw.to_string(),
            host_end,
            port,
            path_start,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn host(&self) -> &str {
        let prefix_len = STREAM_SCHEME.len() + "://".len();
        &self.raw[prefix_len..self.host_end]
    }

    pub fn port(&self) -> Option<u16> {
        self.port
    }

    /// The path including its leading `/`, or `""` when absent.
    pub fn path(&self) -> &str {
        &self.raw[self.path_start..]
    }
}

/// Returns whether `raw` is a well-formed stream locator.
pub fn validate(raw: &str, strict: bool) -> bool {
    StreamLocator::parse(raw, strict).is_ok()
}

fn is_host_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '-' || c == '.'
}

fn is_path_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || PATH_PUNCTUATION.contains(c)
}

impl fmt::Display for StreamLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl FromStr for StreamLocator {
    type Err = LocatorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s, true)
    }
}

impl AsRef<str> for StreamLocator {
    fn as_ref(&self) -> &str {
        &self.raw
    }
}
