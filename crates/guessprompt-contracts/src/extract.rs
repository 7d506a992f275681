use std::fmt;
use std::str::FromStr;

use serde_json::Value;

/// Candidate locations of a generated image URL, most specific first.
pub const IMAGE_URL_PATHS: &[&str] = &[
    "output.images[0].url",
    "output.image_url",
    "output.url",
    "images[0].url",
    "image_url",
    "url",
    "output.image",
    "image",
];

pub const STATUS_PATHS: &[&str] = &["status", "state", "request_status"];

pub const JOB_ID_PATHS: &[&str] = &["request_id", "id"];

pub const FAILURE_MESSAGE_PATHS: &[&str] = &["error", "error.message", "message"];

pub const COMPLETION_TEXT_PATHS: &[&str] = &["choices[0].message.content", "content", "text"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    Key(String),
    Index(usize),
}

/// A dotted lookup path such as `output.images[0].url`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldPath {
    segments: Vec<PathSegment>,
}

impl FieldPath {
    pub fn new(segments: Vec<PathSegment>) -> Self {
        Self { segments }
    }

    pub fn segments(&self) -> &[PathSegment] {
        &self.segments
    }

    /// Walks the path; a missing key, an out-of-range index or a type
    /// mismatch at any segment yields `None`.
    pub fn resolve<'a>(&self, value: &'a Value) -> Option<&'a Value> {
        self.segments
            .iter()
            .try_fold(value, |current, segment| match segment {
                PathSegment::Key(key) => current.as_object()?.get(key),
                PathSegment::Index(idx) => current.as_array()?.get(*idx),
            })
    }
}

impl FromStr for FieldPath {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err("field path is empty".to_string());
        }
        let mut segments = Vec::new();
        for part in trimmed.split('.') {
            let (key, mut rest) = match part.find('[') {
                Some(pos) => (&part[..pos], &part[pos..]),
                None => (part, ""),
            };
            if key.is_empty() && rest.is_empty() {
                return Err(format!("field path '{trimmed}' has an empty segment"));
            }
            if !key.is_empty() {
                segments.push(PathSegment::Key(key.to_string()));
            }
            while !rest.is_empty() {
                let Some(close) = rest.find(']') else {
                    return Err(format!("field path '{trimmed}' has an unclosed index"));
                };
                let index = rest[1..close]
                    .trim()
                    .parse::<usize>()
                    .map_err(|_| format!("field path '{trimmed}' has a non-numeric index"))?;
                segments.push(PathSegment::Index(index));
                rest = &rest[close + 1..];
                if !rest.is_empty() && !rest.starts_with('[') {
                    return Err(format!("field path '{trimmed}' has trailing text after index"));
                }
            }
        }
        Ok(Self { segments })
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, segment) in self.segments.iter().enumerate() {
            match segment {
                PathSegment::Key(key) if idx == 0 => write!(f, "{key}")?,
                PathSegment::Key(key) => write!(f, ".{key}")?,
                PathSegment::Index(index) => write!(f, "[{index}]")?,
            }
        }
        Ok(())
    }
}

/// Parses a static path list. Malformed entries are dropped, which makes
/// them behave like paths that never resolve.
pub fn field_paths(raw: &[&str]) -> Vec<FieldPath> {
    raw.iter()
        .filter_map(|path| path.parse::<FieldPath>().ok())
        .collect()
}

/// Returns the first path, in list order, whose terminal value is a
/// non-empty string. The value is returned untouched.
pub fn extract_first(value: &Value, paths: &[FieldPath]) -> Option<String> {
    paths.iter().find_map(|path| {
        path.resolve(value)
            .and_then(Value::as_str)
            .filter(|text| !text.is_empty())
            .map(str::to_string)
    })
}

pub fn extract_image_url(value: &Value) -> Option<String> {
    extract_first(value, &field_paths(IMAGE_URL_PATHS))
}
