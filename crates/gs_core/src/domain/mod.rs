use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Resource prefix the vendor uses for file search store names.
pub const STORE_ID_PREFIX: &str = "fileSearchStores/";

/// A local document queued for provisioning, paired with the title the remote store will report.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DocumentRef {
    pub path: PathBuf,
    pub display_name: String,
}

impl DocumentRef {
    pub fn new(path: impl Into<PathBuf>, display_name: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            display_name: display_name.into(),
        }
    }
}

/// Parses `<path>=<display name>`, splitting at the last `=` so paths may contain one. The
/// display name defaults to the file stem when omitted.
impl FromStr for DocumentRef {
    type Err = AppError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let (path, name) = match raw.rsplit_once('=') {
            Some((p, n)) => (p.trim(), n.trim().to_string()),
            None => {
                let p = raw.trim();
                let stem = PathBuf::from(p)
                    .file_stem()
                    .map(|s| s.to_string_lossy().to_string())
                    .unwrap_or_default();
                (p, stem)
            }
        };
        if path.is_empty() {
            return Err(AppError::new(
                "PROVISION_INVALID_INPUT",
                "Document path is empty",
            )
            .with_details(format!("arg={raw}")));
        }
        if name.is_empty() {
            return Err(AppError::new(
                "PROVISION_INVALID_INPUT",
                "Document display name is empty",
            )
            .with_details(format!("arg={raw}")));
        }
        Ok(Self::new(path, name))
    }
}

/// Opaque name of a vendor-hosted store. Never empty.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(try_from = "String", into = "String")]
pub struct StoreId(String);

impl StoreId {
    pub fn new(raw: impl AsRef<str>) -> Result<Self, AppError> {
        let trimmed = raw.as_ref().trim();
        if trimmed.is_empty() {
            return Err(AppError::new(
                "CONFIG_INVALID_STORE_ID",
                "Store identifier is empty",
            ));
        }
        Ok(Self(trimmed.to_string()))
    }

    /// Stricter check for identifiers typed in by a user: `fileSearchStores/<id>`.
    pub fn parse_user_input(raw: &str) -> Result<Self, AppError> {
        let id = Self::new(raw)?;
        match id.0.strip_prefix(STORE_ID_PREFIX) {
            Some(rest) if !rest.is_empty() && !rest.contains(char::is_whitespace) => Ok(id),
            _ => Err(AppError::new(
                "CONFIG_INVALID_STORE_ID",
                "Invalid store identifier format; it should start with 'fileSearchStores/'",
            )
            .with_details(format!("value={}", id.0))),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StoreId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for StoreId {
    type Error = AppError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<StoreId> for String {
    fn from(value: StoreId) -> Self {
        value.0
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Citation {
    pub title: String,
    pub text: String,
    pub uri: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Turn {
    pub role: Role,
    pub text: String,
    #[serde(default)]
    pub citations: Vec<Citation>,
}

/// In-memory conversation history for one session. Append-only until `clear`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Transcript {
    turns: Vec<Turn>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn last(&self) -> Option<&Turn> {
        self.turns.last()
    }

    pub fn push_user(&mut self, text: impl Into<String>) {
        self.turns.push(Turn {
            role: Role::User,
            text: text.into(),
            citations: Vec::new(),
        });
    }

    pub fn push_assistant(&mut self, text: impl Into<String>, citations: Vec<Citation>) {
        self.turns.push(Turn {
            role: Role::Assistant,
            text: text.into(),
            citations,
        });
    }

    pub fn clear(&mut self) {
        self.turns.clear();
    }
}
