use crate::error::{Result, SyncError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// Speaker label as it appears in the script.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SpeakerId(String);

impl SpeakerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SpeakerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One line of dialogue in fixed script order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Utterance {
    pub index: usize,
    pub speaker: SpeakerId,
    pub text: String,
}

/// A script record as supplied by the script collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dialogue {
    pub speaker: String,
    pub text: String,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ScriptFile {
    Bare(Vec<Dialogue>),
    Wrapped { dialogues: Vec<Dialogue> },
}

/// The finalized, ordered script. Never reordered or rewritten.
#[derive(Debug, Clone)]
pub struct Script {
    utterances: Vec<Utterance>,
}

impl Script {
    /// Build a script from ordered dialogue records.
    ///
    /// Fails with `InvalidInput` when there are no records or a record has
    /// blank text.
    pub fn from_dialogues(dialogues: Vec<Dialogue>) -> Result<Self> {
        if dialogues.is_empty() {
            return Err(SyncError::InvalidInput(
                "script contains no utterances".to_string(),
            ));
        }
        if let Some(index) = dialogues.iter().position(|d| d.text.trim().is_empty()) {
            return Err(SyncError::InvalidInput(format!(
                "utterance {} has no text",
                index
            )));
        }

        let utterances = dialogues
            .into_iter()
            .enumerate()
            .map(|(index, d)| Utterance {
                index,
                speaker: SpeakerId::new(d.speaker),
                text: d.text,
            })
            .collect();

        Ok(Self { utterances })
    }

    /// Convenience constructor from `(speaker, text)` pairs.
    pub fn from_pairs<S, T>(pairs: impl IntoIterator<Item = (S, T)>) -> Result<Self>
    where
        S: Into<String>,
        T: Into<String>,
    {
        Self::from_dialogues(
            pairs
                .into_iter()
                .map(|(speaker, text)| Dialogue {
                    speaker: speaker.into(),
                    text: text.into(),
                })
                .collect(),
        )
    }

    /// Parse a script from JSON: either a bare array of `{speaker, text}`
    /// records or an object with a `dialogues` array.
    pub fn from_json(json: &str) -> Result<Self> {
        let parsed: ScriptFile = serde_json::from_str(json)
            .map_err(|e| SyncError::InvalidInput(format!("malformed script: {e}")))?;
        let dialogues = match parsed {
            ScriptFile::Bare(d) => d,
            ScriptFile::Wrapped { dialogues } => dialogues,
        };
        Self::from_dialogues(dialogues)
    }

    /// Load a script file from disk.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            SyncError::InvalidInput(format!("cannot read script {}: {e}", path.display()))
        })?;
        Self::from_json(&contents)
    }

    pub fn utterances(&self) -> &[Utterance] {
        &self.utterances
    }

    pub fn len(&self) -> usize {
        self.utterances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.utterances.is_empty()
    }
}
