//! Clip manifest loading and number resolution.

use std::{
    collections::HashMap,
    fs,
    io,
    path::{Path, PathBuf},
};

use serde::Deserialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::{hardware::tone::ToneKind, phone::DialedNumber};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClipSource {
    File(PathBuf),
    Tone(ToneKind),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Clip {
    pub name: String,
    pub source: ClipSource,
    /// Repeat until stopped.
    pub looping: bool,
}

impl Clip {
    pub fn tone(name: &str, kind: ToneKind) -> Self {
        Clip {
            name: name.to_owned(),
            source: ClipSource::Tone(kind),
            looping: true,
        }
    }

    pub fn file(name: &str, path: impl Into<PathBuf>, looping: bool) -> Self {
        Clip {
            name: name.to_owned(),
            source: ClipSource::File(path.into()),
            looping,
        }
    }
}

#[derive(Debug, Error)]
pub enum ClipLibraryError {
    #[error("failed to read manifest {path}: {source}")]
    Read { path: PathBuf, source: io::Error },
    #[error("failed to parse manifest {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("manifest number {0:?} must contain only digits")]
    InvalidNumber(String),
}

/// On-disk layout of `manifest.json`. Paths are relative to the manifest.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct Manifest {
    #[serde(default)]
    numbers: HashMap<String, PathBuf>,
    dial_tone: Option<PathBuf>,
    busy: Option<PathBuf>,
    ring: Option<PathBuf>,
    answer: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct ClipLibrary {
    numbers: HashMap<String, Clip>,
    dial_tone: Clip,
    busy: Clip,
    ring: Clip,
    answer: Option<Clip>,
}

impl Default for ClipLibrary {
    fn default() -> Self {
        ClipLibrary {
            numbers: HashMap::new(),
            dial_tone: Clip::tone("dial tone", ToneKind::DialTone),
            busy: Clip::tone("busy", ToneKind::Busy),
            ring: Clip::tone("ring", ToneKind::Ring),
            answer: None,
        }
    }
}

impl ClipLibrary {
    /// Loads the manifest at `path`. A missing manifest gives the built-in
    /// tones and no numbers.
    pub fn load(path: &Path) -> Result<Self, ClipLibraryError> {
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                warn!(path = %path.display(), "no clip manifest, using built-in tones only");
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(ClipLibraryError::Read {
                    path: path.to_owned(),
                    source,
                })
            }
        };

        let manifest: Manifest =
            serde_json::from_str(&text).map_err(|source| ClipLibraryError::Parse {
                path: path.to_owned(),
                source,
            })?;

        let base = path.parent().unwrap_or_else(|| Path::new("."));
        let library = Self::from_manifest(manifest, base)?;

        info!(
            path = %path.display(),
            numbers = library.numbers.len(),
            answer = library.answer.is_some(),
            "clip manifest loaded"
        );

        Ok(library)
    }

    fn from_manifest(manifest: Manifest, base: &Path) -> Result<Self, ClipLibraryError> {
        let defaults = Self::default();

        let resolve = |name: &str, relative: PathBuf, looping: bool| {
            let path = base.join(relative);
            if !path.is_file() {
                warn!(clip = name, path = %path.display(), "clip file missing");
            }
            Clip::file(name, path, looping)
        };

        let mut numbers = HashMap::new();
        for (number, relative) in manifest.numbers {
            if number.is_empty() || !number.chars().all(|ch| ch.is_ascii_digit()) {
                return Err(ClipLibraryError::InvalidNumber(number));
            }
            let clip = resolve(&number, relative, false);
            numbers.insert(number, clip);
        }

        Ok(ClipLibrary {
            numbers,
            dial_tone: manifest
                .dial_tone
                .map(|path| resolve("dial tone", path, true))
                .unwrap_or(defaults.dial_tone),
            busy: manifest
                .busy
                .map(|path| resolve("busy", path, true))
                .unwrap_or(defaults.busy),
            ring: manifest
                .ring
                .map(|path| resolve("ring", path, true))
                .unwrap_or(defaults.ring),
            answer: manifest.answer.map(|path| resolve("answer", path, false)),
        })
    }

    #[cfg(test)]
    pub fn insert(&mut self, number: &str, clip: Clip) {
        self.numbers.insert(number.to_owned(), clip);
    }

    #[cfg(test)]
    pub fn with_answer(mut self, clip: Clip) -> Self {
        self.answer = Some(clip);
        self
    }

    pub fn resolve(&self, number: &DialedNumber) -> Option<&Clip> {
        self.numbers.get(&number.to_string())
    }

    /// The mapped clip, or the busy signal for unknown numbers.
    pub fn resolve_or_busy(&self, number: &DialedNumber) -> &Clip {
        self.resolve(number).unwrap_or(self.busy())
    }

    /// True when `number` is mapped and no longer mapping starts with it.
    pub fn is_unambiguous(&self, number: &DialedNumber) -> bool {
        let number = number.to_string();

        self.numbers.contains_key(&number)
            && !self
                .numbers
                .keys()
                .any(|known| known.len() > number.len() && known.starts_with(&number))
    }

    pub fn dial_tone(&self) -> &Clip {
        &self.dial_tone
    }

    pub fn busy(&self) -> &Clip {
        &self.busy
    }

    pub fn ring(&self) -> &Clip {
        &self.ring
    }

    pub fn answer(&self) -> Option<&Clip> {
        self.answer.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pulse::Digit;

    fn number(text: &str) -> DialedNumber {
        text.chars().map(|ch| Digit::try_from(ch).unwrap()).collect()
    }

    #[test]
    fn missing_manifest_uses_tones() {
        let dir = tempfile::tempdir().unwrap();

        let library = ClipLibrary::load(&dir.path().join("manifest.json")).unwrap();

        assert_eq!(library.dial_tone().source, ClipSource::Tone(ToneKind::DialTone));
        assert_eq!(library.busy().source, ClipSource::Tone(ToneKind::Busy));
        assert!(library.answer().is_none());
        assert!(library.resolve(&number("5")).is_none());
    }

    #[test]
    fn manifest_paths_are_relative_to_manifest() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("applause.wav"), b"").unwrap();
        fs::write(
            dir.path().join("manifest.json"),
            r#"{
                "numbers": { "5": "applause.wav", "911": "sirens.wav" },
                "busy": "busy.wav",
                "answer": "applause.wav"
            }"#,
        )
        .unwrap();

        let library = ClipLibrary::load(&dir.path().join("manifest.json")).unwrap();

        let clip = library.resolve(&number("5")).unwrap();
        assert_eq!(clip.source, ClipSource::File(dir.path().join("applause.wav")));
        assert!(!clip.looping);
        assert_eq!(library.busy().source, ClipSource::File(dir.path().join("busy.wav")));
        assert!(library.busy().looping);
        assert_eq!(library.ring().source, ClipSource::Tone(ToneKind::Ring));
        assert!(library.answer().is_some());
    }

    #[test]
    fn unknown_numbers_fall_back_to_busy() {
        let library = ClipLibrary::default();

        assert_eq!(library.resolve_or_busy(&number("123")), library.busy());
    }

    #[test]
    fn rejects_non_digit_numbers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("manifest.json");
        fs::write(&path, r#"{ "numbers": { "55a": "x.wav" } }"#).unwrap();

        assert!(matches!(
            ClipLibrary::load(&path),
            Err(ClipLibraryError::InvalidNumber(number)) if number == "55a"
        ));
    }

    #[test]
    fn rejects_malformed_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("manifest.json");
        fs::write(&path, "{ numbers: ").unwrap();

        assert!(matches!(ClipLibrary::load(&path), Err(ClipLibraryError::Parse { .. })));
    }

    #[test]
    fn prefix_of_another_number_is_ambiguous() {
        let mut library = ClipLibrary::default();
        library.insert("91", Clip::file("91", "a.wav", false));
        library.insert("911", Clip::file("911", "b.wav", false));

        assert!(!library.is_unambiguous(&number("9")));
        assert!(!library.is_unambiguous(&number("91")));
        assert!(library.is_unambiguous(&number("911")));
    }
}
