//! Pure, synchronous normalisation of heterogeneous metadata into a
//! canonical `(artist?, title, method)` tuple: ID3 tags first, then
//! caller-supplied metadata, then filename cleanup. The pipeline is
//! total over its input space and never blocks.

use std::path::Path;
use std::sync::LazyLock;

use lofty::file::TaggedFileExt;
use lofty::tag::Accessor;
use regex::Regex;

use crate::models::{IdentificationMethod, TrackInfo};

static OFFICIAL_PAREN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\(\s*official.*?\)").expect("valid regex"));
static BRACKETED: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\[.*?\]").expect("valid regex"));
static SEPARATOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*[-–—]\s*").expect("valid regex"));

/// Step 1: embedded tags of a local audio file. Accepts the first
/// non-empty title; pairs it with the artist tag if present.
pub fn identify_from_id3(path: &Path) -> Option<TrackInfo> {
    let tagged = lofty::read_from_path(path).ok()?;
    let tag = tagged.primary_tag().or_else(|| tagged.first_tag())?;

    let title = tag.title()?.trim().to_string();
    if title.is_empty() {
        return None;
    }
    let artist = tag
        .artist()
        .map(|a| a.trim().to_string())
        .filter(|a| !a.is_empty());

    Some(TrackInfo {
        artist,
        title,
        method: IdentificationMethod::Id3,
    })
}

/// Step 2: caller-supplied metadata (TG caption, YT/SP catalog entry). The
/// method string is assigned by the caller — this helper just enforces
/// "title non-empty".
pub fn identify_from_provided(
    provided_artist: Option<&str>,
    provided_title: Option<&str>,
    method: IdentificationMethod,
) -> Option<TrackInfo> {
    let title = provided_title?.trim();
    if title.is_empty() {
        return None;
    }
    let artist = provided_artist
        .map(|a| a.trim().to_string())
        .filter(|a| !a.is_empty());
    Some(TrackInfo {
        artist,
        title: title.to_string(),
        method,
    })
}

/// Step 3: derive `(artist?, title)` from a filename by stripping the
/// extension, "(Official ...)" segments, bracketed segments, then
/// splitting on the first artist/title separator.
pub fn identify_from_filename(file_name: &str) -> Option<TrackInfo> {
    let stem = Path::new(file_name)
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| file_name.to_string());

    let cleaned = OFFICIAL_PAREN.replace_all(&stem, "");
    let cleaned = BRACKETED.replace_all(&cleaned, "");
    let cleaned = cleaned.trim();

    if let Some(m) = SEPARATOR.find(cleaned) {
        let artist = cleaned[..m.start()].trim();
        let title = cleaned[m.end()..].trim();
        if !artist.is_empty() && !title.is_empty() {
            return Some(TrackInfo {
                artist: Some(artist.to_string()),
                title: title.to_string(),
                method: IdentificationMethod::Filename,
            });
        }
    }

    if cleaned.is_empty() {
        return None;
    }
    Some(TrackInfo {
        artist: None,
        title: cleaned.to_string(),
        method: IdentificationMethod::Filename,
    })
}

/// Input to the full pipeline. Any subset of fields may be present.
#[derive(Debug, Clone, Default)]
pub struct IdentifyInput<'a> {
    pub local_file_path: Option<&'a Path>,
    pub provided_artist: Option<&'a str>,
    pub provided_title: Option<&'a str>,
    pub provided_method: IdentificationMethod,
    pub file_name: Option<&'a str>,
}

/// Run the identification pipeline: id3 → provided metadata → filename.
/// First success wins.
pub fn identify(input: &IdentifyInput<'_>) -> Option<TrackInfo> {
    if let Some(path) = input.local_file_path {
        if let Some(info) = identify_from_id3(path) {
            return Some(info);
        }
    }

    if let Some(info) =
        identify_from_provided(input.provided_artist, input.provided_title, input.provided_method)
    {
        return Some(info);
    }

    if let Some(file_name) = input.file_name {
        if let Some(info) = identify_from_filename(file_name) {
            return Some(info);
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filename_with_official_video_suffix() {
        let info = identify_from_filename("Artist - Song (Official Video).mp3").unwrap();
        assert_eq!(info.artist.as_deref(), Some("Artist"));
        assert_eq!(info.title, "Song");
        assert_eq!(info.method, IdentificationMethod::Filename);
    }

    #[test]
    fn filename_with_em_dash() {
        let info = identify_from_filename("Queen – Bohemian Rhapsody.mp3").unwrap();
        assert_eq!(info.artist.as_deref(), Some("Queen"));
        assert_eq!(info.title, "Bohemian Rhapsody");
    }

    #[test]
    fn filename_without_separator_has_no_artist() {
        let info = identify_from_filename("some_random_track.mp3").unwrap();
        assert_eq!(info.artist, None);
        assert_eq!(info.title, "some_random_track");
    }

    #[test]
    fn filename_strips_bracketed_segment() {
        let info = identify_from_filename("Artist - Song [Lyrics].mp3").unwrap();
        assert_eq!(info.artist.as_deref(), Some("Artist"));
        assert_eq!(info.title, "Song");
    }

    #[test]
    fn provided_metadata_wins_over_filename() {
        let input = IdentifyInput {
            provided_artist: Some("A"),
            provided_title: Some("T"),
            provided_method: IdentificationMethod::TgMetadata,
            file_name: Some("Other - Thing.mp3"),
            ..Default::default()
        };
        let info = identify(&input).unwrap();
        assert_eq!(info.title, "T");
        assert_eq!(info.method, IdentificationMethod::TgMetadata);
    }

    #[test]
    fn empty_input_fails() {
        assert!(identify(&IdentifyInput::default()).is_none());
    }

    #[test]
    fn is_deterministic() {
        let input = IdentifyInput {
            file_name: Some("A - B.mp3"),
            ..Default::default()
        };
        assert_eq!(identify(&input), identify(&input));
    }
}
