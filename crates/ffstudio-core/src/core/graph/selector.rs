//! Stream selections
//!
//! A stream selector node picks streams from an input or names a filter pad.
//! Its mode and fields live in the node's property bag; this module converts
//! between that bag and [`StreamSelection`], and infers selections from
//! FFmpeg stream specifiers.

use serde::{Deserialize, Serialize};

use super::properties::PropertyBag;

pub const SELECT_BY_KEY: &str = "Select by";
pub const ID_KEY: &str = "Id";
pub const TYPE_KEY: &str = "Type";
pub const NAME_KEY: &str = "Name";
pub const LANGUAGE_KEY: &str = "Language";
pub const PROGRAM_KEY: &str = "Program";
pub const CUSTOM_KEY: &str = "Custom";

const DEFAULT_LANGUAGE: &str = "eng";
const DEFAULT_PROGRAM: &str = "1";

/// Selection mode of a stream selector
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SelectBy {
    Id,
    Type,
    Name,
    Language,
    Program,
    Custom,
}

impl SelectBy {
    pub fn as_str(&self) -> &'static str {
        match self {
            SelectBy::Id => "id",
            SelectBy::Type => "type",
            SelectBy::Name => "name",
            SelectBy::Language => "language",
            SelectBy::Program => "program",
            SelectBy::Custom => "custom",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "id" => Some(SelectBy::Id),
            "type" => Some(SelectBy::Type),
            "name" => Some(SelectBy::Name),
            "language" => Some(SelectBy::Language),
            "program" => Some(SelectBy::Program),
            "custom" => Some(SelectBy::Custom),
            _ => None,
        }
    }
}

/// Stream media type, `v`/`a`/`s`/`d`/`t` in specifiers
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Video,
    Audio,
    Subtitle,
    Data,
    Attachment,
}

impl MediaType {
    pub fn from_letter(letter: &str) -> Option<Self> {
        match letter {
            "v" => Some(MediaType::Video),
            "a" => Some(MediaType::Audio),
            "s" => Some(MediaType::Subtitle),
            "d" => Some(MediaType::Data),
            "t" => Some(MediaType::Attachment),
            _ => None,
        }
    }

    pub fn letter(&self) -> &'static str {
        match self {
            MediaType::Video => "v",
            MediaType::Audio => "a",
            MediaType::Subtitle => "s",
            MediaType::Data => "d",
            MediaType::Attachment => "t",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MediaType::Video => "video",
            MediaType::Audio => "audio",
            MediaType::Subtitle => "subtitle",
            MediaType::Data => "data",
            MediaType::Attachment => "attachment",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "video" => Some(MediaType::Video),
            "audio" => Some(MediaType::Audio),
            "subtitle" => Some(MediaType::Subtitle),
            "data" => Some(MediaType::Data),
            "attachment" => Some(MediaType::Attachment),
            _ => None,
        }
    }
}

/// A selector's mode together with its mode-specific field
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StreamSelection {
    /// `<input>:<id>`
    Id(String),
    /// `<input>:<v|a|s|d|t>[:<index>]`
    Type {
        media: MediaType,
        index: Option<String>,
    },
    /// Filter pad label
    Name(String),
    /// `<input>:m:language:<code>`
    Language(String),
    /// `<input>:p:<id>`
    Program(String),
    /// Literal passthrough
    Custom(String),
}

impl Default for StreamSelection {
    fn default() -> Self {
        StreamSelection::Id("0".to_string())
    }
}

impl StreamSelection {
    pub fn mode(&self) -> SelectBy {
        match self {
            StreamSelection::Id(_) => SelectBy::Id,
            StreamSelection::Type { .. } => SelectBy::Type,
            StreamSelection::Name(_) => SelectBy::Name,
            StreamSelection::Language(_) => SelectBy::Language,
            StreamSelection::Program(_) => SelectBy::Program,
            StreamSelection::Custom(_) => SelectBy::Custom,
        }
    }

    /// Builds the selector property bag: mode first, then its fields.
    pub fn to_properties(&self) -> PropertyBag {
        let bag = PropertyBag::new().with(SELECT_BY_KEY, self.mode().as_str());
        match self {
            StreamSelection::Id(id) => bag.with(ID_KEY, id.as_str()),
            StreamSelection::Type { media, index } => bag
                .with(TYPE_KEY, media.as_str())
                .with(ID_KEY, index.clone().unwrap_or_default()),
            StreamSelection::Name(name) => bag.with(NAME_KEY, name.as_str()),
            StreamSelection::Language(code) => bag.with(LANGUAGE_KEY, code.as_str()),
            StreamSelection::Program(id) => bag.with(PROGRAM_KEY, id.as_str()),
            StreamSelection::Custom(literal) => bag.with(CUSTOM_KEY, literal.as_str()),
        }
    }

    /// Reads a selection back from selector properties.
    ///
    /// Returns `None` when the mode is missing or unknown.
    pub fn from_properties(props: &PropertyBag) -> Option<Self> {
        let field = |key: &str| props.get(key).unwrap_or_default().to_string();
        let selection = match SelectBy::parse(props.get(SELECT_BY_KEY)?)? {
            SelectBy::Id => StreamSelection::Id(field(ID_KEY)),
            SelectBy::Type => StreamSelection::Type {
                media: MediaType::parse(props.get(TYPE_KEY).unwrap_or_default())
                    .unwrap_or(MediaType::Video),
                index: props.get_non_empty(ID_KEY).map(str::to_string),
            },
            SelectBy::Name => StreamSelection::Name(field(NAME_KEY)),
            SelectBy::Language => StreamSelection::Language(field(LANGUAGE_KEY)),
            SelectBy::Program => StreamSelection::Program(field(PROGRAM_KEY)),
            SelectBy::Custom => StreamSelection::Custom(field(CUSTOM_KEY)),
        };
        Some(selection)
    }
}

/// Selection inferred from a specifier, plus the input it refers to
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InferredSelection {
    pub selection: StreamSelection,
    /// Index of the referenced input, when the specifier names one
    pub input_index: Option<usize>,
}

impl InferredSelection {
    fn detached(selection: StreamSelection) -> Self {
        Self {
            selection,
            input_index: None,
        }
    }
}

/// Infers a selection from a colon specifier such as `0:v:1` or `:a`.
fn infer_colon_spec(spec: &str) -> InferredSelection {
    let parts: Vec<&str> = spec.split(':').collect();
    let part = |i: usize| parts.get(i).copied().filter(|p| !p.is_empty());

    let selection = if parts.get(1) == Some(&"m") && parts.get(2) == Some(&"language") {
        StreamSelection::Language(part(3).unwrap_or(DEFAULT_LANGUAGE).to_string())
    } else if parts.get(1) == Some(&"p") {
        StreamSelection::Program(part(2).unwrap_or(DEFAULT_PROGRAM).to_string())
    } else if let Some(media) = parts.get(1).and_then(|p| MediaType::from_letter(p)) {
        StreamSelection::Type {
            media,
            index: parts.get(2).map(|p| p.to_string()),
        }
    } else {
        StreamSelection::Id(parts.get(1).copied().unwrap_or_default().to_string())
    };

    InferredSelection {
        selection,
        input_index: parts.first().and_then(|p| p.parse().ok()),
    }
}

/// Infers a selection from a filter input pad label.
///
/// Stream specifiers map to their mode; a bare stream index passes through
/// literally; anything else names a filter pad.
pub fn infer_from_pad_label(label: &str) -> InferredSelection {
    let label = label.trim_matches(|c| c == '[' || c == ']');
    if label.contains(':') {
        return infer_colon_spec(label);
    }
    if !label.is_empty() && label.chars().all(|c| c.is_ascii_digit()) {
        return InferredSelection::detached(StreamSelection::Custom(label.to_string()));
    }
    InferredSelection::detached(StreamSelection::Name(label.to_string()))
}

/// Infers a selection from a `-map` value.
///
/// `[label]` references a filter pad; a bare input index is kept literally
/// but still wired to that input.
pub fn infer_from_map(value: &str) -> InferredSelection {
    if let Some(label) = value.strip_prefix('[').and_then(|v| v.strip_suffix(']')) {
        return InferredSelection::detached(StreamSelection::Name(label.to_string()));
    }
    if value.contains(':') {
        return infer_colon_spec(value);
    }
    InferredSelection {
        selection: StreamSelection::Custom(value.to_string()),
        input_index: Some(value.parse().unwrap_or(0)),
    }
}

/// Infers the selection attached to a flag's stream suffix, e.g. `:v` in `-b:v`.
///
/// Only type suffixes keep their mode; other suffixes pass through literally
/// since a flag suffix never names an input.
pub fn infer_from_flag_suffix(suffix: &str) -> StreamSelection {
    let inferred = infer_colon_spec(suffix);
    match inferred.selection {
        StreamSelection::Type { .. } if inferred.input_index.is_none() => inferred.selection,
        _ => StreamSelection::Custom(suffix.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pad_label_type_selector() {
        let inferred = infer_from_pad_label("0:v");
        assert_eq!(inferred.input_index, Some(0));
        assert_eq!(
            inferred.selection,
            StreamSelection::Type {
                media: MediaType::Video,
                index: None
            }
        );

        let inferred = infer_from_pad_label("1:a:2");
        assert_eq!(inferred.input_index, Some(1));
        assert_eq!(
            inferred.selection,
            StreamSelection::Type {
                media: MediaType::Audio,
                index: Some("2".to_string())
            }
        );
    }

    #[test]
    fn test_pad_label_language_program_and_id() {
        assert_eq!(
            infer_from_pad_label("0:m:language:jpn").selection,
            StreamSelection::Language("jpn".to_string())
        );
        assert_eq!(
            infer_from_pad_label("0:m:language").selection,
            StreamSelection::Language("eng".to_string())
        );
        assert_eq!(
            infer_from_pad_label("2:p:5").selection,
            StreamSelection::Program("5".to_string())
        );
        let inferred = infer_from_pad_label("1:3");
        assert_eq!(inferred.selection, StreamSelection::Id("3".to_string()));
        assert_eq!(inferred.input_index, Some(1));
    }

    #[test]
    fn test_pad_label_name_and_index() {
        let inferred = infer_from_pad_label("[out]");
        assert_eq!(inferred.selection, StreamSelection::Name("out".to_string()));
        assert_eq!(inferred.input_index, None);

        assert_eq!(
            infer_from_pad_label("1").selection,
            StreamSelection::Custom("1".to_string())
        );
    }

    #[test]
    fn test_relative_type_spec_has_no_input() {
        let inferred = infer_from_pad_label(":v");
        assert_eq!(inferred.input_index, None);
        assert_eq!(inferred.selection.mode(), SelectBy::Type);
    }

    #[test]
    fn test_map_values() {
        assert_eq!(
            infer_from_map("[vout]").selection,
            StreamSelection::Name("vout".to_string())
        );
        let bare = infer_from_map("1");
        assert_eq!(bare.selection, StreamSelection::Custom("1".to_string()));
        assert_eq!(bare.input_index, Some(1));
        let spec = infer_from_map("0:m:language:eng");
        assert_eq!(spec.selection, StreamSelection::Language("eng".to_string()));
    }

    #[test]
    fn test_flag_suffix() {
        assert_eq!(
            infer_from_flag_suffix(":a:0"),
            StreamSelection::Type {
                media: MediaType::Audio,
                index: Some("0".to_string())
            }
        );
        assert_eq!(
            infer_from_flag_suffix(":0"),
            StreamSelection::Custom(":0".to_string())
        );
    }

    #[test]
    fn test_properties_round_trip() {
        let selection = StreamSelection::Type {
            media: MediaType::Subtitle,
            index: Some("1".to_string()),
        };
        let props = selection.to_properties();
        assert_eq!(props.key_at(0), Some(SELECT_BY_KEY));
        assert_eq!(props.get(TYPE_KEY), Some("subtitle"));
        assert_eq!(StreamSelection::from_properties(&props), Some(selection));

        let unknown = PropertyBag::new().with(SELECT_BY_KEY, "bogus");
        assert_eq!(StreamSelection::from_properties(&unknown), None);
    }
}
