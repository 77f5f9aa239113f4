//! osu! beatmap model
//!
//! Reference: <https://osu.ppy.sh/wiki/en/Client/File_formats/osu_%28file_format%29>

use std::collections::BTreeMap;

/// Playfield width in osu! pixels
pub const PLAYFIELD_WIDTH: f64 = 512.0;
/// Playfield height in osu! pixels
pub const PLAYFIELD_HEIGHT: f64 = 384.0;

/// Oldest `osu file format` version handled
pub const MIN_FORMAT_VERSION: u8 = 3;
/// Newest `osu file format` version handled
pub const MAX_FORMAT_VERSION: u8 = 14;
/// First version without the legacy audio offset
pub const FIRST_CURRENT_FORMAT_VERSION: u8 = 5;
/// Files older than v5 were timed against an audio stack 24ms late
pub const LEGACY_TIME_OFFSET_MS: f64 = 24.0;

pub const DEFAULT_SLIDER_MULTIPLIER: f64 = 1.4;
pub const DEFAULT_METER: u32 = 4;

// hit object type bitmask
pub const TYPE_CIRCLE: u32 = 1;
pub const TYPE_SLIDER: u32 = 1 << 1;
pub const TYPE_NEW_COMBO: u32 = 1 << 2;
pub const TYPE_SPINNER: u32 = 1 << 3;
pub const TYPE_MANIA_HOLD: u32 = 1 << 7;

// timing point effects bitmask
pub const EFFECT_KIAI: u32 = 1;

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum FormatVersion {
    /// v3 and v4, times need [`LEGACY_TIME_OFFSET_MS`]
    Legacy(u8),
    /// v5 and later
    Current(u8),
}

impl Default for FormatVersion {
    fn default() -> Self {
        Self::Current(MAX_FORMAT_VERSION)
    }
}

impl FormatVersion {
    pub const fn from_number(number: u8) -> Option<Self> {
        if number < MIN_FORMAT_VERSION || number > MAX_FORMAT_VERSION {
            None
        } else if number < FIRST_CURRENT_FORMAT_VERSION {
            Some(Self::Legacy(number))
        } else {
            Some(Self::Current(number))
        }
    }

    pub const fn number(self) -> u8 {
        match self {
            Self::Legacy(n) | Self::Current(n) => n,
        }
    }

    pub const fn is_legacy(self) -> bool {
        matches!(self, Self::Legacy(_))
    }

    /// Offset added to every absolute time read from the file
    pub const fn time_offset(self) -> f64 {
        if self.is_legacy() {
            LEGACY_TIME_OFFSET_MS
        } else {
            0.0
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum GameMode {
    #[default]
    Standard,
    Taiko,
    Catch,
    Mania,
}

impl GameMode {
    pub const fn from_id(id: i32) -> Option<Self> {
        match id {
            0 => Some(Self::Standard),
            1 => Some(Self::Taiko),
            2 => Some(Self::Catch),
            3 => Some(Self::Mania),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct General {
    pub audio_filename: String,
    /// `None` when the file declares `-1`
    pub preview_time: Option<f64>,
    pub mode: GameMode,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Metadata {
    pub title: String,
    pub artist: String,
    pub creator: String,
    /// Difficulty name
    pub version: String,
    pub beatmap_id: Option<u32>,
    pub beatmap_set_id: Option<u32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Difficulty {
    pub hp_drain_rate: f64,
    pub circle_size: f64,
    pub overall_difficulty: f64,
    pub approach_rate: f64,
    pub slider_multiplier: f64,
    pub slider_tick_rate: f64,
}

impl Default for Difficulty {
    fn default() -> Self {
        Difficulty {
            hp_drain_rate: 5.0,
            circle_size: 5.0,
            overall_difficulty: 5.0,
            approach_rate: 5.0,
            slider_multiplier: DEFAULT_SLIDER_MULTIPLIER,
            slider_tick_rate: 1.0,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct TimingPoint {
    pub time: f64,
    /// Milliseconds per beat, negative for inherited points
    pub beat_length: f64,
    pub meter: u32,
    pub uninherited: bool,
    pub kiai: bool,
}

impl TimingPoint {
    pub fn bpm(&self) -> f64 {
        60_000.0 / self.beat_length
    }

    /// Slider velocity multiplier of an inherited point
    pub fn velocity(&self) -> f64 {
        if self.uninherited || self.beat_length >= 0.0 {
            1.0
        } else {
            (-100.0 / self.beat_length).clamp(0.1, 10.0)
        }
    }
}

/// Beat length and slider velocity in effect at `time`.
///
/// `points` must be sorted by time. Before the first uninherited point its
/// beat length applies.
pub fn slider_timing_at(points: &[TimingPoint], time: f64) -> Option<(f64, f64)> {
    let first = points.iter().find(|p| p.uninherited)?;
    let active = points.partition_point(|p| p.time <= time);
    let previous = &points[..active];
    let beat_length = previous
        .iter()
        .rev()
        .find(|p| p.uninherited)
        .unwrap_or(first)
        .beat_length;
    // an uninherited point resets the velocity
    let velocity = previous
        .iter()
        .rev()
        .take_while(|p| !p.uninherited)
        .next()
        .map_or(1.0, TimingPoint::velocity);
    Some((beat_length, velocity))
}

#[derive(Debug, Copy, Clone, PartialEq, Default)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub const fn new(x: f64, y: f64) -> Self {
        Position { x, y }
    }

    pub fn distance(&self, other: &Position) -> f64 {
        (other.x - self.x).hypot(other.y - self.y)
    }

    pub fn lerp(&self, other: &Position, t: f64) -> Position {
        Position {
            x: self.x + (other.x - self.x) * t,
            y: self.y + (other.y - self.y) * t,
        }
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum CurveType {
    Linear,
    Perfect,
    Bezier,
    Catmull,
}

impl CurveType {
    pub const fn from_char(c: char) -> Option<Self> {
        match c {
            'L' => Some(Self::Linear),
            'P' => Some(Self::Perfect),
            'B' => Some(Self::Bezier),
            'C' => Some(Self::Catmull),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Slider {
    pub end_time: f64,
    pub curve: CurveType,
    /// Control points, the head position first
    pub path: Vec<Position>,
    /// Number of spans, 1 for a slider without reverse arrows
    pub repeats: u32,
    pub pixel_length: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum HitObjectKind {
    Tap,
    /// Sliders and osu!mania holds
    Slider(Slider),
    Spinner { end_time: f64 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct HitObject {
    pub time: f64,
    pub position: Position,
    pub new_combo: bool,
    pub kind: HitObjectKind,
}

impl HitObject {
    pub fn end_time(&self) -> f64 {
        match &self.kind {
            HitObjectKind::Tap => self.time,
            HitObjectKind::Slider(slider) => slider.end_time,
            HitObjectKind::Spinner { end_time } => *end_time,
        }
    }
}

/// One `.osu` file, i.e. one difficulty of a beatmap set.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Beatmap {
    pub version: FormatVersion,
    pub general: General,
    pub metadata: Metadata,
    pub difficulty: Difficulty,
    /// Background image filename from `[Events]`
    pub background: Option<String>,
    pub timing_points: Vec<TimingPoint>,
    pub hit_objects: Vec<HitObject>,
}

/// Metadata hints taken from the beatmap set folder name.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SetDefaults {
    pub beatmap_set_id: Option<u32>,
    pub artist: Option<String>,
    pub title: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct SetMetadata {
    pub title: String,
    pub artist: String,
    pub creator: String,
    pub beatmap_id: Option<u32>,
    pub beatmap_set_id: Option<u32>,
    pub audio_filename: String,
    pub cover_filename: Option<String>,
    pub preview_time: Option<f64>,
}

/// A beatmap set: shared metadata and its difficulties.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BeatmapSet {
    pub metadata: SetMetadata,
    pub beatmaps: Vec<Beatmap>,
}

impl BeatmapSet {
    /// Merge the metadata of all difficulties, each field taking its most
    /// frequent value (ties go to the smallest value).
    pub fn from_beatmaps(beatmaps: Vec<Beatmap>, defaults: &SetDefaults) -> Self {
        let text = |field: fn(&Beatmap) -> &String| {
            most_frequent(
                beatmaps
                    .iter()
                    .map(field)
                    .filter(|s| !s.is_empty())
                    .cloned(),
            )
        };
        let title = text(|b| &b.metadata.title)
            .or_else(|| defaults.title.clone())
            .unwrap_or_default();
        let artist = text(|b| &b.metadata.artist)
            .or_else(|| defaults.artist.clone())
            .unwrap_or_default();
        let creator = text(|b| &b.metadata.creator).unwrap_or_default();
        let audio_filename = text(|b| &b.general.audio_filename).unwrap_or_default();
        let cover_filename = most_frequent(beatmaps.iter().filter_map(|b| b.background.clone()));
        let beatmap_id = most_frequent(beatmaps.iter().filter_map(|b| b.metadata.beatmap_id));
        let beatmap_set_id =
            most_frequent(beatmaps.iter().filter_map(|b| b.metadata.beatmap_set_id))
                .or(defaults.beatmap_set_id);
        // f64 is not Ord, vote on whole milliseconds
        let preview_time = most_frequent(
            beatmaps
                .iter()
                .filter_map(|b| b.general.preview_time)
                .map(|t| t.round() as i64),
        )
        .map(|t| t as f64);
        BeatmapSet {
            metadata: SetMetadata {
                title,
                artist,
                creator,
                beatmap_id,
                beatmap_set_id,
                audio_filename,
                cover_filename,
                preview_time,
            },
            beatmaps,
        }
    }
}

fn most_frequent<T: Ord>(values: impl Iterator<Item = T>) -> Option<T> {
    let mut counts = BTreeMap::new();
    for value in values {
        *counts.entry(value).or_insert(0usize) += 1;
    }
    // iteration is ascending, keep the first maximum
    let mut best: Option<(T, usize)> = None;
    for (value, count) in counts {
        if best.as_ref().map_or(true, |(_, c)| count > *c) {
            best = Some((value, count));
        }
    }
    best.map(|(value, _)| value)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uninherited(time: f64, beat_length: f64) -> TimingPoint {
        TimingPoint {
            time,
            beat_length,
            meter: 4,
            uninherited: true,
            kiai: false,
        }
    }

    fn inherited(time: f64, beat_length: f64) -> TimingPoint {
        TimingPoint {
            uninherited: false,
            ..uninherited(time, beat_length)
        }
    }

    #[test]
    fn test_version_ordering() {
        assert!(FormatVersion::from_number(4).unwrap().is_legacy());
        assert!(!FormatVersion::from_number(5).unwrap().is_legacy());
        assert_eq!(FormatVersion::from_number(2), None);
        assert_eq!(FormatVersion::from_number(15), None);
        assert!(FormatVersion::Legacy(4) < FormatVersion::Current(5));
    }

    #[test]
    fn test_slider_timing_at() {
        let points = vec![
            uninherited(0.0, 500.0),
            inherited(1000.0, -50.0),
            uninherited(2000.0, 250.0),
        ];
        assert_eq!(slider_timing_at(&points, -100.0), Some((500.0, 1.0)));
        assert_eq!(slider_timing_at(&points, 500.0), Some((500.0, 1.0)));
        assert_eq!(slider_timing_at(&points, 1500.0), Some((500.0, 2.0)));
        // velocity resets on the next uninherited point
        assert_eq!(slider_timing_at(&points, 2500.0), Some((250.0, 1.0)));
        assert_eq!(slider_timing_at(&[inherited(0.0, -100.0)], 0.0), None);
    }

    #[test]
    fn test_most_frequent_ties_go_to_smallest() {
        assert_eq!(most_frequent(vec![3, 1, 3, 1, 2].into_iter()), Some(1));
        assert_eq!(most_frequent(vec![3, 3, 1].into_iter()), Some(3));
        assert_eq!(most_frequent(Vec::<u32>::new().into_iter()), None);
    }

    #[test]
    fn test_merge_metadata_with_defaults() {
        let mut a = Beatmap::default();
        a.metadata.title = "Song".to_string();
        a.general.audio_filename = "audio.mp3".to_string();
        a.metadata.beatmap_id = Some(10);
        let mut b = a.clone();
        b.metadata.title = "Song (TV Size)".to_string();
        b.metadata.beatmap_id = Some(11);
        let mut c = a.clone();
        c.metadata.beatmap_id = Some(12);

        let defaults = SetDefaults {
            beatmap_set_id: Some(42),
            artist: Some("Folder Artist".to_string()),
            title: Some("Folder Title".to_string()),
        };
        let set = BeatmapSet::from_beatmaps(vec![a, b, c], &defaults);
        assert_eq!(set.metadata.title, "Song");
        assert_eq!(set.metadata.artist, "Folder Artist");
        assert_eq!(set.metadata.beatmap_id, Some(10));
        assert_eq!(set.metadata.beatmap_set_id, Some(42));
        assert_eq!(set.metadata.audio_filename, "audio.mp3");
        assert_eq!(set.beatmaps.len(), 3);
    }
}
