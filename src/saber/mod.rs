pub mod beat_clock;
pub mod difficulty;
pub mod grid_note;
pub mod placement;
pub mod serializer;
pub mod slider_path;

use crate::error::ConversionWarning;
use crate::parser::osu_types::BeatmapSet;
use crate::saber::beat_clock::{BeatClock, BpmChange};
use crate::saber::difficulty::{classify, DifficultyBuckets, TargetDifficulty};
use crate::saber::grid_note::GridNote;
use crate::saber::placement::{NotePlacer, PlacementConfig};
use crate::ConvertError;

pub const SONG_FILENAME: &str = "song.egg";
pub const COVER_FILENAME: &str = "cover.jpg";

/// Seconds, used when the beatmap does not declare a preview point
pub const DEFAULT_PREVIEW_START: f64 = 12.0;
pub const PREVIEW_DURATION: f64 = 10.0;

/// Level wide metadata of `Info.dat`.
#[derive(Debug, Clone, PartialEq)]
pub struct LevelInfo {
    pub song_name: String,
    pub song_sub_name: String,
    pub song_author_name: String,
    pub level_author_name: String,
    pub beats_per_minute: f64,
    pub preview_start_time: f64,
    pub preview_duration: f64,
    pub song_filename: String,
    pub cover_image_filename: String,
    pub beatmap_id: Option<u32>,
    pub beatmap_set_id: Option<u32>,
}

/// Notes of one Beat Saber difficulty.
#[derive(Debug, Clone, PartialEq)]
pub struct SaberDifficulty {
    pub target: TargetDifficulty,
    /// osu! difficulty name it was made from
    pub source_name: String,
    pub notes: Vec<GridNote>,
    pub bpm_changes: Vec<BpmChange>,
    pub warnings: Vec<ConversionWarning>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SaberLevel {
    pub info: LevelInfo,
    /// Easiest first, at most one per target
    pub difficulties: Vec<SaberDifficulty>,
}

impl SaberLevel {
    pub fn warnings(&self) -> impl Iterator<Item = &ConversionWarning> {
        self.difficulties.iter().flat_map(|d| d.warnings.iter())
    }
}

/// Classify the difficulties of a set and place the notes of each.
///
/// Pure computation, the caller writes the result.
pub fn convert_beatmap_set(
    set: &BeatmapSet,
    placement: &PlacementConfig,
    buckets: &DifficultyBuckets,
) -> Result<SaberLevel, ConvertError> {
    let classified = classify(&set.beatmaps, buckets);
    let mut level_bpm = None;
    let mut difficulties = Vec::with_capacity(classified.len());
    for picked in classified {
        let beatmap = &set.beatmaps[picked.index];
        let clock = BeatClock::new(&beatmap.timing_points)?;
        let placed = NotePlacer::new(placement, &clock).place(&beatmap.hit_objects);
        if placed.notes.is_empty() {
            log::warn!(
                "Difficulty [{}] has no playable note, leaving {} out",
                beatmap.metadata.version,
                picked.target
            );
            continue;
        }
        log::info!(
            "{} <- [{}]: {} notes from {} hit objects",
            picked.target,
            beatmap.metadata.version,
            placed.notes.len(),
            beatmap.hit_objects.len()
        );
        level_bpm.get_or_insert(clock.base_bpm());
        difficulties.push(SaberDifficulty {
            target: picked.target,
            source_name: beatmap.metadata.version.clone(),
            notes: placed.notes,
            bpm_changes: clock.bpm_changes(),
            warnings: placed.warnings,
        });
    }
    let Some(beats_per_minute) = level_bpm else {
        return Err(ConvertError::NoDifficultyMapped);
    };

    let metadata = &set.metadata;
    let info = LevelInfo {
        song_name: metadata.title.clone(),
        song_sub_name: String::new(),
        song_author_name: metadata.artist.clone(),
        level_author_name: metadata.creator.clone(),
        beats_per_minute,
        preview_start_time: metadata
            .preview_time
            .map_or(DEFAULT_PREVIEW_START, |ms| ms / 1000.0),
        preview_duration: PREVIEW_DURATION,
        song_filename: SONG_FILENAME.to_string(),
        cover_image_filename: COVER_FILENAME.to_string(),
        beatmap_id: metadata.beatmap_id,
        beatmap_set_id: metadata.beatmap_set_id,
    };
    Ok(SaberLevel { info, difficulties })
}
