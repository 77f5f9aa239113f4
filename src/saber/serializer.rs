use crate::saber::beat_clock::BpmChange;
use crate::saber::grid_note::{CutDirection, GridNote, GRID_COLUMNS, GRID_ROWS};
use crate::saber::{LevelInfo, SaberDifficulty, SaberLevel};
use crate::ConvertError;
use serde::{Deserialize, Serialize};
use std::path::Path;

// Beat Saber v2 level format, field names are fixed by the game

pub const INFO_FILENAME: &str = "Info.dat";
const INFO_VERSION: &str = "2.0.0";
const DIFFICULTY_VERSION: &str = "2.2.0";
const CHARACTERISTIC: &str = "Standard";
const ENVIRONMENT: &str = "DefaultEnvironment";
const ALL_DIRECTIONS_ENVIRONMENT: &str = "GlassDesertEnvironment";
const GENERATOR: &str = concat!("osu2saber ", env!("CARGO_PKG_VERSION"));
const OSU_BEATMAP_URL: &str = "https://osu.ppy.sh/beatmapsets/";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoteEntry {
    #[serde(rename = "_time")]
    pub time: f64,
    #[serde(rename = "_lineIndex")]
    pub line_index: u8,
    #[serde(rename = "_lineLayer")]
    pub line_layer: u8,
    #[serde(rename = "_type")]
    pub kind: u8,
    #[serde(rename = "_cutDirection")]
    pub cut_direction: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObstacleEntry {
    #[serde(rename = "_time")]
    pub time: f64,
    #[serde(rename = "_lineIndex")]
    pub line_index: u8,
    #[serde(rename = "_type")]
    pub kind: u8,
    #[serde(rename = "_duration")]
    pub duration: f64,
    #[serde(rename = "_width")]
    pub width: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEntry {
    #[serde(rename = "_time")]
    pub time: f64,
    #[serde(rename = "_type")]
    pub kind: u8,
    #[serde(rename = "_value")]
    pub value: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BpmChangeEntry {
    #[serde(rename = "_time")]
    pub time: f64,
    #[serde(rename = "_BPM")]
    pub bpm: f64,
    #[serde(rename = "_beatsPerBar")]
    pub beats_per_bar: u32,
    #[serde(rename = "_metronomeOffset")]
    pub metronome_offset: u32,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DifficultyCustomData {
    #[serde(rename = "_BPMChanges", default)]
    pub bpm_changes: Vec<BpmChangeEntry>,
}

/// `<Label>Standard.dat`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DifficultyFile {
    #[serde(rename = "_version")]
    pub version: String,
    #[serde(rename = "_notes")]
    pub notes: Vec<NoteEntry>,
    #[serde(rename = "_obstacles", default)]
    pub obstacles: Vec<ObstacleEntry>,
    #[serde(rename = "_events", default)]
    pub events: Vec<EventEntry>,
    #[serde(
        rename = "_customData",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub custom_data: Option<DifficultyCustomData>,
}

impl DifficultyFile {
    /// Notes back in grid form, `None` on an unknown cut direction
    pub fn grid_notes(&self) -> Option<Vec<GridNote>> {
        self.notes
            .iter()
            .map(|n| {
                CutDirection::from_id(n.cut_direction)
                    .map(|d| GridNote::new(n.time, n.line_index, n.line_layer, d))
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DifficultyBeatmapCustomData {
    #[serde(rename = "_difficultyLabel")]
    pub difficulty_label: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DifficultyBeatmap {
    #[serde(rename = "_difficulty")]
    pub difficulty: String,
    #[serde(rename = "_difficultyRank")]
    pub difficulty_rank: u8,
    #[serde(rename = "_beatmapFilename")]
    pub beatmap_filename: String,
    #[serde(rename = "_noteJumpMovementSpeed")]
    pub note_jump_movement_speed: f64,
    #[serde(rename = "_noteJumpStartBeatOffset")]
    pub note_jump_start_beat_offset: f64,
    #[serde(rename = "_customData")]
    pub custom_data: DifficultyBeatmapCustomData,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DifficultyBeatmapSet {
    #[serde(rename = "_beatmapCharacteristicName")]
    pub characteristic: String,
    #[serde(rename = "_difficultyBeatmaps")]
    pub difficulty_beatmaps: Vec<DifficultyBeatmap>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InfoLink {
    pub name: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InfoCustomData {
    pub generator: String,
    pub source: String,
    #[serde(rename = "beatmapID", skip_serializing_if = "Option::is_none", default)]
    pub beatmap_id: Option<u32>,
    #[serde(rename = "beatmapSetID", skip_serializing_if = "Option::is_none", default)]
    pub beatmap_set_id: Option<u32>,
    #[serde(default)]
    pub links: Vec<InfoLink>,
}

/// `Info.dat`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InfoFile {
    #[serde(rename = "_version")]
    pub version: String,
    #[serde(rename = "_songName")]
    pub song_name: String,
    #[serde(rename = "_songSubName")]
    pub song_sub_name: String,
    #[serde(rename = "_songAuthorName")]
    pub song_author_name: String,
    #[serde(rename = "_levelAuthorName")]
    pub level_author_name: String,
    #[serde(rename = "_beatsPerMinute")]
    pub beats_per_minute: f64,
    #[serde(rename = "_shuffle")]
    pub shuffle: f64,
    #[serde(rename = "_shufflePeriod")]
    pub shuffle_period: f64,
    #[serde(rename = "_previewStartTime")]
    pub preview_start_time: f64,
    #[serde(rename = "_previewDuration")]
    pub preview_duration: f64,
    #[serde(rename = "_songFilename")]
    pub song_filename: String,
    #[serde(rename = "_coverImageFilename")]
    pub cover_image_filename: String,
    #[serde(rename = "_environmentName")]
    pub environment_name: String,
    #[serde(rename = "_allDirectionsEnvironmentName")]
    pub all_directions_environment_name: String,
    #[serde(rename = "_songTimeOffset")]
    pub song_time_offset: f64,
    #[serde(rename = "_customData")]
    pub custom_data: InfoCustomData,
    #[serde(rename = "_difficultyBeatmapSets")]
    pub difficulty_beatmap_sets: Vec<DifficultyBeatmapSet>,
}

fn note_entry(note: &GridNote) -> NoteEntry {
    NoteEntry {
        time: note.beat,
        line_index: note.column,
        line_layer: note.row,
        kind: note.saber().id(),
        cut_direction: note.direction.id(),
    }
}

fn bpm_change_entry(change: &BpmChange) -> BpmChangeEntry {
    BpmChangeEntry {
        time: change.beat,
        bpm: change.bpm,
        beats_per_bar: change.meter,
        metronome_offset: change.meter,
    }
}

fn check_notes(notes: &[GridNote]) -> Result<(), ConvertError> {
    for (i, note) in notes.iter().enumerate() {
        if !note.beat.is_finite() || note.column >= GRID_COLUMNS || note.row >= GRID_ROWS {
            return Err(ConvertError::Serialization(format!(
                "note #{i} out of range: {note:?}"
            )));
        }
    }
    let key = |n: &GridNote| (n.beat, n.column, n.row);
    if let Some(pair) = notes.windows(2).find(|w| key(&w[0]) >= key(&w[1])) {
        return Err(ConvertError::Serialization(format!(
            "notes out of order or overlapping: {:?} then {:?}",
            pair[0], pair[1]
        )));
    }
    Ok(())
}

/// Difficulty document, notes must be sorted without overlaps.
pub fn difficulty_file(
    difficulty: &SaberDifficulty,
    level_bpm: f64,
) -> Result<DifficultyFile, ConvertError> {
    check_notes(&difficulty.notes)?;
    let constant_tempo = matches!(difficulty.bpm_changes.as_slice(), [only] if only.bpm == level_bpm);
    let custom_data = (!constant_tempo).then(|| DifficultyCustomData {
        bpm_changes: difficulty.bpm_changes.iter().map(bpm_change_entry).collect(),
    });
    Ok(DifficultyFile {
        version: DIFFICULTY_VERSION.to_string(),
        notes: difficulty.notes.iter().map(note_entry).collect(),
        obstacles: Vec::new(),
        events: Vec::new(),
        custom_data,
    })
}

pub fn render_difficulty(
    difficulty: &SaberDifficulty,
    level_bpm: f64,
) -> Result<String, ConvertError> {
    let file = difficulty_file(difficulty, level_bpm)?;
    serde_json::to_string(&file).map_err(|e| ConvertError::Serialization(e.to_string()))
}

/// Level document, the difficulty labels show the osu! difficulty names.
pub fn info_file(info: &LevelInfo, difficulties: &[SaberDifficulty]) -> InfoFile {
    let difficulty_beatmaps = difficulties
        .iter()
        .map(|d| DifficultyBeatmap {
            difficulty: d.target.name().to_string(),
            difficulty_rank: d.target.rank(),
            beatmap_filename: d.target.beatmap_filename(),
            note_jump_movement_speed: d.target.note_jump_speed(),
            note_jump_start_beat_offset: 0.0,
            custom_data: DifficultyBeatmapCustomData {
                difficulty_label: d.source_name.clone(),
            },
        })
        .collect();
    let links = info
        .beatmap_set_id
        .map(|id| InfoLink {
            name: "osu!".to_string(),
            url: format!("{OSU_BEATMAP_URL}{id}"),
        })
        .into_iter()
        .collect();
    InfoFile {
        version: INFO_VERSION.to_string(),
        song_name: info.song_name.clone(),
        song_sub_name: info.song_sub_name.clone(),
        song_author_name: info.song_author_name.clone(),
        level_author_name: info.level_author_name.clone(),
        beats_per_minute: info.beats_per_minute,
        shuffle: 0.0,
        shuffle_period: 0.5,
        preview_start_time: info.preview_start_time,
        preview_duration: info.preview_duration,
        song_filename: info.song_filename.clone(),
        cover_image_filename: info.cover_image_filename.clone(),
        environment_name: ENVIRONMENT.to_string(),
        all_directions_environment_name: ALL_DIRECTIONS_ENVIRONMENT.to_string(),
        song_time_offset: 0.0,
        custom_data: InfoCustomData {
            generator: GENERATOR.to_string(),
            source: "osu!".to_string(),
            beatmap_id: info.beatmap_id,
            beatmap_set_id: info.beatmap_set_id,
            links,
        },
        difficulty_beatmap_sets: vec![DifficultyBeatmapSet {
            characteristic: CHARACTERISTIC.to_string(),
            difficulty_beatmaps,
        }],
    }
}

pub fn render_info(
    info: &LevelInfo,
    difficulties: &[SaberDifficulty],
) -> Result<String, ConvertError> {
    serde_json::to_string_pretty(&info_file(info, difficulties))
        .map_err(|e| ConvertError::Serialization(e.to_string()))
}

/// Write `Info.dat` and every difficulty file into `target_dir`.
pub fn write_level(target_dir: &Path, level: &SaberLevel) -> Result<(), ConvertError> {
    if level.difficulties.is_empty() {
        return Err(ConvertError::NoDifficultyMapped);
    }
    // render everything before touching the disk
    let info = render_info(&level.info, &level.difficulties)?;
    let difficulties = level
        .difficulties
        .iter()
        .map(|d| {
            render_difficulty(d, level.info.beats_per_minute)
                .map(|text| (d.target.beatmap_filename(), text))
        })
        .collect::<Result<Vec<_>, _>>()?;

    std::fs::create_dir_all(target_dir)?;
    std::fs::write(target_dir.join(INFO_FILENAME), info)?;
    for (filename, text) in difficulties {
        std::fs::write(target_dir.join(&filename), text)?;
        log::debug!("Wrote {}", target_dir.join(filename).display());
    }
    Ok(())
}

pub fn read_difficulty(text: &str) -> Result<DifficultyFile, ConvertError> {
    serde_json::from_str(text).map_err(|e| ConvertError::Serialization(e.to_string()))
}

pub fn read_info(text: &str) -> Result<InfoFile, ConvertError> {
    serde_json::from_str(text).map_err(|e| ConvertError::Serialization(e.to_string()))
}
