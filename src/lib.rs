//! osu2saber - osu! beatmap to Beat Saber level converter
//!
//! This library provides:
//! - Parsing of osu! (.osu) beatmaps, format versions 3 to 14
//! - Placement of hit objects on the Beat Saber 4x3 grid with cut directions
//! - Beat Saber v2 `Info.dat` and difficulty files
//! - Audio and cover conversion, and a bounded batch runner
//!
//! # Example
//!
//! ```no_run
//! use osu2saber::{
//!     convert_beatmap_set, parse_osu_file, write_level, BeatmapSet, DifficultyBuckets,
//!     PlacementConfig, SetDefaults,
//! };
//! use std::path::Path;
//!
//! let beatmap = parse_osu_file(Path::new("song [Hard].osu")).unwrap();
//! let set = BeatmapSet::from_beatmaps(vec![beatmap], &SetDefaults::default());
//! let level = convert_beatmap_set(
//!     &set,
//!     &PlacementConfig::default(),
//!     &DifficultyBuckets::default(),
//! )
//! .unwrap();
//! write_level(Path::new("level"), &level).unwrap();
//! ```

pub mod assets;
pub mod batch;
pub mod config;
pub mod error;
pub mod parser;
pub mod saber;

// Re-export main types for convenience
pub use assets::{AssetPipeline, FfmpegAssets};
pub use batch::{
    convert_set_folder, find_beatmap_sets, run_batch, BatchSummary, ConvertedSet, SetOutcome,
};
pub use config::Config;
pub use error::{ConversionWarning, ConvertError};
pub use parser::osu_parser::{parse_osu_data, parse_osu_file};
pub use parser::osu_types::{Beatmap, BeatmapSet, HitObject, HitObjectKind, SetDefaults};
pub use saber::{
    beat_clock::BeatClock,
    convert_beatmap_set,
    difficulty::{classify, DifficultyBuckets, TargetDifficulty},
    grid_note::{CutDirection, GridNote},
    placement::{NotePlacer, Placement, PlacementConfig},
    serializer::{read_difficulty, read_info, render_difficulty, render_info, write_level},
    SaberDifficulty, SaberLevel,
};
