use crate::parser::osu_types::{Beatmap, GameMode};
use crate::ConvertError;
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

/// Highest rating an osu! difficulty setting can take
pub const MAX_RATING: f64 = 10.0;
pub const DEFAULT_DIFFICULTY_BOUNDS: [f64; 4] = [2.0, 4.0, 6.0, 8.0];

/// The five Beat Saber difficulty slots, easiest first.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TargetDifficulty {
    Easy,
    Normal,
    Hard,
    Expert,
    ExpertPlus,
}

impl TargetDifficulty {
    pub const ALL: [TargetDifficulty; 5] = [
        Self::Easy,
        Self::Normal,
        Self::Hard,
        Self::Expert,
        Self::ExpertPlus,
    ];

    pub const fn name(self) -> &'static str {
        match self {
            Self::Easy => "Easy",
            Self::Normal => "Normal",
            Self::Hard => "Hard",
            Self::Expert => "Expert",
            Self::ExpertPlus => "ExpertPlus",
        }
    }

    /// `_difficultyRank`
    pub const fn rank(self) -> u8 {
        match self {
            Self::Easy => 1,
            Self::Normal => 3,
            Self::Hard => 5,
            Self::Expert => 7,
            Self::ExpertPlus => 9,
        }
    }

    /// `_noteJumpMovementSpeed`
    pub const fn note_jump_speed(self) -> f64 {
        match self {
            Self::Easy | Self::Normal => 10.0,
            Self::Hard => 12.0,
            Self::Expert => 16.0,
            Self::ExpertPlus => 18.0,
        }
    }

    pub fn beatmap_filename(self) -> String {
        format!("{}Standard.dat", self.name())
    }
}

impl Display for TargetDifficulty {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Rating thresholds between consecutive difficulties.
#[derive(Debug, Clone, PartialEq)]
pub struct DifficultyBuckets {
    bounds: [f64; 4],
}

impl Default for DifficultyBuckets {
    fn default() -> Self {
        DifficultyBuckets {
            bounds: DEFAULT_DIFFICULTY_BOUNDS,
        }
    }
}

impl DifficultyBuckets {
    pub fn new(bounds: [f64; 4]) -> Result<Self, ConvertError> {
        let in_range = bounds.iter().all(|b| (0.0..=MAX_RATING).contains(b));
        let ascending = bounds.windows(2).all(|w| w[0] < w[1]);
        if !in_range || !ascending {
            return Err(ConvertError::Config(format!(
                "difficulty bounds {bounds:?} must be strictly ascending within 0..={MAX_RATING}"
            )));
        }
        Ok(DifficultyBuckets { bounds })
    }

    /// A rating equal to a bound belongs to the harder side.
    pub fn target_for(&self, rating: f64) -> TargetDifficulty {
        let index = self.bounds.partition_point(|bound| *bound <= rating);
        TargetDifficulty::ALL[index]
    }

    /// Center of the rating range of `target`
    pub fn midpoint(&self, target: TargetDifficulty) -> f64 {
        let index = TargetDifficulty::ALL
            .iter()
            .position(|d| *d == target)
            .unwrap_or_default();
        let lower = if index == 0 { 0.0 } else { self.bounds[index - 1] };
        let upper = self.bounds.get(index).copied().unwrap_or(MAX_RATING);
        (lower + upper) / 2.0
    }
}

/// Rating used to order osu! difficulties
pub fn rating(beatmap: &Beatmap) -> f64 {
    beatmap.difficulty.overall_difficulty
}

/// Beatmap picked for a Beat Saber difficulty slot.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Classified {
    pub target: TargetDifficulty,
    /// Index in the classified slice
    pub index: usize,
    pub rating: f64,
}

/// Assign at most one beatmap per slot, easiest slot first.
///
/// When several beatmaps land in the same slot the one rated closest to the
/// slot midpoint wins; ties keep the first in input order. Taiko beatmaps
/// have no usable positions and are left out.
pub fn classify(beatmaps: &[Beatmap], buckets: &DifficultyBuckets) -> Vec<Classified> {
    let mut slots: BTreeMap<TargetDifficulty, Classified> = BTreeMap::new();
    for (index, beatmap) in beatmaps.iter().enumerate() {
        let name = &beatmap.metadata.version;
        if beatmap.general.mode == GameMode::Taiko {
            log::info!("Skipping taiko difficulty [{name}]");
            continue;
        }
        let rating = rating(beatmap);
        if !rating.is_finite() {
            log::warn!("Skipping difficulty [{name}] with rating {rating}");
            continue;
        }
        let rating = rating.clamp(0.0, MAX_RATING);
        let target = buckets.target_for(rating);
        let candidate = Classified {
            target,
            index,
            rating,
        };
        let midpoint = buckets.midpoint(target);
        match slots.get(&target) {
            Some(current) if (current.rating - midpoint).abs() <= (rating - midpoint).abs() => {
                log::info!(
                    "Dropping difficulty [{name}], {target} already taken by [{}]",
                    beatmaps[current.index].metadata.version
                );
            }
            Some(current) => {
                log::info!(
                    "Difficulty [{name}] replaces [{}] as {target}",
                    beatmaps[current.index].metadata.version
                );
                slots.insert(target, candidate);
            }
            None => {
                log::debug!("Difficulty [{name}] rated {rating} maps to {target}");
                slots.insert(target, candidate);
            }
        }
    }
    slots.into_values().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn beatmap(name: &str, overall_difficulty: f64) -> Beatmap {
        let mut beatmap = Beatmap::default();
        beatmap.metadata.version = name.to_string();
        beatmap.difficulty.overall_difficulty = overall_difficulty;
        beatmap
    }

    #[test]
    fn test_target_for_bounds() {
        let buckets = DifficultyBuckets::default();
        assert_eq!(buckets.target_for(0.0), TargetDifficulty::Easy);
        assert_eq!(buckets.target_for(1.9), TargetDifficulty::Easy);
        assert_eq!(buckets.target_for(2.0), TargetDifficulty::Normal);
        assert_eq!(buckets.target_for(5.5), TargetDifficulty::Hard);
        assert_eq!(buckets.target_for(7.0), TargetDifficulty::Expert);
        assert_eq!(buckets.target_for(10.0), TargetDifficulty::ExpertPlus);
    }

    #[test]
    fn test_midpoints() {
        let buckets = DifficultyBuckets::default();
        let midpoints: Vec<f64> = TargetDifficulty::ALL
            .iter()
            .map(|d| buckets.midpoint(*d))
            .collect();
        assert_eq!(midpoints, vec![1.0, 3.0, 5.0, 7.0, 9.0]);
    }

    #[test]
    fn test_invalid_bounds() {
        assert!(DifficultyBuckets::new([2.0, 2.0, 6.0, 8.0]).is_err());
        assert!(DifficultyBuckets::new([4.0, 2.0, 6.0, 8.0]).is_err());
        assert!(DifficultyBuckets::new([2.0, 4.0, 6.0, 11.0]).is_err());
        assert!(DifficultyBuckets::new([1.0, 3.0, 5.0, 9.5]).is_ok());
    }

    #[test]
    fn test_labels() {
        assert_eq!(TargetDifficulty::ExpertPlus.rank(), 9);
        assert_eq!(TargetDifficulty::Hard.note_jump_speed(), 12.0);
        assert_eq!(
            TargetDifficulty::Expert.beatmap_filename(),
            "ExpertStandard.dat"
        );
    }

    #[test]
    fn test_classify_one_per_slot() {
        let beatmaps = vec![
            beatmap("Insane", 7.5),
            beatmap("Easy", 1.0),
            beatmap("Hard", 5.0),
            beatmap("Another", 6.8),
        ];
        let classified = classify(&beatmaps, &DifficultyBuckets::default());
        let picked: Vec<(TargetDifficulty, usize)> =
            classified.iter().map(|c| (c.target, c.index)).collect();
        // 6.8 is closer to the Expert midpoint than 7.5
        assert_eq!(
            picked,
            vec![
                (TargetDifficulty::Easy, 1),
                (TargetDifficulty::Hard, 2),
                (TargetDifficulty::Expert, 3),
            ]
        );
    }

    #[test]
    fn test_classify_tie_keeps_first() {
        let beatmaps = vec![beatmap("A", 6.5), beatmap("B", 7.5)];
        let classified = classify(&beatmaps, &DifficultyBuckets::default());
        assert_eq!(classified.len(), 1);
        assert_eq!(classified[0].index, 0);
    }

    #[test]
    fn test_classify_skips_taiko_and_clamps() {
        let mut taiko = beatmap("Taiko", 5.0);
        taiko.general.mode = GameMode::Taiko;
        let beatmaps = vec![taiko, beatmap("Over", 12.0), beatmap("Broken", f64::NAN)];
        let classified = classify(&beatmaps, &DifficultyBuckets::default());
        assert_eq!(classified.len(), 1);
        assert_eq!(classified[0].target, TargetDifficulty::ExpertPlus);
        assert_eq!(classified[0].rating, 10.0);
        assert!(classify(&[], &DifficultyBuckets::default()).is_empty());
    }
}
