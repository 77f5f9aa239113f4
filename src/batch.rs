//! Beatmap set discovery and the bounded conversion pool.

use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};

use regex::Regex;
use tokio::sync::Semaphore;

use crate::assets::AssetPipeline;
use crate::config::Config;
use crate::error::ConversionWarning;
use crate::parser::osu_parser::parse_osu_file;
use crate::parser::osu_types::{BeatmapSet, SetDefaults, SetMetadata};
use crate::saber::difficulty::{classify, TargetDifficulty};
use crate::saber::{convert_beatmap_set, COVER_FILENAME, SONG_FILENAME};
use crate::saber::serializer::write_level;
use crate::ConvertError;

const OSU_EXTENSION: &str = "osu";

/// Left in a level folder whose audio ffmpeg could not convert
pub const BROKEN_AUDIO_FLAG: &str = "broken_audio.flag";
/// Left in a level folder when no difficulty could be mapped
pub const NO_ELIGIBLE_FLAG: &str = "no_eligible_osu_files.flag";

/// `<set id> <artist> - <title>`, the folder naming of osu! downloads
static SET_FOLDER: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^(\d+) (.+?) - (.+)$").ok());

/// Metadata defaults encoded in a beatmap set folder name.
pub fn set_defaults_from_folder(name: &str) -> SetDefaults {
    let Some(captures) = SET_FOLDER
        .as_ref()
        .and_then(|pattern| pattern.captures(name.trim()))
    else {
        return SetDefaults::default();
    };
    SetDefaults {
        beatmap_set_id: captures[1].parse().ok(),
        artist: Some(captures[2].trim().to_string()),
        title: Some(captures[3].trim().to_string()),
    }
}

/// `osu <set id> (<title> - <artist>) [saberized]` without characters
/// forbidden in file names.
///
/// Sets without id use the name of their source folder in place of it.
pub fn output_folder_name(metadata: &SetMetadata, source_folder: &str) -> String {
    let name = match metadata.beatmap_set_id {
        Some(id) => format!(
            "osu {id} ({} - {}) [saberized]",
            metadata.title, metadata.artist
        ),
        None => format!(
            "osu {source_folder} ({} - {}) [saberized]",
            metadata.title, metadata.artist
        ),
    };
    name.chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect()
}

/// Beatmap set folders to convert.
///
/// Without `songs`, `source` is itself the set. Otherwise its immediate
/// subfolders are, sorted by name.
pub fn find_beatmap_sets(source: &Path, songs: bool) -> Result<Vec<PathBuf>, ConvertError> {
    if !source.is_dir() {
        return Err(ConvertError::Io(format!(
            "{} is not a directory",
            source.display()
        )));
    }
    if !songs {
        return Ok(vec![source.to_path_buf()]);
    }
    let mut folders = Vec::new();
    for entry in std::fs::read_dir(source)? {
        let path = entry?.path();
        if path.is_dir() {
            folders.push(path);
        }
    }
    folders.sort();
    Ok(folders)
}

fn osu_files(folder: &Path) -> Result<Vec<PathBuf>, ConvertError> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(folder)? {
        let path = entry?.path();
        let is_osu = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case(OSU_EXTENSION));
        if is_osu && path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

fn folder_name(folder: &Path) -> String {
    folder.file_name().map_or_else(
        || folder.display().to_string(),
        |name| name.to_string_lossy().into_owned(),
    )
}

fn task_error(error: tokio::task::JoinError) -> ConvertError {
    ConvertError::Task(error.to_string())
}

/// Failure recorded in `target_dir` by an earlier run
fn known_failure(target_dir: &Path) -> Option<String> {
    [
        (BROKEN_AUDIO_FLAG, "audio could not be converted"),
        (NO_ELIGIBLE_FLAG, "no difficulty could be mapped"),
    ]
    .into_iter()
    .find(|(flag, _)| target_dir.join(flag).is_file())
    .map(|(flag, reason)| format!("{reason} in an earlier run, remove {flag} to retry"))
}

async fn mark_failed(
    target_dir: &Path,
    flag: &str,
    error: &ConvertError,
) -> Result<(), ConvertError> {
    tokio::fs::create_dir_all(target_dir).await?;
    tokio::fs::write(target_dir.join(flag), error.to_string()).await?;
    Ok(())
}

/// Remove converted assets of a level that will not be written
async fn discard_assets(target_dir: &Path) {
    for file in [SONG_FILENAME, COVER_FILENAME] {
        let path = target_dir.join(file);
        if let Err(e) = tokio::fs::remove_file(&path).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                log::warn!("Could not remove {}: {e}", path.display());
            }
        }
    }
}

/// A beatmap set written as a level.
#[derive(Debug, Clone, PartialEq)]
pub struct ConvertedSet {
    pub target_dir: PathBuf,
    /// Target and the osu! difficulty it was made from, easiest first
    pub difficulties: Vec<(TargetDifficulty, String)>,
    pub warnings: Vec<ConversionWarning>,
    /// `.osu` files that could not be parsed and the reason
    pub skipped_files: Vec<(PathBuf, String)>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SetOutcome {
    Converted(ConvertedSet),
    /// Nothing to convert in the folder
    Skipped { reason: String },
}

/// Convert one beatmap set folder into a level folder under `destination`.
///
/// Unparsable `.osu` files are left out as long as one difficulty parses.
/// Audio that ffmpeg rejects and sets without any mappable difficulty leave
/// a flag file in the level folder, and later runs skip them. Any other
/// failure leaves the folder as is.
pub async fn convert_set_folder<A: AssetPipeline>(
    folder: &Path,
    destination: &Path,
    config: &Config,
    assets: &A,
) -> Result<SetOutcome, ConvertError> {
    let name = folder_name(folder);
    let files = osu_files(folder)?;
    if files.is_empty() {
        log::info!("Skipping {name}: no .osu file");
        return Ok(SetOutcome::Skipped {
            reason: "no .osu file".to_string(),
        });
    }

    let (beatmaps, skipped_files, first_error) = tokio::task::spawn_blocking(move || {
        let mut beatmaps = Vec::with_capacity(files.len());
        let mut skipped = Vec::new();
        let mut first_error = None;
        for file in files {
            match parse_osu_file(&file) {
                Ok(beatmap) => beatmaps.push(beatmap),
                Err(e) => {
                    log::warn!("Skipping {}: {e}", file.display());
                    skipped.push((file, e.to_string()));
                    first_error.get_or_insert(e);
                }
            }
        }
        (beatmaps, skipped, first_error)
    })
    .await
    .map_err(task_error)?;
    if beatmaps.is_empty() {
        return Err(first_error.unwrap_or(ConvertError::NoDifficultyMapped));
    }

    let set = Arc::new(BeatmapSet::from_beatmaps(
        beatmaps,
        &set_defaults_from_folder(&name),
    ));
    let target_dir = destination.join(output_folder_name(&set.metadata, &name));
    if let Some(reason) = known_failure(&target_dir) {
        log::info!("Skipping {name}: {reason}");
        return Ok(SetOutcome::Skipped { reason });
    }
    let buckets = config.difficulty_buckets()?;
    if classify(&set.beatmaps, &buckets).is_empty() {
        let error = ConvertError::NoDifficultyMapped;
        mark_failed(&target_dir, NO_ELIGIBLE_FLAG, &error).await?;
        return Err(error);
    }
    tokio::fs::create_dir_all(&target_dir).await?;
    log::info!("Converting {name} into {}", target_dir.display());

    let audio_source = folder.join(&set.metadata.audio_filename);
    let cover_source = set
        .metadata
        .cover_filename
        .as_ref()
        .map(|cover| folder.join(cover));
    let placement = config.placement.clone();
    let placing = {
        let set = Arc::clone(&set);
        tokio::task::spawn_blocking(move || convert_beatmap_set(&set, &placement, &buckets))
    };
    let (level, audio, cover) = tokio::join!(
        placing,
        assets.transcode_audio(&audio_source, &target_dir),
        assets.convert_cover(cover_source.as_deref(), &target_dir),
    );
    let level = match level.map_err(task_error)? {
        Ok(level) => level,
        Err(error @ ConvertError::NoDifficultyMapped) => {
            // only difficulties without playable notes
            discard_assets(&target_dir).await;
            mark_failed(&target_dir, NO_ELIGIBLE_FLAG, &error).await?;
            return Err(error);
        }
        Err(error) => return Err(error),
    };
    if let Err(error) = audio {
        if matches!(error, ConvertError::Asset(_)) {
            mark_failed(&target_dir, BROKEN_AUDIO_FLAG, &error).await?;
        }
        return Err(error);
    }
    cover?;

    let level = {
        let target_dir = target_dir.clone();
        tokio::task::spawn_blocking(move || write_level(&target_dir, &level).map(|()| level))
            .await
            .map_err(task_error)??
    };

    let warnings: Vec<ConversionWarning> = level.warnings().cloned().collect();
    for warning in &warnings {
        log::warn!("{name}: {warning}");
    }
    let difficulties = level
        .difficulties
        .into_iter()
        .map(|d| (d.target, d.source_name))
        .collect();
    Ok(SetOutcome::Converted(ConvertedSet {
        target_dir,
        difficulties,
        warnings,
        skipped_files,
    }))
}

/// Outcome of a batch, each list sorted by folder name.
#[derive(Debug, Default)]
pub struct BatchSummary {
    pub converted: Vec<(String, ConvertedSet)>,
    pub skipped: Vec<(String, String)>,
    pub failed: Vec<(String, ConvertError)>,
}

impl BatchSummary {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn report(&self) {
        for (name, set) in &self.converted {
            let labels: Vec<String> = set
                .difficulties
                .iter()
                .map(|(target, source)| format!("{target} <- [{source}]"))
                .collect();
            log::info!(
                "Converted {name}: {} ({} warnings)",
                labels.join(", "),
                set.warnings.len()
            );
        }
        for (name, reason) in &self.skipped {
            log::info!("Skipped {name}: {reason}");
        }
        for (name, error) in &self.failed {
            log::error!("Failed {name}: {error}");
        }
        log::info!(
            "{} converted, {} skipped, {} failed",
            self.converted.len(),
            self.skipped.len(),
            self.failed.len()
        );
    }
}

/// Convert every folder, at most `jobs` sets at a time.
///
/// A failing set never stops its siblings.
pub async fn run_batch<A: AssetPipeline>(
    folders: Vec<PathBuf>,
    destination: PathBuf,
    config: Arc<Config>,
    assets: Arc<A>,
    jobs: usize,
) -> BatchSummary {
    let semaphore = Arc::new(Semaphore::new(jobs.max(1)));
    let destination = Arc::new(destination);
    let mut tasks = Vec::with_capacity(folders.len());
    for folder in folders {
        let name = folder_name(&folder);
        let semaphore = Arc::clone(&semaphore);
        let destination = Arc::clone(&destination);
        let config = Arc::clone(&config);
        let assets = Arc::clone(&assets);
        let task = tokio::spawn(async move {
            // held until the set, its transcoder included, is done
            let _permit = semaphore
                .acquire_owned()
                .await
                .map_err(|e| ConvertError::Task(e.to_string()))?;
            convert_set_folder(&folder, &destination, &config, assets.as_ref()).await
        });
        tasks.push((name, task));
    }

    let mut summary = BatchSummary::default();
    for (name, task) in tasks {
        match task.await.unwrap_or_else(|e| Err(task_error(e))) {
            Ok(SetOutcome::Converted(set)) => summary.converted.push((name, set)),
            Ok(SetOutcome::Skipped { reason }) => summary.skipped.push((name, reason)),
            Err(e) => {
                log::error!("Could not convert {name}: {e}");
                summary.failed.push((name, e));
            }
        }
    }
    summary.converted.sort_by(|a, b| a.0.cmp(&b.0));
    summary.skipped.sort_by(|a, b| a.0.cmp(&b.0));
    summary.failed.sort_by(|a, b| a.0.cmp(&b.0));
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Writes marker files and tracks how many sets run at once.
    #[derive(Default)]
    struct CountingAssets {
        running: AtomicUsize,
        peak: AtomicUsize,
        transcodes: AtomicUsize,
        reject_audio: bool,
    }

    impl AssetPipeline for CountingAssets {
        async fn transcode_audio(
            &self,
            _source: &Path,
            target_dir: &Path,
        ) -> Result<PathBuf, ConvertError> {
            self.transcodes.fetch_add(1, Ordering::SeqCst);
            if self.reject_audio {
                return Err(ConvertError::Asset("Invalid data found".to_string()));
            }
            let running = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(running, Ordering::SeqCst);
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            self.running.fetch_sub(1, Ordering::SeqCst);
            let target = target_dir.join(SONG_FILENAME);
            tokio::fs::write(&target, b"audio").await?;
            Ok(target)
        }

        async fn convert_cover(
            &self,
            _source: Option<&Path>,
            target_dir: &Path,
        ) -> Result<PathBuf, ConvertError> {
            let target = target_dir.join(COVER_FILENAME);
            tokio::fs::write(&target, b"cover").await?;
            Ok(target)
        }
    }

    const TAPS: &str = "osu file format v14\n\n[General]\nAudioFilename: audio.mp3\n\n\
        [Metadata]\nTitle:Song\nArtist:Band\nCreator:Mapper\nVersion:Normal\n\n\
        [Difficulty]\nOverallDifficulty:3\n\n\
        [TimingPoints]\n0,500,4,2,0,100,1,0\n\n\
        [HitObjects]\n64,64,1000,1,0\n448,320,1500,1,0\n";

    fn file_names(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(dir)
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    fn single_set(name: &str, osu: &str) -> tempfile::TempDir {
        let root = tempfile::tempdir().unwrap();
        let folder = root.path().join(name);
        std::fs::create_dir(&folder).unwrap();
        std::fs::write(folder.join("map.osu"), osu).unwrap();
        root
    }

    fn songs_root(sets: usize) -> tempfile::TempDir {
        let root = tempfile::tempdir().unwrap();
        for i in 0..sets {
            let folder = root.path().join(format!("{} Band - Song {i}", 100 + i));
            std::fs::create_dir(&folder).unwrap();
            std::fs::write(folder.join("normal.osu"), TAPS).unwrap();
        }
        root
    }

    #[test]
    fn test_set_defaults_from_folder() {
        let defaults = set_defaults_from_folder("1001 Test Artist - Test Song");
        assert_eq!(defaults.beatmap_set_id, Some(1001));
        assert_eq!(defaults.artist.as_deref(), Some("Test Artist"));
        assert_eq!(defaults.title.as_deref(), Some("Test Song"));

        // the first separator splits artist from title
        let defaults = set_defaults_from_folder("7 A - B - C");
        assert_eq!(defaults.artist.as_deref(), Some("A"));
        assert_eq!(defaults.title.as_deref(), Some("B - C"));

        assert_eq!(set_defaults_from_folder("my songs"), SetDefaults::default());
        assert_eq!(set_defaults_from_folder("Artist - Title"), SetDefaults::default());
    }

    #[test]
    fn test_output_folder_name() {
        let mut metadata = SetMetadata {
            title: "What? Yes: No".to_string(),
            artist: "AC/DC".to_string(),
            beatmap_set_id: Some(42),
            ..SetMetadata::default()
        };
        assert_eq!(
            output_folder_name(&metadata, "42 AC_DC - What"),
            "osu 42 (What_ Yes_ No - AC_DC) [saberized]"
        );
        // sets without id stay apart through their source folder
        metadata.beatmap_set_id = None;
        assert_eq!(
            output_folder_name(&metadata, "What (TV Size)"),
            "osu What (TV Size) (What_ Yes_ No - AC_DC) [saberized]"
        );
        assert_ne!(
            output_folder_name(&metadata, "first"),
            output_folder_name(&metadata, "second")
        );
    }

    #[test]
    fn test_find_beatmap_sets() {
        let root = songs_root(3);
        std::fs::write(root.path().join("loose.osu"), TAPS).unwrap();
        let sets = find_beatmap_sets(root.path(), true).unwrap();
        assert_eq!(sets.len(), 3);
        assert!(sets[0].ends_with("100 Band - Song 0"));
        assert!(sets[2].ends_with("102 Band - Song 2"));

        let single = find_beatmap_sets(&sets[1], false).unwrap();
        assert_eq!(single, vec![sets[1].clone()]);

        assert!(find_beatmap_sets(&root.path().join("loose.osu"), false).is_err());
    }

    #[tokio::test]
    async fn test_convert_set_folder() {
        let root = songs_root(1);
        let output = tempfile::tempdir().unwrap();
        let folder = root.path().join("100 Band - Song 0");
        // unparsable difficulty next to a good one
        std::fs::write(folder.join("broken.osu"), "osu file format v2\n").unwrap();

        let outcome = convert_set_folder(
            &folder,
            output.path(),
            &Config::default(),
            &CountingAssets::default(),
        )
        .await
        .unwrap();
        let SetOutcome::Converted(set) = outcome else {
            panic!("not converted: {outcome:?}");
        };
        assert_eq!(
            set.target_dir,
            output.path().join("osu 100 (Song - Band) [saberized]")
        );
        assert_eq!(
            set.difficulties,
            vec![(TargetDifficulty::Normal, "Normal".to_string())]
        );
        assert_eq!(set.skipped_files.len(), 1);
        assert!(set.skipped_files[0].0.ends_with("broken.osu"));
        for file in ["Info.dat", "NormalStandard.dat", "song.egg", "cover.jpg"] {
            assert!(set.target_dir.join(file).is_file(), "{file}");
        }
    }

    #[tokio::test]
    async fn test_taiko_only_set_converts_no_asset() {
        let taiko = TAPS.replace("[General]\n", "[General]\nMode: 1\n");
        let root = single_set("5 Band - Song", &taiko);
        let folder = root.path().join("5 Band - Song");
        let output = tempfile::tempdir().unwrap();
        let assets = CountingAssets::default();
        let config = Config::default();

        let result = convert_set_folder(&folder, output.path(), &config, &assets).await;
        assert!(matches!(result, Err(ConvertError::NoDifficultyMapped)));
        assert_eq!(assets.transcodes.load(Ordering::SeqCst), 0);
        let target_dir = output.path().join("osu 5 (Song - Band) [saberized]");
        assert_eq!(file_names(&target_dir), vec![NO_ELIGIBLE_FLAG]);

        let rerun = convert_set_folder(&folder, output.path(), &config, &assets)
            .await
            .unwrap();
        assert!(matches!(rerun, SetOutcome::Skipped { .. }));
    }

    #[tokio::test]
    async fn test_spinner_only_set_discards_assets() {
        let spinners = TAPS.replace(
            "64,64,1000,1,0\n448,320,1500,1,0\n",
            "256,192,1000,8,0,3000\n",
        );
        let root = single_set("6 Band - Song", &spinners);
        let folder = root.path().join("6 Band - Song");
        let output = tempfile::tempdir().unwrap();

        let result = convert_set_folder(
            &folder,
            output.path(),
            &Config::default(),
            &CountingAssets::default(),
        )
        .await;
        assert!(matches!(result, Err(ConvertError::NoDifficultyMapped)));
        let target_dir = output.path().join("osu 6 (Song - Band) [saberized]");
        assert_eq!(file_names(&target_dir), vec![NO_ELIGIBLE_FLAG]);
    }

    #[tokio::test]
    async fn test_broken_audio_is_not_retried() {
        let root = single_set("7 Band - Song", TAPS);
        let folder = root.path().join("7 Band - Song");
        let output = tempfile::tempdir().unwrap();
        let assets = CountingAssets {
            reject_audio: true,
            ..CountingAssets::default()
        };
        let config = Config::default();

        let result = convert_set_folder(&folder, output.path(), &config, &assets).await;
        assert!(matches!(result, Err(ConvertError::Asset(_))));
        let target_dir = output.path().join("osu 7 (Song - Band) [saberized]");
        assert!(target_dir.join(BROKEN_AUDIO_FLAG).is_file());

        let rerun = convert_set_folder(&folder, output.path(), &config, &assets)
            .await
            .unwrap();
        match rerun {
            SetOutcome::Skipped { reason } => assert!(reason.contains(BROKEN_AUDIO_FLAG)),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(assets.transcodes.load(Ordering::SeqCst), 1);

        // removing the flag retries the set
        std::fs::remove_file(target_dir.join(BROKEN_AUDIO_FLAG)).unwrap();
        let assets = CountingAssets::default();
        let retried = convert_set_folder(&folder, output.path(), &config, &assets)
            .await
            .unwrap();
        assert!(matches!(retried, SetOutcome::Converted(_)));
    }

    #[tokio::test]
    async fn test_folder_without_beatmap_is_skipped() {
        let root = tempfile::tempdir().unwrap();
        std::fs::write(root.path().join("readme.txt"), "hello").unwrap();
        let outcome = convert_set_folder(
            root.path(),
            root.path(),
            &Config::default(),
            &CountingAssets::default(),
        )
        .await
        .unwrap();
        assert!(matches!(outcome, SetOutcome::Skipped { .. }));
    }

    #[tokio::test]
    async fn test_only_broken_files_fail_with_first_error() {
        let root = tempfile::tempdir().unwrap();
        std::fs::write(root.path().join("a.osu"), "osu file format v2\n").unwrap();
        std::fs::write(root.path().join("b.osu"), "garbage").unwrap();
        let result = convert_set_folder(
            root.path(),
            root.path(),
            &Config::default(),
            &CountingAssets::default(),
        )
        .await;
        assert!(matches!(result, Err(ConvertError::UnsupportedVersion(_))));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_run_batch_respects_jobs() {
        let root = songs_root(6);
        let output = tempfile::tempdir().unwrap();
        let assets = Arc::new(CountingAssets::default());
        let folders = find_beatmap_sets(root.path(), true).unwrap();
        let summary = run_batch(
            folders,
            output.path().to_path_buf(),
            Arc::new(Config::default()),
            Arc::clone(&assets),
            2,
        )
        .await;
        assert!(summary.is_success());
        assert_eq!(summary.converted.len(), 6);
        assert_eq!(summary.converted[0].0, "100 Band - Song 0");
        assert!(assets.peak.load(Ordering::SeqCst) <= 2);
    }
}
