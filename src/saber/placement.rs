use crate::error::ConversionWarning;
use crate::parser::osu_types::{
    HitObject, HitObjectKind, Position, Slider, PLAYFIELD_HEIGHT, PLAYFIELD_WIDTH,
};
use crate::saber::beat_clock::BeatClock;
use crate::saber::grid_note::{CutDirection, GridNote, GRID_COLUMNS, GRID_ROWS};
use crate::saber::slider_path::SliderPath;
use crate::ConvertError;
use serde::{Deserialize, Serialize};

/// Note beats are rounded to 1/1000 beat
pub const BEAT_RESOLUTION: f64 = 1000.0;

// objects further out than this are not playable
const PLAYFIELD_MARGIN: f64 = PLAYFIELD_WIDTH;

/// Longest slider resampled, in notes
const MAX_SLIDER_SAMPLES: f64 = 4096.0;

/// Tuning of the note placement, in beats.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlacementConfig {
    /// Distance between two notes sampled along a slider
    pub resample_interval_beats: f64,
    /// Notes closer than this to the first note of a chord join the chord
    pub chord_epsilon_beats: f64,
    /// Slider body notes closer than this to a neighbour are dropped
    pub min_spacing_beats: f64,
    /// Past this gap a note starts a new phrase and can be cut any way
    pub phrase_gap_beats: f64,
}

impl Default for PlacementConfig {
    fn default() -> Self {
        PlacementConfig {
            resample_interval_beats: 0.25,
            chord_epsilon_beats: 0.02,
            min_spacing_beats: 0.125,
            phrase_gap_beats: 2.0,
        }
    }
}

impl PlacementConfig {
    pub fn validate(&self) -> Result<(), ConvertError> {
        let positive = |name: &str, value: f64| {
            if value.is_finite() && value > 0.0 {
                Ok(())
            } else {
                Err(ConvertError::Config(format!(
                    "placement.{name} must be a positive number, got {value}"
                )))
            }
        };
        positive("resample_interval_beats", self.resample_interval_beats)?;
        positive("min_spacing_beats", self.min_spacing_beats)?;
        positive("phrase_gap_beats", self.phrase_gap_beats)?;
        let precision = 1.0 / BEAT_RESOLUTION;
        if !(self.chord_epsilon_beats.is_finite() && self.chord_epsilon_beats >= precision) {
            return Err(ConvertError::Config(format!(
                "placement.chord_epsilon_beats must be at least {precision}, got {}",
                self.chord_epsilon_beats
            )));
        }
        if self.chord_epsilon_beats >= self.resample_interval_beats {
            return Err(ConvertError::Config(format!(
                "placement.chord_epsilon_beats ({}) must be below placement.resample_interval_beats ({})",
                self.chord_epsilon_beats, self.resample_interval_beats
            )));
        }
        Ok(())
    }
}

/// Grid cell of a playfield position, `(column, row)` with row 0 at the bottom.
pub fn grid_cell(position: Position) -> (u8, u8) {
    let column = (position.x / 128.0).floor().clamp(0.0, f64::from(GRID_COLUMNS - 1)) as u8;
    let band = (position.y / 128.0).floor().clamp(0.0, f64::from(GRID_ROWS - 1)) as u8;
    // the playfield y axis points down
    (column, GRID_ROWS - 1 - band)
}

pub fn round_beat(beat: f64) -> f64 {
    (beat * BEAT_RESOLUTION).round() / BEAT_RESOLUTION
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum Role {
    Tap,
    SliderHead,
    SliderBody,
    SliderTail,
}

impl Role {
    /// Only slider bodies may be thinned out
    const fn is_protected(self) -> bool {
        !matches!(self, Role::SliderBody)
    }
}

#[derive(Debug, Copy, Clone, PartialEq)]
struct Candidate {
    beat: f64,
    column: u8,
    row: u8,
    role: Role,
}

impl Candidate {
    const fn cell(&self) -> (u8, u8) {
        (self.column, self.row)
    }
}

/// Notes of one difficulty and what was lost on the way.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Placement {
    /// Sorted by beat, column then row
    pub notes: Vec<GridNote>,
    pub warnings: Vec<ConversionWarning>,
}

/// Turns hit objects into grid notes.
pub struct NotePlacer<'a> {
    config: &'a PlacementConfig,
    clock: &'a BeatClock,
    candidates: Vec<Candidate>,
    warnings: Vec<ConversionWarning>,
}

impl<'a> NotePlacer<'a> {
    pub fn new(config: &'a PlacementConfig, clock: &'a BeatClock) -> Self {
        Self {
            config,
            clock,
            candidates: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub fn place(mut self, hit_objects: &[HitObject]) -> Placement {
        for (index, hit_object) in hit_objects.iter().enumerate() {
            if let Err(reason) = self.add_hit_object(hit_object) {
                log::warn!(
                    "Skipping hit object #{index} at {}ms: {reason}",
                    hit_object.time
                );
                self.warnings.push(ConversionWarning::SkippedObject {
                    index,
                    time: hit_object.time,
                    reason,
                });
            }
        }
        log::debug!(
            "{} note candidates from {} hit objects",
            self.candidates.len(),
            hit_objects.len()
        );

        // stable sort, simultaneous candidates keep their input order
        let mut candidates = std::mem::take(&mut self.candidates);
        candidates.sort_by(|a, b| a.beat.total_cmp(&b.beat));
        let chords = self.collapse_chords(candidates);
        let mut kept = self.thin_slider_bodies(chords);
        kept.sort_by(|a, b| {
            a.beat
                .total_cmp(&b.beat)
                .then(a.column.cmp(&b.column))
                .then(a.row.cmp(&b.row))
        });
        let notes = self.assign_directions(&kept);
        Placement {
            notes,
            warnings: self.warnings,
        }
    }

    fn add_hit_object(&mut self, hit_object: &HitObject) -> Result<(), String> {
        let time = hit_object.time;
        let position = hit_object.position;
        if !time.is_finite() {
            return Err(format!("invalid time {time}"));
        }
        if !position.is_finite() || !on_playfield(position) {
            return Err(format!("position ({}, {}) off the playfield", position.x, position.y));
        }
        match &hit_object.kind {
            HitObjectKind::Tap => {
                self.push(self.clock.beat_at(time), position, Role::Tap);
                Ok(())
            }
            HitObjectKind::Slider(slider) => self.add_slider(time, slider),
            HitObjectKind::Spinner { end_time } => {
                if !(end_time.is_finite() && *end_time >= time) {
                    return Err(format!("spinner ends at {end_time}ms"));
                }
                log::debug!("No note for spinner at {time}ms");
                Ok(())
            }
        }
    }

    /// Resample a slider at a fixed beat interval, head and tail included.
    fn add_slider(&mut self, time: f64, slider: &Slider) -> Result<(), String> {
        let end_time = slider.end_time;
        if !(end_time.is_finite() && end_time >= time) {
            return Err(format!("slider ends at {end_time}ms"));
        }
        let path = SliderPath::new(slider).ok_or_else(|| "unusable slider path".to_string())?;
        if !slider.path.iter().all(|p| on_playfield(*p)) {
            return Err("slider path off the playfield".to_string());
        }

        let start_beat = self.clock.beat_at(time);
        let span = self.clock.beat_at(end_time) - start_beat;
        let interval = self.config.resample_interval_beats;
        let samples = span / interval;
        if !samples.is_finite() || samples > MAX_SLIDER_SAMPLES {
            return Err(format!("slider spans {span} beats"));
        }
        // half-open, a sample landing exactly on the end is not repeated
        let count = ((samples - 1e-9).ceil() as usize).max(1);
        for k in 0..count {
            let beat = start_beat + k as f64 * interval;
            let progress = if end_time > time {
                (self.clock.time_at(beat) - time) / (end_time - time)
            } else {
                0.0
            };
            let role = match k {
                0 => Role::SliderHead,
                k if k + 1 == count => Role::SliderTail,
                _ => Role::SliderBody,
            };
            self.push(beat, path.position_at(progress), role);
        }
        Ok(())
    }

    fn push(&mut self, beat: f64, position: Position, role: Role) {
        let (column, row) = grid_cell(position);
        self.candidates.push(Candidate {
            beat: round_beat(beat),
            column,
            row,
            role,
        });
    }

    /// Snap near-simultaneous candidates onto one beat and give each its own cell.
    fn collapse_chords(&mut self, candidates: Vec<Candidate>) -> Vec<Candidate> {
        let mut placed: Vec<Candidate> = Vec::with_capacity(candidates.len());
        let mut chord_start = 0;
        for mut candidate in candidates {
            match placed.get(chord_start) {
                Some(first) if candidate.beat - first.beat <= self.config.chord_epsilon_beats => {
                    candidate.beat = first.beat;
                }
                _ => chord_start = placed.len(),
            }
            let occupied: Vec<(u8, u8)> = placed[chord_start..].iter().map(Candidate::cell).collect();
            if occupied.contains(&candidate.cell()) {
                match free_cell_near(candidate.cell(), &occupied) {
                    Some((column, row)) => {
                        log::debug!(
                            "Moving note at beat {} from {:?} to {:?}",
                            candidate.beat,
                            candidate.cell(),
                            (column, row)
                        );
                        candidate.column = column;
                        candidate.row = row;
                    }
                    None => {
                        log::warn!(
                            "Dropping note at beat {}, no free cell left",
                            candidate.beat
                        );
                        self.warnings.push(ConversionWarning::NoteOverload {
                            beat: candidate.beat,
                            column: candidate.column,
                            row: candidate.row,
                        });
                        continue;
                    }
                }
            }
            placed.push(candidate);
        }
        placed
    }

    /// Drop slider body notes crowding a neighbour on another beat.
    fn thin_slider_bodies(&self, chords: Vec<Candidate>) -> Vec<Candidate> {
        let min_spacing_beats = self.config.min_spacing_beats;

        // nearest protected beat strictly after each candidate
        let mut next_protected = vec![f64::INFINITY; chords.len()];
        let mut upcoming = f64::INFINITY;
        let mut end = chords.len();
        while end > 0 {
            let beat = chords[end - 1].beat;
            let start = chords[..end].iter().rposition(|c| c.beat != beat).map_or(0, |i| i + 1);
            next_protected[start..end].fill(upcoming);
            if let Some(protected) = chords[start..end].iter().find(|c| c.role.is_protected()) {
                upcoming = protected.beat;
            }
            end = start;
        }

        let mut kept: Vec<Candidate> = Vec::with_capacity(chords.len());
        let mut dropped = 0;
        for (candidate, next_protected) in chords.into_iter().zip(next_protected) {
            if !candidate.role.is_protected() {
                let previous = kept.iter().rev().find(|k| k.beat != candidate.beat);
                let crowded_before =
                    previous.is_some_and(|p| candidate.beat - p.beat < min_spacing_beats);
                let crowded_after = next_protected - candidate.beat < min_spacing_beats;
                if crowded_before || crowded_after {
                    dropped += 1;
                    continue;
                }
            }
            kept.push(candidate);
        }
        if dropped > 0 {
            log::debug!("Thinned out {dropped} slider body notes");
        }
        kept
    }

    /// Cut along the movement from the previous note.
    fn assign_directions(&self, kept: &[Candidate]) -> Vec<GridNote> {
        let mut notes: Vec<GridNote> = Vec::with_capacity(kept.len());
        // last note of each saber
        let mut last_by_saber: [Option<GridNote>; 2] = [None, None];
        for candidate in kept {
            let direction = match notes.last() {
                Some(previous)
                    if candidate.beat - previous.beat <= self.config.phrase_gap_beats
                        && previous.cell() != candidate.cell() =>
                {
                    CutDirection::from_displacement(
                        i32::from(candidate.column) - i32::from(previous.column),
                        i32::from(candidate.row) - i32::from(previous.row),
                    )
                }
                _ => CutDirection::Any,
            };
            let mut note = GridNote::new(candidate.beat, candidate.column, candidate.row, direction);
            let saber = note.saber().id() as usize;
            if let Some(last) = last_by_saber[saber] {
                // same swing on the same spot straight away is not playable
                if note.beat - last.beat < self.config.min_spacing_beats
                    && last.cell() == note.cell()
                    && last.direction == note.direction
                {
                    note.direction = CutDirection::Any;
                }
            }
            last_by_saber[saber] = Some(note);
            notes.push(note);
        }
        notes
    }
}

fn on_playfield(position: Position) -> bool {
    (-PLAYFIELD_MARGIN..=PLAYFIELD_WIDTH + PLAYFIELD_MARGIN).contains(&position.x)
        && (-PLAYFIELD_MARGIN..=PLAYFIELD_HEIGHT + PLAYFIELD_MARGIN).contains(&position.y)
}

/// Closest free cell on the same row, then on the same column, left and down first
fn free_cell_near((column, row): (u8, u8), occupied: &[(u8, u8)]) -> Option<(u8, u8)> {
    let free = |cell: &(u8, u8)| !occupied.contains(cell);
    let along_row = (1..GRID_COLUMNS).flat_map(|d| {
        [column.checked_sub(d), column.checked_add(d)]
            .into_iter()
            .flatten()
            .filter(|c| *c < GRID_COLUMNS)
            .map(|c| (c, row))
    });
    let along_column = (1..GRID_ROWS).flat_map(|d| {
        [row.checked_sub(d), row.checked_add(d)]
            .into_iter()
            .flatten()
            .filter(|r| *r < GRID_ROWS)
            .map(|r| (column, r))
    });
    along_row.chain(along_column).find(free)
}
