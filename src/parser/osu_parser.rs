use crate::parser::osu_types::{
    slider_timing_at, Beatmap, CurveType, Difficulty, FormatVersion, GameMode, General, HitObject,
    HitObjectKind, Metadata, Position, Slider, TimingPoint, DEFAULT_METER, EFFECT_KIAI,
    TYPE_CIRCLE, TYPE_MANIA_HOLD, TYPE_NEW_COMBO, TYPE_SLIDER, TYPE_SPINNER,
};
use crate::parser::primitive_parser::{
    comma, decode_text, next_column, parse_curve, parse_decimal, parse_format_header, parse_int,
    parse_key_value, parse_optional_int, parse_section_header, unquote,
};
use crate::ConvertError;
use nom::combinator::map;
use nom::sequence::preceded;
use nom::{IResult, Parser};
use std::path::Path;
use std::str::FromStr;

// Format docs at <https://osu.ppy.sh/wiki/en/Client/File_formats/osu_%28file_format%29>

const HEADER: &str = "header";
const GENERAL: &str = "General";
const METADATA: &str = "Metadata";
const DIFFICULTY: &str = "Difficulty";
const EVENTS: &str = "Events";
const TIMING_POINTS: &str = "TimingPoints";
const HIT_OBJECTS: &str = "HitObjects";

/// Lines of each `[Section]`, with their 1-based line number.
struct Sections<'a> {
    entries: Vec<(&'a str, Vec<(usize, &'a str)>)>,
}

impl<'a> Sections<'a> {
    fn split(lines: impl Iterator<Item = (usize, &'a str)>) -> Self {
        let mut entries: Vec<(&'a str, Vec<(usize, &'a str)>)> = Vec::new();
        let mut current: Option<usize> = None;
        for (line_no, line) in lines {
            let line = line.trim();
            if line.is_empty() || line.starts_with("//") {
                continue;
            }
            if let Ok((_, name)) = parse_section_header(line) {
                log::debug!("Section [{name}] at line {line_no}");
                // repeated sections are merged
                current = match entries.iter().position(|(n, _)| *n == name) {
                    Some(index) => Some(index),
                    None => {
                        entries.push((name, Vec::new()));
                        Some(entries.len() - 1)
                    }
                };
                continue;
            }
            match current {
                Some(index) => entries[index].1.push((line_no, line)),
                None => log::debug!("Ignoring line {line_no} outside of any section"),
            }
        }
        Sections { entries }
    }

    fn lines(&self, name: &str) -> &[(usize, &'a str)] {
        self.entries
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, lines)| lines.as_slice())
            .unwrap_or_default()
    }

    fn key_values(&self, name: &str) -> Vec<(usize, &'a str, &'a str)> {
        self.lines(name)
            .iter()
            .filter_map(|&(line_no, line)| match parse_key_value(line) {
                Ok((_, (key, value))) => Some((line_no, key, value)),
                Err(_) => {
                    log::debug!("Ignoring line {line_no} in [{name}]: {line}");
                    None
                }
            })
            .collect()
    }
}

/// Parse a `.osu` file from disk.
pub fn parse_osu_file(path: &Path) -> Result<Beatmap, ConvertError> {
    let data = std::fs::read(path)?;
    parse_osu_data(&data)
}

/// Parse the raw bytes of a `.osu` file.
pub fn parse_osu_data(data: &[u8]) -> Result<Beatmap, ConvertError> {
    let text = decode_text(data);
    parse_osu_text(&text)
}

/// Parse the text of a `.osu` file.
pub fn parse_osu_text(text: &str) -> Result<Beatmap, ConvertError> {
    let mut lines = text
        .lines()
        .enumerate()
        .map(|(i, line)| (i + 1, line))
        .skip_while(|(_, line)| line.trim().is_empty());

    let version = match lines.next() {
        Some((line_no, line)) => parse_version(line_no, line)?,
        None => return Err(ConvertError::parse(HEADER, 1, "empty file")),
    };
    log::debug!("Parsing osu! file format v{}", version.number());

    let sections = Sections::split(lines);
    let general = parse_general(&sections)?;
    let metadata = parse_metadata(&sections)?;
    let difficulty = parse_difficulty(&sections)?;
    let background = parse_background(&sections);
    let timing_points = parse_timing_points(&sections, version)?;
    let hit_objects = parse_hit_objects(&sections, version, &difficulty, &timing_points)?;

    // timing must be defined before anything can be hit
    let first_hit = hit_objects
        .iter()
        .map(|h| h.time)
        .fold(f64::INFINITY, f64::min);
    let first_uninherited = timing_points
        .iter()
        .find(|p| p.uninherited)
        .map_or(f64::INFINITY, |p| p.time);
    if first_uninherited > first_hit {
        let line_no = sections.lines(TIMING_POINTS).first().map_or(0, |(n, _)| *n);
        return Err(ConvertError::parse(
            TIMING_POINTS,
            line_no,
            format!("first uninherited timing point at {first_uninherited}ms comes after the first hit object at {first_hit}ms"),
        ));
    }

    Ok(Beatmap {
        version,
        general,
        metadata,
        difficulty,
        background,
        timing_points,
        hit_objects,
    })
}

fn parse_version(line_no: usize, line: &str) -> Result<FormatVersion, ConvertError> {
    let line = line.trim();
    match parse_format_header(line) {
        Ok((_, number)) => FormatVersion::from_number(number)
            .ok_or_else(|| ConvertError::UnsupportedVersion(format!("v{number}"))),
        Err(_) if line.starts_with("osu file format v") => Err(ConvertError::UnsupportedVersion(
            line.trim_start_matches("osu file format ").to_string(),
        )),
        Err(_) => Err(ConvertError::parse(
            HEADER,
            line_no,
            "missing `osu file format` header",
        )),
    }
}

fn parse_value<T: FromStr>(
    section: &str,
    line_no: usize,
    key: &str,
    value: &str,
) -> Result<T, ConvertError> {
    value.parse().map_err(|_| {
        ConvertError::parse(section, line_no, format!("invalid value `{value}` for {key}"))
    })
}

/// Ids use -1 or 0 for "unknown"
fn parse_id(section: &str, line_no: usize, key: &str, value: &str) -> Result<Option<u32>, ConvertError> {
    let id: i64 = parse_value(section, line_no, key, value)?;
    Ok(u32::try_from(id).ok().filter(|id| *id > 0))
}

fn parse_general(sections: &Sections) -> Result<General, ConvertError> {
    let mut general = General::default();
    let mut audio_filename = None;
    for (line_no, key, value) in sections.key_values(GENERAL) {
        match key {
            "AudioFilename" => audio_filename = Some(value.to_string()),
            "PreviewTime" => {
                let time: f64 = parse_value(GENERAL, line_no, key, value)?;
                general.preview_time = (time >= 0.0).then_some(time);
            }
            "Mode" => {
                let id = parse_value(GENERAL, line_no, key, value)?;
                general.mode = GameMode::from_id(id).ok_or_else(|| {
                    ConvertError::parse(GENERAL, line_no, format!("unknown mode {id}"))
                })?;
            }
            _ => (),
        }
    }
    general.audio_filename = audio_filename.filter(|f| !f.is_empty()).ok_or_else(|| {
        let line_no = sections.lines(GENERAL).first().map_or(0, |(n, _)| *n);
        ConvertError::parse(GENERAL, line_no, "missing AudioFilename")
    })?;
    Ok(general)
}

fn parse_metadata(sections: &Sections) -> Result<Metadata, ConvertError> {
    let mut metadata = Metadata::default();
    for (line_no, key, value) in sections.key_values(METADATA) {
        match key {
            "Title" => metadata.title = value.to_string(),
            "Artist" => metadata.artist = value.to_string(),
            "Creator" => metadata.creator = value.to_string(),
            "Version" => metadata.version = value.to_string(),
            "BeatmapID" => metadata.beatmap_id = parse_id(METADATA, line_no, key, value)?,
            "BeatmapSetID" => metadata.beatmap_set_id = parse_id(METADATA, line_no, key, value)?,
            _ => (),
        }
    }
    if metadata.version.is_empty() {
        metadata.version = "Normal".to_string();
    }
    Ok(metadata)
}

fn parse_difficulty(sections: &Sections) -> Result<Difficulty, ConvertError> {
    let mut difficulty = Difficulty::default();
    let mut approach_rate = None;
    for (line_no, key, value) in sections.key_values(DIFFICULTY) {
        let field = match key {
            "HPDrainRate" => &mut difficulty.hp_drain_rate,
            "CircleSize" => &mut difficulty.circle_size,
            "OverallDifficulty" => &mut difficulty.overall_difficulty,
            "ApproachRate" => approach_rate.insert(0.0),
            "SliderMultiplier" => &mut difficulty.slider_multiplier,
            "SliderTickRate" => &mut difficulty.slider_tick_rate,
            _ => continue,
        };
        *field = parse_value(DIFFICULTY, line_no, key, value)?;
    }
    // old files only carry OverallDifficulty
    difficulty.approach_rate = approach_rate.unwrap_or(difficulty.overall_difficulty);
    Ok(difficulty)
}

fn parse_background(sections: &Sections) -> Option<String> {
    sections.lines(EVENTS).iter().find_map(|(_, line)| {
        let rest = line.strip_prefix("0,0,")?;
        let (_, filename) = next_column(rest);
        let filename = unquote(filename);
        (!filename.is_empty()).then(|| filename.to_string())
    })
}

#[derive(Debug)]
struct RawTimingPoint {
    time: f64,
    beat_length: f64,
    meter: Option<i32>,
    uninherited: Option<i32>,
    effects: Option<i32>,
}

/// `time,beatLength,meter,sampleSet,sampleIndex,volume,uninherited,effects`
///
/// Legacy rows stop after `beatLength`.
fn parse_timing_point_row(i: &str) -> IResult<&str, RawTimingPoint> {
    map(
        (
            parse_decimal,                  // time
            preceded(comma, parse_decimal), // beat length
            parse_optional_int,             // meter
            parse_optional_int,             // sample set
            parse_optional_int,             // sample index
            parse_optional_int,             // volume
            parse_optional_int,             // uninherited
            parse_optional_int,             // effects
        ),
        |(time, beat_length, meter, _, _, _, uninherited, effects)| RawTimingPoint {
            time,
            beat_length,
            meter,
            uninherited,
            effects,
        },
    )
    .parse(i)
}

fn is_trailing_noise(rest: &str) -> bool {
    rest.chars().all(|c| c == ',' || c.is_whitespace())
}

fn parse_timing_points(
    sections: &Sections,
    version: FormatVersion,
) -> Result<Vec<TimingPoint>, ConvertError> {
    let offset = version.time_offset();
    let mut points: Vec<TimingPoint> = Vec::new();
    let mut last_meter = DEFAULT_METER;
    for (line_no, row) in sections.lines(TIMING_POINTS) {
        let raw = match parse_timing_point_row(row) {
            Ok((rest, raw)) if is_trailing_noise(rest) => raw,
            _ => {
                return Err(ConvertError::parse(
                    TIMING_POINTS,
                    *line_no,
                    format!("malformed timing point `{row}`"),
                ))
            }
        };
        log::debug!("Timing point: {raw:?}");
        let uninherited = raw
            .uninherited
            .map_or(raw.beat_length > 0.0, |flag| flag == 1);
        if uninherited && !(raw.beat_length.is_finite() && raw.beat_length > 0.0) {
            return Err(ConvertError::parse(
                TIMING_POINTS,
                *line_no,
                format!("invalid beat length {}", raw.beat_length),
            ));
        }
        let meter = match raw.meter {
            Some(m) if uninherited && m > 0 => m as u32,
            _ => last_meter,
        };
        if uninherited {
            last_meter = meter;
        }
        points.push(TimingPoint {
            time: raw.time + offset,
            beat_length: raw.beat_length,
            meter,
            uninherited,
            kiai: raw.effects.is_some_and(|e| e as u32 & EFFECT_KIAI != 0),
        });
    }

    points.sort_by(|a, b| a.time.total_cmp(&b.time));
    // at equal times the later uninherited point wins
    let mut deduplicated: Vec<TimingPoint> = Vec::with_capacity(points.len());
    for point in points {
        if point.uninherited {
            if let Some(index) = deduplicated
                .iter()
                .rposition(|p| p.uninherited && p.time == point.time)
            {
                log::debug!("Replacing uninherited timing point at {}ms", point.time);
                deduplicated.remove(index);
            }
        }
        deduplicated.push(point);
    }

    if !deduplicated.iter().any(|p| p.uninherited) {
        let line_no = sections.lines(TIMING_POINTS).first().map_or(0, |(n, _)| *n);
        return Err(ConvertError::parse(
            TIMING_POINTS,
            line_no,
            "no uninherited timing point",
        ));
    }
    Ok(deduplicated)
}

/// `x,y,time,type,hitSound`
fn parse_hit_object_head(i: &str) -> IResult<&str, (f64, f64, f64, i32)> {
    map(
        (
            parse_decimal,                  // x
            preceded(comma, parse_decimal), // y
            preceded(comma, parse_decimal), // time
            preceded(comma, parse_int),     // type
            preceded(comma, parse_int),     // hit sound
        ),
        |(x, y, time, kind, _hit_sound)| (x, y, time, kind),
    )
    .parse(i)
}

fn parse_hit_objects(
    sections: &Sections,
    version: FormatVersion,
    difficulty: &Difficulty,
    timing_points: &[TimingPoint],
) -> Result<Vec<HitObject>, ConvertError> {
    let offset = version.time_offset();
    let rows = sections.lines(HIT_OBJECTS);
    log::debug!("Parsing {} hit objects", rows.len());
    let mut hit_objects = Vec::with_capacity(rows.len());
    for (line_no, row) in rows {
        let malformed = |what: &str| {
            ConvertError::parse(HIT_OBJECTS, *line_no, format!("{what} in `{row}`"))
        };
        let (rest, (x, y, time, kind_bits)) =
            parse_hit_object_head(row).map_err(|_| malformed("malformed hit object"))?;
        let kind_bits = kind_bits as u32;
        let time = time + offset;
        let position = Position::new(x, y);

        let kind = if kind_bits & TYPE_SLIDER != 0 {
            let (rest, curve_column) = next_column(rest);
            let (curve_rest, (curve_char, points)) =
                parse_curve(curve_column).map_err(|_| malformed("malformed slider curve"))?;
            if !curve_rest.trim().is_empty() {
                return Err(malformed("malformed slider curve"));
            }
            let curve = CurveType::from_char(curve_char)
                .ok_or_else(|| malformed("unknown slider curve type"))?;
            let (rest, repeats_column) = next_column(rest);
            let repeats = if repeats_column.is_empty() {
                1
            } else {
                parse_value(HIT_OBJECTS, *line_no, "slides", repeats_column)?
            };
            let (_, length_column) = next_column(rest);
            let mut path = Vec::with_capacity(points.len() + 1);
            path.push(position);
            path.extend(points);
            let pixel_length = if length_column.is_empty() {
                path.windows(2).map(|w| w[0].distance(&w[1])).sum()
            } else {
                parse_value(HIT_OBJECTS, *line_no, "length", length_column)?
            };
            let (beat_length, velocity) = slider_timing_at(timing_points, time)
                .ok_or_else(|| malformed("slider without timing"))?;
            let span_duration =
                pixel_length / (difficulty.slider_multiplier * 100.0 * velocity) * beat_length;
            HitObjectKind::Slider(Slider {
                end_time: time + span_duration * f64::from(repeats),
                curve,
                path,
                repeats,
                pixel_length,
            })
        } else if kind_bits & TYPE_SPINNER != 0 {
            let (_, end_column) = next_column(rest);
            let end_time: f64 = parse_value(HIT_OBJECTS, *line_no, "endTime", end_column)?;
            HitObjectKind::Spinner {
                end_time: end_time + offset,
            }
        } else if kind_bits & TYPE_MANIA_HOLD != 0 {
            let (_, params) = next_column(rest);
            let end_column = params.split(':').next().unwrap_or_default();
            let end_time: f64 = parse_value(HIT_OBJECTS, *line_no, "endTime", end_column)?;
            HitObjectKind::Slider(Slider {
                end_time: end_time + offset,
                curve: CurveType::Linear,
                path: vec![position],
                repeats: 1,
                pixel_length: 0.0,
            })
        } else if kind_bits & TYPE_CIRCLE != 0 {
            HitObjectKind::Tap
        } else {
            return Err(malformed(&format!("unknown hit object type {kind_bits}")));
        };

        hit_objects.push(HitObject {
            time,
            position,
            new_combo: kind_bits & TYPE_NEW_COMBO != 0,
            kind,
        });
    }

    if hit_objects.is_empty() {
        let line_no = rows.first().map_or(0, |(n, _)| *n);
        return Err(ConvertError::parse(HIT_OBJECTS, line_no, "no hit objects"));
    }
    Ok(hit_objects)
}
