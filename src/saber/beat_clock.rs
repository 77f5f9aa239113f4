use crate::parser::osu_types::TimingPoint;
use crate::ConvertError;

/// Tempo section start, precomputed from an uninherited timing point.
#[derive(Debug, Copy, Clone, PartialEq)]
struct Breakpoint {
    time: f64,
    beat: f64,
    beat_length: f64,
    bpm: f64,
    meter: u32,
}

/// Tempo change expressed in beats since the start of the audio.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct BpmChange {
    pub beat: f64,
    pub bpm: f64,
    pub meter: u32,
}

/// Maps absolute milliseconds to beats.
///
/// Beat zero is audio time zero, measured with the tempo of the first
/// uninherited point. Inherited points never change the tempo.
#[derive(Debug, Clone, PartialEq)]
pub struct BeatClock {
    breakpoints: Vec<Breakpoint>, // sorted by time and by beat
}

impl BeatClock {
    pub fn new(timing_points: &[TimingPoint]) -> Result<Self, ConvertError> {
        let invalid = |message: String| ConvertError::parse("TimingPoints", 0, message);
        let mut breakpoints: Vec<Breakpoint> = Vec::new();
        for point in timing_points.iter().filter(|p| p.uninherited) {
            if !point.time.is_finite() || !(point.beat_length.is_finite() && point.beat_length > 0.0)
            {
                return Err(invalid(format!(
                    "invalid uninherited timing point {}ms / {}ms per beat",
                    point.time, point.beat_length
                )));
            }
            let beat = match breakpoints.last() {
                None => point.time / point.beat_length,
                Some(previous) if previous.time < point.time => {
                    previous.beat + (point.time - previous.time) / previous.beat_length
                }
                Some(previous) => {
                    return Err(invalid(format!(
                        "uninherited timing point at {}ms does not follow {}ms",
                        point.time, previous.time
                    )))
                }
            };
            breakpoints.push(Breakpoint {
                time: point.time,
                beat,
                beat_length: point.beat_length,
                bpm: point.bpm(),
                meter: point.meter,
            });
        }
        if breakpoints.is_empty() {
            return Err(invalid("no uninherited timing point".to_string()));
        }
        log::debug!("Beat clock with {} tempo sections", breakpoints.len());
        Ok(Self { breakpoints })
    }

    /// Section in effect at `time`, the first one for earlier times
    fn section_at(&self, time: f64) -> &Breakpoint {
        let index = self.breakpoints.partition_point(|b| b.time <= time);
        &self.breakpoints[index.saturating_sub(1)]
    }

    /// Beats elapsed since audio time zero, negative during pre-roll.
    pub fn beat_at(&self, time: f64) -> f64 {
        let section = self.section_at(time);
        section.beat + (time - section.time) / section.beat_length
    }

    /// Inverse of [`BeatClock::beat_at`].
    pub fn time_at(&self, beat: f64) -> f64 {
        let index = self.breakpoints.partition_point(|b| b.beat <= beat);
        let section = &self.breakpoints[index.saturating_sub(1)];
        section.time + (beat - section.beat) * section.beat_length
    }

    /// Tempo of the first section, used as the level BPM
    pub fn base_bpm(&self) -> f64 {
        self.breakpoints[0].bpm
    }

    /// One change per section; the first one starts at beat zero.
    pub fn bpm_changes(&self) -> Vec<BpmChange> {
        self.breakpoints
            .iter()
            .enumerate()
            .map(|(i, b)| BpmChange {
                beat: if i == 0 { 0.0 } else { b.beat },
                bpm: b.bpm,
                meter: b.meter,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(time: f64, beat_length: f64, uninherited: bool) -> TimingPoint {
        TimingPoint {
            time,
            beat_length,
            meter: 4,
            uninherited,
            kiai: false,
        }
    }

    #[test]
    fn test_constant_tempo() {
        let clock = BeatClock::new(&[point(0.0, 500.0, true)]).unwrap();
        assert_eq!(clock.beat_at(0.0), 0.0);
        assert_eq!(clock.beat_at(1000.0), 2.0);
        assert_eq!(clock.beat_at(2125.0), 4.25);
        assert_eq!(clock.base_bpm(), 120.0);
        assert_eq!(clock.bpm_changes().len(), 1);
    }

    #[test]
    fn test_offset_first_point_extrapolates_backward() {
        let clock = BeatClock::new(&[point(250.0, 500.0, true)]).unwrap();
        assert_eq!(clock.beat_at(250.0), 0.5);
        assert_eq!(clock.beat_at(0.0), 0.0);
        assert_eq!(clock.beat_at(-500.0), -1.0);
    }

    #[test]
    fn test_tempo_change_accumulates() {
        let clock = BeatClock::new(&[
            point(0.0, 500.0, true),
            point(1000.0, -50.0, false), // inherited, no effect on tempo
            point(2000.0, 250.0, true),
        ])
        .unwrap();
        assert_eq!(clock.beat_at(1500.0), 3.0);
        assert_eq!(clock.beat_at(2000.0), 4.0);
        assert_eq!(clock.beat_at(2500.0), 6.0);
        assert_eq!(clock.time_at(4.0), 2000.0);

        let changes = clock.bpm_changes();
        assert_eq!(changes.len(), 2);
        assert_eq!(changes[0].beat, 0.0);
        assert_eq!(changes[0].bpm, 120.0);
        assert_eq!(changes[1].beat, 4.0);
        assert_eq!(changes[1].bpm, 240.0);
    }

    #[test]
    fn test_time_at_inverts_beat_at() {
        let clock = BeatClock::new(&[
            point(100.0, 400.0, true),
            point(2100.0, 300.0, true),
            point(4500.0, 600.0, true),
        ])
        .unwrap();
        for time in [-300.0, 0.0, 100.0, 1234.0, 2100.0, 3000.0, 4500.0, 9000.0] {
            let back = clock.time_at(clock.beat_at(time));
            assert!((back - time).abs() < 1e-9, "{time} -> {back}");
        }
    }

    #[test]
    fn test_beat_at_is_monotonic() {
        let clock = BeatClock::new(&[
            point(-200.0, 333.3, true),
            point(1000.0, 1200.0, true),
            point(1500.0, 150.0, true),
            point(1800.0, -25.0, false),
            point(4000.0, 480.0, true),
        ])
        .unwrap();
        let mut previous = f64::NEG_INFINITY;
        let mut time = -2000.0;
        while time < 10_000.0 {
            let beat = clock.beat_at(time);
            assert!(beat >= previous, "beat_at decreased at {time}ms");
            previous = beat;
            time += 7.3;
        }
    }

    #[test]
    fn test_invalid_timing() {
        assert!(BeatClock::new(&[]).is_err());
        assert!(BeatClock::new(&[point(0.0, -100.0, false)]).is_err());
        assert!(BeatClock::new(&[point(0.0, 0.0, true)]).is_err());
        assert!(BeatClock::new(&[point(1000.0, 500.0, true), point(1000.0, 400.0, true)]).is_err());
    }
}
