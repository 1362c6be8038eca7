use crate::resonance::{ResonancePeak, ResonancePeakState};
use crate::scale::{build_scale, mtof};
use crate::types::{NoteSpec, StereoSample, PEAKS_PER_NOTE};
use rand::Rng;
use serde::Serialize;

/// An addressable voice: one resonance peak per harmonic of its fundamental.
#[derive(Debug, Clone)]
pub struct Note {
    spec: NoteSpec,
    resonances: Vec<ResonancePeak>,
}

impl Note {
    pub fn new<R: Rng + ?Sized>(spec: NoteSpec, rng: &mut R) -> Self {
        let fundamental = mtof(spec.midi as f64) as f32;
        let resonances = (1..=PEAKS_PER_NOTE as u32)
            .map(|harmonic| ResonancePeak::new(harmonic as f32 * fundamental, harmonic, rng))
            .collect();
        Self { spec, resonances }
    }

    pub fn spec(&self) -> &NoteSpec {
        &self.spec
    }

    pub fn midi(&self) -> i32 {
        self.spec.midi
    }

    pub fn resonances(&self) -> &[ResonancePeak] {
        &self.resonances
    }

    pub fn resonance_mut(&mut self, index: usize) -> Option<&mut ResonancePeak> {
        self.resonances.get_mut(index)
    }

    /// Trigger every peak with the same velocity; each derives its own gain and Q.
    pub fn play(&mut self, velocity: f32, now: f64) {
        for peak in self.resonances.iter_mut() {
            peak.trigger(velocity, now);
        }
    }

    pub fn render(&mut self, input: &[f32], start: f64, sample_rate: f32, out: &mut [StereoSample]) {
        for peak in self.resonances.iter_mut() {
            peak.render(input, start, sample_rate, out);
        }
    }
}

/// The full set of notes, ascending in pitch, plus the range they span.
/// Note order is the pitch axis of both the trigger grid and the visuals.
#[derive(Debug, Clone)]
pub struct Instrument {
    notes: Vec<Note>,
    lowest_note: i32,
    highest_note: i32,
}

impl Instrument {
    pub fn new<R: Rng + ?Sized>(
        lowest_note: i32,
        highest_note: i32,
        degrees: &[i32],
        rng: &mut R,
    ) -> Self {
        let notes = build_scale(lowest_note, highest_note, degrees)
            .into_iter()
            .map(|spec| Note::new(spec, rng))
            .collect();
        Self {
            notes,
            lowest_note,
            highest_note,
        }
    }

    pub fn notes(&self) -> &[Note] {
        &self.notes
    }

    pub fn notes_mut(&mut self) -> &mut [Note] {
        &mut self.notes
    }

    pub fn len(&self) -> usize {
        self.notes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }

    pub fn lowest_note(&self) -> i32 {
        self.lowest_note
    }

    pub fn highest_note(&self) -> i32 {
        self.highest_note
    }

    /// Play the note in pitch bucket `index`. Returns false if there is none.
    pub fn play(&mut self, index: usize, velocity: f32, now: f64) -> bool {
        match self.notes.get_mut(index) {
            Some(note) => {
                note.play(velocity, now);
                true
            }
            None => false,
        }
    }

    /// Snapshot of every peak's state at audio time `t`.
    pub fn view_at(&self, t: f64) -> InstrumentView {
        InstrumentView {
            lowest_note: self.lowest_note,
            highest_note: self.highest_note,
            notes: self
                .notes
                .iter()
                .map(|n| NoteView {
                    midi: n.midi(),
                    peaks: n.resonances.iter().map(|p| p.state_at(t)).collect(),
                })
                .collect(),
        }
    }
}

/// Read-only copy of instrument state, cheap to hand to the visualizer
/// without holding the synth lock while drawing.
#[derive(Debug, Clone, Serialize)]
pub struct InstrumentView {
    pub lowest_note: i32,
    pub highest_note: i32,
    pub notes: Vec<NoteView>,
}

#[derive(Debug, Clone, Serialize)]
pub struct NoteView {
    pub midi: i32,
    pub peaks: Vec<ResonancePeakState>,
}

impl InstrumentView {
    pub fn active_peaks(&self) -> usize {
        self.notes
            .iter()
            .flat_map(|n| n.peaks.iter())
            .filter(|p| p.current_gain > 0.0)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scale::DIATONIC_MAJOR;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_peaks_sit_on_harmonics() {
        let mut rng = StdRng::seed_from_u64(1);
        let spec = NoteSpec {
            midi: 69,
            lowest_note: 21,
            highest_note: 107,
        };
        let note = Note::new(spec, &mut rng);
        assert_eq!(note.resonances().len(), 2);
        for (k, peak) in note.resonances().iter().enumerate() {
            let expected = (k + 1) as f32 * 440.0;
            assert!((peak.center_frequency() - expected).abs() < 1e-3);
            assert_eq!(peak.harmonic(), k as u32 + 1);
        }
    }

    #[test]
    fn test_play_fans_out_to_every_peak() {
        let mut rng = StdRng::seed_from_u64(1);
        let spec = NoteSpec {
            midi: 60,
            lowest_note: 21,
            highest_note: 107,
        };
        let mut note = Note::new(spec, &mut rng);
        note.play(0.8, 0.0);
        let p = note.resonances();
        assert!((p[0].gain_at(0.5) - 0.8).abs() < 1e-5);
        assert!((p[1].gain_at(1.0) - 0.4).abs() < 1e-5);
    }

    #[test]
    fn test_instrument_columns_follow_scale() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut inst = Instrument::new(21, 107, &DIATONIC_MAJOR, &mut rng);
        assert_eq!(inst.len(), 51);
        assert!(inst.play(0, 1.0, 0.0));
        assert!(!inst.play(51, 1.0, 0.0));

        let view = inst.view_at(0.5);
        assert_eq!(view.notes.len(), 51);
        assert_eq!(view.active_peaks(), 2);
        assert_eq!(view.notes[0].midi, 21);
    }
}
