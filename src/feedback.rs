//! Audio and speech feedback.
//!
//! The engine reports through two sinks: [`AudioFeedback`] for tones and
//! [`Speech`] for announcements. [`Beeper`] is a tone synthesizer that renders
//! 16-bit stereo PCM and plays it on a dedicated thread through a [`PcmSink`].
//! The recording sinks capture everything for tests and the CLI.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, RwLock};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{unbounded, Sender};

/// Output sample rate of synthesized buffers.
pub const SAMPLE_RATE: u32 = 44_100;

/// Base pitch of crackles and indentation tones, in Hz.
pub const BASE_FREQUENCY: f64 = 220.0;

/// Length of one crackle beep.
pub const CRACKLE_BEEP_MS: u64 = 10;

/// Silence between crackle beeps.
pub const CRACKLE_PAUSE_MS: u64 = 5;

/// Upper bound on the beeps of one crackle.
pub const MAX_CRACKLE_BEEPS: usize = 40;

/// Chime played for every paragraph skipped as clutter.
pub const SKIP_CHIME: &str = "skip";

const NOTES: [&str; 12] = ["A", "B", "H", "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#"];

/// Tone output used by the navigation engine.
pub trait AudioFeedback: Send + Sync {
    /// Play a tone. Volumes are percentages per channel.
    fn beep(&self, frequency: f64, duration_ms: u64, left: u8, right: u8);

    /// Play a crackle whose length grows with `distance` paragraphs.
    fn crackle(&self, distance: usize, volume: u8);

    /// Play a registered chime.
    fn chime(&self, name: &str, volume: u8);

    /// Play the notes of `chord` (e.g. `"HF"`, `"DG#"`) together.
    fn chord(&self, chord: &str, duration_ms: u64, left: u8, right: u8) {
        for frequency in chord_frequencies(chord) {
            self.beep(frequency, duration_ms, left, right);
        }
    }

    /// Cut off whatever is playing.
    fn stop(&self) {}
}

/// Spoken output.
pub trait Speech: Send + Sync {
    fn speak(&self, text: &str);
}

/// Number of beeps in the crackle for `distance` paragraphs.
///
/// Grows logarithmically (`round(10 * ln(1 + n / 10))`) so long jumps do not
/// produce unbounded sounds, capped at [`MAX_CRACKLE_BEEPS`].
pub fn crackle_beeps(distance: usize) -> usize {
    let compressed = (10.0 * (1.0 + distance as f64 / 10.0).ln()).round() as usize;
    compressed.min(MAX_CRACKLE_BEEPS)
}

/// Frequencies of the notes in a chord string.
///
/// Notes use the German naming (`B` is B-flat, `H` is B) starting from A at
/// 220 Hz. Each note is placed at or above the previous one.
pub fn chord_frequencies(chord: &str) -> Vec<f64> {
    let chars: Vec<char> = chord.chars().collect();
    let mut result = Vec::new();
    let mut previous: Option<usize> = None;
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        i += 1;
        if !('A'..='H').contains(&c) {
            continue;
        }
        let mut name = c.to_string();
        if chars.get(i) == Some(&'#') {
            name.push('#');
            i += 1;
        }
        let Some(mut index) = NOTES.iter().position(|n| *n == name) else {
            continue;
        };
        if let Some(prev) = previous {
            while index < prev {
                index += 12;
            }
        }
        previous = Some(index);
        result.push((BASE_FREQUENCY * 2f64.powf(index as f64 / 12.0)).floor());
    }
    result
}

/// Pitch for an indentation level in quarter tones above the base.
pub fn indent_pitch(indent: i32) -> f64 {
    BASE_FREQUENCY * 2f64.powf(indent as f64 / 24.0)
}

fn frames(duration_ms: u64) -> usize {
    (SAMPLE_RATE as u64 * duration_ms / 1000) as usize
}

/// Interleaved stereo sine tone.
pub fn synthesize_beep(frequency: f64, duration_ms: u64, left: u8, right: u8) -> Vec<i16> {
    let n = frames(duration_ms);
    let left = f64::from(left.min(100)) / 100.0;
    let right = f64::from(right.min(100)) / 100.0;
    let step = 2.0 * std::f64::consts::PI * frequency / f64::from(SAMPLE_RATE);
    let mut samples = Vec::with_capacity(n * 2);
    for i in 0..n {
        let s = (step * i as f64).sin() * f64::from(i16::MAX);
        samples.push((s * left) as i16);
        samples.push((s * right) as i16);
    }
    samples
}

/// Stereo silence.
pub fn synthesize_silence(duration_ms: u64) -> Vec<i16> {
    vec![0; frames(duration_ms) * 2]
}

/// Sum several buffers sample by sample, saturating.
pub fn mix(buffers: &[Vec<i16>]) -> Vec<i16> {
    let len = buffers.iter().map(Vec::len).max().unwrap_or(0);
    let mut out = vec![0i16; len];
    for buffer in buffers {
        for (o, s) in out.iter_mut().zip(buffer) {
            *o = o.saturating_add(*s);
        }
    }
    out
}

/// Scale a buffer by a volume percentage.
pub fn scale_volume(samples: &[i16], volume: u8) -> Vec<i16> {
    let volume = i32::from(volume.min(100));
    samples
        .iter()
        .map(|s| (i32::from(*s) * volume / 100) as i16)
        .collect()
}

/// Destination of rendered PCM, such as a sound device.
pub trait PcmSink: Send + 'static {
    /// Play interleaved stereo samples at [`SAMPLE_RATE`].
    fn play(&mut self, samples: &[i16]);

    /// Stop the current sound.
    fn stop(&mut self) {}
}

enum Command {
    Play(Vec<i16>),
    Stop,
}

/// Tone synthesizer feeding a background playback thread.
///
/// Every new sound interrupts the previous one. Dropping the beeper closes the
/// queue and joins the thread.
pub struct Beeper {
    tx: Option<Sender<Command>>,
    worker: Option<JoinHandle<()>>,
    chimes: RwLock<HashMap<String, Arc<Vec<i16>>>>,
}

impl fmt::Debug for Beeper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let chimes = self.chimes.read().map(|c| c.len()).unwrap_or(0);
        f.debug_struct("Beeper").field("chimes", &chimes).finish()
    }
}

impl Beeper {
    /// Start the playback thread for `sink`.
    pub fn new(sink: impl PcmSink) -> Self {
        let (tx, rx) = unbounded::<Command>();
        let mut sink = sink;
        let worker = thread::Builder::new()
            .name("quickjump-sound".to_string())
            .spawn(move || {
                for command in rx {
                    match command {
                        Command::Play(samples) => {
                            sink.stop();
                            sink.play(&samples);
                        }
                        Command::Stop => sink.stop(),
                    }
                }
            });
        let worker = match worker {
            Ok(handle) => Some(handle),
            Err(e) => {
                log::warn!("sound playback disabled: {}", e);
                None
            }
        };
        let mut chimes = HashMap::new();
        chimes.insert(
            SKIP_CHIME.to_string(),
            Arc::new(synthesize_beep(880.0, 30, 100, 100)),
        );
        Self {
            tx: worker.as_ref().map(|_| tx),
            worker,
            chimes: RwLock::new(chimes),
        }
    }

    /// Register PCM for a chime name, replacing any previous buffer.
    pub fn register_chime(&self, name: impl Into<String>, samples: Vec<i16>) {
        if let Ok(mut chimes) = self.chimes.write() {
            chimes.insert(name.into(), Arc::new(samples));
        }
    }

    /// Crackle buffer: one short beep plus pause per compressed step.
    pub fn render_crackle(distance: usize, volume: u8) -> Vec<i16> {
        let beep = synthesize_beep(BASE_FREQUENCY, CRACKLE_BEEP_MS, volume, volume);
        let pause = synthesize_silence(CRACKLE_PAUSE_MS);
        let count = crackle_beeps(distance);
        let mut out = Vec::with_capacity(count * (beep.len() + pause.len()));
        for _ in 0..count {
            out.extend_from_slice(&beep);
            out.extend_from_slice(&pause);
        }
        out
    }

    /// Chord buffer: all notes mixed.
    pub fn render_chord(chord: &str, duration_ms: u64, left: u8, right: u8) -> Vec<i16> {
        let tones: Vec<Vec<i16>> = chord_frequencies(chord)
            .into_iter()
            .map(|f| synthesize_beep(f, duration_ms, left, right))
            .collect();
        let voices = tones.len().max(1) as i32;
        let scaled: Vec<Vec<i16>> = tones
            .into_iter()
            .map(|t| {
                t.into_iter()
                    .map(|s| (i32::from(s) / voices) as i16)
                    .collect::<Vec<i16>>()
            })
            .collect();
        mix(&scaled)
    }

    fn send(&self, command: Command) {
        if let Some(tx) = &self.tx {
            if tx.send(command).is_err() {
                log::debug!("sound thread has exited");
            }
        }
    }
}

impl AudioFeedback for Beeper {
    fn beep(&self, frequency: f64, duration_ms: u64, left: u8, right: u8) {
        self.send(Command::Play(synthesize_beep(frequency, duration_ms, left, right)));
    }

    fn crackle(&self, distance: usize, volume: u8) {
        let samples = Self::render_crackle(distance, volume);
        if !samples.is_empty() {
            self.send(Command::Play(samples));
        }
    }

    fn chime(&self, name: &str, volume: u8) {
        let buffer = self.chimes.read().ok().and_then(|c| c.get(name).cloned());
        match buffer {
            Some(samples) => self.send(Command::Play(scale_volume(&samples, volume))),
            None => log::warn!("unknown chime '{}'", name),
        }
    }

    fn chord(&self, chord: &str, duration_ms: u64, left: u8, right: u8) {
        self.send(Command::Play(Self::render_chord(chord, duration_ms, left, right)));
    }

    fn stop(&self) {
        self.send(Command::Stop);
    }
}

impl Drop for Beeper {
    fn drop(&mut self) {
        self.tx = None;
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

/// Discards all sound.
#[derive(Debug, Clone, Copy, Default)]
pub struct Silent;

impl AudioFeedback for Silent {
    fn beep(&self, _frequency: f64, _duration_ms: u64, _left: u8, _right: u8) {}
    fn crackle(&self, _distance: usize, _volume: u8) {}
    fn chime(&self, _name: &str, _volume: u8) {}
}

impl Speech for Silent {
    fn speak(&self, _text: &str) {}
}

/// One call made on a [`RecordingAudio`].
#[derive(Debug, Clone, PartialEq)]
pub enum AudioEvent {
    Beep {
        frequency: f64,
        duration_ms: u64,
        left: u8,
        right: u8,
    },
    Crackle {
        distance: usize,
        volume: u8,
    },
    Chime {
        name: String,
        volume: u8,
    },
    Chord {
        chord: String,
        duration_ms: u64,
        left: u8,
        right: u8,
    },
    Stop,
}

/// Audio sink that remembers every call.
#[derive(Debug, Default)]
pub struct RecordingAudio {
    events: Mutex<Vec<AudioEvent>>,
}

impl RecordingAudio {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<AudioEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    /// Remove and return the recorded events.
    pub fn take(&self) -> Vec<AudioEvent> {
        self.events
            .lock()
            .map(|mut e| std::mem::take(&mut *e))
            .unwrap_or_default()
    }

    fn push(&self, event: AudioEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}

impl AudioFeedback for RecordingAudio {
    fn beep(&self, frequency: f64, duration_ms: u64, left: u8, right: u8) {
        self.push(AudioEvent::Beep {
            frequency,
            duration_ms,
            left,
            right,
        });
    }

    fn crackle(&self, distance: usize, volume: u8) {
        self.push(AudioEvent::Crackle { distance, volume });
    }

    fn chime(&self, name: &str, volume: u8) {
        self.push(AudioEvent::Chime {
            name: name.to_string(),
            volume,
        });
    }

    fn chord(&self, chord: &str, duration_ms: u64, left: u8, right: u8) {
        self.push(AudioEvent::Chord {
            chord: chord.to_string(),
            duration_ms,
            left,
            right,
        });
    }

    fn stop(&self) {
        self.push(AudioEvent::Stop);
    }
}

/// Speech sink that remembers every utterance.
#[derive(Debug, Default)]
pub struct RecordingSpeech {
    spoken: Mutex<Vec<String>>,
}

impl RecordingSpeech {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn spoken(&self) -> Vec<String> {
        self.spoken.lock().map(|s| s.clone()).unwrap_or_default()
    }

    pub fn take(&self) -> Vec<String> {
        self.spoken
            .lock()
            .map(|mut s| std::mem::take(&mut *s))
            .unwrap_or_default()
    }
}

impl Speech for RecordingSpeech {
    fn speak(&self, text: &str) {
        if let Ok(mut spoken) = self.spoken.lock() {
            spoken.push(text.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Default)]
    struct Capture(Arc<Mutex<Vec<usize>>>);

    impl PcmSink for Capture {
        fn play(&mut self, samples: &[i16]) {
            self.0.lock().unwrap().push(samples.len());
        }
    }

    #[test]
    fn test_crackle_compression() {
        assert_eq!(crackle_beeps(0), 0);
        assert_eq!(crackle_beeps(1), 1);
        assert_eq!(crackle_beeps(10), 7);
        assert_eq!(crackle_beeps(100), 24);
        assert_eq!(crackle_beeps(100_000), MAX_CRACKLE_BEEPS);
    }

    #[test]
    fn test_chord_frequencies() {
        assert_eq!(chord_frequencies("A"), vec![220.0]);
        let hf = chord_frequencies("HF");
        assert_eq!(hf.len(), 2);
        assert_eq!(hf[0], (220.0 * 2f64.powf(2.0 / 12.0)).floor());
        assert_eq!(hf[1], (220.0 * 2f64.powf(8.0 / 12.0)).floor());
        // A after G is placed an octave up
        assert_eq!(chord_frequencies("GA")[1], 440.0);
        assert_eq!(chord_frequencies("DG#").len(), 2);
        assert_eq!(chord_frequencies("CDGA").len(), 4);
        assert!(chord_frequencies("xyz").is_empty());
    }

    #[test]
    fn test_indent_pitch() {
        assert_eq!(indent_pitch(0), BASE_FREQUENCY);
        assert!((indent_pitch(24) - 2.0 * BASE_FREQUENCY).abs() < 1e-9);
    }

    #[test]
    fn test_synthesis_lengths() {
        let beep = synthesize_beep(440.0, 10, 50, 50);
        assert_eq!(beep.len(), 441 * 2);
        let crackle = Beeper::render_crackle(1, 50);
        assert_eq!(crackle.len(), (441 + 220) * 2);
        assert!(Beeper::render_crackle(0, 50).is_empty());
    }

    #[test]
    fn test_scale_and_mix() {
        assert_eq!(scale_volume(&[100, -100, 7], 50), vec![50, -50, 3]);
        assert_eq!(mix(&[vec![i16::MAX, 1], vec![10]]), vec![i16::MAX, 1]);
    }

    #[test]
    fn test_beeper_plays_on_thread() {
        let capture = Capture::default();
        let beeper = Beeper::new(capture.clone());
        beeper.beep(440.0, 10, 50, 50);
        beeper.chime(SKIP_CHIME, 25);
        beeper.chime("missing", 25);
        drop(beeper);
        let played = capture.0.lock().unwrap().clone();
        assert_eq!(played.len(), 2);
        assert_eq!(played[0], 441 * 2);
    }

    #[test]
    fn test_recording_sinks() {
        let audio = RecordingAudio::new();
        audio.chord("HF", 100, 50, 50);
        audio.crackle(3, 25);
        assert_eq!(audio.take().len(), 2);
        assert!(audio.events().is_empty());

        let speech = RecordingSpeech::new();
        speech.speak("hello");
        assert_eq!(speech.spoken(), vec!["hello"]);
    }
}
