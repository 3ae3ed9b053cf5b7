//! Notification chime and the persisted sound preference.
//!
//! The chime is a short two-tone synthesized waveform handed to an
//! [`AudioSink`]. Whether it plays is controlled by a single boolean
//! preference that survives restarts (`notificationSoundEnabled` in the
//! preferences file under the state directory). The flag lives in an
//! `AtomicBool` shared with every consumer, so a toggle takes effect for the
//! very next event without resubscribing anything.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde_json::{Map, Value as JsonValue};
use tracing::{debug, warn};

use gigboard_core::{defaults, Error, Result};

/// First tone of the chime (A5).
const CHIME_LOW_HZ: f32 = 880.0;
/// Second tone of the chime (E6).
const CHIME_HIGH_HZ: f32 = 1_318.5;
const CHIME_LOW_SECS: f32 = 0.12;
const CHIME_HIGH_SECS: f32 = 0.18;
const CHIME_GAIN: f32 = 0.3;
const CHIME_ATTACK_SECS: f32 = 0.005;

/// Output device for synthesized audio.
pub trait AudioSink: Send + Sync {
    /// Play mono `samples` in `[-1.0, 1.0]` at `sample_rate`.
    fn play(&self, samples: &[f32], sample_rate: u32) -> Result<()>;
}

/// Sink used when no audio device is wired in: records the chime in the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl AudioSink for LogSink {
    fn play(&self, samples: &[f32], sample_rate: u32) -> Result<()> {
        let duration_ms = samples.len() as u64 * 1000 / u64::from(sample_rate.max(1));
        debug!(
            subsystem = "sound",
            samples = samples.len(),
            duration_ms,
            "Chime played"
        );
        Ok(())
    }
}

/// Synthesize the two-tone chime at `sample_rate`.
///
/// Each tone has a short linear attack followed by an exponential decay to
/// about 1% of its peak, so consecutive chimes never click.
pub fn synthesize_chime(sample_rate: u32) -> Vec<f32> {
    let mut samples = tone(CHIME_LOW_HZ, CHIME_LOW_SECS, sample_rate);
    samples.extend(tone(CHIME_HIGH_HZ, CHIME_HIGH_SECS, sample_rate));
    samples
}

fn tone(freq: f32, secs: f32, sample_rate: u32) -> Vec<f32> {
    let rate = sample_rate.max(1) as f32;
    let len = (rate * secs).round() as usize;
    let decay = 100f32.ln() / secs;
    (0..len)
        .map(|i| {
            let t = i as f32 / rate;
            let attack = (t / CHIME_ATTACK_SECS).min(1.0);
            let envelope = attack * (-decay * t).exp();
            CHIME_GAIN * envelope * (std::f32::consts::TAU * freq * t).sin()
        })
        .collect()
}

/// JSON preferences file holding the sound flag.
///
/// Other keys in the file are preserved on write. A missing or unreadable
/// file means "enabled".
#[derive(Debug, Clone)]
pub struct PreferenceStore {
    path: Option<PathBuf>,
}

impl PreferenceStore {
    /// Preferences stored in `dir/preferences.json`.
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        Self {
            path: Some(dir.as_ref().join(defaults::PREFERENCES_FILE)),
        }
    }

    /// Preferences that are never written to disk.
    pub fn ephemeral() -> Self {
        Self { path: None }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Load the sound flag, defaulting to enabled.
    pub fn load(&self) -> bool {
        let Some(path) = &self.path else {
            return true;
        };
        match read_object(path) {
            Ok(Some(map)) => map
                .get(defaults::SOUND_PREFERENCE_KEY)
                .and_then(JsonValue::as_bool)
                .unwrap_or(true),
            Ok(None) => true,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Ignoring unreadable preferences");
                true
            }
        }
    }

    /// Persist the sound flag.
    pub fn save(&self, enabled: bool) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let mut map = read_object(path).ok().flatten().unwrap_or_default();
        map.insert(
            defaults::SOUND_PREFERENCE_KEY.to_string(),
            JsonValue::Bool(enabled),
        );
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let text = serde_json::to_string_pretty(&JsonValue::Object(map))?;
        fs::write(path, text)?;
        Ok(())
    }
}

fn read_object(path: &Path) -> Result<Option<Map<String, JsonValue>>> {
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    match serde_json::from_str::<JsonValue>(&text)? {
        JsonValue::Object(map) => Ok(Some(map)),
        _ => Err(Error::Serialization(
            "preferences file is not a JSON object".to_string(),
        )),
    }
}

/// Plays the notification chime when sound is enabled.
pub struct SoundEngine {
    enabled: Arc<AtomicBool>,
    prefs: PreferenceStore,
    sink: Arc<dyn AudioSink>,
    chime: Vec<f32>,
    sample_rate: u32,
}

impl SoundEngine {
    /// Create an engine, loading the persisted preference.
    pub fn new(prefs: PreferenceStore, sink: Arc<dyn AudioSink>) -> Self {
        let enabled = prefs.load();
        let sample_rate = defaults::CHIME_SAMPLE_RATE;
        Self {
            enabled: Arc::new(AtomicBool::new(enabled)),
            prefs,
            sink,
            chime: synthesize_chime(sample_rate),
            sample_rate,
        }
    }

    /// Engine with an ephemeral preference and the logging sink.
    pub fn silent() -> Self {
        Self::new(PreferenceStore::ephemeral(), Arc::new(LogSink))
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    /// Shared flag, read by consumers at dispatch time.
    pub fn enabled_flag(&self) -> Arc<AtomicBool> {
        self.enabled.clone()
    }

    /// Update the flag immediately and persist it.
    ///
    /// The in-memory flag changes even if persisting fails.
    pub fn set_enabled(&self, enabled: bool) -> Result<()> {
        self.enabled.store(enabled, Ordering::Release);
        debug!(subsystem = "sound", enabled, "Sound preference changed");
        self.prefs.save(enabled)
    }

    /// Flip the flag, returning the new value.
    pub fn toggle(&self) -> Result<bool> {
        let enabled = !self.is_enabled();
        self.set_enabled(enabled)?;
        Ok(enabled)
    }

    /// Play the chime regardless of the preference. Returns whether the sink
    /// accepted it; playback failures are logged, never propagated.
    pub fn play_chime(&self) -> bool {
        match self.sink.play(&self.chime, self.sample_rate) {
            Ok(()) => true,
            Err(e) => {
                warn!(subsystem = "sound", error = %e, "Chime playback failed");
                false
            }
        }
    }

    /// Play the chime if sound is enabled right now.
    pub fn chime_if_enabled(&self) -> bool {
        self.is_enabled() && self.play_chime()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[derive(Default)]
    struct CountingSink {
        plays: AtomicUsize,
        fail: bool,
    }

    impl AudioSink for CountingSink {
        fn play(&self, _samples: &[f32], _sample_rate: u32) -> Result<()> {
            if self.fail {
                return Err(Error::Internal("no audio device".into()));
            }
            self.plays.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn test_chime_shape() {
        let samples = synthesize_chime(1_000);
        assert_eq!(samples.len(), 120 + 180);
        assert!(samples.iter().all(|s| s.abs() <= CHIME_GAIN));
        assert_eq!(samples[0], 0.0);
        // Decayed near silence at the end of each tone.
        assert!(samples[119].abs() < 0.01);
        assert!(samples[299].abs() < 0.01);
    }

    #[test]
    fn test_preference_defaults_to_enabled() {
        let dir = tempfile::tempdir().unwrap();
        assert!(PreferenceStore::in_dir(dir.path()).load());
        assert!(PreferenceStore::ephemeral().load());
    }

    #[test]
    fn test_preference_persists_and_keeps_other_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(defaults::PREFERENCES_FILE);
        fs::write(&path, r#"{"theme":"dark"}"#).unwrap();

        let prefs = PreferenceStore::in_dir(dir.path());
        prefs.save(false).unwrap();
        assert!(!PreferenceStore::in_dir(dir.path()).load());

        let json: JsonValue = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(json["theme"], "dark");
        assert_eq!(json["notificationSoundEnabled"], false);
    }

    #[test]
    fn test_corrupt_preferences_fall_back_to_enabled() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(defaults::PREFERENCES_FILE), "not json").unwrap();
        assert!(PreferenceStore::in_dir(dir.path()).load());
    }

    #[test]
    fn test_save_creates_state_dir() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("gigboard");
        PreferenceStore::in_dir(&nested).save(true).unwrap();
        assert!(nested.join(defaults::PREFERENCES_FILE).exists());
    }

    #[test]
    fn test_engine_respects_flag_at_call_time() {
        let sink = Arc::new(CountingSink::default());
        let engine = SoundEngine::new(PreferenceStore::ephemeral(), sink.clone());

        assert!(engine.chime_if_enabled());
        engine.set_enabled(false).unwrap();
        assert!(!engine.chime_if_enabled());
        assert!(engine.toggle().unwrap());
        assert!(engine.chime_if_enabled());
        assert_eq!(sink.plays.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_engine_loads_persisted_preference() {
        let dir = tempfile::tempdir().unwrap();
        PreferenceStore::in_dir(dir.path()).save(false).unwrap();

        let engine = SoundEngine::new(PreferenceStore::in_dir(dir.path()), Arc::new(LogSink));
        assert!(!engine.is_enabled());
    }

    #[test]
    fn test_shared_flag_tracks_engine() {
        let engine = SoundEngine::silent();
        let flag = engine.enabled_flag();
        engine.set_enabled(false).unwrap();
        assert!(!flag.load(Ordering::Acquire));
    }

    #[test]
    fn test_playback_failure_is_swallowed() {
        let sink = Arc::new(CountingSink {
            plays: AtomicUsize::new(0),
            fail: true,
        });
        let engine = SoundEngine::new(PreferenceStore::ephemeral(), sink);
        assert!(!engine.chime_if_enabled());
    }
}
