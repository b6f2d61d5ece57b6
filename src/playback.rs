//! Playback controller: at most one clip plays at any time.

use std::{io, path::PathBuf};

use thiserror::Error;
use tracing::{debug, info};

use crate::{
    clips::{Clip, ClipLibrary},
    phone::DialedNumber,
};

#[derive(Debug, Error)]
pub enum PlaybackError {
    #[error("no audio output device available")]
    NoDevice,
    #[error("failed to open audio stream: {0}")]
    Stream(#[from] rodio::StreamError),
    #[error("failed to create audio sink: {0}")]
    Sink(#[from] rodio::PlayError),
    #[error("failed to open clip {path}: {source}")]
    Open { path: PathBuf, source: io::Error },
    #[error("failed to decode clip {path}: {source}")]
    Decode {
        path: PathBuf,
        source: rodio::decoder::DecoderError,
    },
    #[error("no answer clip configured")]
    NoAnswerClip,
}

/// The device side of playback.
pub trait AudioOutput {
    /// Replaces whatever is playing with `clip`.
    fn play(&mut self, clip: &Clip) -> Result<(), PlaybackError>;

    fn stop(&mut self);

    /// True once the last clip played to its end, or when nothing was started.
    fn is_finished(&self) -> bool;
}

pub struct PlaybackController<O: AudioOutput> {
    output: O,
    library: ClipLibrary,
    active: Option<Clip>,
}

impl<O: AudioOutput> PlaybackController<O> {
    pub fn new(output: O, library: ClipLibrary) -> Self {
        PlaybackController {
            output,
            library,
            active: None,
        }
    }

    pub fn library(&self) -> &ClipLibrary {
        &self.library
    }

    #[cfg(test)]
    pub fn active(&self) -> Option<&Clip> {
        self.active.as_ref()
    }

    pub fn is_playing(&self) -> bool {
        self.active.is_some() && !self.output.is_finished()
    }

    /// Stops the current clip, if any, and starts `clip`.
    pub fn start(&mut self, clip: &Clip) -> Result<(), PlaybackError> {
        self.stop();

        self.output.play(clip)?;
        info!(clip = %clip.name, "clip started");

        self.active = Some(clip.clone());
        Ok(())
    }

    pub fn stop(&mut self) {
        if let Some(clip) = self.active.take() {
            self.output.stop();
            debug!(clip = %clip.name, "clip stopped");
        }
    }

    /// Takes the active clip once it has played to its end.
    pub fn poll_finished(&mut self) -> Option<Clip> {
        if self.active.is_some() && self.output.is_finished() {
            let clip = self.active.take();
            if let Some(clip) = &clip {
                debug!(clip = %clip.name, "clip finished");
            }
            return clip;
        }

        None
    }

    /// Plays the clip mapped to `number`, or the busy signal.
    pub fn play_number(&mut self, number: &DialedNumber) -> Result<Clip, PlaybackError> {
        let clip = self.library.resolve_or_busy(number).clone();
        self.start(&clip)?;
        Ok(clip)
    }

    pub fn play_dial_tone(&mut self) -> Result<(), PlaybackError> {
        let clip = self.library.dial_tone().clone();
        self.start(&clip)
    }

    pub fn play_ring(&mut self) -> Result<(), PlaybackError> {
        let clip = self.library.ring().clone();
        self.start(&clip)
    }

    pub fn play_answer(&mut self) -> Result<Clip, PlaybackError> {
        let clip = self
            .library
            .answer()
            .cloned()
            .ok_or(PlaybackError::NoAnswerClip)?;
        self.start(&clip)?;
        Ok(clip)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::{cell::RefCell, rc::Rc};

    use super::*;

    #[derive(Debug, Default)]
    pub struct OutputLog {
        pub playing: Option<Clip>,
        pub started: Vec<Clip>,
        pub stops: usize,
        pub fail: bool,
    }

    /// In-memory output; clones share one log.
    #[derive(Debug, Clone, Default)]
    pub struct FakeOutput {
        log: Rc<RefCell<OutputLog>>,
    }

    impl FakeOutput {
        pub fn log(&self) -> std::cell::Ref<'_, OutputLog> {
            self.log.borrow()
        }

        pub fn playing(&self) -> Option<Clip> {
            self.log.borrow().playing.clone()
        }

        pub fn set_failing(&self, fail: bool) {
            self.log.borrow_mut().fail = fail;
        }

        /// Simulates the current clip reaching its end.
        pub fn finish(&self) {
            self.log.borrow_mut().playing = None;
        }
    }

    impl AudioOutput for FakeOutput {
        fn play(&mut self, clip: &Clip) -> Result<(), PlaybackError> {
            let mut log = self.log.borrow_mut();
            if log.fail {
                log.playing = None;
                return Err(PlaybackError::NoDevice);
            }
            log.playing = Some(clip.clone());
            log.started.push(clip.clone());
            Ok(())
        }

        fn stop(&mut self) {
            let mut log = self.log.borrow_mut();
            log.playing = None;
            log.stops += 1;
        }

        fn is_finished(&self) -> bool {
            self.log.borrow().playing.is_none()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{testing::FakeOutput, *};
    use crate::{hardware::tone::ToneKind, pulse::Digit};

    fn number(text: &str) -> DialedNumber {
        text.chars().map(|ch| Digit::try_from(ch).unwrap()).collect()
    }

    fn controller() -> (PlaybackController<FakeOutput>, FakeOutput) {
        let output = FakeOutput::default();
        let mut library = ClipLibrary::default();
        library.insert("5", Clip::file("5", "applause.wav", false));
        (PlaybackController::new(output.clone(), library), output)
    }

    #[test]
    fn start_replaces_the_active_clip() {
        let (mut playback, output) = controller();

        playback.play_dial_tone().unwrap();
        playback.play_number(&number("5")).unwrap();

        assert_eq!(output.log().started.len(), 2);
        assert_eq!(output.log().stops, 1);
        assert_eq!(playback.active().map(|clip| clip.name.as_str()), Some("5"));
        assert!(playback.is_playing());
    }

    #[test]
    fn stop_is_idempotent() {
        let (mut playback, output) = controller();
        playback.play_dial_tone().unwrap();

        playback.stop();
        let stops_after_first = output.log().stops;
        playback.stop();

        assert_eq!(output.log().stops, stops_after_first);
        assert!(!playback.is_playing());
        assert!(playback.active().is_none());
    }

    #[test]
    fn stop_when_silent_is_a_no_op() {
        let (mut playback, output) = controller();

        playback.stop();

        assert_eq!(output.log().stops, 0);
    }

    #[test]
    fn unknown_number_plays_busy() {
        let (mut playback, output) = controller();

        let clip = playback.play_number(&number("42")).unwrap();

        assert_eq!(clip.source, crate::clips::ClipSource::Tone(ToneKind::Busy));
        assert_eq!(output.playing(), Some(clip));
    }

    #[test]
    fn failed_start_leaves_nothing_active() {
        let (mut playback, output) = controller();
        playback.play_dial_tone().unwrap();
        output.set_failing(true);

        assert!(matches!(
            playback.play_number(&number("5")),
            Err(PlaybackError::NoDevice)
        ));
        assert!(playback.active().is_none());
        assert!(output.playing().is_none());
    }

    #[test]
    fn finished_clip_is_reported_once() {
        let (mut playback, output) = controller();
        playback.play_number(&number("5")).unwrap();

        assert!(playback.poll_finished().is_none());
        output.finish();

        assert_eq!(playback.poll_finished().map(|clip| clip.name), Some("5".to_owned()));
        assert!(playback.poll_finished().is_none());
    }

    #[test]
    fn answer_requires_a_clip() {
        let (mut playback, _) = controller();

        assert!(matches!(playback.play_answer(), Err(PlaybackError::NoAnswerClip)));
    }
}
