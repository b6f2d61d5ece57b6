use std::{fs::File, io::BufReader};

use cpal::traits::{DeviceTrait, HostTrait};
use rodio::{Decoder, OutputStream, OutputStreamHandle, Sink, Source};
use tracing::{info, warn};

use crate::{
    clips::{Clip, ClipSource},
    hardware::tone::Tone,
    playback::{AudioOutput, PlaybackError},
};

enum OutputState {
    Nothing,
    Stream {
        _stream: OutputStream,
        handle: OutputStreamHandle,
    },
}

/// Speaker output through rodio. The stream is opened lazily and reopened
/// after a failure, so a missing device only silences playback.
///
/// `OutputStream` is not `Send`; create this on the thread that uses it.
pub struct AudioDevice {
    device_name: Option<String>,
    output: OutputState,
    sink: Option<Sink>,
}

impl AudioDevice {
    pub fn create(device_name: Option<String>) -> AudioDevice {
        let mut audio_device = AudioDevice {
            device_name,
            output: OutputState::Nothing,
            sink: None,
        };

        if let Err(e) = audio_device.prepare_output() {
            warn!(error = %e, "audio output not ready, will retry on playback");
        }

        audio_device
    }

    fn prepare_output(&mut self) -> Result<&OutputStreamHandle, PlaybackError> {
        if let OutputState::Nothing = self.output {
            let device = self.new_output_device().ok_or(PlaybackError::NoDevice)?;
            let name = device.name().unwrap_or_else(|_| String::from("unknown"));

            let (stream, handle) = OutputStream::try_from_device(&device)?;
            info!(device = %name, "audio output opened");

            self.output = OutputState::Stream {
                _stream: stream,
                handle,
            };
        }

        match &self.output {
            OutputState::Stream { handle, .. } => Ok(handle),
            OutputState::Nothing => Err(PlaybackError::NoDevice),
        }
    }

    fn new_output_device(&self) -> Option<cpal::Device> {
        let host = cpal::default_host();

        match &self.device_name {
            Some(wanted) => host.output_devices().ok()?.find(|device| {
                device
                    .name()
                    .map(|name| name.contains(wanted.as_str()))
                    .unwrap_or(false)
            }),
            None => host.default_output_device(),
        }
    }

    fn new_sink(&mut self, clip: &Clip) -> Result<Sink, PlaybackError> {
        let handle = self.prepare_output()?;
        let sink = Sink::try_new(handle)?;

        match &clip.source {
            ClipSource::Tone(kind) => sink.append(Tone::new(*kind)),
            ClipSource::File(path) => {
                let file = File::open(path).map_err(|source| PlaybackError::Open {
                    path: path.clone(),
                    source,
                })?;
                let decoder =
                    Decoder::new(BufReader::new(file)).map_err(|source| PlaybackError::Decode {
                        path: path.clone(),
                        source,
                    })?;

                if clip.looping {
                    sink.append(decoder.buffered().repeat_infinite());
                } else {
                    sink.append(decoder);
                }
            }
        }

        Ok(sink)
    }
}

impl AudioOutput for AudioDevice {
    fn play(&mut self, clip: &Clip) -> Result<(), PlaybackError> {
        self.stop();

        match self.new_sink(clip) {
            Ok(sink) => {
                self.sink = Some(sink);
                Ok(())
            }
            Err(e) => {
                if matches!(e, PlaybackError::Stream(_) | PlaybackError::Sink(_)) {
                    self.output = OutputState::Nothing;
                }
                Err(e)
            }
        }
    }

    fn stop(&mut self) {
        if let Some(sink) = self.sink.take() {
            sink.stop();
        }
    }

    fn is_finished(&self) -> bool {
        self.sink.as_ref().map_or(true, Sink::empty)
    }
}
