use thiserror::Error;

#[derive(Error, Debug)]
pub enum AudioError {
    #[error("No audio output device available")]
    NoOutputDevice,

    #[error("No output device named {0}")]
    DeviceNotFound(String),

    #[error("Could not list output devices: {0}")]
    Enumerate(#[from] cpal::DevicesError),

    #[error("Could not query device configurations: {0}")]
    QueryConfigs(#[from] cpal::SupportedStreamConfigsError),

    /// The device reports no output configuration at all
    #[error("Device has no output configuration")]
    NoOutputConfig,

    #[error("Device only offers {0:?} output; f32 is required")]
    UnsupportedFormat(cpal::SampleFormat),

    #[error("Could not open output stream: {0}")]
    BuildStream(#[from] cpal::BuildStreamError),

    #[error("Could not start output stream: {0}")]
    PlayStream(#[from] cpal::PlayStreamError),

    /// The output thread could not be spawned or exited before the stream opened
    #[error("Audio output thread failed: {0}")]
    OutputThread(String),

    /// The renderer is not draining the command queue fast enough
    #[error("Audio command queue is full")]
    CommandQueueFull,

    #[error("Audio context renders to a device, not offline")]
    NotOffline,
}

pub type AudioResult<T> = Result<T, AudioError>;
