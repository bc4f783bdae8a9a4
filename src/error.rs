use std::{error, fmt, io};

// -------------------------------------------------------------------------------------------------

/// Provides an enumeration of all possible errors reported by granade.
///
/// Real-time invariant violations (arena overflow, non power-of-two transform lengths, broken
/// LIFO order) are not errors but panics: they can't be recovered from in an audio callback.
#[derive(Debug)]
#[allow(clippy::enum_variant_names)]
pub enum Error {
    AudioFileNotFound,
    AudioDecodingError(Box<dyn error::Error + Send + Sync>),
    UnsupportedAudioFormat(String),
    PackfileFormatError(String),
    ParameterError(String),
    OutputDeviceError(Box<dyn error::Error + Send + Sync>),
    SendError(String),
    WorkerError(String),
    IoError(io::Error),
}

impl error::Error for Error {}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AudioFileNotFound => write!(f, "Audio file not found"),
            Self::AudioDecodingError(err) | Self::OutputDeviceError(err) => err.fmt(f),
            Self::UnsupportedAudioFormat(str) => write!(f, "Unsupported audio format: {str}"),
            Self::PackfileFormatError(str) => write!(f, "Malformed grain packfile: {str}"),
            Self::ParameterError(str) => write!(f, "Invalid parameter: {str}"),
            Self::SendError(str) => write!(f, "Failed to send command: {str}"),
            Self::WorkerError(str) => write!(f, "Audio worker failed: {str}"),
            Self::IoError(err) => err.fmt(f),
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Error {
        if err.kind() == io::ErrorKind::NotFound {
            Error::AudioFileNotFound
        } else {
            Error::IoError(err)
        }
    }
}

impl<T> From<crossbeam_channel::SendError<T>> for Error {
    fn from(err: crossbeam_channel::SendError<T>) -> Self {
        Error::SendError(err.to_string())
    }
}

// -------------------------------------------------------------------------------------------------
