pub mod channel;
pub mod encoder;
pub mod wav;

pub use channel::{
    safe_file_component, ChannelFiles, ChannelId, ChannelPipeline, ChannelReport, MixedReport,
    PipelineReport, MIXED_FILE_NAME,
};
pub use encoder::{AudioEncoder, EncodeError, EncoderFactory, FfmpegEncoder, NativeEncoder};
