pub(crate) mod emotion;
pub(crate) mod media;

pub(crate) use emotion::{EmotionAnalyzer, HttpEmotionClient};
pub(crate) use media::MediaStoreClient;
