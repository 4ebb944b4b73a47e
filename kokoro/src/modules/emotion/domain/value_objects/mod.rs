mod emotion;

pub use emotion::EmotionTag;
