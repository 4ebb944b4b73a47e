mod session;

pub use session::{
    EmotionRecord, EmotionSession, EmotionStatistics, EmotionTagStats, MAX_EMOTION_HISTORY,
};
