// Emotion Module - 情绪模块
//
// - domain: 情绪值对象与纯函数分类器
// - application: 有状态的情绪会话（衰减、历史、事件发布）

pub mod application;
pub mod domain;

pub use application::{
    EmotionRecord, EmotionSession, EmotionStatistics, EmotionTagStats, MAX_EMOTION_HISTORY,
};
pub use domain::{classify, Classification, EmotionTag, KeywordEntry, KeywordTable};
