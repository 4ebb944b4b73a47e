pub mod services;
pub mod value_objects;

pub use services::{classify, Classification, KeywordEntry, KeywordTable};
pub use value_objects::EmotionTag;
