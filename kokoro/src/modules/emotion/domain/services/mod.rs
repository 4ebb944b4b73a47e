mod classifier;

pub use classifier::{classify, Classification, KeywordEntry, KeywordTable};
