// Emotion Classifier - 情绪分类
//
// 纯函数式关键词加权打分。对同样的输入永远给出同样的结果，
// 平分时由表的声明顺序决定胜者。

use std::time::Duration;

use super::super::value_objects::EmotionTag;

/// 单个情绪的关键词配置
#[derive(Debug, Clone)]
pub struct KeywordEntry {
    pub tag: EmotionTag,
    pub keywords: Vec<String>,
    /// 加权系数，默认 1.0
    pub weight: f32,
    /// 情绪保持时长（秒），默认 1.0
    pub hold_secs: f32,
}

impl KeywordEntry {
    pub fn new(tag: EmotionTag, keywords: &[&str], weight: f32, hold_secs: f32) -> Self {
        Self {
            tag,
            keywords: keywords.iter().map(|s| s.to_string()).collect(),
            weight,
            hold_secs,
        }
    }
}

/// 情绪关键词表
///
/// 条目顺序即声明顺序：加权得分相同的情绪，先声明者获胜。
#[derive(Debug, Clone)]
pub struct KeywordTable {
    entries: Vec<KeywordEntry>,
}

impl KeywordTable {
    pub fn new(entries: Vec<KeywordEntry>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &[KeywordEntry] {
        &self.entries
    }

    pub fn weight(&self, tag: EmotionTag) -> f32 {
        self.entries
            .iter()
            .find(|e| e.tag == tag)
            .map_or(1.0, |e| e.weight)
    }

    /// 情绪保持时长；未配置的情绪（含中性）为 1 秒
    pub fn hold_duration(&self, tag: EmotionTag) -> Duration {
        let secs = self
            .entries
            .iter()
            .find(|e| e.tag == tag)
            .map_or(1.0, |e| e.hold_secs);
        Duration::from_secs_f32(secs)
    }

    /// 追加关键词；尚无该情绪条目时在表尾新建（声明顺序排最后）
    pub fn add_keywords(&mut self, tag: EmotionTag, keywords: Vec<String>) {
        if let Some(entry) = self.entries.iter_mut().find(|e| e.tag == tag) {
            entry.keywords.extend(keywords);
        } else {
            self.entries.push(KeywordEntry {
                tag,
                keywords,
                weight: 1.0,
                hold_secs: 1.0,
            });
        }
    }

    pub fn set_weight(&mut self, tag: EmotionTag, weight: f32) {
        if let Some(entry) = self.entries.iter_mut().find(|e| e.tag == tag) {
            entry.weight = weight;
        }
    }

    pub fn set_hold_duration(&mut self, tag: EmotionTag, hold_secs: f32) {
        if let Some(entry) = self.entries.iter_mut().find(|e| e.tag == tag) {
            entry.hold_secs = hold_secs;
        }
    }
}

impl Default for KeywordTable {
    fn default() -> Self {
        Self::new(vec![
            KeywordEntry::new(
                EmotionTag::Happy,
                &[
                    "开心", "高兴", "快乐", "哈哈", "呵呵", "嘻嘻", "笑", "😊", "🙂", "😄", "😃",
                    "happy", "太好了", "棒极了", "太棒了", "完美", "优秀", "赞", "不错", "兴奋",
                    "愉快", "欢乐", "欣喜", "喜悦", "满足", "欣慰",
                ],
                1.0,
                2.0,
            ),
            KeywordEntry::new(
                EmotionTag::Angry,
                &[
                    "生气", "愤怒", "讨厌", "气死", "恼火", "怒", "😠", "😡", "mad", "angry",
                    "混蛋", "可恶", "烦死了", "气人", "气愤", "愤慨", "恼怒", "暴躁", "火大",
                    "不爽", "郁闷", "窝火", "愤愤不平",
                ],
                1.2,
                1.5,
            ),
            KeywordEntry::new(
                EmotionTag::Sad,
                &[
                    "伤心", "难过", "悲伤", "哭", "😢", "😭", "😞", "😔", "sad", "cry", "痛苦",
                    "心痛", "心疼", "遗憾", "哀伤", "悲痛", "忧伤", "沮丧", "失落", "绝望",
                    "哀愁", "悲戚",
                ],
                1.1,
                3.0,
            ),
            KeywordEntry::new(
                EmotionTag::Surprised,
                &[
                    "惊讶", "震惊", "哇", "天啊", "不会吧", "😮", "😲", "😯", "wow", "amazing",
                    "真的吗", "难以置信", "太意外了", "吃惊", "诧异", "惊奇", "意外", "惊愕",
                    "目瞪口呆", "大吃一惊",
                ],
                1.3,
                1.0,
            ),
            KeywordEntry::new(
                EmotionTag::Shy,
                &[
                    "害羞", "不好意思", "脸红", "羞涩", "😳", "shy", "embarrassed", "羞羞",
                    "难为情", "腼腆", "忸怩", "局促", "羞怯", "羞赧",
                ],
                0.9,
                2.5,
            ),
            KeywordEntry::new(
                EmotionTag::Afraid,
                &[
                    "害怕", "恐惧", "怕", "吓人", "😨", "😰", "scared", "afraid", "恐怖", "可怕",
                    "吓死了", "畏惧", "恐慌", "忧虑", "担心", "不安", "紧张", "惊恐", "胆怯",
                ],
                1.0,
                2.0,
            ),
        ])
    }
}

/// 分类结果
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub tag: EmotionTag,
    pub intensity: f32,
    /// 命中的关键词，每次出现记一条
    pub matched_keywords: Vec<String>,
}

impl Classification {
    fn neutral() -> Self {
        Self {
            tag: EmotionTag::Neutral,
            intensity: 1.0,
            matched_keywords: Vec::new(),
        }
    }
}

/// 对文本做情绪分类
///
/// 对每个非中性情绪统计其关键词在文本中不区分大小写的出现次数
/// （同一关键词出现两次计 2 分），原始得分乘以权重得到加权得分。
/// 全部为零时返回 `(Neutral, 1.0)`；否则取加权得分最高者，
/// 平分时取表中先声明的情绪。
/// 强度 = `min(raw / 3.0, 2.0) * weight`，截断到 `[0, 2]`。
pub fn classify(text: &str, table: &KeywordTable) -> Classification {
    if text.trim().is_empty() {
        return Classification::neutral();
    }

    let lower = text.to_lowercase();
    let mut best: Option<(f32, u32, f32, Vec<String>, EmotionTag)> = None;

    for entry in table.entries() {
        if entry.tag == EmotionTag::Neutral {
            continue;
        }
        let mut raw: u32 = 0;
        let mut matched = Vec::new();
        for keyword in &entry.keywords {
            let needle = keyword.to_lowercase();
            if needle.is_empty() {
                continue;
            }
            let count = lower.matches(needle.as_str()).count() as u32;
            if count > 0 {
                raw += count;
                for _ in 0..count {
                    matched.push(keyword.clone());
                }
            }
        }
        if raw == 0 {
            continue;
        }
        let weighted = raw as f32 * entry.weight;
        // 严格大于：平分时保留先声明的条目
        let replace = best.as_ref().map_or(true, |(bw, ..)| weighted > *bw);
        if replace {
            best = Some((weighted, raw, entry.weight, matched, entry.tag));
        }
    }

    match best {
        None => Classification::neutral(),
        Some((_, raw, weight, matched_keywords, tag)) => {
            let intensity = ((raw as f32 / 3.0).min(2.0) * weight).clamp(0.0, 2.0);
            Classification {
                tag,
                intensity,
                matched_keywords,
            }
        }
    }
}
