use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 情绪类型
///
/// 值对象：表示从文本流中检测到的情绪状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmotionTag {
    /// 中性
    Neutral,
    /// 开心
    Happy,
    /// 生气
    Angry,
    /// 伤心
    Sad,
    /// 惊讶
    Surprised,
    /// 害羞
    Shy,
    /// 害怕
    Afraid,
}

impl EmotionTag {
    /// 获取所有可用的情绪类型
    pub fn all() -> &'static [EmotionTag] {
        &[
            EmotionTag::Neutral,
            EmotionTag::Happy,
            EmotionTag::Angry,
            EmotionTag::Sad,
            EmotionTag::Surprised,
            EmotionTag::Shy,
            EmotionTag::Afraid,
        ]
    }

    /// 转换为表情名称（用于模型表情映射）
    pub fn to_expression_name(&self) -> &'static str {
        match self {
            EmotionTag::Neutral => "neutral",
            EmotionTag::Happy => "smile",
            EmotionTag::Angry => "angry",
            EmotionTag::Sad => "sad",
            EmotionTag::Surprised => "surprised",
            EmotionTag::Shy => "shy",
            EmotionTag::Afraid => "afraid",
        }
    }
}

impl Default for EmotionTag {
    fn default() -> Self {
        Self::Neutral
    }
}

impl fmt::Display for EmotionTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EmotionTag::Neutral => "neutral",
            EmotionTag::Happy => "happy",
            EmotionTag::Angry => "angry",
            EmotionTag::Sad => "sad",
            EmotionTag::Surprised => "surprised",
            EmotionTag::Shy => "shy",
            EmotionTag::Afraid => "afraid",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for EmotionTag {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "neutral" => Ok(EmotionTag::Neutral),
            "happy" => Ok(EmotionTag::Happy),
            "angry" => Ok(EmotionTag::Angry),
            "sad" => Ok(EmotionTag::Sad),
            "surprised" => Ok(EmotionTag::Surprised),
            "shy" => Ok(EmotionTag::Shy),
            "afraid" => Ok(EmotionTag::Afraid),
            _ => Err(format!("Unknown emotion: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emotion_round_trip() {
        for tag in EmotionTag::all() {
            let parsed: EmotionTag = tag.to_string().parse().unwrap();
            assert_eq!(parsed, *tag);
        }
    }

    #[test]
    fn test_emotion_to_expression() {
        assert_eq!(EmotionTag::Happy.to_expression_name(), "smile");
        assert_eq!(EmotionTag::Neutral.to_expression_name(), "neutral");
    }
}
