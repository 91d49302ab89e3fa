//! 本地词频查询
//!
//! 从本地 JSON 词典读取词频数据，输出可排序的排名字符串。
//! 未配置词典或查不到的词一律返回默认排名 "999999"，保证字段总有值。

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::cache::key::frequency_key;

/// 查不到词频时的兜底排名，排在所有真实排名之后
pub const DEFAULT_RANK: &str = "999999";

/// 词典中单个词条的频率信息
///
/// 三个字段都可缺省，按 rank > zipf_score > frequency 的优先级取用。
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FrequencyEntry {
    #[serde(default)]
    pub rank: Option<u64>,
    #[serde(default)]
    pub frequency: f64,
    #[serde(default)]
    pub zipf_score: Option<f64>,
}

/// 本地词频服务
///
/// 支持三种词典格式：
/// - 排名表：`[{"id": 1, "word": "the"}, ...]`，id 即排名
/// - 词条数组：`[{"word": "the", "frequency": 0.05}, ...]`
/// - 词条映射：`{"the": {"rank": 1, "zipf_score": 7.3}, ...}`
pub struct FrequencyService {
    dict: HashMap<String, FrequencyEntry>,
}

impl FrequencyService {
    /// 同步加载词典，任何加载失败都降级为空词典
    pub fn new(dict_path: &str) -> Self {
        let mut service = Self {
            dict: HashMap::new(),
        };

        if dict_path.is_empty() {
            info!("未配置本地词频词典，所有查询返回默认排名");
            return service;
        }

        let path = Path::new(dict_path);
        if !path.exists() {
            warn!("⚠️ 词频词典文件不存在: {}", dict_path);
            return service;
        }

        match std::fs::read_to_string(path) {
            Ok(content) => match serde_json::from_str::<Value>(&content) {
                Ok(value) => {
                    service.dict = parse_dictionary(value);
                    info!("✅ 已加载本地词频词典: {} 个词条", service.dict.len());
                }
                Err(e) => error!("❌ 词频词典解析失败 ({}): {}", dict_path, e),
            },
            Err(e) => error!("❌ 词频词典读取失败 ({}): {}", dict_path, e),
        }

        service
    }

    /// 查询排名字符串，优先用词典原形，查不到时退回单词本身
    pub fn rank(&self, word: &str, lemma: Option<&str>) -> String {
        let search = frequency_key(word, lemma);
        if search.is_empty() {
            return DEFAULT_RANK.to_string();
        }

        let entry = match self.dict.get(&search) {
            Some(entry) => entry,
            None => {
                debug!("词频词典未收录: {}", search);
                return DEFAULT_RANK.to_string();
            }
        };

        if let Some(rank) = entry.rank {
            return rank.to_string();
        }

        if let Some(zipf) = entry.zipf_score {
            if zipf > 0.0 {
                let rounded = (zipf * 100.0).round() / 100.0;
                return format!("zipf {}", rounded);
            }
        }

        if entry.frequency > 0.0 {
            let estimated = (1.0 / entry.frequency) as i64;
            return estimated.clamp(1, 999_999).to_string();
        }

        DEFAULT_RANK.to_string()
    }

    pub fn entry_count(&self) -> usize {
        self.dict.len()
    }
}

/// 识别词典格式并统一成 word -> FrequencyEntry 映射
fn parse_dictionary(value: Value) -> HashMap<String, FrequencyEntry> {
    match value {
        Value::Array(items) => {
            let is_rank_list = items
                .first()
                .map(|item| item.get("id").is_some() && item.get("word").is_some())
                .unwrap_or(false);

            let mut dict = HashMap::new();
            for item in items {
                let word = match item.get("word").and_then(Value::as_str) {
                    Some(w) => w.to_lowercase(),
                    None => continue,
                };

                let entry = if is_rank_list {
                    let id = match item.get("id").and_then(Value::as_u64) {
                        Some(id) if id > 0 => id,
                        _ => continue,
                    };
                    FrequencyEntry {
                        rank: Some(id),
                        frequency: 1.0 / id as f64,
                        zipf_score: None,
                    }
                } else {
                    match serde_json::from_value(item) {
                        Ok(entry) => entry,
                        Err(_) => continue,
                    }
                };

                dict.insert(word, entry);
            }
            dict
        }
        Value::Object(map) => map
            .into_iter()
            .filter_map(|(word, data)| {
                serde_json::from_value::<FrequencyEntry>(data)
                    .ok()
                    .map(|entry| (word.to_lowercase(), entry))
            })
            .collect(),
        _ => {
            warn!("⚠️ 词频词典格式无法识别，按空词典处理");
            HashMap::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service_with(entries: Vec<(&str, FrequencyEntry)>) -> FrequencyService {
        FrequencyService {
            dict: entries
                .into_iter()
                .map(|(w, e)| (w.to_string(), e))
                .collect(),
        }
    }

    #[test]
    fn test_rank_takes_precedence() {
        let service = service_with(vec![(
            "run",
            FrequencyEntry {
                rank: Some(120),
                frequency: 0.5,
                zipf_score: Some(6.1),
            },
        )]);

        assert_eq!(service.rank("run", None), "120");
    }

    #[test]
    fn test_zipf_formatting() {
        let service = service_with(vec![(
            "happen",
            FrequencyEntry {
                rank: None,
                frequency: 0.0,
                zipf_score: Some(5.1234),
            },
        )]);

        assert_eq!(service.rank("happen", None), "zipf 5.12");
    }

    #[test]
    fn test_frequency_inverts_and_clamps() {
        let service = service_with(vec![
            (
                "the",
                FrequencyEntry {
                    rank: None,
                    frequency: 0.05,
                    zipf_score: None,
                },
            ),
            (
                "rare",
                FrequencyEntry {
                    rank: None,
                    frequency: 0.0000000001,
                    zipf_score: None,
                },
            ),
        ]);

        assert_eq!(service.rank("the", None), "20");
        assert_eq!(service.rank("rare", None), "999999");
    }

    #[test]
    fn test_missing_word_and_empty_input_default() {
        let service = service_with(vec![]);

        assert_eq!(service.rank("unknown", None), DEFAULT_RANK);
        assert_eq!(service.rank("", None), DEFAULT_RANK);
        assert_eq!(service.rank("   ", Some("  ")), DEFAULT_RANK);
    }

    #[test]
    fn test_lemma_preferred_over_surface_form() {
        let service = service_with(vec![(
            "run",
            FrequencyEntry {
                rank: Some(120),
                frequency: 0.0,
                zipf_score: None,
            },
        )]);

        assert_eq!(service.rank("running", Some("run")), "120");
        assert_eq!(service.rank("Run", Some("")), "120");
    }

    #[test]
    fn test_parse_rank_list_format() {
        let value = serde_json::json!([
            {"id": 1, "word": "THE"},
            {"id": 2, "word": "Be"},
            {"word": "broken"},
        ]);

        let dict = parse_dictionary(value);
        assert_eq!(dict.len(), 2);
        assert_eq!(dict["the"].rank, Some(1));
        assert_eq!(dict["be"].rank, Some(2));
        assert!((dict["be"].frequency - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_parse_entry_array_format() {
        let value = serde_json::json!([
            {"word": "cat", "frequency": 0.001},
            {"word": "dog", "zipf_score": 4.5},
        ]);

        let dict = parse_dictionary(value);
        assert_eq!(dict.len(), 2);
        assert!(dict["cat"].rank.is_none());
        assert_eq!(dict["dog"].zipf_score, Some(4.5));
    }

    #[test]
    fn test_parse_mapping_format() {
        let value = serde_json::json!({
            "Cat": {"rank": 300},
            "dog": {"frequency": 0.002},
        });

        let dict = parse_dictionary(value);
        assert_eq!(dict.len(), 2);
        assert_eq!(dict["cat"].rank, Some(300));
        assert!((dict["dog"].frequency - 0.002).abs() < 1e-9);
    }

    #[test]
    fn test_unrecognized_format_is_empty() {
        let dict = parse_dictionary(serde_json::json!("not a dict"));
        assert!(dict.is_empty());
    }
}
