//! LLM 提示词与标签白名单
//!
//! 提示词要求模型只返回固定 schema 的 JSON，由三部分拼接而成：
//! 严格模式说明、逐字段的生成指引、防幻觉规则。
//! 标签白名单同时以有序切片（拼接提示词用）和哈希集合（过滤用）两种形式给出，
//! 两者内容必须一致，由单元测试保证。

use phf::phf_set;
use serde_json::json;

/// 允许写入 Anki 的标签（有序，用于提示词中列举可选值）
pub const ALLOWED_TAGS: &[&str] = &[
    "A2", "B1", "B2", "C1", "C2",
    "noun", "verb", "adj", "adv", "prep", "conj", "intj",
    "business", "everyday", "academic", "technical", "emotional", "phrasal", "idiom", "slang",
    "collocation",
    "formal", "informal", "neutral", "rude",
];

/// 允许写入 Anki 的标签（哈希集合，用于快速成员检查）
static ALLOWED_TAG_SET: phf::Set<&'static str> = phf_set! {
    "A2", "B1", "B2", "C1", "C2",
    "noun", "verb", "adj", "adv", "prep", "conj", "intj",
    "business", "everyday", "academic", "technical", "emotional", "phrasal", "idiom", "slang",
    "collocation",
    "formal", "informal", "neutral", "rude",
};

/// 过滤掉白名单之外的标签，保留原有顺序（区分大小写）
pub fn filter_allowed_tags(tags: &[String]) -> Vec<String> {
    tags.iter()
        .filter(|tag| ALLOWED_TAG_SET.contains(tag.as_str()))
        .cloned()
        .collect()
}

const STRICT_RULES_HEAD: &str = r#"Return ONLY valid JSON, no text outside JSON. No markdown. No comments.
Schema:
{
  "definition": "string (5–10 words, short English definition)",
  "definition_ru": "string (5–10 words, natural Russian equivalent)",
  "ipa": "string (IPA transcription, no slashes/brackets)",
  "lemma": "string (dictionary base form, lowercase)",
  "collocations": "string (≤5 items, '<i>english</i> — русский', joined with <br>)",
  "synonyms": "string (≤3 items, 'eng — short explanation (русский)', joined with <br>)",
  "antonyms": "string (≤3 items, same format as synonyms)",
  "related_forms": "string (2–4 lines, 'pos: форма = перевод', joined with <br>. If irregular verb: 'verb: base — past — past participle = перевод'. If regular verb: include base + past + past participle with -ed. Nouns only singular. No duplicate POS.)",
  "examples": "string (2 short dialogs, each with two lines A:/B:, joined with <br>)",
  "hint": "string (short Russian explanation of the word’s meaning in the given sentence/context)",
  "tags": ["string", "string", ...]
}

Rules:
- Keys exactly as in schema. All fields MUST be present.
- All strings UTF-8, no escaped unicode. No HTML except <i> in collocations and <br> where specified.
- definition: neutral register, no headword repetition, no examples/brackets.
- definition_ru: one concise natural equivalent, no slashes/alternatives.
- ipa: BrE by default; if context clearly American, use AmE. Primary stress required. No / / or [ ].
- lemma: lowercase base form (verbs: base; nouns: singular; adjectives/adverbs: base). Keep inherent hyphens.
- collocations: 3–5 attested patterns (adj+noun, noun+of, verb+object, fixed phrase). Format '<i>english</i> — русский', joined with <br>.
- synonyms: up to 3, SAME POS and sense as headword. Format 'eng — short explanation (русский)', joined with <br>.
- antonyms: up to 3 true opposites for SAME POS and sense. Same format as synonyms.
- related_forms: 2–4 derivational/morphological relatives, no duplicates of headword. One verb line with principal parts when applicable. Join with <br>.
- examples: exactly 2 dialogs × 2 lines (A:/B:). Each EN line ≤14 words and ends with ' — RU'. Join all lines with <br>. No names or profanity.
- hint: 1–2 Russian sentences, explain the exact sense used in `sentence`.
- tags: 3–4 items total. Exactly ONE CEFR level (A2/B1/B2/C1/C2). Other tags ONLY from: "#;

const STRICT_RULES_TAIL: &str = ". Use 'everyday' ONLY for core daily vocabulary; use 'academic'/'technical' ONLY when clearly applicable. No duplicates.\n";

/// 每个生成字段的详细指引，按 (llm_key, 指引) 排列
const FIELD_GUIDES: &[(&str, &str)] = &[
    (
        "definition",
        "Output: short English definition (5–10 words). \
         Target sense = the one used in `sentence`; if unclear, use the most common literal sense. \
         Same POS as the headword. No examples, no synonyms, no idioms, no brackets. \
         Avoid circularity (do not repeat the headword). Keep register neutral/formal.",
    ),
    (
        "definition_ru",
        "Output: one concise Russian equivalent (5–10 words). \
         Natural, not telegraphic. No multiple options, no slashes, no brackets. \
         Match the chosen English sense from `definition`. No transliteration.",
    ),
    (
        "ipa",
        "Output: IPA transcription for the headword. \
         BrE by default; if the sentence/context is clearly American, use AmE. \
         No slashes or brackets. Single token if possible; keep hyphens/apostrophes only if in the word. \
         Mark primary stress. If uncertain, return empty string.",
    ),
    (
        "lemma",
        "Output: dictionary base form in lowercase. \
         Verbs → base (go), nouns → singular (precinct), adjectives/adverbs → base form. \
         Strip plural/conjugational endings; keep hyphens if inherent. No POS labels, just the lemma.",
    ),
    (
        "collocations",
        "Output: 3–5 idiomatic, frequent collocations that native speakers actually use. \
         Prefer patterns: adjective+noun, noun+of, verb+object, fixed expressions. \
         Do NOT invent niche phrases. No duplicates. \
         Format each as '<i>english</i> — русский', join with <br>. \
         Keep same sense as in `sentence`. Lowercase unless proper nouns.",
    ),
    (
        "synonyms",
        "Output: up to 3 synonyms of the SAME POS and sense. \
         Prioritize common, learner-friendly words. Avoid multiword paraphrases unless standard (e.g., 'drug addict'). \
         No rare archaisms. No register shift unless intended (mark it in Russian note). \
         Format: 'eng — short explanation (русский)', join with <br>.",
    ),
    (
        "antonyms",
        "Output: up to 3 true antonyms for the SAME POS and sense. \
         If no real antonym exists, return empty string. No negated forms with prefixes as fake antonyms unless conventional (e.g., 'legal' vs 'illegal'). \
         Format: 'eng — short explanation (русский)', join with <br>.",
    ),
    (
        "related_forms",
        "Output: 2–4 derivational/morphological relatives, no duplicates of the headword. \
         Cover different POS where possible (noun/verb/adj/adv). \
         If the headword is a verb: \
          - irregular → one line: 'verb: base — past — past participle = перевод'. \
          - regular → one line: 'verb: base — past — past participle = перевод' with -ed. \
         Nouns only singular; adjectives → adverb (-ly) where applicable. \
         Each line strictly 'pos: форма = перевод'; join with <br>.",
    ),
    (
        "examples",
        "Output: two short mini-dialogs (spoken style). \
         Each dialog has exactly two lines: 'A: … — …(RU)' and 'B: … — …(RU)'. \
         Use the target word naturally in context and sense from `sentence`. \
         Keep each line ≤12–14 words EN. Join all lines with <br>. No profanity, no names.",
    ),
    (
        "hint",
        "Output: 1–2 Russian sentences. \
         Explain the exact meaning used in `sentence`, disambiguate if multiple senses exist, and note register (slang/formal/technical) if relevant. \
         No lists, no alternative meanings. Be specific and brief.",
    ),
    (
        "tags",
        "Output: 3–4 tags. Exactly one CEFR level (A2/B1/B2/C1/C2). \
         Heuristics: function words, core daily actions/objects → A2/B1; common concrete nouns/verbs/adj → B1/B2; abstract/formal/academic/technical → C1/C2; slang/taboo → ≥B2. \
         Add 2–3 topical/style tags ONLY from ALLOWED_TAGS. \
         Use 'everyday' ONLY for core daily vocabulary; use 'academic'/'technical' ONLY when clearly applicable. \
         No duplicates.",
    ),
];

const ANTI_HALLUCINATION_RULES: &str = "\
If unsure about any field, return an empty string for that field.
Keep POS alignment across definition/synonyms/antonyms/collocations.
Prefer common, attested phrases; do not coin collocations.
For CEFR: if uncertain between two levels, choose the HIGHER level (avoid underestimation).
";

/// 组装完整的系统提示词
pub fn system_prompt() -> String {
    let mut prompt = String::with_capacity(8 * 1024);
    prompt.push_str(STRICT_RULES_HEAD);
    prompt.push_str(&ALLOWED_TAGS.join(", "));
    prompt.push_str(STRICT_RULES_TAIL);

    prompt.push_str("\n\nField guides:\n");
    for (key, guide) in FIELD_GUIDES {
        prompt.push_str("- ");
        prompt.push_str(key);
        prompt.push_str(": ");
        prompt.push_str(guide);
        prompt.push('\n');
    }

    prompt.push_str("\nAnti-hallucination:\n");
    prompt.push_str(ANTI_HALLUCINATION_RULES);
    prompt
}

/// 组装用户提示词（JSON 形式的任务描述）
pub fn user_prompt(word: &str, sentence: &str) -> String {
    json!({
        "task": "generateWordData",
        "word": word,
        "sentence": sentence,
        "requirements": [
            "Ответь только валидным JSON",
            "Все поля обязательны",
            "Используй указанное значение слова из sentence",
            "Сохраняй HTML разметку только где указано",
            "Не изобретай коллокации - используй проверенные"
        ]
    })
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_slice_and_set_agree() {
        assert_eq!(ALLOWED_TAGS.len(), ALLOWED_TAG_SET.len());
        for tag in ALLOWED_TAGS {
            assert!(ALLOWED_TAG_SET.contains(tag), "集合缺少标签: {}", tag);
        }
    }

    #[test]
    fn test_filter_allowed_tags() {
        let tags = vec![
            "B2".to_string(),
            "verb".to_string(),
            "nonsense".to_string(),
            "b2".to_string(),
        ];
        let filtered = filter_allowed_tags(&tags);
        assert_eq!(filtered, vec!["B2".to_string(), "verb".to_string()]);
    }

    #[test]
    fn test_system_prompt_structure() {
        let prompt = system_prompt();
        assert!(prompt.starts_with("Return ONLY valid JSON"));
        assert!(prompt.contains("Field guides:"));
        assert!(prompt.contains("Anti-hallucination:"));
        assert!(prompt.contains("formal, informal, neutral, rude"));
        for (key, _) in FIELD_GUIDES {
            assert!(prompt.contains(&format!("- {}: ", key)), "缺少字段指引: {}", key);
        }
    }

    #[test]
    fn test_user_prompt_is_valid_json() {
        let prompt = user_prompt("run", "He runs every morning.");
        let parsed: serde_json::Value = serde_json::from_str(&prompt).unwrap();
        assert_eq!(parsed["task"], "generateWordData");
        assert_eq!(parsed["word"], "run");
        assert_eq!(parsed["sentence"], "He runs every morning.");
        assert!(parsed["requirements"].is_array());
    }
}
