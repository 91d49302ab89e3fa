//! 多表 JSON 缓存存储
//!
//! 四张表全部驻留内存，启动时从缓存目录加载，按需整体写回：
//!
//! | 表 | 文件 | 键 |
//! |---|---|---|
//! | 笔记原始数据 | notes_raw.json | 笔记 ID |
//! | LLM 生成结果 | openai_results.json | 单词+例句 |
//! | 词频 | freq.json | 词典原形（退回单词） |
//! | 处理记录 | processing_results.json | 笔记 ID+单词+例句 |
//!
//! 缓存文件损坏时按空表处理并记录警告，绝不让缓存问题中断处理。
//! 表的读写用同步读写锁保护，序列化在锁内完成，文件 IO 在锁外进行。
//! 持锁代码 panic 留下的中毒锁照常取用，不让单个任务崩溃拖垮后续任务。

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};

use tokio::fs;
use tracing::{debug, error, info, warn};

use crate::cache::key;
use crate::error::{AppError, AppResult};
use crate::models::{AnkiNote, LlmWordData, ProcessingRecord};

const NOTES_FILE: &str = "notes_raw.json";
const GENERATED_FILE: &str = "openai_results.json";
const FREQ_FILE: &str = "freq.json";
const PROCESSED_FILE: &str = "processing_results.json";
const AUDIO_DIR: &str = "audio";

/// 可清空的缓存表
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheKind {
    Notes,
    Generated,
    Freq,
    Processed,
    All,
}

impl fmt::Display for CacheKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheKind::Notes => write!(f, "笔记"),
            CacheKind::Generated => write!(f, "生成结果"),
            CacheKind::Freq => write!(f, "词频"),
            CacheKind::Processed => write!(f, "处理记录"),
            CacheKind::All => write!(f, "全部"),
        }
    }
}

/// 缓存统计
#[derive(Debug, Clone)]
pub struct CacheStats {
    pub notes: usize,
    pub generated: usize,
    pub freq: usize,
    pub processed: usize,
    pub audio_files: usize,
    pub dir_size_mb: f64,
}

/// 多表 JSON 缓存存储
pub struct CacheStore {
    cache_dir: PathBuf,
    audio_dir: PathBuf,
    notes_path: PathBuf,
    generated_path: PathBuf,
    freq_path: PathBuf,
    processed_path: PathBuf,

    notes: RwLock<HashMap<i64, AnkiNote>>,
    generated: RwLock<HashMap<String, LlmWordData>>,
    freq: RwLock<HashMap<String, String>>,
    processed: RwLock<HashMap<String, ProcessingRecord>>,
}

/// 取出锁守卫，锁中毒时照常返回表数据
///
/// 每张表的单次操作都是完整的插入或读取，不存在跨语句的中间状态，
/// 中毒后的表数据仍然可用。
fn recover<G>(result: Result<G, PoisonError<G>>) -> G {
    result.unwrap_or_else(PoisonError::into_inner)
}

impl CacheStore {
    /// 创建缓存存储并确保缓存目录存在
    pub fn new(cache_dir: impl Into<PathBuf>) -> AppResult<Self> {
        let cache_dir = cache_dir.into();
        std::fs::create_dir_all(&cache_dir)
            .map_err(|e| AppError::cache_io(cache_dir.clone(), e))?;

        let audio_dir = cache_dir.join(AUDIO_DIR);
        std::fs::create_dir_all(&audio_dir)
            .map_err(|e| AppError::cache_io(audio_dir.clone(), e))?;

        Ok(Self {
            notes_path: cache_dir.join(NOTES_FILE),
            generated_path: cache_dir.join(GENERATED_FILE),
            freq_path: cache_dir.join(FREQ_FILE),
            processed_path: cache_dir.join(PROCESSED_FILE),
            cache_dir,
            audio_dir,
            notes: RwLock::new(HashMap::new()),
            generated: RwLock::new(HashMap::new()),
            freq: RwLock::new(HashMap::new()),
            processed: RwLock::new(HashMap::new()),
        })
    }

    /// 音频文件目录
    pub fn audio_dir(&self) -> &Path {
        &self.audio_dir
    }

    // ========== 加载 ==========

    /// 加载全部缓存表到内存
    pub async fn load(&self) {
        if let Some(list) = load_json::<Vec<AnkiNote>>(&self.notes_path, "笔记").await {
            let mut table = recover(self.notes.write());
            *table = list.into_iter().map(|n| (n.note_id, n)).collect();
        }
        if let Some(map) = load_json::<HashMap<String, LlmWordData>>(&self.generated_path, "生成结果").await {
            *recover(self.generated.write()) = map;
        }
        if let Some(map) = load_json::<HashMap<String, String>>(&self.freq_path, "词频").await {
            *recover(self.freq.write()) = map;
        }
        if let Some(map) =
            load_json::<HashMap<String, ProcessingRecord>>(&self.processed_path, "处理记录").await
        {
            *recover(self.processed.write()) = map;
        }

        info!(
            "缓存加载完成: notes={}, generated={}, freq={}, processed={}",
            recover(self.notes.read()).len(),
            recover(self.generated.read()).len(),
            recover(self.freq.read()).len(),
            recover(self.processed.read()).len()
        );
    }

    // ========== 笔记表 ==========

    pub fn get_note(&self, note_id: i64) -> Option<AnkiNote> {
        recover(self.notes.read()).get(&note_id).cloned()
    }

    /// 写入一批笔记（按笔记 ID 覆盖）
    pub fn put_notes(&self, notes: &[AnkiNote]) {
        let mut table = recover(self.notes.write());
        for note in notes {
            table.insert(note.note_id, note.clone());
        }
    }

    pub async fn flush_notes(&self) {
        let (json, count) = {
            let table = recover(self.notes.read());
            let mut notes: Vec<&AnkiNote> = table.values().collect();
            notes.sort_unstable_by_key(|n| n.note_id);
            (serde_json::to_string_pretty(&notes), notes.len())
        };
        write_table(&self.notes_path, json, "笔记", count).await;
    }

    // ========== 生成结果表 ==========

    pub fn get_generated(&self, word: &str, sentence: &str) -> Option<LlmWordData> {
        let cache_key = key::generation_key(word, sentence);
        recover(self.generated.read()).get(&cache_key).cloned()
    }

    pub fn put_generated(&self, word: &str, sentence: &str, data: &LlmWordData) {
        let cache_key = key::generation_key(word, sentence);
        recover(self.generated.write()).insert(cache_key, data.clone());
    }

    pub async fn flush_generated(&self) {
        let (json, count) = {
            let table = recover(self.generated.read());
            (serde_json::to_string_pretty(&*table), table.len())
        };
        write_table(&self.generated_path, json, "生成结果", count).await;
    }

    // ========== 词频表 ==========

    pub fn get_freq(&self, word: &str, lemma: Option<&str>) -> Option<String> {
        let cache_key = key::frequency_key(word, lemma);
        recover(self.freq.read()).get(&cache_key).cloned()
    }

    pub fn put_freq(&self, word: &str, lemma: Option<&str>, rank: &str) {
        let cache_key = key::frequency_key(word, lemma);
        recover(self.freq.write()).insert(cache_key, rank.to_string());
    }

    pub async fn flush_freq(&self) {
        let (json, count) = {
            let table = recover(self.freq.read());
            (serde_json::to_string_pretty(&*table), table.len())
        };
        write_table(&self.freq_path, json, "词频", count).await;
    }

    // ========== 处理记录表 ==========

    /// 该笔记是否已有成功的处理记录
    pub fn is_processed(&self, note_id: i64, word: &str, sentence: &str) -> bool {
        let cache_key = key::processing_key(note_id, word, sentence);
        recover(self.processed.read())
            .get(&cache_key)
            .map(|record| record.success)
            .unwrap_or(false)
    }

    pub fn record_processed(&self, note_id: i64, word: &str, sentence: &str, success: bool) {
        let cache_key = key::processing_key(note_id, word, sentence);
        let record = ProcessingRecord {
            note_id,
            success,
            created_at: unix_now(),
        };
        recover(self.processed.write()).insert(cache_key, record);
    }

    pub async fn flush_processed(&self) {
        let (json, count) = {
            let table = recover(self.processed.read());
            (serde_json::to_string_pretty(&*table), table.len())
        };
        write_table(&self.processed_path, json, "处理记录", count).await;
    }

    // ========== 维护 ==========

    /// 一次写回全部缓存表
    pub async fn flush_all(&self) {
        futures::future::join4(
            self.flush_notes(),
            self.flush_generated(),
            self.flush_freq(),
            self.flush_processed(),
        )
        .await;
    }

    /// 清理超过保留期的处理记录，返回清理数量
    pub async fn evict_older_than(&self, max_age_days: i64) -> usize {
        let cutoff = unix_now() - (max_age_days as f64) * 24.0 * 60.0 * 60.0;
        let removed = {
            let mut table = recover(self.processed.write());
            let before = table.len();
            table.retain(|_, record| record.created_at >= cutoff);
            before - table.len()
        };

        if removed > 0 {
            info!("清理了 {} 条过期处理记录", removed);
            self.flush_processed().await;
        }
        removed
    }

    /// 清空指定缓存表并删除对应文件
    pub async fn clear(&self, kind: CacheKind) -> AppResult<()> {
        if matches!(kind, CacheKind::Notes | CacheKind::All) {
            recover(self.notes.write()).clear();
            remove_file_if_exists(&self.notes_path).await?;
        }
        if matches!(kind, CacheKind::Generated | CacheKind::All) {
            recover(self.generated.write()).clear();
            remove_file_if_exists(&self.generated_path).await?;
        }
        if matches!(kind, CacheKind::Freq | CacheKind::All) {
            recover(self.freq.write()).clear();
            remove_file_if_exists(&self.freq_path).await?;
        }
        if matches!(kind, CacheKind::Processed | CacheKind::All) {
            recover(self.processed.write()).clear();
            remove_file_if_exists(&self.processed_path).await?;
        }

        info!("已清空{}缓存", kind);
        Ok(())
    }

    /// 当前缓存统计
    pub fn stats(&self) -> CacheStats {
        let audio_files = std::fs::read_dir(&self.audio_dir)
            .map(|entries| {
                entries
                    .filter_map(|e| e.ok())
                    .filter(|e| e.path().extension().and_then(|s| s.to_str()) == Some("mp3"))
                    .count()
            })
            .unwrap_or(0);

        CacheStats {
            notes: recover(self.notes.read()).len(),
            generated: recover(self.generated.read()).len(),
            freq: recover(self.freq.read()).len(),
            processed: recover(self.processed.read()).len(),
            audio_files,
            dir_size_mb: dir_size_bytes(&self.cache_dir) as f64 / (1024.0 * 1024.0),
        }
    }
}

/// 当前 Unix 时间戳（秒，保留毫秒精度）
fn unix_now() -> f64 {
    chrono::Utc::now().timestamp_millis() as f64 / 1000.0
}

/// 读取并反序列化一张缓存表，文件缺失或损坏时返回 None
async fn load_json<T: serde::de::DeserializeOwned>(path: &Path, label: &str) -> Option<T> {
    if !path.exists() {
        return None;
    }

    let content = match fs::read_to_string(path).await {
        Ok(content) => content,
        Err(e) => {
            warn!("读取{}缓存失败 ({}): {}", label, path.display(), e);
            return None;
        }
    };

    match serde_json::from_str(&content) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!("{}缓存文件损坏，按空缓存处理 ({}): {}", label, path.display(), e);
            None
        }
    }
}

/// 将序列化结果写入缓存文件，失败只记录日志
async fn write_table(
    path: &Path,
    json: Result<String, serde_json::Error>,
    label: &str,
    count: usize,
) {
    match json {
        Ok(json) => match fs::write(path, json).await {
            Ok(()) => debug!("{}缓存已保存: {} 条记录", label, count),
            Err(e) => error!("保存{}缓存失败 ({}): {}", label, path.display(), e),
        },
        Err(e) => error!("序列化{}缓存失败: {}", label, e),
    }
}

async fn remove_file_if_exists(path: &Path) -> AppResult<()> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(AppError::cache_io(path.to_path_buf(), e)),
    }
}

/// 递归统计目录大小（字节）
fn dir_size_bytes(dir: &Path) -> u64 {
    let mut total = 0;
    if let Ok(entries) = std::fs::read_dir(dir) {
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                total += dir_size_bytes(&path);
            } else if let Ok(meta) = entry.metadata() {
                total += meta.len();
            }
        }
    }
    total
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::assert_ok;

    fn sample_word_data() -> LlmWordData {
        LlmWordData {
            definition: "move quickly on foot".to_string(),
            definition_ru: "бежать".to_string(),
            ipa: "rʌn".to_string(),
            lemma: "run".to_string(),
            collocations: "<i>run fast</i> — быстро бежать".to_string(),
            synonyms: "sprint — бежать изо всех сил (спринтовать)".to_string(),
            antonyms: String::new(),
            related_forms: "noun: runner = бегун".to_string(),
            examples: "A: Do you run? — Ты бегаешь?<br>B: Every day. — Каждый день.".to_string(),
            hint: "Быстро передвигаться бегом.".to_string(),
            tags: vec!["A2".to_string(), "verb".to_string()],
        }
    }

    fn sample_note(note_id: i64) -> AnkiNote {
        AnkiNote {
            note_id,
            model_name: "ForkLapisForEnglsih".to_string(),
            deck_name: String::new(),
            fields: HashMap::from([
                ("Expression".to_string(), "run".to_string()),
                ("Sentence".to_string(), "He runs every morning.".to_string()),
            ]),
            tags: vec![],
        }
    }

    #[tokio::test]
    async fn test_round_trip_after_flush_and_load() {
        let dir = tempfile::tempdir().unwrap();

        let store = assert_ok!(CacheStore::new(dir.path()));
        store.put_notes(&[sample_note(1)]);
        store.put_generated("run", "He runs every morning.", &sample_word_data());
        store.put_freq("running", Some("run"), "1234");
        store.record_processed(1, "run", "He runs every morning.", true);
        store.flush_all().await;

        let reloaded = assert_ok!(CacheStore::new(dir.path()));
        reloaded.load().await;

        let note = reloaded.get_note(1).unwrap();
        assert_eq!(note.fields["Expression"], "run");

        let data = reloaded.get_generated("run", "He runs every morning.").unwrap();
        assert_eq!(data.definition, "move quickly on foot");
        assert_eq!(reloaded.get_freq("whatever", Some("run")).as_deref(), Some("1234"));
        assert!(reloaded.is_processed(1, "run", "He runs every morning."));
        assert!(!reloaded.is_processed(2, "run", "He runs every morning."));

        let stats = reloaded.stats();
        assert_eq!(stats.notes, 1);
        assert_eq!(stats.generated, 1);
        assert_eq!(stats.freq, 1);
        assert_eq!(stats.processed, 1);
    }

    #[tokio::test]
    async fn test_corrupt_file_degrades_to_empty() {
        let dir = tempfile::tempdir().unwrap();

        let store = CacheStore::new(dir.path()).unwrap();
        store.put_freq("run", None, "1234");
        store.flush_freq().await;

        tokio::fs::write(dir.path().join(GENERATED_FILE), "{not valid json!!")
            .await
            .unwrap();

        let reloaded = CacheStore::new(dir.path()).unwrap();
        reloaded.load().await;

        assert!(reloaded.get_generated("run", "any").is_none());
        assert_eq!(reloaded.get_freq("run", None).as_deref(), Some("1234"));
    }

    #[tokio::test]
    async fn test_is_processed_requires_success() {
        let dir = tempfile::tempdir().unwrap();
        let store = CacheStore::new(dir.path()).unwrap();

        store.record_processed(7, "walk", "She walks.", false);
        assert!(!store.is_processed(7, "walk", "She walks."));

        store.record_processed(7, "walk", "She walks.", true);
        assert!(store.is_processed(7, "walk", "She walks."));
    }

    #[tokio::test]
    async fn test_processed_check_normalizes_inputs() {
        let dir = tempfile::tempdir().unwrap();
        let store = CacheStore::new(dir.path()).unwrap();

        store.record_processed(7, "Walk", "She  walks fast.", true);
        assert!(store.is_processed(7, "walk", "she walks FAST."));
    }

    #[tokio::test]
    async fn test_evict_old_records() {
        let dir = tempfile::tempdir().unwrap();
        let store = CacheStore::new(dir.path()).unwrap();

        store.record_processed(1, "fresh", "A fresh one.", true);
        {
            let mut table = store.processed.write().unwrap();
            table.insert(
                key::processing_key(2, "stale", "A stale one."),
                ProcessingRecord {
                    note_id: 2,
                    success: true,
                    created_at: unix_now() - 90.0 * 24.0 * 60.0 * 60.0,
                },
            );
        }

        let removed = store.evict_older_than(30).await;
        assert_eq!(removed, 1);
        assert!(store.is_processed(1, "fresh", "A fresh one."));
        assert!(!store.is_processed(2, "stale", "A stale one."));
    }

    #[tokio::test]
    async fn test_clear_removes_table_and_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = CacheStore::new(dir.path()).unwrap();

        store.put_freq("run", None, "1234");
        store.flush_freq().await;
        assert!(dir.path().join(FREQ_FILE).exists());

        store.clear(CacheKind::Freq).await.unwrap();
        assert!(store.get_freq("run", None).is_none());
        assert!(!dir.path().join(FREQ_FILE).exists());
    }

    #[test]
    fn test_poisoned_table_keeps_serving() {
        let dir = tempfile::tempdir().unwrap();
        let store = CacheStore::new(dir.path()).unwrap();
        store.put_freq("run", None, "120");

        // 制造锁中毒：持写锁时 panic
        let crashed = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _guard = store.freq.write().unwrap();
            panic!("持锁任务崩溃");
        }));
        assert!(crashed.is_err());
        assert!(store.freq.is_poisoned());

        // 之后的读写照常工作
        assert_eq!(store.get_freq("run", None).as_deref(), Some("120"));
        store.put_freq("walk", None, "300");
        assert_eq!(store.get_freq("walk", None).as_deref(), Some("300"));
        assert_eq!(store.stats().freq, 2);
    }
}
