//! 交互式命令行界面
//!
//! 负责终端交互：牌组与笔记类型选择、配置确认、预览展示、
//! 处理报告输出，以及缓存维护菜单。
//!
//! 面向用户的内容用 println! 直接输出，错误与过程信息走日志。
//! 配置中已指定牌组和笔记类型时跳过交互，直接处理。

use std::io::{self, Write};

use tracing::error;

use crate::cache::CacheKind;
use crate::models::{DeckPreview, DeckReport};
use crate::orchestrator::App;
use crate::services::NoteValidator;

/// 命令行入口
pub async fn run(app: App) -> anyhow::Result<()> {
    let deck_name = app.config().deck_name.clone();
    let note_type = app.config().note_type.clone();

    // 非交互模式：配置里给全了目标就直接跑
    if !deck_name.is_empty() && !note_type.is_empty() {
        let report = app.process_deck(&deck_name, &note_type).await?;
        print_report(&report);
        return Ok(());
    }

    run_interactive(&app).await
}

async fn run_interactive(app: &App) -> anyhow::Result<()> {
    println!("=== Anki 笔记批量增强工具 ===");

    loop {
        println!();
        println!("1. 处理牌组");
        println!("2. 查看缓存统计");
        println!("3. 清空缓存");
        println!("q. 退出");

        let choice = prompt("\n请选择操作: ").await?;
        match choice.as_str() {
            "1" => {
                if process_deck_interactive(app).await? {
                    break;
                }
            }
            "2" => print_cache_stats(app),
            "3" => clear_cache_interactive(app).await?,
            "q" | "Q" => break,
            _ => println!("无效的选择，请重新输入"),
        }
    }

    println!("再见");
    Ok(())
}

/// 完整的牌组处理交互流程
///
/// 返回 true 表示完成了一次处理（或中途退出），回到主菜单无意义。
async fn process_deck_interactive(app: &App) -> anyhow::Result<bool> {
    // 选择牌组
    let decks = app.deck_names().await?;
    if decks.is_empty() {
        println!("错误: 没有找到任何牌组");
        return Ok(false);
    }
    println!("\n可用牌组 ({}):", decks.len());
    let deck_name = match select_from_list(&decks, "牌组").await? {
        Some(name) => name,
        None => return Ok(false),
    };
    println!("✓ 已选择牌组: {}\n", deck_name);

    // 选择笔记类型：只列出 Anki 中存在且已注册配置的类型
    let model_names = app.model_names().await?;
    let supported: Vec<String> = model_names
        .into_iter()
        .filter(|name| app.validator().get(name).is_some())
        .collect();
    if supported.is_empty() {
        println!("错误: 没有找到受支持的笔记类型");
        println!("已注册的配置: {}", app.validator().supported_names().join(", "));
        return Ok(false);
    }
    println!("受支持的笔记类型 ({}):", supported.len());
    let note_type = match select_from_list(&supported, "笔记类型").await? {
        Some(name) => name,
        None => return Ok(false),
    };
    println!("✓ 已选择笔记类型: {}\n", note_type);

    // 确认配置
    if !confirm_configuration(app, &deck_name, &note_type).await? {
        return Ok(false);
    }

    // 预览与校验
    if !show_preview(app, &deck_name, &note_type).await? {
        return Ok(false);
    }

    // 正式处理
    if app.config().dry_run {
        println!("🔄 开始试运行（不会修改任何笔记）...");
    } else {
        println!("🔄 开始处理笔记...");
    }

    match app.process_deck(&deck_name, &note_type).await {
        Ok(report) => print_report(&report),
        Err(e) => {
            error!("处理牌组失败: {}", e);
            println!("❌ 处理失败: {}", e);
        }
    }
    Ok(true)
}

/// 展示本次处理的配置并请求确认
async fn confirm_configuration(
    app: &App,
    deck_name: &str,
    note_type: &str,
) -> anyhow::Result<bool> {
    let config = app.config();

    println!("=== 处理配置确认 ===");
    println!("牌组: {}", deck_name);
    println!("笔记类型: {}", note_type);
    println!("试运行: {}", yes_no(config.dry_run));
    println!("跳过音频: {}", yes_no(config.skip_audio));
    println!("跳过词频: {}", yes_no(config.skip_frequency));
    println!("跳过校验不通过的笔记: {}", yes_no(config.skip_invalid_notes));
    if !config.force_regenerate.is_empty() {
        println!("强制重新生成: {}", config.force_regenerate.join(", "));
    }

    if let Some(note_config) = app.validator().get(note_type) {
        println!("\n字段处理方式:");
        println!("  INPUT (处理前必须已填写): {:?}", note_config.input_fields());
        println!("  GENERATE (将被填充): {:?}", note_config.generate_fields());
    }

    // 对照 Anki 中的实际字段检查配置兼容性
    let anki_fields = app.model_field_names(note_type).await?;
    let (compatible, missing) = app.validator().check_compatibility(&anki_fields, note_type)?;
    if !compatible {
        println!("\n⚠️ 警告: Anki 模型缺少配置要求的字段: {:?}", missing);
    }

    confirm("\n继续处理? (y/n): ").await
}

/// 展示牌组预览，返回是否继续
async fn show_preview(app: &App, deck_name: &str, note_type: &str) -> anyhow::Result<bool> {
    println!("正在获取牌组预览...");
    let preview = app.preview_deck(deck_name, note_type).await?;

    println!("\n=== 牌组预览 ===");
    println!("总计: {} 条笔记", preview.total_notes);

    if preview.total_notes == 0 {
        println!("没有找到笔记");
        return Ok(false);
    }

    let validation = &preview.validation;
    println!("校验通过: {} 条", validation.valid_notes);
    println!("校验不通过: {} 条", validation.invalid_notes);

    if validation.invalid_notes > 0 {
        println!("⚠️ 共发现 {} 个校验问题", validation.errors.len());
        if confirm("查看问题明细? (y/n): ").await? {
            println!("\n{}", NoteValidator::format_report(validation));
        }
    }

    print_samples(&preview);

    // 有不合格笔记时的分支：自动跳过只提示，整批中止前再次确认
    if validation.invalid_notes > 0 {
        if app.config().skip_invalid_notes {
            println!(
                "\n📋 {} 条校验不通过的笔记将被自动跳过，实际处理 {} 条",
                validation.invalid_notes, validation.valid_notes
            );
        } else if !app.config().dry_run {
            println!(
                "\n⚠️ 注意: 当前配置不允许跳过，存在 {} 条不合格笔记时整批处理会中止",
                validation.invalid_notes
            );
            return confirm("仍然继续? (y/n): ").await;
        }
    }

    Ok(true)
}

fn print_samples(preview: &DeckPreview) {
    if preview.samples.is_empty() {
        return;
    }

    println!("\n样本笔记 (前 {} 条):", preview.samples.len());
    for sample in &preview.samples {
        let fields: Vec<String> = sample
            .fields
            .iter()
            .map(|(name, value)| format!("{}={}", name, value))
            .collect();
        println!("  笔记 {}: {}", sample.note_id, fields.join(" | "));
    }
}

fn print_report(report: &DeckReport) {
    println!("\n=== 处理报告 ===");
    println!("牌组: {} / 笔记类型: {}", report.deck_name, report.note_type);
    println!("查询到: {} 条", report.total_notes);
    println!("实际处理: {} 条", report.attempted);
    println!("成功: {} (其中缓存命中 {})", report.succeeded, report.from_cache);
    println!("失败: {}", report.failed);
    if report.skipped_invalid > 0 {
        println!("跳过校验不通过: {}", report.skipped_invalid);
    }
    println!("耗时: {:.1} 秒", report.elapsed_secs);
    if report.dry_run {
        println!("（试运行，未写回任何修改）");
    }
    if let Some(status) = &report.status {
        println!("状态: {}", status);
    }

    let failures: Vec<_> = report.outcomes.iter().filter(|o| !o.success).collect();
    if !failures.is_empty() {
        println!("\n失败明细 (最多展示 10 条):");
        for outcome in failures.iter().take(10) {
            println!(
                "  笔记 {}: {}",
                outcome.note_id,
                outcome.status.as_deref().unwrap_or("未知原因")
            );
        }
    }
}

fn print_cache_stats(app: &App) {
    let stats = app.cache().stats();
    println!("\n=== 缓存统计 ===");
    println!("笔记: {} 条", stats.notes);
    println!("生成结果: {} 条", stats.generated);
    println!("词频: {} 条", stats.freq);
    println!("处理记录: {} 条", stats.processed);
    println!("音频文件: {} 个", stats.audio_files);
    println!("占用空间: {:.2} MB", stats.dir_size_mb);
}

async fn clear_cache_interactive(app: &App) -> anyhow::Result<()> {
    println!("\n清空哪类缓存?");
    println!("1. 笔记");
    println!("2. 生成结果");
    println!("3. 词频");
    println!("4. 处理记录");
    println!("5. 全部");
    println!("q. 取消");

    let kind = match prompt("\n请选择: ").await?.as_str() {
        "1" => CacheKind::Notes,
        "2" => CacheKind::Generated,
        "3" => CacheKind::Freq,
        "4" => CacheKind::Processed,
        "5" => CacheKind::All,
        _ => return Ok(()),
    };

    if !confirm(&format!("确认清空{}缓存? (y/n): ", kind)).await? {
        return Ok(());
    }

    match app.cache().clear(kind).await {
        Ok(()) => println!("✓ 已清空{}缓存", kind),
        Err(e) => println!("❌ 清空缓存失败: {}", e),
    }
    Ok(())
}

// ========== 终端输入辅助函数 ==========

/// 打印提示并读取一行输入（去除首尾空白）
///
/// 标准输入是阻塞读取，放到专用阻塞线程上执行，不占用运行时工作线程。
async fn prompt(message: &str) -> anyhow::Result<String> {
    let message = message.to_string();
    let line = tokio::task::spawn_blocking(move || -> io::Result<String> {
        print!("{}", message);
        io::stdout().flush()?;

        let mut line = String::new();
        io::stdin().read_line(&mut line)?;
        Ok(line.trim().to_string())
    })
    .await??;
    Ok(line)
}

/// 解析是/否输入
fn parse_confirm(input: &str) -> Option<bool> {
    match input.trim().to_lowercase().as_str() {
        "y" | "yes" | "是" => Some(true),
        "n" | "no" | "否" => Some(false),
        _ => None,
    }
}

/// 解析编号选择：q 表示取消，有效编号转为 0 起的下标
fn parse_selection(input: &str, count: usize) -> Result<Option<usize>, String> {
    if input.eq_ignore_ascii_case("q") {
        return Ok(None);
    }

    match input.parse::<usize>() {
        Ok(n) if n >= 1 && n <= count => Ok(Some(n - 1)),
        Ok(_) => Err("编号超出范围".to_string()),
        Err(_) => Err("请输入数字".to_string()),
    }
}

/// 从编号列表中选择一项，输入 q 返回 None
async fn select_from_list(items: &[String], label: &str) -> anyhow::Result<Option<String>> {
    for (i, item) in items.iter().enumerate() {
        println!("  {}. {}", i + 1, item);
    }

    loop {
        let choice = prompt(&format!(
            "\n请选择{} (1-{})，或输入 q 返回: ",
            label,
            items.len()
        ))
        .await?;

        match parse_selection(&choice, items.len()) {
            Ok(None) => return Ok(None),
            Ok(Some(index)) => return Ok(Some(items[index].clone())),
            Err(message) => println!("错误: {}", message),
        }
    }
}

/// 是/否确认，反复询问直到输入有效
async fn confirm(message: &str) -> anyhow::Result<bool> {
    loop {
        let choice = prompt(message).await?;
        match parse_confirm(&choice) {
            Some(value) => return Ok(value),
            None => println!("请输入 y 或 n"),
        }
    }
}

fn yes_no(value: bool) -> &'static str {
    if value {
        "是"
    } else {
        "否"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_confirm_variants() {
        assert_eq!(parse_confirm("y"), Some(true));
        assert_eq!(parse_confirm("YES"), Some(true));
        assert_eq!(parse_confirm("是"), Some(true));
        assert_eq!(parse_confirm(" n "), Some(false));
        assert_eq!(parse_confirm("No"), Some(false));
        assert_eq!(parse_confirm("否"), Some(false));
        assert_eq!(parse_confirm("maybe"), None);
        assert_eq!(parse_confirm(""), None);
    }

    #[test]
    fn test_parse_selection_accepts_valid_numbers() {
        assert_eq!(parse_selection("1", 3), Ok(Some(0)));
        assert_eq!(parse_selection("3", 3), Ok(Some(2)));
        assert_eq!(parse_selection("q", 3), Ok(None));
        assert_eq!(parse_selection("Q", 3), Ok(None));
    }

    #[test]
    fn test_parse_selection_rejects_bad_input() {
        assert!(parse_selection("0", 3).is_err());
        assert!(parse_selection("4", 3).is_err());
        assert!(parse_selection("abc", 3).is_err());
        assert!(parse_selection("", 3).is_err());
    }
}
