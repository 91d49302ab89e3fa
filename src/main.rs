use anyhow::Result;

use anki_enricher::cli;
use anki_enricher::orchestrator::App;
use anki_enricher::utils::logging;
use anki_enricher::Config;

#[tokio::main]
async fn main() -> Result<()> {
    // 初始化日志
    logging::init();

    // 加载配置
    let config = Config::from_env();

    // 初始化并运行应用
    let app = App::initialize(config).await?;
    cli::run(app).await?;

    Ok(())
}
