use std::sync::Arc;

use pinpad::SimulatedTerminal;
use pos_server::{Config, Server, ServerState, setup_environment};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. .env 优先于默认值
    dotenv::dotenv().ok();

    // 2. 加载配置，设置环境 (工作目录, 日志)
    let config = Config::from_env();
    setup_environment(&config)?;
    pos_server::api::health::mark_started();

    tracing::info!(
        environment = %config.environment,
        policy = ?config.confirmation_policy,
        "POS terminal server starting..."
    );

    // 3. 终端驱动: 目前只有进程内模拟终端 (认证测试 / 开发)
    let bridge = Arc::new(SimulatedTerminal::new().with_two_phase(config.simulator_two_phase));

    // 4. 初始化服务器状态
    let state = ServerState::initialize(&config, bridge)?;

    // 5. 启动 HTTP 服务器 (冷启动恢复在 run 内完成)
    let server = Server::with_state(config, state);

    if let Err(e) = server.run().await {
        tracing::error!("Server error: {}", e);
        return Err(e.into());
    }

    Ok(())
}
