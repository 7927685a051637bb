use thiserror::Error;

/// 服务器启动 / 运行错误
///
/// 请求级错误走 `shared::error::AppError`，这里只处理进程级失败。
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("工作目录错误: {0}")]
    WorkDir(#[source] std::io::Error),

    #[error("端口绑定失败 {addr}: {source}")]
    Bind {
        addr: std::net::SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("内部服务器错误")]
    Internal(#[from] anyhow::Error),
}

/// 服务器 Result 类型别名
pub type Result<T> = std::result::Result<T, ServerError>;
