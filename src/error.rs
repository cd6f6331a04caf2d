use thiserror::Error;

// 構成の検証エラー
// 同期操作そのものはエラーを返さない。スレッドを起動する前にここで弾く
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("resource ring needs at least 2 actors, got {0}")]
    TooFewActors(usize),

    #[error("{0} capacity must be greater than zero")]
    ZeroCapacity(&'static str),

    #[error("{0} must have at least one thread")]
    NoThreads(&'static str),

    #[error("queue demo is unbalanced: {enqueued} items enqueued but {dequeued} dequeued")]
    Unbalanced { enqueued: usize, dequeued: usize },
}
