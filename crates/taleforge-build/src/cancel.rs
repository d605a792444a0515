//! ビルドの協調キャンセル

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// ビルド1回分のキャンセルトークン
///
/// クローンはすべて同じフラグを共有する。ビルダー起動プロトコルが
/// ログ1行ごと（出力がなければポーリング間隔ごと)にフラグを確認する。
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// キャンセルを要求する（何度呼んでもよい）
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}
