//! Bulletin board collaborator.

use async_trait::async_trait;

use crate::CoreError;

/// One post as returned by the board.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoardPost {
    /// Post text
    pub text: String,
    /// Platform-stable id of the author account
    pub author_id: String,
    /// Display username of the author account
    pub author_username: String,
}

/// The account the board is currently signed in as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoardAccount {
    /// Credential passed back to [`BulletinBoard::post`]
    pub auth_token: String,
    /// Platform-stable account id
    pub platform_id: String,
    /// Account username
    pub platform_username: String,
}

/// Externally hosted, append-only public directory.
///
/// Implementations own transport, rate limiting and timeouts. Every method
/// may fail with [`CoreError::Generic`]; the directory treats such failures
/// as "nothing found".
#[async_trait]
pub trait BulletinBoard: Send + Sync + 'static {
    /// Most recent posts by `username`, newest first.
    async fn fetch_recent(&self, username: &str) -> Result<Vec<BoardPost>, CoreError>;

    /// Full-text search, newest first.
    async fn search(&self, query: &str) -> Result<Vec<BoardPost>, CoreError>;

    /// Post `text` as the account owning `auth_token`.
    async fn post(&self, text: &str, auth_token: &str) -> Result<(), CoreError>;

    /// Signed-in account, if any.
    async fn current_account(&self) -> Result<Option<BoardAccount>, CoreError>;
}
