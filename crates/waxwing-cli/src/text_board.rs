//! Bulletin board that only collects what would be posted.

use std::sync::Mutex;

use async_trait::async_trait;
use waxwing_core::{BoardAccount, BoardPost, BulletinBoard, CoreError};

/// Signed in as one account; posts are kept for printing.
pub struct TextBoard {
    account: BoardAccount,
    posts: Mutex<Vec<String>>,
}

impl TextBoard {
    /// Board signed in as `username` on account `platform_id`.
    pub fn new(username: &str, platform_id: &str) -> Self {
        Self {
            account: BoardAccount {
                auth_token: String::new(),
                platform_id: platform_id.to_string(),
                platform_username: username.to_string(),
            },
            posts: Mutex::new(Vec::new()),
        }
    }

    /// Posted texts, in order.
    #[allow(clippy::expect_used)]
    pub fn posts(&self) -> Vec<String> {
        self.posts.lock().expect("Mutex poisoned").clone()
    }
}

#[async_trait]
impl BulletinBoard for TextBoard {
    async fn fetch_recent(&self, _username: &str) -> Result<Vec<BoardPost>, CoreError> {
        Ok(Vec::new())
    }

    async fn search(&self, _query: &str) -> Result<Vec<BoardPost>, CoreError> {
        Ok(Vec::new())
    }

    #[allow(clippy::expect_used)]
    async fn post(&self, text: &str, _auth_token: &str) -> Result<(), CoreError> {
        self.posts.lock().expect("Mutex poisoned").push(text.to_string());
        Ok(())
    }

    async fn current_account(&self) -> Result<Option<BoardAccount>, CoreError> {
        Ok(Some(self.account.clone()))
    }
}
