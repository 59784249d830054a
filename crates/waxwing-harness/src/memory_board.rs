//! In-memory bulletin board.

use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use waxwing_core::{BoardAccount, BoardPost, BulletinBoard, CoreError};

/// Posts returned by `fetch_recent`.
pub const RECENT_LIMIT: usize = 20;

#[derive(Default)]
struct BoardState {
    /// Oldest first
    posts: Vec<BoardPost>,
    /// auth token → (platform id, username)
    accounts: HashMap<String, (String, String)>,
    hidden_from_recent: HashSet<String>,
}

/// Shared board with per-account handles.
///
/// Every handle sees the same posts; each handle is signed in as at most
/// one account.
#[derive(Clone, Default)]
pub struct MemoryBoard {
    state: Arc<Mutex<BoardState>>,
    account: Option<BoardAccount>,
}

impl MemoryBoard {
    /// Empty board, signed out.
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle on the same board signed in as `username`.
    pub fn as_account(&self, username: &str, platform_id: &str) -> Self {
        let auth_token = format!("token-{platform_id}");
        self.lock()
            .accounts
            .insert(auth_token.clone(), (platform_id.to_string(), username.to_string()));
        Self {
            state: Arc::clone(&self.state),
            account: Some(BoardAccount {
                auth_token,
                platform_id: platform_id.to_string(),
                platform_username: username.to_string(),
            }),
        }
    }

    /// Append a post directly.
    pub fn inject(&self, post: BoardPost) {
        self.lock().posts.push(post);
    }

    /// Make `username`'s posts invisible to `fetch_recent` (still
    /// searchable).
    pub fn hide_recent(&self, username: &str) {
        self.lock().hidden_from_recent.insert(username.to_string());
    }

    /// Drop every post by `username`.
    pub fn erase(&self, username: &str) {
        self.lock().posts.retain(|post| post.author_username != username);
    }

    /// Posts by `username`, oldest first.
    pub fn posts_by(&self, username: &str) -> Vec<BoardPost> {
        self.lock().posts.iter().filter(|p| p.author_username == username).cloned().collect()
    }

    #[allow(clippy::expect_used)]
    fn lock(&self) -> std::sync::MutexGuard<'_, BoardState> {
        self.state.lock().expect("Mutex poisoned")
    }
}

#[async_trait]
impl BulletinBoard for MemoryBoard {
    async fn fetch_recent(&self, username: &str) -> Result<Vec<BoardPost>, CoreError> {
        let state = self.lock();
        if state.hidden_from_recent.contains(username) {
            return Ok(Vec::new());
        }
        Ok(state
            .posts
            .iter()
            .rev()
            .filter(|post| post.author_username == username)
            .take(RECENT_LIMIT)
            .cloned()
            .collect())
    }

    async fn search(&self, query: &str) -> Result<Vec<BoardPost>, CoreError> {
        let author = query.split_whitespace().find_map(|token| token.strip_prefix("from:"));
        let markers: Vec<&str> = query.split_whitespace().filter(|t| t.starts_with('#')).collect();

        let state = self.lock();
        Ok(state
            .posts
            .iter()
            .rev()
            .filter(|post| author.is_none_or(|author| post.author_username == author))
            .filter(|post| markers.iter().any(|marker| post.text.starts_with(marker)))
            .cloned()
            .collect())
    }

    async fn post(&self, text: &str, auth_token: &str) -> Result<(), CoreError> {
        let mut state = self.lock();
        let Some((platform_id, username)) = state.accounts.get(auth_token).cloned() else {
            return Err(CoreError::Generic("unknown auth token".into()));
        };
        state.posts.push(BoardPost {
            text: text.to_string(),
            author_id: platform_id,
            author_username: username,
        });
        Ok(())
    }

    async fn current_account(&self) -> Result<Option<BoardAccount>, CoreError> {
        Ok(self.account.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn posts_are_attributed_to_the_token_owner() {
        let board = MemoryBoard::new();
        let alice = board.as_account("alice", "1");
        alice.post("#signkey 1 aa", "token-1").await.unwrap();

        let recent = board.fetch_recent("alice").await.unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].author_id, "1");
        assert!(alice.post("x", "token-9").await.is_err());
    }

    #[tokio::test]
    async fn hidden_posts_are_still_searchable() {
        let board = MemoryBoard::new();
        let alice = board.as_account("alice", "1");
        alice.post("#signkey 1 aa", "token-1").await.unwrap();
        alice.post("hello", "token-1").await.unwrap();
        board.hide_recent("alice");

        assert!(board.fetch_recent("alice").await.unwrap().is_empty());
        let found = board.search("#signkey OR #keysig from:alice").await.unwrap();
        assert_eq!(found.len(), 1);
        assert!(board.search("#signkey from:bob").await.unwrap().is_empty());
    }
}
