use std::collections::VecDeque;

use ahash::HashSet;
use chrono::{DateTime, Utc};
use parking_lot::Mutex as SyncMutex;
use tokio::sync::Mutex as AsyncMutex;
use tokio::sync::mpsc;

/// Maximum number of posts kept in a user's `recentPosts` ring (spec.md §3).
pub const MAX_RECENT_POSTS: usize = 20;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Post {
    pub author: String,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

pub(crate) struct UserState {
    pub(crate) followers: HashSet<String>,
    pub(crate) following: HashSet<String>,
    /// Most-recent-first, per the replay contract in spec.md §4.6.
    pub(crate) recent_posts: VecDeque<Post>,
}

/// In-memory record for one account. `state` (followers/following/recent
/// posts) and `stream` (the live timeline subscriber) are separate locks,
/// matching spec.md §4.6's "each User has a dedicated lock protecting
/// writes to its timelineStream". `stream` is a `tokio::sync::Mutex`
/// because holding it across the subscriber's `send().await` is exactly
/// how concurrent fan-outs to the same recipient get serialized.
pub struct User {
    pub username: String,
    state: SyncMutex<UserState>,
    stream: AsyncMutex<Option<mpsc::Sender<Post>>>,
}

impl User {
    /// A freshly logged-in user follows and is followed by themselves
    /// (spec.md §3).
    pub fn new(username: &str) -> Self {
        let mut followers = HashSet::default();
        let mut following = HashSet::default();
        followers.insert(username.to_string());
        following.insert(username.to_string());

        Self {
            username: username.to_string(),
            state: SyncMutex::new(UserState {
                followers,
                following,
                recent_posts: VecDeque::new(),
            }),
            stream: AsyncMutex::new(None),
        }
    }

    /// Reconstructs a user from persisted state at startup.
    pub fn from_parts(
        username: String,
        followers: Vec<String>,
        following: Vec<String>,
        posts: Vec<Post>,
    ) -> Self {
        Self {
            username,
            state: SyncMutex::new(UserState {
                followers: followers.into_iter().collect(),
                following: following.into_iter().collect(),
                recent_posts: posts.into_iter().collect(),
            }),
            stream: AsyncMutex::new(None),
        }
    }

    pub fn followers(&self) -> Vec<String> {
        self.state.lock().followers.iter().cloned().collect()
    }

    pub fn following(&self) -> Vec<String> {
        self.state.lock().following.iter().cloned().collect()
    }

    /// Most-recent-first snapshot for replay or persistence.
    pub fn recent_posts(&self) -> Vec<Post> {
        self.state.lock().recent_posts.iter().cloned().collect()
    }

    /// Exposes the raw state lock so callers that must hold two users'
    /// locks at once (Follow/UnFollow, in canonical username order) can do
    /// so without re-entering through a higher-level method.
    pub(crate) fn state(&self) -> &SyncMutex<UserState> {
        &self.state
    }

    /// Prepends `post` to `recentPosts`, evicting the oldest entry past
    /// `MAX_RECENT_POSTS`, and delivers it to the live subscriber if one is
    /// attached. Holds `stream` for the whole operation so it can never
    /// interleave with [`User::attach_stream`]'s own snapshot-then-attach
    /// step: a post is provably visible to a subscriber either in the
    /// backlog `attach_stream` snapshots or in the live feed it is
    /// subscribed to by the time `attach_stream` returns, never in neither
    /// (spec.md §4.6's Attached-state guarantee).
    pub(crate) async fn publish(&self, post: Post) {
        let mut guard = self.stream.lock().await;
        {
            let mut state = self.state.lock();
            state.recent_posts.push_front(post.clone());
            while state.recent_posts.len() > MAX_RECENT_POSTS {
                state.recent_posts.pop_back();
            }
        }

        if let Some(tx) = guard.as_ref() {
            if tx.send(post).await.is_err() {
                *guard = None;
            }
        }
    }

    /// Attaches `tx` as the live subscriber and replays the current
    /// backlog onto it, most-recent-first, all under the `stream` lock so
    /// no concurrent [`User::publish`] can land a post in the gap between
    /// the replay and the attach.
    pub async fn attach_stream(&self, tx: mpsc::Sender<Post>) {
        let mut guard = self.stream.lock().await;
        let backlog = self.recent_posts();
        for post in backlog {
            if tx.send(post).await.is_err() {
                return;
            }
        }
        *guard = Some(tx);
    }

    pub async fn detach_stream(&self) {
        *self.stream.lock().await = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn post(author: &str, text: &str) -> Post {
        Post {
            author: author.to_string(),
            text: text.to_string(),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn new_user_follows_and_is_followed_by_self() {
        let user = User::new("alice");
        assert_eq!(user.followers(), vec!["alice".to_string()]);
        assert_eq!(user.following(), vec!["alice".to_string()]);
    }

    #[tokio::test]
    async fn recent_posts_bounded_and_most_recent_first() {
        let user = User::new("alice");
        for i in 0..25 {
            user.publish(post("alice", &i.to_string())).await;
        }
        let posts = user.recent_posts();
        assert_eq!(posts.len(), MAX_RECENT_POSTS);
        assert_eq!(posts[0].text, "24");
        assert_eq!(posts[posts.len() - 1].text, "5");
    }

    #[tokio::test]
    async fn attach_stream_replays_backlog_before_live_posts() {
        let user = User::new("alice");
        user.publish(post("alice", "backlog")).await;

        let (tx, mut rx) = mpsc::channel(8);
        user.attach_stream(tx).await;
        user.publish(post("alice", "live")).await;

        assert_eq!(rx.recv().await.unwrap().text, "backlog");
        assert_eq!(rx.recv().await.unwrap().text, "live");
    }
}
